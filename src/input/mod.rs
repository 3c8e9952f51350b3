//! Pointer input translation
//!
//! Converts low-level pointer notifications into window-relative
//! [`MouseEvent`]s. Each window keeps a [`PointerTracker`] holding the last
//! known pointer position; button and scroll events are reported at that
//! position.

use log::trace;

/// Linux input event codes for the buttons this layer reports
const BTN_LEFT: u32 = 0x110;
const BTN_RIGHT: u32 = 0x111;
const BTN_MIDDLE: u32 = 0x112;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Map an evdev button code; anything outside the closed set is `None`
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            BTN_LEFT => Some(MouseButton::Left),
            BTN_RIGHT => Some(MouseButton::Right),
            BTN_MIDDLE => Some(MouseButton::Middle),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            MouseButton::Left => BTN_LEFT,
            MouseButton::Right => BTN_RIGHT,
            MouseButton::Middle => BTN_MIDDLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    Press,
    Release,
    Move,
    Wheel,
}

/// A translated, window-relative mouse event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub x: f64,
    pub y: f64,
    /// Set for `Press` and `Release`
    pub button: Option<MouseButton>,
    pub action: MouseAction,
    pub delta_x: f64,
    pub delta_y: f64,
}

impl MouseEvent {
    fn at(x: f64, y: f64, action: MouseAction) -> Self {
        Self {
            x,
            y,
            button: None,
            action,
            delta_x: 0.0,
            delta_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Raw pointer notifications as delivered on a window's pointer object
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    /// Pointer entered this window's surface
    Enter { x: f64, y: f64 },
    /// Pointer left this window's surface
    Leave,
    Motion { x: f64, y: f64 },
    Button { code: u32, state: ButtonState },
    /// `axis` is `None` for axes this client does not know
    Axis { axis: Option<ScrollAxis>, value: f64 },
    Frame,
    AxisSource,
    AxisStop,
    AxisDiscrete,
    AxisValue120,
}

/// Per-window pointer state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerTracker {
    x: f64,
    y: f64,
    inside: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// Update state from a notification and return the event to report, if any.
    pub fn translate(&mut self, event: &PointerEvent) -> Option<MouseEvent> {
        match *event {
            PointerEvent::Enter { x, y } => {
                self.x = x;
                self.y = y;
                self.inside = true;
                None
            }
            PointerEvent::Leave => {
                self.inside = false;
                None
            }
            PointerEvent::Motion { x, y } => {
                self.x = x;
                self.y = y;
                Some(MouseEvent::at(x, y, MouseAction::Move))
            }
            PointerEvent::Button { code, state } => {
                let Some(button) = MouseButton::from_code(code) else {
                    trace!("Unsupported button code {:#x} dropped", code);
                    return None;
                };
                let action = match state {
                    ButtonState::Pressed => MouseAction::Press,
                    ButtonState::Released => MouseAction::Release,
                };
                Some(MouseEvent {
                    button: Some(button),
                    ..MouseEvent::at(self.x, self.y, action)
                })
            }
            PointerEvent::Axis { axis, value } => {
                let mut wheel = MouseEvent::at(self.x, self.y, MouseAction::Wheel);
                match axis? {
                    ScrollAxis::Vertical => wheel.delta_y = value,
                    ScrollAxis::Horizontal => wheel.delta_x = value,
                }
                Some(wheel)
            }
            // frame grouping and fine-grained scroll metadata are not reported
            PointerEvent::Frame
            | PointerEvent::AxisSource
            | PointerEvent::AxisStop
            | PointerEvent::AxisDiscrete
            | PointerEvent::AxisValue120 => None,
        }
    }
}
