//! Event handlers for every protocol object kind.
//!
//! Handlers only decode; all state changes happen later in the manager.

use crate::input::{ButtonState, PointerEvent, ScrollAxis};
use crate::protocol::{ServerEvent, ToplevelState};
use crate::shm::BufferId;
use crate::window::WindowId;
use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use wayland_client::{
    delegate_noop,
    protocol::{wl_buffer, wl_compositor, wl_pointer, wl_registry, wl_seat, wl_shm, wl_shm_pool, wl_surface},
    Connection, Dispatch, QueueHandle, WEnum,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

/// Collects decoded notifications until the transport hands them over
#[derive(Debug, Default)]
pub(crate) struct EventSink {
    pub(crate) events: Vec<ServerEvent>,
}

impl EventSink {
    fn push(&mut self, event: ServerEvent) {
        self.events.push(event);
    }
}

/// User data of a per-window pointer object.
///
/// Every pointer object created from the seat receives the same motion,
/// button and axis events, so each one only forwards them while the
/// pointer is over its own surface.
#[derive(Debug)]
pub(crate) struct PointerData {
    pub(crate) window: WindowId,
    /// Enter/leave for any other surface belong to another pointer object
    pub(crate) surface: wl_surface::WlSurface,
    pub(crate) entered: AtomicBool,
}

impl PointerData {
    pub(crate) fn new(window: WindowId, surface: wl_surface::WlSurface) -> Self {
        Self {
            window,
            surface,
            entered: AtomicBool::new(false),
        }
    }

    fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Relaxed)
    }
}

delegate_noop!(EventSink: ignore wl_compositor::WlCompositor);
delegate_noop!(EventSink: ignore wl_shm_pool::WlShmPool);
delegate_noop!(EventSink: ignore wl_surface::WlSurface);

impl Dispatch<wl_registry::WlRegistry, ()> for EventSink {
    fn event(
        state: &mut Self,
        _: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.push(ServerEvent::GlobalAdded {
                name,
                interface,
                version,
            }),
            wl_registry::Event::GlobalRemove { name } => {
                state.push(ServerEvent::GlobalRemoved { name })
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for EventSink {
    fn event(
        _: &mut Self,
        _: &wl_shm::WlShm,
        event: wl_shm::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            trace!("wl_shm format {:?}", format);
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for EventSink {
    fn event(
        state: &mut Self,
        _: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            state.push(ServerEvent::Ping { serial });
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, WindowId> for EventSink {
    fn event(
        state: &mut Self,
        _: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        window: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.push(ServerEvent::SurfaceConfigure {
                window: *window,
                serial,
            });
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, WindowId> for EventSink {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        window: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure {
                width,
                height,
                states,
            } => state.push(ServerEvent::ToplevelConfigure {
                window: *window,
                width,
                height,
                states: ToplevelState::parse_array(&states),
            }),
            xdg_toplevel::Event::Close => state.push(ServerEvent::ToplevelClose { window: *window }),
            other => trace!("Window {}: unhandled toplevel event {:?}", window, other),
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for EventSink {
    fn event(
        state: &mut Self,
        _: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(capabilities),
            } => state.push(ServerEvent::SeatCapabilities {
                pointer: capabilities.contains(wl_seat::Capability::Pointer),
            }),
            wl_seat::Event::Name { name } => trace!("Seat name: {}", name),
            _ => {}
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, PointerData> for EventSink {
    fn event(
        state: &mut Self,
        _: &wl_pointer::WlPointer,
        event: wl_pointer::Event,
        data: &PointerData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let translated = match event {
            wl_pointer::Event::Enter {
                surface,
                surface_x,
                surface_y,
                ..
            } => {
                if surface != data.surface {
                    return;
                }
                data.entered.store(true, Ordering::Relaxed);
                PointerEvent::Enter {
                    x: surface_x,
                    y: surface_y,
                }
            }
            wl_pointer::Event::Leave { surface, .. } => {
                if surface != data.surface {
                    return;
                }
                data.entered.store(false, Ordering::Relaxed);
                PointerEvent::Leave
            }
            wl_pointer::Event::Motion { .. }
            | wl_pointer::Event::Button { .. }
            | wl_pointer::Event::Axis { .. }
                if !data.is_entered() =>
            {
                return;
            }
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => PointerEvent::Motion {
                x: surface_x,
                y: surface_y,
            },
            wl_pointer::Event::Button {
                button,
                state: WEnum::Value(button_state),
                ..
            } => PointerEvent::Button {
                code: button,
                state: match button_state {
                    wl_pointer::ButtonState::Pressed => ButtonState::Pressed,
                    _ => ButtonState::Released,
                },
            },
            wl_pointer::Event::Axis { axis, value, .. } => PointerEvent::Axis {
                axis: match axis {
                    WEnum::Value(wl_pointer::Axis::VerticalScroll) => Some(ScrollAxis::Vertical),
                    WEnum::Value(wl_pointer::Axis::HorizontalScroll) => Some(ScrollAxis::Horizontal),
                    _ => None,
                },
                value,
            },
            wl_pointer::Event::Frame => PointerEvent::Frame,
            wl_pointer::Event::AxisSource { .. } => PointerEvent::AxisSource,
            wl_pointer::Event::AxisStop { .. } => PointerEvent::AxisStop,
            wl_pointer::Event::AxisDiscrete { .. } => PointerEvent::AxisDiscrete,
            wl_pointer::Event::AxisValue120 { .. } => PointerEvent::AxisValue120,
            other => {
                trace!("Window {}: unhandled pointer event {:?}", data.window, other);
                return;
            }
        };

        state.push(ServerEvent::Pointer {
            window: data.window,
            event: translated,
        });
    }
}

impl Dispatch<wl_buffer::WlBuffer, (WindowId, BufferId)> for EventSink {
    fn event(
        state: &mut Self,
        _: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        data: &(WindowId, BufferId),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            let (window, buffer) = *data;
            state.push(ServerEvent::BufferReleased { window, buffer });
        }
    }
}
