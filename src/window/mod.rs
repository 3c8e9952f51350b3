//! Window lifecycle
//!
//! Every window walks the same chain of states:
//!
//! ```text
//! Created ─► InitialCommitPending ─► AwaitingConfigure ─► Configured ─► Mapped
//! ```
//!
//! The first commit goes out without a buffer so the server can send its
//! initial configure; nothing is attached until that configure has been
//! acknowledged. Close requests and keyboard focus are tracked alongside the
//! chain and never move a window along it.
//!
//! The state machine lives in [`WindowEntry`], owned by the
//! [`WindowManager`](crate::manager::WindowManager) arena. Applications see
//! the read-only [`Window`] view and mutate through [`WindowMut`].

use crate::config::ShmConfig;
use crate::input::{MouseEvent, PointerEvent, PointerTracker};
use crate::protocol::{ToplevelState, Transport};
use crate::shm::{BufferId, BufferIds, BufferInfo, PixelBuffer};
use log::{debug, info, trace, warn};
use std::ffi::c_void;
use std::fmt;
use std::ops::Deref;

/// Stable handle to a window slot. A slot reused after destruction gets a
/// new generation, so stale ids never resolve to the new window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl WindowId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

/// Position in the surface lifecycle chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SurfaceState {
    /// Role objects exist, nothing committed yet
    Created,
    /// Identity asserted, initial commit about to be issued
    InitialCommitPending,
    /// Initial commit sent, waiting for the first configure
    AwaitingConfigure,
    /// First configure acknowledged, no buffer attached yet
    Configured,
    /// A buffer is attached and committed
    Mapped,
}

/// Lifecycle notifications delivered to a window's event callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WmEvent {
    WindowConfigured,
    WindowCloseRequested,
    WindowResized,
    WindowFocusGained,
    WindowFocusLost,
}

pub type EventCallback = Box<dyn FnMut(WmEvent, &Window)>;
pub type MouseCallback = Box<dyn FnMut(&MouseEvent, &Window)>;

/// Read-only view of a window, handed to callbacks.
#[derive(Debug, Clone)]
pub struct Window {
    id: WindowId,
    title: String,
    initial_title: String,
    app_id: String,
    initial_app_id: String,
    width: u32,
    height: u32,
    state: SurfaceState,
    close_requested: bool,
    focused: bool,
    pointer: PointerTracker,
    buffer: Option<BufferInfo>,
}

impl Window {
    pub(crate) fn new(id: WindowId, title: &str, width: u32, height: u32) -> Self {
        Self {
            id,
            title: title.to_string(),
            initial_title: title.to_string(),
            app_id: String::new(),
            initial_app_id: String::new(),
            width,
            height,
            state: SurfaceState::Created,
            close_requested: false,
            focused: false,
            pointer: PointerTracker::new(),
            buffer: None,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Currently applied title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title requested at creation
    pub fn initial_title(&self) -> &str {
        &self.initial_title
    }

    /// Effective application id; falls back to the first one ever set
    pub fn app_id(&self) -> &str {
        if self.app_id.is_empty() {
            &self.initial_app_id
        } else {
            &self.app_id
        }
    }

    pub fn initial_app_id(&self) -> &str {
        &self.initial_app_id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state >= SurfaceState::Configured
    }

    pub fn is_mapped(&self) -> bool {
        self.state == SurfaceState::Mapped
    }

    pub fn initial_commit_sent(&self) -> bool {
        self.state >= SurfaceState::AwaitingConfigure
    }

    /// Set once the server asks the window to close; never cleared
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn has_focus(&self) -> bool {
        self.focused
    }

    /// Last pointer position inside this window
    pub fn pointer_position(&self) -> (f64, f64) {
        self.pointer.position()
    }

    pub fn pointer_inside(&self) -> bool {
        self.pointer.is_inside()
    }

    /// The buffer that is, or will next be, attached
    pub fn buffer(&self) -> Option<BufferInfo> {
        self.buffer
    }
}

/// A replaced buffer the server may still be reading
struct Retired<B> {
    buffer: PixelBuffer<B>,
    released: bool,
}

/// A window together with the protocol objects and buffers it owns.
pub(crate) struct WindowEntry<T: Transport> {
    window: Window,
    surface: T::Surface,
    pointer: Option<T::Pointer>,
    buffer: Option<PixelBuffer<T::Buffer>>,
    /// Whether the server released `buffer` since it was attached
    buffer_released: bool,
    attached: Option<BufferId>,
    retired: Vec<Retired<T::Buffer>>,
    on_event: Option<EventCallback>,
    on_mouse: Option<MouseCallback>,
}

impl<T: Transport> WindowEntry<T> {
    pub(crate) fn new(window: Window, surface: T::Surface) -> Self {
        Self {
            window,
            surface,
            pointer: None,
            buffer: None,
            buffer_released: false,
            attached: None,
            retired: Vec::new(),
            on_event: None,
            on_mouse: None,
        }
    }

    pub(crate) fn window(&self) -> &Window {
        &self.window
    }

    pub(crate) fn surface(&self) -> &T::Surface {
        &self.surface
    }

    pub(crate) fn has_pointer(&self) -> bool {
        self.pointer.is_some()
    }

    /// Number of replaced buffers still waiting for the server to let go
    pub(crate) fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Move the window along its lifecycle as far as it can go without
    /// hearing from the server.
    pub(crate) fn advance(&mut self, transport: &mut T) {
        match self.window.state {
            SurfaceState::Created | SurfaceState::InitialCommitPending => {
                self.window.state = SurfaceState::InitialCommitPending;
                self.assert_identity(transport);
                transport.commit(&self.surface);
                self.window.state = SurfaceState::AwaitingConfigure;
                debug!("Window {}: initial commit sent", self.window.id);
            }
            SurfaceState::AwaitingConfigure => {}
            SurfaceState::Configured => {
                if self.buffer.is_none() {
                    return;
                }
                // some compositors only honour identity set alongside the first attach
                self.assert_identity(transport);
                self.attach_current(transport);
                self.window.state = SurfaceState::Mapped;
                info!(
                    "🪟 Window {} mapped at {}x{}",
                    self.window.id, self.window.width, self.window.height
                );
            }
            SurfaceState::Mapped => {
                let pending = self.buffer.as_ref().map(|buffer| buffer.id());
                if pending.is_some() && pending != self.attached {
                    self.attach_current(transport);
                    debug!("Window {}: attached resized buffer", self.window.id);
                }
            }
        }
    }

    fn assert_identity(&self, transport: &mut T) {
        let title = if self.window.title.is_empty() {
            &self.window.initial_title
        } else {
            &self.window.title
        };
        if !title.is_empty() {
            transport.set_title(&self.surface, title);
        }

        let app_id = self.window.app_id();
        if !app_id.is_empty() {
            transport.set_app_id(&self.surface, app_id);
        }
    }

    fn attach_current(&mut self, transport: &mut T) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        transport.attach(
            &self.surface,
            buffer.handle(),
            buffer.width() as i32,
            buffer.height() as i32,
        );
        transport.commit(&self.surface);
        self.attached = Some(buffer.id());
        self.buffer_released = false;
        self.reap(transport);
    }

    /// Install a freshly allocated buffer. The old one is released right away
    /// unless the server may still be reading it.
    pub(crate) fn replace_buffer(&mut self, transport: &mut T, buffer: PixelBuffer<T::Buffer>) {
        self.window.buffer = Some(buffer.info());
        let released = std::mem::replace(&mut self.buffer_released, false);

        if let Some(old) = self.buffer.replace(buffer) {
            if Some(old.id()) == self.attached {
                trace!(
                    "Window {}: retiring attached buffer {}",
                    self.window.id,
                    old.id().as_u64()
                );
                self.retired.push(Retired {
                    buffer: old,
                    released,
                });
            } else {
                old.release(transport);
            }
        }
        self.reap(transport);
    }

    /// Destroy retired buffers the server has released and no longer sees attached
    fn reap(&mut self, transport: &mut T) {
        if self.retired.is_empty() {
            return;
        }
        let attached = self.attached;
        let (done, keep): (Vec<_>, Vec<_>) = self
            .retired
            .drain(..)
            .partition(|retired| retired.released && Some(retired.buffer.id()) != attached);
        self.retired = keep;
        for retired in done {
            retired.buffer.release(transport);
        }
    }

    pub(crate) fn handle_buffer_released(&mut self, transport: &mut T, id: BufferId) {
        if self.buffer.as_ref().map(|buffer| buffer.id()) == Some(id) {
            self.buffer_released = true;
        } else if let Some(retired) = self
            .retired
            .iter_mut()
            .find(|retired| retired.buffer.id() == id)
        {
            retired.released = true;
        } else {
            trace!("Window {}: release for unknown buffer {}", self.window.id, id.as_u64());
        }
        self.reap(transport);
    }

    pub(crate) fn handle_configure(&mut self, transport: &mut T, serial: u32) {
        transport.ack_configure(&self.surface, serial);
        trace!("Window {}: acked configure {}", self.window.id, serial);

        if self.window.state < SurfaceState::Configured {
            self.window.state = SurfaceState::Configured;
            debug!("Window {}: configured", self.window.id);
            self.emit(WmEvent::WindowConfigured);
        }
    }

    pub(crate) fn handle_toplevel_configure(
        &mut self,
        transport: &mut T,
        ids: &mut BufferIds,
        shm: &ShmConfig,
        width: i32,
        height: i32,
        states: &[ToplevelState],
    ) {
        if width > 0 && height > 0 {
            let (width, height) = (width as u32, height as u32);
            match PixelBuffer::allocate(
                transport,
                self.window.id,
                ids.next(),
                width,
                height,
                shm.resize_fill,
                &shm.name_prefix,
            ) {
                Ok(buffer) => {
                    self.replace_buffer(transport, buffer);
                    self.window.width = width;
                    self.window.height = height;
                    debug!("Window {}: resized to {}x{}", self.window.id, width, height);
                    self.emit(WmEvent::WindowResized);
                }
                Err(err) => {
                    warn!(
                        "Window {}: keeping {}x{} buffer, resize to {}x{} failed: {}",
                        self.window.id, self.window.width, self.window.height, width, height, err
                    );
                }
            }
        }

        let activated = states.contains(&ToplevelState::Activated);
        if activated != self.window.focused {
            self.window.focused = activated;
            self.emit(if activated {
                WmEvent::WindowFocusGained
            } else {
                WmEvent::WindowFocusLost
            });
        }
    }

    pub(crate) fn handle_close(&mut self) {
        self.window.close_requested = true;
        info!("Window {}: close requested", self.window.id);
        self.emit(WmEvent::WindowCloseRequested);
    }

    pub(crate) fn handle_pointer(&mut self, event: &PointerEvent) {
        let Some(mouse) = self.window.pointer.translate(event) else {
            return;
        };
        match self.on_mouse.as_mut() {
            Some(callback) => callback(&mouse, &self.window),
            None => debug!("Window {}: no mouse callback for {:?}", self.window.id, mouse.action),
        }
    }

    fn emit(&mut self, event: WmEvent) {
        match self.on_event.as_mut() {
            Some(callback) => callback(event, &self.window),
            None => debug!("Window {}: no event callback for {:?}", self.window.id, event),
        }
    }

    pub(crate) fn attach_pointer(&mut self, transport: &mut T) {
        if self.pointer.is_none() {
            self.pointer = transport.create_pointer(self.window.id, &self.surface);
        }
    }

    pub(crate) fn detach_pointer(&mut self, transport: &mut T) {
        if let Some(pointer) = self.pointer.take() {
            transport.destroy_pointer(pointer);
            self.window.pointer.translate(&PointerEvent::Leave);
        }
    }

    /// Tear down in dependency order: pointer, role objects and surface, then buffers.
    pub(crate) fn destroy(mut self, transport: &mut T) {
        self.detach_pointer(transport);
        let WindowEntry {
            window,
            surface,
            buffer,
            retired,
            ..
        } = self;

        transport.destroy_window(surface);
        if let Some(buffer) = buffer {
            buffer.release(transport);
        }
        for retired in retired {
            retired.buffer.release(transport);
        }
        info!("🗑️ Window {} destroyed", window.id);
    }
}

/// Mutable access to one window.
pub struct WindowMut<'a, T: Transport> {
    entry: &'a mut WindowEntry<T>,
    transport: &'a mut T,
}

impl<'a, T: Transport> WindowMut<'a, T> {
    pub(crate) fn new(entry: &'a mut WindowEntry<T>, transport: &'a mut T) -> Self {
        Self { entry, transport }
    }

    pub fn window(&self) -> &Window {
        &self.entry.window
    }

    /// Apply a new title immediately
    pub fn set_title(&mut self, title: &str) {
        self.entry.window.title = title.to_string();
        self.transport.set_title(&self.entry.surface, title);
    }

    /// Apply a new application id.
    ///
    /// Before the first configure this also commits, so the server knows the
    /// id when it picks the initial state. An empty id clears the current one
    /// without telling the server.
    pub fn set_app_id(&mut self, app_id: &str) {
        let window = &mut self.entry.window;
        if app_id.is_empty() {
            window.app_id.clear();
            debug!("Window {}: app id cleared", window.id);
            return;
        }

        if window.initial_app_id.is_empty() {
            window.initial_app_id = app_id.to_string();
        }
        window.app_id = app_id.to_string();
        self.transport.set_app_id(&self.entry.surface, app_id);

        if window.state < SurfaceState::Configured {
            self.transport.commit(&self.entry.surface);
            if window.state < SurfaceState::AwaitingConfigure {
                window.state = SurfaceState::AwaitingConfigure;
                debug!("Window {}: initial commit sent with app id", window.id);
            }
        }
    }

    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(WmEvent, &Window) + 'static,
    {
        self.entry.on_event = Some(Box::new(callback));
    }

    pub fn set_mouse_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&MouseEvent, &Window) + 'static,
    {
        self.entry.on_mouse = Some(Box::new(callback));
    }

    pub fn clear_callbacks(&mut self) {
        self.entry.on_event = None;
        self.entry.on_mouse = None;
    }

    /// Native surface handle for building a graphics-API surface
    pub fn native_surface_handle(&self) -> *mut c_void {
        self.transport.surface_handle(&self.entry.surface)
    }
}

impl<T: Transport> Deref for WindowMut<'_, T> {
    type Target = Window;

    fn deref(&self) -> &Window {
        &self.entry.window
    }
}
