//! Connection ownership and the event dispatch driver
//!
//! [`WindowManager`] owns the transport, the negotiated capabilities and an
//! arena of windows. Server notifications are collected by the transport
//! during dispatch and routed here afterwards, on the caller's thread.
//!
//! Three dispatch modes are offered:
//! - [`WindowManager::run`] blocks and dispatches until quit is requested
//! - [`WindowManager::poll_events`] never blocks
//! - [`WindowManager::wait_events`] blocks for exactly one batch
//!
//! Each of them first advances every live window's lifecycle, so windows
//! created at any time get committed and mapped without extra calls.

use crate::config::WmConfig;
use crate::error::{ErrorKind, Result, WmError};
use crate::protocol::{Capabilities, Capability, NativeHandles, ServerEvent, Transport};
use crate::shm::{BufferIds, PixelBuffer};
use crate::wayland::WaylandTransport;
use crate::window::{Window, WindowEntry, WindowId, WindowMut};
use log::{debug, error, info, trace, warn};
use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;
use std::time::Duration;

/// Connection-level error sink
pub type ErrorCallback = Box<dyn FnMut(ErrorKind, &str)>;

/// Cloneable flag that stops [`WindowManager::run`] at its next loop boundary.
#[derive(Debug, Clone, Default)]
pub struct QuitHandle(Rc<Cell<bool>>);

impl QuitHandle {
    pub fn request_quit(&self) {
        self.0.set(true);
    }

    pub fn is_quit_requested(&self) -> bool {
        self.0.get()
    }
}

struct Slot<T: Transport> {
    generation: u32,
    entry: Option<WindowEntry<T>>,
}

/// A connection to the display server and every window created on it.
pub struct WindowManager<T: Transport = WaylandTransport> {
    transport: T,
    config: WmConfig,
    capabilities: Capabilities,
    slots: Vec<Slot<T>>,
    buffer_ids: BufferIds,
    seat_pointer: bool,
    quit: QuitHandle,
    on_error: Option<ErrorCallback>,
    events: Vec<ServerEvent>,
}

impl WindowManager<WaylandTransport> {
    /// Connect to the display named by the environment and negotiate globals.
    ///
    /// Failures are reported to `on_error` and yield `None`.
    pub fn connect(config: WmConfig, mut on_error: Option<ErrorCallback>) -> Option<Self> {
        match WaylandTransport::connect() {
            Ok(transport) => Self::with_transport(transport, config, on_error),
            Err(err) => {
                report_to(&mut on_error, &err);
                None
            }
        }
    }

    pub fn try_connect(config: WmConfig) -> Result<Self> {
        Self::try_with_transport(WaylandTransport::connect()?, config)
    }
}

impl<T: Transport> WindowManager<T> {
    /// Negotiate over an already-open transport.
    ///
    /// Failures are reported to `on_error` and yield `None`; a partially
    /// negotiated manager is never returned.
    pub fn with_transport(
        transport: T,
        config: WmConfig,
        mut on_error: Option<ErrorCallback>,
    ) -> Option<Self> {
        match Self::try_with_transport(transport, config) {
            Ok(mut manager) => {
                manager.on_error = on_error;
                Some(manager)
            }
            Err(err) => {
                report_to(&mut on_error, &err);
                None
            }
        }
    }

    pub fn try_with_transport(transport: T, config: WmConfig) -> Result<Self> {
        let mut manager = Self {
            transport,
            config,
            capabilities: Capabilities::new(),
            slots: Vec::new(),
            buffer_ids: BufferIds::default(),
            seat_pointer: false,
            quit: QuitHandle::default(),
            on_error: None,
            events: Vec::new(),
        };

        manager.pump(|transport, events| transport.roundtrip(events).map(|()| 0))?;

        let missing = manager.capabilities.missing_required();
        if !missing.is_empty() {
            return Err(WmError::MissingGlobals(missing));
        }

        if manager.capabilities.has(Capability::Seat) {
            // seat capabilities arrive in response to the bind
            manager.pump(|transport, events| transport.roundtrip(events).map(|()| 0))?;
        } else {
            info!("No wl_seat advertised; pointer input disabled");
        }

        info!("✅ Display connection ready");
        Ok(manager)
    }

    pub fn config(&self) -> &WmConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Whether the seat currently offers a pointer
    pub fn has_pointer(&self) -> bool {
        self.seat_pointer
    }

    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: FnMut(ErrorKind, &str) + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    pub fn clear_error_callback(&mut self) {
        self.on_error = None;
    }

    fn report(&mut self, err: &WmError) {
        report_to(&mut self.on_error, err);
    }

    // ----- windows -----

    /// Create a toplevel window. It is committed and mapped by the dispatch
    /// methods, or right away by [`show_window`](Self::show_window).
    pub fn create_window(&mut self, width: u32, height: u32, title: &str) -> Result<WindowId> {
        let result = self.try_create_window(width, height, title);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    fn try_create_window(&mut self, width: u32, height: u32, title: &str) -> Result<WindowId> {
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(WmError::InvalidDimensions { width, height });
        }

        let id = self.vacant_slot();
        let surface = self.transport.create_window(id)?;
        self.transport.set_title(&surface, title);

        let mut entry = WindowEntry::new(Window::new(id, title, width, height), surface);
        if self.seat_pointer {
            entry.attach_pointer(&mut self.transport);
        }

        match PixelBuffer::allocate(
            &mut self.transport,
            id,
            self.buffer_ids.next(),
            width,
            height,
            self.config.shm.initial_fill,
            &self.config.shm.name_prefix,
        ) {
            Ok(buffer) => entry.replace_buffer(&mut self.transport, buffer),
            Err(err) => warn!("Window {}: no initial buffer: {}", id, err),
        }

        self.slots[id.index as usize].entry = Some(entry);
        info!("🪟 Created window {} '{}' ({}x{})", id, title, width, height);
        Ok(id)
    }

    fn vacant_slot(&mut self) -> WindowId {
        if let Some(index) = self.slots.iter().position(|slot| slot.entry.is_none()) {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            return WindowId {
                index: index as u32,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            entry: None,
        });
        WindowId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn lookup(slots: &[Slot<T>], id: WindowId) -> Option<&WindowEntry<T>> {
        slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn lookup_mut(slots: &mut [Slot<T>], id: WindowId) -> Option<&mut WindowEntry<T>> {
        slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        Self::lookup(&self.slots, id).map(|entry| entry.window())
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<WindowMut<'_, T>> {
        let entry = Self::lookup_mut(&mut self.slots, id)?;
        Some(WindowMut::new(entry, &mut self.transport))
    }

    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .map(|entry| entry.window())
    }

    pub fn window_count(&self) -> usize {
        self.windows().count()
    }

    /// Replaced buffers of a window still held until the server releases them
    pub fn retired_buffers(&self, id: WindowId) -> usize {
        Self::lookup(&self.slots, id).map_or(0, |entry| entry.retired_len())
    }

    /// Release a window's server objects and buffers. Unknown ids are ignored.
    pub fn destroy_window(&mut self, id: WindowId) -> bool {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return false;
        };
        let Some(entry) = slot.entry.take() else {
            return false;
        };
        entry.destroy(&mut self.transport);
        if let Err(err) = self.transport.flush() {
            warn!("Flush after destroying window {} failed: {}", id, err);
        }
        true
    }

    /// Commit the window and round-trip until the server has configured it,
    /// then map it. Returns whether the window is mapped afterwards.
    pub fn show_window(&mut self, id: WindowId) -> Result<bool> {
        let Some(entry) = Self::lookup_mut(&mut self.slots, id) else {
            warn!("show_window: unknown window {}", id);
            return Ok(false);
        };
        entry.advance(&mut self.transport);

        let limit = self.config.protocol.show_roundtrip_limit;
        let mut rounds = 0;
        while rounds < limit {
            match Self::lookup(&self.slots, id) {
                Some(entry) if !entry.window().is_configured() && !entry.window().should_close() => {}
                _ => break,
            }
            let result = self.pump(|transport, events| transport.roundtrip(events).map(|()| 0));
            self.fatal(result)?;
            rounds += 1;
        }

        let Some(entry) = Self::lookup_mut(&mut self.slots, id) else {
            return Ok(false);
        };
        entry.advance(&mut self.transport);
        let mapped = entry.window().is_mapped();
        let result = self.transport.flush();
        self.fatal(result)?;

        if !mapped {
            warn!("Window {} not mapped after {} round-trips", id, rounds);
        }
        Ok(mapped)
    }

    // ----- quit and native handles -----

    pub fn request_quit(&self) {
        self.quit.request_quit();
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.is_quit_requested()
    }

    /// Handle usable from callbacks to stop [`run`](Self::run)
    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }

    pub fn native_display_handle(&self) -> *mut c_void {
        self.transport.display_handle()
    }

    pub fn native_surface_handle(&self, id: WindowId) -> Option<*mut c_void> {
        Self::lookup(&self.slots, id).map(|entry| self.transport.surface_handle(entry.surface()))
    }

    pub fn native_handles(&self, id: WindowId) -> Option<NativeHandles> {
        Some(NativeHandles {
            display: self.native_display_handle(),
            surface: self.native_surface_handle(id)?,
        })
    }

    // ----- dispatch driver -----

    fn advance_windows(&mut self) {
        let transport = &mut self.transport;
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot.entry.as_mut() {
                entry.advance(transport);
            }
        }
    }

    /// Dispatch whatever is available without blocking.
    /// Returns the number of notifications processed.
    pub fn poll_events(&mut self) -> Result<usize> {
        self.advance_windows();
        let result = self.poll_once();
        self.fatal(result)
    }

    fn poll_once(&mut self) -> Result<usize> {
        let mut processed = self.pump(|transport, events| transport.dispatch_pending(events))?;
        self.transport.flush()?;

        if self.transport.poll_readable(Duration::ZERO)? {
            processed += self.pump(|transport, events| transport.blocking_dispatch(events))?;
            self.transport.flush()?;
        }
        Ok(processed)
    }

    /// Flush, then block until one batch of notifications has been dispatched.
    pub fn wait_events(&mut self) -> Result<usize> {
        self.advance_windows();
        let result = self.wait_once();
        self.fatal(result)
    }

    fn wait_once(&mut self) -> Result<usize> {
        self.transport.flush()?;
        let processed = self.pump(|transport, events| transport.blocking_dispatch(events))?;
        self.transport.flush()?;
        Ok(processed)
    }

    /// Dispatch until [`request_quit`](Self::request_quit) or a connection error.
    pub fn run(&mut self) -> Result<()> {
        info!("▶️ Entering dispatch loop");
        while !self.quit.is_quit_requested() {
            self.advance_windows();
            let result = self.wait_once();
            self.fatal(result)?;
        }
        info!("⏹️ Dispatch loop stopped on quit request");
        Ok(())
    }

    fn fatal<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Run one transport read and route what it collected, even if the read
    /// failed part way.
    fn pump<F>(&mut self, read: F) -> Result<usize>
    where
        F: FnOnce(&mut T, &mut Vec<ServerEvent>) -> Result<usize>,
    {
        let mut events = std::mem::take(&mut self.events);
        let result = read(&mut self.transport, &mut events);

        let processed = events.len();
        for event in events.drain(..) {
            self.handle_event(event);
        }
        self.events = events;

        result.map(|_| processed)
    }

    fn handle_event(&mut self, event: ServerEvent) {
        trace!("Server event: {:?}", event);
        match event {
            ServerEvent::Ping { serial } => {
                self.transport.pong(serial);
                trace!("Answered ping {}", serial);
            }
            ServerEvent::GlobalAdded {
                name,
                interface,
                version,
            } => {
                if let Some((capability, version)) = self.capabilities.on_global_added(
                    name,
                    &interface,
                    version,
                    &self.config.protocol,
                ) {
                    self.transport.bind(name, capability, version);
                }
            }
            ServerEvent::GlobalRemoved { name } => {
                if self.capabilities.on_global_removed(name).is_none() {
                    debug!("Unbound global {} removed", name);
                }
            }
            ServerEvent::SeatCapabilities { pointer } => self.set_seat_pointer(pointer),
            ServerEvent::SurfaceConfigure { window, serial } => {
                match Self::lookup_mut(&mut self.slots, window) {
                    Some(entry) => entry.handle_configure(&mut self.transport, serial),
                    None => trace!("Configure for destroyed window {} dropped", window),
                }
            }
            ServerEvent::ToplevelConfigure {
                window,
                width,
                height,
                states,
            } => match Self::lookup_mut(&mut self.slots, window) {
                Some(entry) => entry.handle_toplevel_configure(
                    &mut self.transport,
                    &mut self.buffer_ids,
                    &self.config.shm,
                    width,
                    height,
                    &states,
                ),
                None => trace!("Toplevel configure for destroyed window {} dropped", window),
            },
            ServerEvent::ToplevelClose { window } => {
                if let Some(entry) = Self::lookup_mut(&mut self.slots, window) {
                    entry.handle_close();
                }
            }
            ServerEvent::Pointer { window, event } => {
                if let Some(entry) = Self::lookup_mut(&mut self.slots, window) {
                    entry.handle_pointer(&event);
                }
            }
            ServerEvent::BufferReleased { window, buffer } => {
                if let Some(entry) = Self::lookup_mut(&mut self.slots, window) {
                    entry.handle_buffer_released(&mut self.transport, buffer);
                }
            }
        }
    }

    fn set_seat_pointer(&mut self, pointer: bool) {
        if pointer == self.seat_pointer {
            return;
        }
        self.seat_pointer = pointer;

        let transport = &mut self.transport;
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if pointer {
                entry.attach_pointer(transport);
            } else {
                entry.detach_pointer(transport);
            }
        }
        info!(
            "🖱️ Seat pointer {}",
            if pointer { "available" } else { "removed" }
        );
    }
}

impl<T: Transport> Drop for WindowManager<T> {
    fn drop(&mut self) {
        let live = self.window_count();
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot.entry.take() {
                entry.destroy(&mut self.transport);
            }
        }
        if let Err(err) = self.transport.flush() {
            debug!("Final flush failed: {}", err);
        }
        if live > 0 {
            info!("Destroyed {} remaining window(s) on shutdown", live);
        }
    }
}

fn report_to(callback: &mut Option<ErrorCallback>, err: &WmError) {
    let message = err.to_string();
    error!("{}: {}", err.kind(), message);
    if let Some(callback) = callback.as_mut() {
        callback(err.kind(), &message);
    }
}
