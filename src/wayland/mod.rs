//! Wayland transport over `wayland-client` and xdg-shell
//!
//! Protocol objects carry the owning [`WindowId`] (and [`BufferId`] for
//! buffers) as user data, so the [`dispatch`] handlers can translate every
//! notification into a [`ServerEvent`] without looking anything up.

mod dispatch;

use crate::error::{Result, WmError};
use crate::protocol::{BufferLayout, Capability, PixelFormat, ServerEvent, Transport};
use crate::shm::BufferId;
use crate::window::WindowId;
use dispatch::{EventSink, PointerData};
use log::{debug, info, trace};
use std::ffi::c_void;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;
use wayland_backend::client::WaylandError;
use wayland_client::{
    protocol::{wl_buffer, wl_compositor, wl_pointer, wl_registry, wl_seat, wl_shm, wl_surface},
    Connection, DispatchError, EventQueue, Proxy, QueueHandle,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

/// A window's surface and the xdg-shell role objects layered on it
#[derive(Debug)]
pub struct WaylandWindow {
    surface: wl_surface::WlSurface,
    xdg_surface: xdg_surface::XdgSurface,
    toplevel: xdg_toplevel::XdgToplevel,
}

/// Production [`Transport`]: one display connection and one event queue.
pub struct WaylandTransport {
    conn: Connection,
    queue: EventQueue<EventSink>,
    qh: QueueHandle<EventSink>,
    sink: EventSink,
    registry: wl_registry::WlRegistry,
    compositor: Option<wl_compositor::WlCompositor>,
    shm: Option<wl_shm::WlShm>,
    wm_base: Option<xdg_wm_base::XdgWmBase>,
    seat: Option<wl_seat::WlSeat>,
}

impl WaylandTransport {
    /// Connect to `$WAYLAND_DISPLAY` and request the registry.
    pub fn connect() -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| WmError::ConnectDisplayFailed(e.to_string()))?;
        let queue = conn.new_event_queue();
        let qh = queue.handle();
        let registry = conn.display().get_registry(&qh, ());

        info!("🔌 Connected to Wayland display");
        Ok(Self {
            conn,
            queue,
            qh,
            sink: EventSink::default(),
            registry,
            compositor: None,
            shm: None,
            wm_base: None,
            seat: None,
        })
    }

    fn collect(&mut self, events: &mut Vec<ServerEvent>) {
        events.append(&mut self.sink.events);
    }
}

fn dispatch_error(err: DispatchError) -> WmError {
    WmError::ProtocolError(err.to_string())
}

fn shm_format(format: PixelFormat) -> wl_shm::Format {
    match format {
        PixelFormat::Xrgb8888 => wl_shm::Format::Xrgb8888,
    }
}

impl Transport for WaylandTransport {
    type Surface = WaylandWindow;
    type Pointer = wl_pointer::WlPointer;
    type Buffer = wl_buffer::WlBuffer;

    fn flush(&mut self) -> Result<()> {
        match self.conn.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!("Socket full, flush deferred");
                Ok(())
            }
            Err(err) => Err(WmError::ProtocolError(err.to_string())),
        }
    }

    fn roundtrip(&mut self, events: &mut Vec<ServerEvent>) -> Result<()> {
        let result = self.queue.roundtrip(&mut self.sink);
        self.collect(events);
        result.map(|_| ()).map_err(dispatch_error)
    }

    fn dispatch_pending(&mut self, events: &mut Vec<ServerEvent>) -> Result<usize> {
        let result = self.queue.dispatch_pending(&mut self.sink);
        self.collect(events);
        result.map_err(dispatch_error)
    }

    fn blocking_dispatch(&mut self, events: &mut Vec<ServerEvent>) -> Result<usize> {
        let result = self.queue.blocking_dispatch(&mut self.sink);
        self.collect(events);
        result.map_err(dispatch_error)
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.conn.backend().poll_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(WmError::ProtocolError(format!("poll failed: {}", err)));
        }
        Ok(ready > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
    }

    fn bind(&mut self, name: u32, capability: Capability, version: u32) {
        let registry = &self.registry;
        let qh = &self.qh;
        match capability {
            Capability::Compositor => {
                let version = version.min(wl_compositor::WlCompositor::interface().version);
                self.compositor = Some(registry.bind(name, version, qh, ()));
            }
            Capability::Shm => {
                let version = version.min(wl_shm::WlShm::interface().version);
                self.shm = Some(registry.bind(name, version, qh, ()));
            }
            Capability::WmBase => {
                let version = version.min(xdg_wm_base::XdgWmBase::interface().version);
                self.wm_base = Some(registry.bind(name, version, qh, ()));
            }
            Capability::Seat => {
                let version = version.min(wl_seat::WlSeat::interface().version);
                self.seat = Some(registry.bind(name, version, qh, ()));
            }
        }
        debug!("Bound {} v{}", capability.interface(), version);
    }

    fn pong(&mut self, serial: u32) {
        if let Some(wm_base) = &self.wm_base {
            wm_base.pong(serial);
        }
    }

    fn create_window(&mut self, window: WindowId) -> Result<WaylandWindow> {
        let compositor = self
            .compositor
            .as_ref()
            .ok_or_else(|| WmError::CreateSurfaceFailed("wl_compositor not bound".into()))?;
        let wm_base = self
            .wm_base
            .as_ref()
            .ok_or_else(|| WmError::CreateSurfaceFailed("xdg_wm_base not bound".into()))?;

        let surface = compositor.create_surface(&self.qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &self.qh, window);
        let toplevel = xdg_surface.get_toplevel(&self.qh, window);

        trace!("Window {}: created {}", window, surface.id());
        Ok(WaylandWindow {
            surface,
            xdg_surface,
            toplevel,
        })
    }

    fn set_title(&mut self, surface: &WaylandWindow, title: &str) {
        surface.toplevel.set_title(title.to_owned());
    }

    fn set_app_id(&mut self, surface: &WaylandWindow, app_id: &str) {
        surface.toplevel.set_app_id(app_id.to_owned());
    }

    fn ack_configure(&mut self, surface: &WaylandWindow, serial: u32) {
        surface.xdg_surface.ack_configure(serial);
    }

    fn attach(&mut self, surface: &WaylandWindow, buffer: &wl_buffer::WlBuffer, width: i32, height: i32) {
        surface.surface.attach(Some(buffer), 0, 0);
        surface.surface.damage(0, 0, width, height);
    }

    fn commit(&mut self, surface: &WaylandWindow) {
        surface.surface.commit();
    }

    fn destroy_window(&mut self, surface: WaylandWindow) {
        surface.toplevel.destroy();
        surface.xdg_surface.destroy();
        surface.surface.destroy();
    }

    fn create_pointer(&mut self, window: WindowId, surface: &WaylandWindow) -> Option<wl_pointer::WlPointer> {
        let seat = self.seat.as_ref()?;
        let data = PointerData::new(window, surface.surface.clone());
        Some(seat.get_pointer(&self.qh, data))
    }

    fn destroy_pointer(&mut self, pointer: wl_pointer::WlPointer) {
        // wl_pointer.release appeared in version 3
        if pointer.version() >= 3 {
            pointer.release();
        }
    }

    fn create_buffer(
        &mut self,
        window: WindowId,
        buffer: BufferId,
        fd: BorrowedFd<'_>,
        layout: &BufferLayout,
    ) -> Result<wl_buffer::WlBuffer> {
        let shm = self.shm.as_ref().ok_or_else(|| {
            WmError::shm(
                "register",
                io::Error::new(io::ErrorKind::NotConnected, "wl_shm not bound"),
            )
        })?;

        let pool = shm.create_pool(fd, layout.size, &self.qh, ());
        let handle = pool.create_buffer(
            0,
            layout.width,
            layout.height,
            layout.stride,
            shm_format(layout.format),
            &self.qh,
            (window, buffer),
        );
        // the buffer keeps the pool's memory alive
        pool.destroy();
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: wl_buffer::WlBuffer) {
        buffer.destroy();
    }

    fn display_handle(&self) -> *mut c_void {
        self.conn.backend().display_ptr() as *mut c_void
    }

    fn surface_handle(&self, surface: &WaylandWindow) -> *mut c_void {
        surface.surface.id().as_ptr() as *mut c_void
    }
}
