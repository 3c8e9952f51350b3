//! Transport boundary between the windowing core and the wire protocol.
//!
//! The core never touches protocol objects directly. It issues requests
//! through a [`Transport`] and consumes decoded notifications as
//! [`ServerEvent`] values, which the transport collects while dispatching.
//! [`crate::wayland::WaylandTransport`] is the production implementation;
//! tests drive the core through a recording fake.
//!
//! # Request/notification flow
//!
//! ```text
//! ┌──────────────┐  requests   ┌─────────────┐  wire  ┌────────────┐
//! │ WindowManager│────────────►│  Transport  │───────►│ compositor │
//! │   (core)     │◄────────────│ (dispatch)  │◄───────│            │
//! └──────────────┘ ServerEvent └─────────────┘        └────────────┘
//! ```

pub mod registry;

use crate::error::Result;
use crate::input::PointerEvent;
use crate::shm::BufferId;
use crate::window::WindowId;
use std::ffi::c_void;
use std::os::fd::BorrowedFd;
use std::time::Duration;

pub use registry::{BoundGlobal, Capabilities};

/// A protocol capability ("global") this client knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Surface factory (wl_compositor)
    Compositor,
    /// Shared-memory factory (wl_shm)
    Shm,
    /// Window-shell protocol (xdg_wm_base)
    WmBase,
    /// Input seat (wl_seat)
    Seat,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Compositor,
        Capability::Shm,
        Capability::WmBase,
        Capability::Seat,
    ];

    /// Interface name as advertised by the registry
    pub fn interface(&self) -> &'static str {
        match self {
            Capability::Compositor => "wl_compositor",
            Capability::Shm => "wl_shm",
            Capability::WmBase => "xdg_wm_base",
            Capability::Seat => "wl_seat",
        }
    }

    pub fn from_interface(interface: &str) -> Option<Self> {
        Capability::ALL
            .into_iter()
            .find(|capability| capability.interface() == interface)
    }

    /// Whether construction fails when the server does not advertise it
    pub fn is_required(&self) -> bool {
        !matches!(self, Capability::Seat)
    }
}

/// State markers carried by a toplevel configure (xdg_toplevel.state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToplevelState {
    Maximized,
    Fullscreen,
    Resizing,
    Activated,
    TiledLeft,
    TiledRight,
    TiledTop,
    TiledBottom,
    Suspended,
    Other(u32),
}

impl ToplevelState {
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => ToplevelState::Maximized,
            2 => ToplevelState::Fullscreen,
            3 => ToplevelState::Resizing,
            4 => ToplevelState::Activated,
            5 => ToplevelState::TiledLeft,
            6 => ToplevelState::TiledRight,
            7 => ToplevelState::TiledTop,
            8 => ToplevelState::TiledBottom,
            9 => ToplevelState::Suspended,
            other => ToplevelState::Other(other),
        }
    }

    /// Decode a wl_array of native-endian u32 state values
    pub fn parse_array(bytes: &[u8]) -> Vec<ToplevelState> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let raw = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                ToplevelState::from_raw(raw)
            })
            .collect()
    }
}

/// A decoded server notification, queued by the transport during dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Registry announced a global
    GlobalAdded {
        name: u32,
        interface: String,
        version: u32,
    },
    /// Registry withdrew a global
    GlobalRemoved { name: u32 },
    /// Shell liveness probe
    Ping { serial: u32 },
    /// Seat capability set changed
    SeatCapabilities { pointer: bool },
    /// xdg_surface.configure
    SurfaceConfigure { window: WindowId, serial: u32 },
    /// xdg_toplevel.configure
    ToplevelConfigure {
        window: WindowId,
        width: i32,
        height: i32,
        states: Vec<ToplevelState>,
    },
    /// xdg_toplevel.close
    ToplevelClose { window: WindowId },
    /// Pointer notification delivered to the window's pointer object
    Pointer {
        window: WindowId,
        event: PointerEvent,
    },
    /// Server no longer reads from the buffer
    BufferReleased { window: WindowId, buffer: BufferId },
}

/// Pixel formats the buffer manager hands to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit xRGB, little-endian, alpha ignored
    Xrgb8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Xrgb8888 => 4,
        }
    }
}

/// Geometry of a shared-memory region as described to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub size: i32,
    pub format: PixelFormat,
}

/// Raw handles a GPU surface helper needs to build a graphics-API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHandles {
    pub display: *mut c_void,
    pub surface: *mut c_void,
}

impl NativeHandles {
    /// Instance extensions required to create a Vulkan surface from these handles
    pub const VULKAN_INSTANCE_EXTENSIONS: [&'static str; 2] =
        ["VK_KHR_surface", "VK_KHR_wayland_surface"];
}

/// Connection-level operations and per-object requests the core depends on.
///
/// Object handles are associated types so the core can own them without
/// knowing their concrete protocol representation. Methods that only
/// enqueue a request are infallible, matching the wire protocol where
/// errors surface asynchronously on the next dispatch.
pub trait Transport {
    /// A window's surface with its shell-surface and toplevel role objects
    type Surface;
    /// A pointer-input object
    type Pointer;
    /// A server-side buffer handle
    type Buffer;

    /// Send queued requests; a full socket is not an error
    fn flush(&mut self) -> Result<()>;

    /// Block until the server has processed every queued request,
    /// collecting the notifications delivered meanwhile
    fn roundtrip(&mut self, events: &mut Vec<ServerEvent>) -> Result<()>;

    /// Dispatch already-read notifications without blocking
    fn dispatch_pending(&mut self, events: &mut Vec<ServerEvent>) -> Result<usize>;

    /// Read and dispatch at least one batch, blocking until it arrives
    fn blocking_dispatch(&mut self, events: &mut Vec<ServerEvent>) -> Result<usize>;

    /// Readiness check on the connection's file descriptor
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool>;

    fn bind(&mut self, name: u32, capability: Capability, version: u32);

    fn pong(&mut self, serial: u32);

    /// Create surface, shell surface and toplevel for `window`, in that order
    fn create_window(&mut self, window: WindowId) -> Result<Self::Surface>;

    fn set_title(&mut self, surface: &Self::Surface, title: &str);

    fn set_app_id(&mut self, surface: &Self::Surface, app_id: &str);

    fn ack_configure(&mut self, surface: &Self::Surface, serial: u32);

    fn attach(&mut self, surface: &Self::Surface, buffer: &Self::Buffer, width: i32, height: i32);

    fn commit(&mut self, surface: &Self::Surface);

    /// Destroy toplevel, shell surface and surface, in that order
    fn destroy_window(&mut self, surface: Self::Surface);

    /// `None` when the seat is unbound or has no pointer
    fn create_pointer(&mut self, window: WindowId, surface: &Self::Surface) -> Option<Self::Pointer>;

    fn destroy_pointer(&mut self, pointer: Self::Pointer);

    fn create_buffer(
        &mut self,
        window: WindowId,
        buffer: BufferId,
        fd: BorrowedFd<'_>,
        layout: &BufferLayout,
    ) -> Result<Self::Buffer>;

    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn display_handle(&self) -> *mut c_void;

    fn surface_handle(&self, surface: &Self::Surface) -> *mut c_void;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_interface_roundtrip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_interface(capability.interface()), Some(capability));
        }
        assert_eq!(Capability::from_interface("wl_output"), None);
    }

    #[test]
    fn test_only_seat_is_optional() {
        let optional: Vec<_> = Capability::ALL
            .into_iter()
            .filter(|capability| !capability.is_required())
            .collect();
        assert_eq!(optional, vec![Capability::Seat]);
    }

    #[test]
    fn test_parse_state_array() {
        let mut bytes = Vec::new();
        for value in [1u32, 4, 42] {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        // trailing partial element is ignored
        bytes.push(0xff);

        let states = ToplevelState::parse_array(&bytes);
        assert_eq!(
            states,
            vec![
                ToplevelState::Maximized,
                ToplevelState::Activated,
                ToplevelState::Other(42)
            ]
        );
    }
}
