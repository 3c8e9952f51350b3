//! # wlwindow
//!
//! Client-side windowing on Wayland: connect to the compositor, negotiate
//! the globals a toplevel window needs, drive each window through the
//! xdg-shell configure handshake, back it with shared-memory pixel buffers
//! and translate pointer input into window-relative mouse events.
//!
//! ## Architecture
//!
//! - `manager`: connection ownership, window arena, dispatch driver
//! - `window`: per-window lifecycle state machine
//! - `protocol`: transport boundary and global negotiation
//! - `shm`: shared-memory buffer allocation and release
//! - `input`: pointer event translation
//! - `wayland`: the `wayland-client` transport
//! - `config`: configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wlwindow::{WindowManager, WmConfig, WmEvent};
//!
//! fn main() -> wlwindow::Result<()> {
//!     let mut manager = WindowManager::try_connect(WmConfig::default())?;
//!     let id = manager.create_window(640, 400, "hello")?;
//!
//!     let quit = manager.quit_handle();
//!     if let Some(mut window) = manager.window_mut(id) {
//!         window.set_event_callback(move |event, _| {
//!             if event == WmEvent::WindowCloseRequested {
//!                 quit.request_quit();
//!             }
//!         });
//!     }
//!     manager.run()
//! }
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod manager;
pub mod protocol;
pub mod shm;
pub mod wayland;
pub mod window;

// Re-export main types for easy access
pub use config::WmConfig;
pub use error::{ErrorKind, Result, WmError};
pub use input::{MouseAction, MouseButton, MouseEvent};
pub use manager::{ErrorCallback, QuitHandle, WindowManager};
pub use protocol::{Capability, NativeHandles, ServerEvent, Transport};
pub use wayland::WaylandTransport;
pub use window::{SurfaceState, Window, WindowId, WindowMut, WmEvent};

/// Version information for wlwindow
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
