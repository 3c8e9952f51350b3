// Shared fake display server for integration tests
//
// FakeTransport records every request the core issues and hands out
// notifications the test injects. The server state sits behind an
// Rc<RefCell<..>> so tests can inspect it while the manager owns the transport.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::ffi::c_void;
use std::io;
use std::os::fd::BorrowedFd;
use std::rc::Rc;
use std::time::Duration;
use wlwindow::config::WmConfig;
use wlwindow::error::{Result, WmError};
use wlwindow::input::{MouseEvent, PointerEvent};
use wlwindow::protocol::{BufferLayout, Capability, ServerEvent, ToplevelState, Transport};
use wlwindow::shm::BufferId;
use wlwindow::window::{WindowId, WmEvent};
use wlwindow::WindowManager;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Bind {
        name: u32,
        capability: Capability,
        version: u32,
    },
    Pong(u32),
    CreateWindow(WindowId),
    SetTitle(WindowId, String),
    SetAppId(WindowId, String),
    AckConfigure(WindowId, u32),
    Attach {
        window: WindowId,
        buffer: BufferId,
        width: i32,
        height: i32,
    },
    Commit(WindowId),
    DestroyWindow(WindowId),
    CreatePointer(WindowId),
    DestroyPointer(WindowId),
    CreateBuffer {
        window: WindowId,
        buffer: BufferId,
        size: i32,
    },
    DestroyBuffer(BufferId),
}

#[derive(Debug, Default)]
pub struct FakeServer {
    pub requests: Vec<Request>,
    /// Already read from the socket, waiting for dispatch
    pub buffered: VecDeque<ServerEvent>,
    /// Still on the socket
    pub incoming: VecDeque<ServerEvent>,
    pub flushes: usize,
    pub roundtrips: usize,
    /// Announce a pointer when the seat is bound
    pub seat_pointer: bool,
    /// Answer a window's first commit with a configure
    pub auto_configure: bool,
    pub fail_buffers: bool,
    pub fail_dispatch: bool,
    next_serial: u32,
    configured: HashSet<WindowId>,
}

pub type Shared = Rc<RefCell<FakeServer>>;

impl FakeServer {
    /// A server advertising the given globals, numbered from 1
    pub fn with_globals(interfaces: &[&str]) -> Shared {
        let mut server = FakeServer {
            seat_pointer: true,
            next_serial: 100,
            ..Default::default()
        };
        for (index, interface) in interfaces.iter().enumerate() {
            server.incoming.push_back(ServerEvent::GlobalAdded {
                name: index as u32 + 1,
                interface: interface.to_string(),
                version: 9,
            });
        }
        Rc::new(RefCell::new(server))
    }

    /// compositor (1), shm (2), xdg_wm_base (3), seat (4)
    pub fn standard() -> Shared {
        Self::with_globals(&["wl_compositor", "wl_shm", "xdg_wm_base", "wl_seat"])
    }

    fn take_all(queue: &mut VecDeque<ServerEvent>, events: &mut Vec<ServerEvent>) -> usize {
        let count = queue.len();
        events.extend(queue.drain(..));
        count
    }

    fn check_dispatch(&self) -> Result<()> {
        if self.fail_dispatch {
            return Err(WmError::ProtocolError("connection reset by peer".into()));
        }
        Ok(())
    }
}

pub struct FakeTransport {
    server: Shared,
}

impl FakeTransport {
    pub fn new(server: &Shared) -> Self {
        Self {
            server: Rc::clone(server),
        }
    }

    fn record(&self, request: Request) {
        self.server.borrow_mut().requests.push(request);
    }
}

impl Transport for FakeTransport {
    type Surface = WindowId;
    type Pointer = WindowId;
    type Buffer = BufferId;

    fn flush(&mut self) -> Result<()> {
        self.server.borrow_mut().flushes += 1;
        Ok(())
    }

    fn roundtrip(&mut self, events: &mut Vec<ServerEvent>) -> Result<()> {
        let mut server = self.server.borrow_mut();
        server.check_dispatch()?;
        server.roundtrips += 1;
        FakeServer::take_all(&mut server.buffered, events);
        FakeServer::take_all(&mut server.incoming, events);
        Ok(())
    }

    fn dispatch_pending(&mut self, events: &mut Vec<ServerEvent>) -> Result<usize> {
        let mut server = self.server.borrow_mut();
        server.check_dispatch()?;
        Ok(FakeServer::take_all(&mut server.buffered, events))
    }

    fn blocking_dispatch(&mut self, events: &mut Vec<ServerEvent>) -> Result<usize> {
        let mut server = self.server.borrow_mut();
        server.check_dispatch()?;
        Ok(FakeServer::take_all(&mut server.incoming, events))
    }

    fn poll_readable(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(!self.server.borrow().incoming.is_empty())
    }

    fn bind(&mut self, name: u32, capability: Capability, version: u32) {
        let mut server = self.server.borrow_mut();
        server.requests.push(Request::Bind {
            name,
            capability,
            version,
        });
        if capability == Capability::Seat {
            let pointer = server.seat_pointer;
            server
                .incoming
                .push_back(ServerEvent::SeatCapabilities { pointer });
        }
    }

    fn pong(&mut self, serial: u32) {
        self.record(Request::Pong(serial));
    }

    fn create_window(&mut self, window: WindowId) -> Result<WindowId> {
        self.record(Request::CreateWindow(window));
        Ok(window)
    }

    fn set_title(&mut self, surface: &WindowId, title: &str) {
        self.record(Request::SetTitle(*surface, title.to_string()));
    }

    fn set_app_id(&mut self, surface: &WindowId, app_id: &str) {
        self.record(Request::SetAppId(*surface, app_id.to_string()));
    }

    fn ack_configure(&mut self, surface: &WindowId, serial: u32) {
        self.record(Request::AckConfigure(*surface, serial));
    }

    fn attach(&mut self, surface: &WindowId, buffer: &BufferId, width: i32, height: i32) {
        self.record(Request::Attach {
            window: *surface,
            buffer: *buffer,
            width,
            height,
        });
    }

    fn commit(&mut self, surface: &WindowId) {
        let mut server = self.server.borrow_mut();
        server.requests.push(Request::Commit(*surface));
        if server.auto_configure && server.configured.insert(*surface) {
            server.next_serial += 1;
            let serial = server.next_serial;
            server.incoming.push_back(ServerEvent::ToplevelConfigure {
                window: *surface,
                width: 0,
                height: 0,
                states: Vec::new(),
            });
            server.incoming.push_back(ServerEvent::SurfaceConfigure {
                window: *surface,
                serial,
            });
        }
    }

    fn destroy_window(&mut self, surface: WindowId) {
        self.record(Request::DestroyWindow(surface));
    }

    fn create_pointer(&mut self, window: WindowId, _surface: &WindowId) -> Option<WindowId> {
        self.record(Request::CreatePointer(window));
        Some(window)
    }

    fn destroy_pointer(&mut self, pointer: WindowId) {
        self.record(Request::DestroyPointer(pointer));
    }

    fn create_buffer(
        &mut self,
        window: WindowId,
        buffer: BufferId,
        _fd: BorrowedFd<'_>,
        layout: &BufferLayout,
    ) -> Result<BufferId> {
        let mut server = self.server.borrow_mut();
        if server.fail_buffers {
            return Err(WmError::ShmFailed {
                context: "register",
                source: io::Error::new(io::ErrorKind::OutOfMemory, "pool exhausted"),
            });
        }
        server.requests.push(Request::CreateBuffer {
            window,
            buffer,
            size: layout.size,
        });
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.record(Request::DestroyBuffer(buffer));
    }

    fn display_handle(&self) -> *mut c_void {
        0xd15b_usize as *mut c_void
    }

    fn surface_handle(&self, surface: &WindowId) -> *mut c_void {
        (0x1000 + surface.index() as usize) as *mut c_void
    }
}

// ----- helpers -----

pub fn test_config() -> WmConfig {
    let mut config = WmConfig::default();
    config.shm.name_prefix = "/wlwindow-test".to_string();
    config
}

pub fn connect(server: &Shared) -> WindowManager<FakeTransport> {
    WindowManager::try_with_transport(FakeTransport::new(server), test_config())
        .expect("fake server negotiation failed")
}

pub fn inject(server: &Shared, event: ServerEvent) {
    server.borrow_mut().incoming.push_back(event);
}

pub fn configure(server: &Shared, window: WindowId, serial: u32) {
    inject(server, ServerEvent::SurfaceConfigure { window, serial });
}

pub fn toplevel_configure(server: &Shared, window: WindowId, width: i32, height: i32, states: &[ToplevelState]) {
    inject(
        server,
        ServerEvent::ToplevelConfigure {
            window,
            width,
            height,
            states: states.to_vec(),
        },
    );
}

pub fn pointer(server: &Shared, window: WindowId, event: PointerEvent) {
    inject(server, ServerEvent::Pointer { window, event });
}

/// Number of requests recorded so far, for use with `requests_since`
pub fn mark(server: &Shared) -> usize {
    server.borrow().requests.len()
}

pub fn requests_since(server: &Shared, mark: usize) -> Vec<Request> {
    server.borrow().requests[mark..].to_vec()
}

pub fn all_requests(server: &Shared) -> Vec<Request> {
    server.borrow().requests.clone()
}

/// Buffer ids the core registered, in creation order
pub fn created_buffers(server: &Shared) -> Vec<(BufferId, i32)> {
    server
        .borrow()
        .requests
        .iter()
        .filter_map(|request| match request {
            Request::CreateBuffer { buffer, size, .. } => Some((*buffer, *size)),
            _ => None,
        })
        .collect()
}

pub fn record_events(manager: &mut WindowManager<FakeTransport>, id: WindowId) -> Rc<RefCell<Vec<WmEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    manager
        .window_mut(id)
        .expect("window exists")
        .set_event_callback(move |event, _| sink.borrow_mut().push(event));
    events
}

pub fn record_mouse(manager: &mut WindowManager<FakeTransport>, id: WindowId) -> Rc<RefCell<Vec<MouseEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    manager
        .window_mut(id)
        .expect("window exists")
        .set_mouse_callback(move |event, _| sink.borrow_mut().push(*event));
    events
}

/// Create a window and drive it through configure to mapped
pub fn mapped_window(server: &Shared, manager: &mut WindowManager<FakeTransport>) -> WindowId {
    let id = manager.create_window(640, 400, "demo").expect("create window");
    manager.poll_events().expect("initial commit");
    configure(server, id, 1);
    manager.poll_events().expect("configure");
    manager.poll_events().expect("map");
    assert!(manager.window(id).expect("window exists").is_mapped());
    id
}
