//! Shared-memory pixel buffers
//!
//! A [`PixelBuffer`] is a fixed-size XRGB8888 surface backed by an anonymous
//! kernel memory object that is mapped into this process and described to
//! the server through a buffer handle. Buffers are immutable in size: a
//! resize allocates a new one and the old one is released once the server
//! is done with it.
//!
//! Release order is fixed: server-side handle first, then the mapping, then
//! the file descriptor.

use crate::error::{Result, WmError};
use crate::protocol::{BufferLayout, PixelFormat, Transport};
use crate::window::WindowId;
use log::{debug, trace};
use memmap2::MmapMut;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicU32, Ordering};

/// Format every buffer is created with
pub const PIXEL_FORMAT: PixelFormat = PixelFormat::Xrgb8888;

/// Name collisions (EEXIST) are retried with the next counter value this many times
const NAME_ATTEMPTS: u32 = 16;

static SEGMENT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Identifies a buffer across its lifetime, including while it awaits release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Hands out connection-unique buffer ids.
#[derive(Debug, Default)]
pub(crate) struct BufferIds {
    next: u64,
}

impl BufferIds {
    pub(crate) fn next(&mut self) -> BufferId {
        self.next += 1;
        BufferId(self.next)
    }
}

/// Read-only description of a window's current buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub id: BufferId,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// Size of the mapping in bytes
    pub len: usize,
}

/// Compute stride and size for a packed 32-bit surface, rejecting sizes the
/// wire protocol cannot describe.
pub fn layout_for(width: u32, height: u32) -> Result<BufferLayout> {
    let too_large = || {
        WmError::shm(
            "size",
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{}x{} buffer does not fit a shm pool", width, height),
            ),
        )
    };

    if width == 0 || height == 0 {
        return Err(WmError::shm(
            "size",
            io::Error::new(io::ErrorKind::InvalidInput, "buffer dimensions must be positive"),
        ));
    }

    let stride = width
        .checked_mul(PIXEL_FORMAT.bytes_per_pixel())
        .ok_or_else(too_large)?;
    let size = stride.checked_mul(height).ok_or_else(too_large)?;

    Ok(BufferLayout {
        width: i32::try_from(width).map_err(|_| too_large())?,
        height: i32::try_from(height).map_err(|_| too_large())?,
        stride: i32::try_from(stride).map_err(|_| too_large())?,
        size: i32::try_from(size).map_err(|_| too_large())?,
        format: PIXEL_FORMAT,
    })
}

/// An unlinked, mapped shared-memory object.
///
/// Field order matters: the mapping is dropped before the descriptor.
pub struct ShmSegment {
    map: MmapMut,
    file: File,
}

impl ShmSegment {
    /// Create a segment of exactly `len` bytes named `{prefix}-{pid}-{n}`.
    /// The name is unlinked before this returns.
    pub fn create(prefix: &str, len: usize) -> Result<Self> {
        let file = open_segment(prefix).map_err(|e| WmError::shm("create", e))?;
        file.set_len(len as u64)
            .map_err(|e| WmError::shm("resize", e))?;

        // SAFETY: the descriptor is private to this process (its name is
        // already unlinked) and only the server reads it, never truncates it.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| WmError::shm("mmap", e))?;

        trace!("Mapped {} byte shm segment", len);
        Ok(Self { map, file })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Fill every pixel with a packed 32-bit colour (stored little-endian)
    pub fn fill(&mut self, color: u32) {
        let pixel = color.to_le_bytes();
        for chunk in self.map.chunks_exact_mut(4) {
            chunk.copy_from_slice(&pixel);
        }
    }
}

fn open_segment(prefix: &str) -> io::Result<File> {
    match open_named(prefix) {
        Ok(file) => Ok(file),
        Err(err) => {
            debug!("shm_open failed ({}), trying memfd", err);
            open_anonymous().map_err(|_| err)
        }
    }
}

fn open_named(prefix: &str) -> io::Result<File> {
    for _ in 0..NAME_ATTEMPTS {
        let counter = SEGMENT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}-{}", prefix, std::process::id(), counter);
        let c_name = CString::new(name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC,
                0o600,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                continue;
            }
            return Err(err);
        }

        // SAFETY: shm_open returned a fresh descriptor we exclusively own
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        unsafe { libc::shm_unlink(c_name.as_ptr()) };
        return Ok(File::from(owned));
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free shm segment name",
    ))
}

#[cfg(target_os = "linux")]
fn open_anonymous() -> io::Result<File> {
    let name = CString::new("wlwindow-shm").map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: memfd_create returned a fresh descriptor we exclusively own
    Ok(File::from(unsafe { OwnedFd::from_raw_fd(fd) }))
}

#[cfg(not(target_os = "linux"))]
fn open_anonymous() -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "anonymous memory objects are only available on Linux",
    ))
}

/// A shared-memory buffer paired with its server-side handle.
pub struct PixelBuffer<B> {
    id: BufferId,
    width: u32,
    height: u32,
    stride: u32,
    handle: B,
    segment: ShmSegment,
}

impl<B> PixelBuffer<B> {
    /// Allocate, fill and register a `width`x`height` buffer.
    ///
    /// Nothing is registered with the server unless the segment was created,
    /// sized and mapped successfully.
    pub fn allocate<T>(
        transport: &mut T,
        window: WindowId,
        id: BufferId,
        width: u32,
        height: u32,
        fill: u32,
        name_prefix: &str,
    ) -> Result<Self>
    where
        T: Transport<Buffer = B>,
    {
        let layout = layout_for(width, height)?;
        let mut segment = ShmSegment::create(name_prefix, layout.size as usize)?;
        segment.fill(fill);

        let handle = transport.create_buffer(window, id, segment.as_fd(), &layout)?;

        debug!(
            "Allocated buffer {} for window {}: {}x{} stride {} ({} bytes)",
            id.as_u64(),
            window,
            width,
            height,
            layout.stride,
            layout.size
        );

        Ok(Self {
            id,
            width,
            height,
            stride: layout.stride as u32,
            handle,
            segment,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn handle(&self) -> &B {
        &self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.segment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment.is_empty()
    }

    pub fn pixels(&self) -> &[u8] {
        self.segment.bytes()
    }

    pub fn info(&self) -> BufferInfo {
        BufferInfo {
            id: self.id,
            width: self.width,
            height: self.height,
            stride: self.stride,
            len: self.segment.len(),
        }
    }

    /// Destroy the server handle, then unmap, then close.
    pub fn release<T>(self, transport: &mut T)
    where
        T: Transport<Buffer = B>,
    {
        let PixelBuffer {
            id, handle, segment, ..
        } = self;

        transport.destroy_buffer(handle);
        let ShmSegment { map, file } = segment;
        drop(map);
        drop(file);

        trace!("Released buffer {}", id.as_u64());
    }
}
