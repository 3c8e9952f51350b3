//! Error types shared by every layer of the crate.
//!
//! Every failure the library can report is a [`WmError`]. Callers that only
//! care about the category (for example an error callback) use
//! [`WmError::kind`], which collapses the variants onto [`ErrorKind`].

use std::fmt;
use std::io;

/// Coarse error category reported to the connection-level error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The display server socket could not be opened
    ConnectDisplayFailed,
    /// A required global was not advertised by the server
    MissingGlobals,
    /// A window's server-side objects could not be created
    CreateSurfaceFailed,
    /// Shared-memory segment creation, sizing or mapping failed
    ShmFailed,
    /// The connection reported an unrecoverable protocol or I/O error
    ProtocolError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectDisplayFailed => "ConnectDisplayFailed",
            ErrorKind::MissingGlobals => "MissingGlobals",
            ErrorKind::CreateSurfaceFailed => "CreateSurfaceFailed",
            ErrorKind::ShmFailed => "ShmFailed",
            ErrorKind::ProtocolError => "ProtocolError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WmError {
    #[error("failed to connect to the display server: {0}")]
    ConnectDisplayFailed(String),

    #[error("required globals missing: {}", .0.join(", "))]
    MissingGlobals(Vec<&'static str>),

    #[error("failed to create surface: {0}")]
    CreateSurfaceFailed(String),

    #[error("invalid window dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("shared-memory buffer: {context}")]
    ShmFailed {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    ProtocolError(String),
}

impl WmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WmError::ConnectDisplayFailed(_) => ErrorKind::ConnectDisplayFailed,
            WmError::MissingGlobals(_) => ErrorKind::MissingGlobals,
            WmError::CreateSurfaceFailed(_) | WmError::InvalidDimensions { .. } => {
                ErrorKind::CreateSurfaceFailed
            }
            WmError::ShmFailed { .. } => ErrorKind::ShmFailed,
            WmError::ProtocolError(_) => ErrorKind::ProtocolError,
        }
    }

    pub(crate) fn shm(context: &'static str, source: io::Error) -> Self {
        WmError::ShmFailed { context, source }
    }
}

pub type Result<T> = std::result::Result<T, WmError>;
