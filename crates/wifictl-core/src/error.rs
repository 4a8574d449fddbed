//! Error taxonomy shared by the control-socket layer.

use std::path::PathBuf;
use std::time::Duration;

/// Coarse classification of a [`CtrlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required argument was empty or out of bounds.
    InvalidParam,
    /// The operation needs an open connection.
    InvalidState,
    /// OS-level failure, reply mismatch, or directory scan failure.
    Error,
    /// No reply arrived within the budget.
    Timeout,
    /// The registered vendor does not provide this capability.
    NotImplemented,
}

/// Errors from connections, interfaces, managers, and discovery.
#[derive(Debug, thiserror::Error)]
pub enum CtrlError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{op} failed on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("short write on {}: sent {sent} of {len} bytes", path.display())]
    ShortWrite {
        path: PathBuf,
        sent: usize,
        len: usize,
    },

    #[error("unexpected reply to {cmd:?}: expected {expected:?}, got {got:?}")]
    ResponseMismatch {
        cmd: String,
        expected: String,
        got: String,
    },

    #[error("no reply to {cmd:?} on {} within {timeout:?}", path.display())]
    Timeout {
        cmd: String,
        path: PathBuf,
        timeout: Duration,
    },

    #[error("failed to scan control directory {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("event loop poll failed: {0}")]
    Poll(#[from] nix::errno::Errno),

    #[error("vendor {vendor} does not implement {op}")]
    NotImplemented { vendor: String, op: &'static str },
}

impl CtrlError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParam(_) => ErrorKind::InvalidParam,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Io { .. }
            | Self::ShortWrite { .. }
            | Self::ResponseMismatch { .. }
            | Self::Scan { .. }
            | Self::Poll(_) => ErrorKind::Error,
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
