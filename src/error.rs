use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),
    #[error("Invalid edge: {0}")]
    InvalidEdge(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Poll error: {0}")]
    Poll(String),
}

impl GpioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GpioError::Io {
            path: path.into(),
            source,
        }
    }

    /// Udev may not have fixed up node permissions yet right after an export.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, GpioError::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied)
    }

    /// The kernel answers `EBUSY` when exporting a line that is already exported.
    pub fn is_busy(&self) -> bool {
        matches!(self, GpioError::Io { source, .. } if source.raw_os_error() == Some(Errno::EBUSY as i32))
    }
}
