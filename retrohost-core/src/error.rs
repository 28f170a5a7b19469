//! Error taxonomy for the host.
//!
//! Game-load failure is deliberately absent: `retro_load_game` reports a boolean and the host
//! surfaces it as `Ok(false)` so callers can retry with another image.

use std::path::PathBuf;

/// Errors returned by host operations.
#[derive(Debug)]
pub enum HostError {
    /// The native module could not be mapped.
    LoadFailure { path: PathBuf, reason: String },
    /// A required entry point is missing from the module.
    SymbolResolutionFailure { symbol: &'static str },
    /// The core does not support the requested operation (e.g. serialize size 0).
    UnsupportedOperation(&'static str),
    /// The core's serialize entry point reported failure.
    SerializationFailure,
    /// A save-state file does not exist.
    NotFound(PathBuf),
    /// A path cannot be passed to the core as a C string.
    InvalidPath(PathBuf),
    /// An entry point was invoked after the core was disposed.
    Disposed,
    /// File I/O failed.
    Io(std::io::Error),
}

impl core::fmt::Display for HostError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HostError::LoadFailure { path, reason } => {
                write!(f, "failed to load core {}: {reason}", path.display())
            }
            HostError::SymbolResolutionFailure { symbol } => {
                write!(f, "core is missing required entry point `{symbol}`")
            }
            HostError::UnsupportedOperation(op) => write!(f, "core does not support {op}"),
            HostError::SerializationFailure => write!(f, "core failed to serialize its state"),
            HostError::NotFound(path) => write!(f, "file not found: {}", path.display()),
            HostError::InvalidPath(path) => {
                write!(f, "path contains an interior NUL byte: {}", path.display())
            }
            HostError::Disposed => write!(f, "core has already been disposed"),
            HostError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HostError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HostError {
    fn from(e: std::io::Error) -> Self {
        HostError::Io(e)
    }
}

impl HostError {
    /// Whether the session can keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            HostError::LoadFailure { .. } | HostError::SymbolResolutionFailure { .. }
        )
    }
}
