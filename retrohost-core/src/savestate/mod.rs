//! Save states through the core's serialize/unserialize pair.
//!
//! The blob is opaque and written verbatim: no header, no host-side validation. Its size is
//! whatever `retro_serialize_size` reports for the loaded game; 0 means unsupported.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{debug, warn};

use crate::error::HostError;
use crate::loader::CoreLibrary;

const OPERATION: &str = "save states";

/// Capture the core's state in memory.
pub fn snapshot(core: &CoreLibrary) -> Result<Vec<u8>, HostError> {
    let size = core.serialize_size()?;
    if size == 0 {
        return Err(HostError::UnsupportedOperation(OPERATION));
    }

    let mut blob = vec![0u8; size];
    if !core.serialize(&mut blob)? {
        warn!("core failed to serialize {size} bytes of state");
        return Err(HostError::SerializationFailure);
    }
    Ok(blob)
}

/// Hand a blob back to the core; returns the core's verdict unchanged.
pub fn restore(core: &CoreLibrary, blob: &[u8]) -> Result<bool, HostError> {
    if !core.supports_serialization() {
        return Err(HostError::UnsupportedOperation(OPERATION));
    }
    let restored = core.unserialize(blob)?;
    if !restored {
        debug!("core rejected a {}-byte state", blob.len());
    }
    Ok(restored)
}

/// Serialize and write to `path`. Nothing is written unless serialization succeeds.
pub fn save_state(core: &CoreLibrary, path: &Path) -> Result<(), HostError> {
    let blob = snapshot(core)?;
    fs::write(path, &blob)?;
    debug!("saved {} bytes of state to {}", blob.len(), path.display());
    Ok(())
}

/// Read `path` in full and hand it to the core.
pub fn load_state(core: &CoreLibrary, path: &Path) -> Result<bool, HostError> {
    let blob = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => HostError::NotFound(path.to_path_buf()),
        _ => HostError::Io(e),
    })?;
    debug!("loading {} bytes of state from {}", blob.len(), path.display());
    restore(core, &blob)
}
