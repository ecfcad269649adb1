//! Save state files.
//!
//! Captures the whole machine to a file using bincode serialization with
//! deflate compression, so a long simulation can be stopped and resumed.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "OPC6"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};

use crate::bus::Pins;
use crate::config::CoreConfig;
use crate::cpu::CoreState;
use crate::error::{Error, Result};

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"OPC6";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Complete machine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub config: CoreConfig,
    pub core: CoreState,
    pub pins: Pins,
    /// Full 64K-word memory image
    pub memory: Vec<u16>,
    /// Non-zero I/O latches
    pub io: Vec<(u16, u16)>,
}

/// Encode a state into the on-disk byte layout.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>> {
    let payload = bincode::serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode the on-disk byte layout, checking magic and version.
pub fn from_bytes(data: &[u8]) -> Result<SaveState> {
    if data.len() < HEADER_LEN || &data[0..4] != MAGIC {
        return Err(Error::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::Version { found: version, expected: FORMAT_VERSION });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| Error::Codec(format!("decompress: {:?}", e)))?;
    Ok(bincode::deserialize(&decompressed)?)
}

/// Save state to file.
pub fn save_to_file(state: &SaveState, path: &Path) -> Result<()> {
    let bytes = to_bytes(state)?;
    std::fs::write(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "state saved");
    Ok(())
}

/// Load state from file.
pub fn load_from_file(path: &Path) -> Result<SaveState> {
    let data = std::fs::read(path)?;
    let state = from_bytes(&data)?;
    tracing::info!(path = %path.display(), "state loaded");
    Ok(state)
}

/// Generate save state path from an image path (replaces extension with `.state`).
pub fn state_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("state")
}
