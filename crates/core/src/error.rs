//! Host-boundary errors.
//!
//! The core itself has no fault model: reserved opcodes pass through and
//! HLT is a deliberate stop. Everything here comes from loading images,
//! reading configuration or persisting state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("line {line}: checksum mismatch (sum=0x{sum:02X})")]
    Checksum { line: usize, sum: u8 },

    #[error("image does not fit in memory: word address 0x{0:X}")]
    Overflow(usize),

    #[error("cannot encode instruction: {0}")]
    Encode(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("not a save state file (bad magic)")]
    BadMagic,

    #[error("unsupported save state version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("save state codec: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
