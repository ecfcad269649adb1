//! Core configuration.
//!
//! Loaded from a TOML file and overridden from the command line:
//!
//! ```toml
//! # opc6.toml
//! zero_register = false
//! predication = "skip"     # or "squash"
//! vector_a = 0x0004
//! vector_b = 0x0002
//! uart_tx = 0xFE09
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How an instruction whose predicate is false moves through the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predication {
    /// Abandon the instruction at the first state that sees the false
    /// predicate and go back to Fetch0.
    #[default]
    Skip,
    /// Walk the full state path with writes and data strobes suppressed.
    /// Every instruction then takes a fixed number of cycles.
    Squash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// r0 reads as zero everywhere, not only as an address base.
    pub zero_register: bool,
    pub predication: Predication,
    /// Interrupt vector taken when `int_b[1]` is low.
    pub vector_a: u16,
    /// Interrupt vector taken when `int_b[1]` is high (including SWI).
    pub vector_b: u16,
    /// I/O address whose writes are captured as serial output.
    pub uart_tx: u16,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            zero_register: false,
            predication: Predication::Skip,
            vector_a: crate::VECTOR_A,
            vector_b: crate::VECTOR_B,
            uart_tx: crate::UART_TX,
        }
    }
}

impl CoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded core config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = CoreConfig::default();
        assert!(!c.zero_register);
        assert_eq!(c.predication, Predication::Skip);
        assert_eq!(c.vector_a, 0x0004);
        assert_eq!(c.vector_b, 0x0002);
        assert_eq!(c.uart_tx, 0xFE09);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = CoreConfig::from_toml_str("predication = \"squash\"\nvector_a = 0x100\n").unwrap();
        assert_eq!(c.predication, Predication::Squash);
        assert_eq!(c.vector_a, 0x100);
        assert_eq!(c.vector_b, 0x0002);
        assert!(!c.zero_register);
    }

    #[test]
    fn test_bad_toml() {
        assert!(CoreConfig::from_toml_str("predication = \"sometimes\"").is_err());
        assert!(CoreConfig::from_toml_str("vector_a = 70000").is_err());
    }
}
