//! The processor's single synchronous bus port.
//!
//! Each enabled clock the core drives at most one strobe. `vpa` marks an
//! instruction fetch, `vda` a data access and `vio` an I/O access. The
//! collaborator behind [`Bus`] must answer reads in the same cycle.

use serde::{Deserialize, Serialize};

/// Address space selected by the active strobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Space {
    /// `vpa`: opcode or extension-word fetch.
    Program,
    /// `vda`: LD/STO/PUSH/POP data access.
    Data,
    /// `vio`: IN/OUT access.
    Io,
}

/// Memory and I/O seen from the core.
pub trait Bus {
    fn read(&mut self, space: Space, addr: u16) -> u16;
    fn write(&mut self, space: Space, addr: u16, value: u16);
}

/// Input pins sampled each clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pins {
    /// Two-bit active-low interrupt request. 3 means no request.
    pub int_b: u8,
    /// Active-low reset, passed through a two-stage synchroniser.
    pub reset_b: bool,
    /// Clock enable. Low holds every register.
    pub clken: bool,
}

impl Default for Pins {
    fn default() -> Self {
        Pins { int_b: 3, reset_b: true, clken: true }
    }
}

impl Pins {
    #[inline(always)]
    pub fn irq(&self) -> bool {
        self.int_b & 3 != 3
    }
}

/// What the core put on the bus during one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusCycle {
    pub address: u16,
    /// Data sampled from the bus (0 when nothing was read).
    pub din: u16,
    pub dout: u16,
    pub rnw: bool,
    pub vpa: bool,
    pub vda: bool,
    pub vio: bool,
}

impl BusCycle {
    pub fn space(&self) -> Option<Space> {
        if self.vpa {
            Some(Space::Program)
        } else if self.vda {
            Some(Space::Data)
        } else if self.vio {
            Some(Space::Io)
        } else {
            None
        }
    }

    pub fn is_idle(&self) -> bool {
        !(self.vpa || self.vda || self.vio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pins_idle() {
        let pins = Pins::default();
        assert!(!pins.irq());
        assert!(pins.reset_b && pins.clken);
        assert!(Pins { int_b: 2, ..pins }.irq());
    }

    #[test]
    fn test_bus_cycle_space() {
        let c = BusCycle { vio: true, ..Default::default() };
        assert_eq!(c.space(), Some(Space::Io));
        assert!(BusCycle::default().is_idle());
    }
}
