//! Register file and program status register.
//!
//! Sixteen 16-bit cells, where cell 15 *is* the program counter. There is
//! no separate PC field: [`RegisterFile::pc`] and [`RegisterFile::set_pc`]
//! are accessors over the same storage, so a write to r15 is a jump and a
//! read of r15 observes the live PC.

use serde::{Deserialize, Serialize};

use crate::{PSR_C, PSR_EI, PSR_S, PSR_Z};

/// Register index aliased to the program counter.
pub const PC_REG: usize = 15;

/// Program status register: Z C S EI (bits 0..3) and the software
/// interrupt id (bits 4..7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Psr(pub u8);

impl Psr {
    #[inline(always)]
    pub fn flag(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    #[inline(always)]
    pub fn set_flag(&mut self, bit: u8, v: bool) {
        if v { self.0 |= 1 << bit; } else { self.0 &= !(1 << bit); }
    }

    #[inline(always)]
    pub fn zero(self) -> bool { self.flag(PSR_Z) }

    #[inline(always)]
    pub fn carry(self) -> bool { self.flag(PSR_C) }

    #[inline(always)]
    pub fn sign(self) -> bool { self.flag(PSR_S) }

    #[inline(always)]
    pub fn interrupts_enabled(self) -> bool { self.flag(PSR_EI) }

    /// Software interrupt id (upper nibble).
    #[inline(always)]
    pub fn swiid(self) -> u8 { self.0 >> 4 }

    /// Copy of this PSR with the three arithmetic flags replaced.
    /// EI and swiid pass through unchanged.
    pub fn with_flags(self, zero: bool, carry: bool, sign: bool) -> Psr {
        let mut p = Psr(self.0 & 0xF8);
        p.set_flag(PSR_Z, zero);
        p.set_flag(PSR_C, carry);
        p.set_flag(PSR_S, sign);
        p
    }
}

/// The 16-entry register file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterFile {
    cells: [u16; 16],
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile { cells: [0; 16] }
    }

    /// Read register `r` (0..=15). r15 reads the PC.
    #[inline(always)]
    pub fn get(&self, r: usize) -> u16 {
        self.cells[r & 0xF]
    }

    /// Write register `r` (0..=15). Writing r15 moves the PC.
    #[inline(always)]
    pub fn set(&mut self, r: usize, v: u16) {
        self.cells[r & 0xF] = v;
    }

    #[inline(always)]
    pub fn pc(&self) -> u16 {
        self.cells[PC_REG]
    }

    #[inline(always)]
    pub fn set_pc(&mut self, v: u16) {
        self.cells[PC_REG] = v;
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.cells
    }

    pub fn clear(&mut self) {
        self.cells = [0; 16];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_r15_is_pc() {
        let mut rf = RegisterFile::new();
        rf.set(15, 0x1234);
        assert_eq!(rf.pc(), 0x1234);
        rf.set_pc(0xBEEF);
        assert_eq!(rf.get(15), 0xBEEF);
        // nothing else moved
        assert!(rf.as_slice()[..15].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_psr_flags() {
        let psr = Psr(0b1010_1000).with_flags(true, true, false);
        assert!(psr.zero());
        assert!(psr.carry());
        assert!(!psr.sign());
        assert!(psr.interrupts_enabled());
        assert_eq!(psr.swiid(), 0xA);
        assert_eq!(psr.0, 0b1010_1011);
    }
}
