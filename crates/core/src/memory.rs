//! OPC6 memory subsystem.
//!
//! Program and data share one word-addressed space:
//!
//! | Address Range | Content                      |
//! |---------------|------------------------------|
//! | 0x0000–0x0001 | reset entry                  |
//! | 0x0002        | interrupt vector B (default) |
//! | 0x0004        | interrupt vector A (default) |
//! | 0x0005–0xFFFF | program, data and stack      |
//!
//! I/O (IN/OUT) is a separate space, see [`crate::io`].

use crate::MEM_WORDS;

/// Unified 64K x 16-bit memory.
pub struct Memory {
    pub words: Vec<u16>,
}

impl Memory {
    pub fn new() -> Self {
        Memory { words: vec![0u16; MEM_WORDS] }
    }

    #[inline(always)]
    pub fn read(&self, addr: u16) -> u16 {
        self.words[addr as usize]
    }

    #[inline(always)]
    pub fn write(&mut self, addr: u16, v: u16) {
        self.words[addr as usize] = v;
    }

    /// Copy `image` to memory starting at `origin`, wrapping at 64K.
    pub fn load(&mut self, origin: u16, image: &[u16]) {
        for (i, &w) in image.iter().enumerate() {
            let a = (origin as usize + i) % MEM_WORDS;
            self.words[a] = w;
        }
    }

    /// Current word and the one after it (for two-word decode).
    pub fn read_pair(&self, addr: u16) -> (u16, u16) {
        (self.read(addr), self.read(addr.wrapping_add(1)))
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
