//! I/O space reached through IN/OUT.
//!
//! Every address is a plain 16-bit latch: OUT stores, IN reads back the
//! last value written (zero if never written). Writes to the UART transmit
//! address additionally append their low byte to the serial buffer.

use std::collections::BTreeMap;

pub struct IoSpace {
    latches: BTreeMap<u16, u16>,
    /// I/O address captured as serial output.
    pub uart_tx: u16,
    serial_buf: Vec<u8>,
}

impl IoSpace {
    pub fn new(uart_tx: u16) -> Self {
        IoSpace { latches: BTreeMap::new(), uart_tx, serial_buf: Vec::new() }
    }

    pub fn read(&self, addr: u16) -> u16 {
        self.latches.get(&addr).copied().unwrap_or(0)
    }

    pub fn write(&mut self, addr: u16, v: u16) {
        if addr == self.uart_tx {
            self.serial_buf.push(v as u8);
        }
        self.latches.insert(addr, v);
    }

    /// Take and clear accumulated serial output bytes.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial_buf)
    }

    /// Non-zero latches in address order.
    pub fn latches(&self) -> Vec<(u16, u16)> {
        self.latches.iter().filter(|(_, &v)| v != 0).map(|(&a, &v)| (a, v)).collect()
    }

    pub fn restore_latches(&mut self, latches: &[(u16, u16)]) {
        self.latches = latches.iter().copied().collect();
    }

    pub fn clear(&mut self) {
        self.latches.clear();
        self.serial_buf.clear();
    }
}

impl Default for IoSpace {
    fn default() -> Self {
        Self::new(crate::UART_TX)
    }
}

/// Format non-zero I/O latches, one per line.
pub fn dump_io(io: &IoSpace) -> String {
    let mut s = String::new();
    for (addr, v) in io.latches() {
        let name = if addr == io.uart_tx { " (uart tx)" } else { "" };
        s.push_str(&format!("IO[0x{:04X}] = 0x{:04X}{}\n", addr, v, name));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_and_serial() {
        let mut io = IoSpace::new(0xFE09);
        io.write(0xFE09, 'H' as u16);
        io.write(0xFE09, 0x0169); // only the low byte is transmitted
        io.write(0x0010, 7);
        assert_eq!(io.read(0x0010), 7);
        assert_eq!(io.read(0x0011), 0);
        assert_eq!(io.take_serial_output(), b"Hi".to_vec());
        assert!(io.take_serial_output().is_empty());
    }

    #[test]
    fn test_dump_io() {
        let mut io = IoSpace::new(0xFE09);
        io.write(0x0010, 0x00FF);
        io.write(0x0020, 0);
        let s = dump_io(&io);
        assert!(s.contains("IO[0x0010] = 0x00FF"));
        assert!(!s.contains("0x0020"));
    }
}
