//! Debugging facilities.
//!
//! - **Memory viewer**: hex + ASCII dump of any word range
//! - **Watchpoints**: trigger on data or I/O reads and writes
//!
//! Watchpoints are checked by the board on every strobed data/I-O access.
//! Instruction fetches never trigger them; use breakpoints for that.

use crate::bus::Space;

/// Watchpoint trigger type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchKind {
    /// Trigger on write
    Write,
    /// Trigger on read
    Read,
    /// Trigger on read or write
    ReadWrite,
}

/// A data or I/O watchpoint.
#[derive(Debug, Clone)]
pub struct Watchpoint {
    pub space: Space,
    pub addr: u16,
    pub kind: WatchKind,
    /// Only trigger when the written value equals this
    pub value_match: Option<u16>,
    pub hits: u64,
    pub enabled: bool,
}

/// Watchpoint trigger event.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchHit {
    /// Watchpoint index
    pub index: usize,
    pub space: Space,
    pub addr: u16,
    /// Value before the access (for writes) or the value read
    pub old_val: u16,
    /// Value written (same as `old_val` for reads)
    pub new_val: u16,
    pub access: WatchKind,
}

/// Debugger state.
pub struct Debugger {
    pub watchpoints: Vec<Watchpoint>,
    /// Pending hit; the run loop stops when this is set
    pub watch_hit: Option<WatchHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger {
            watchpoints: Vec::new(),
            watch_hit: None,
        }
    }

    /// Add a watchpoint. Returns its index.
    pub fn add_watchpoint(&mut self, space: Space, addr: u16, kind: WatchKind) -> usize {
        let idx = self.watchpoints.len();
        self.watchpoints.push(Watchpoint {
            space, addr, kind, value_match: None, hits: 0, enabled: true,
        });
        idx
    }

    /// Remove a watchpoint by index.
    pub fn remove_watchpoint(&mut self, idx: usize) -> bool {
        if idx < self.watchpoints.len() {
            self.watchpoints.remove(idx);
            true
        } else { false }
    }

    /// Flip a watchpoint between enabled and disabled. Returns the new
    /// setting, or `None` for a bad index.
    pub fn toggle_watchpoint(&mut self, idx: usize) -> Option<bool> {
        let wp = self.watchpoints.get_mut(idx)?;
        wp.enabled = !wp.enabled;
        Some(wp.enabled)
    }

    /// Check watchpoints for a write access. Call before the write lands.
    #[inline]
    pub fn check_write(&mut self, space: Space, addr: u16, old_val: u16, new_val: u16) {
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.enabled || wp.addr != addr || wp.space != space { continue; }
            if wp.kind == WatchKind::Read { continue; }
            if let Some(v) = wp.value_match {
                if new_val != v { continue; }
            }
            wp.hits += 1;
            if self.watch_hit.is_none() {
                self.watch_hit = Some(WatchHit {
                    index: i, space, addr, old_val, new_val,
                    access: WatchKind::Write,
                });
            }
        }
    }

    /// Check watchpoints for a read access.
    #[inline]
    pub fn check_read(&mut self, space: Space, addr: u16, val: u16) {
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.enabled || wp.addr != addr || wp.space != space { continue; }
            if wp.kind == WatchKind::Write { continue; }
            wp.hits += 1;
            if self.watch_hit.is_none() {
                self.watch_hit = Some(WatchHit {
                    index: i, space, addr, old_val: val, new_val: val,
                    access: WatchKind::Read,
                });
            }
        }
    }

    /// Take pending watchpoint hit (returns and clears it).
    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.watch_hit.take()
    }

    /// Format watchpoints list.
    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let k = match wp.kind {
                WatchKind::Write => "W",
                WatchKind::Read => "R",
                WatchKind::ReadWrite => "RW",
            };
            let sp = if wp.space == Space::Io { "io" } else { "mem" };
            let en = if wp.enabled { " " } else { "!" };
            let vm = if let Some(v) = wp.value_match {
                format!(" =0x{:04X}", v)
            } else { String::new() };
            s.push_str(&format!("  [{}]{} {} 0x{:04X} {}  hits={}{}\n",
                i, en, sp, wp.addr, k, wp.hits, vm));
        }
        s
    }
}

impl Default for Debugger {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for WatchHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sp = if self.space == Space::Io { "io" } else { "mem" };
        match self.access {
            WatchKind::Read => write!(f, "watchpoint {}: read {}[0x{:04X}] = 0x{:04X}",
                self.index, sp, self.addr, self.old_val),
            _ => write!(f, "watchpoint {}: write {}[0x{:04X}] 0x{:04X} -> 0x{:04X}",
                self.index, sp, self.addr, self.old_val, self.new_val),
        }
    }
}

// ─── Memory Viewer ──────────────────────────────────────────────────────────

/// Format a hex + ASCII dump of word memory.
///
/// Eight words per line; the ASCII column shows each word's low byte,
/// which is how character data is usually stored.
pub fn dump_memory(mem: &[u16], start: u16, length: u16) -> String {
    let mut s = String::new();
    let end = (start as usize + length as usize).min(mem.len());
    let mut addr = start as usize;
    while addr < end {
        let line_end = (addr + 8).min(end);
        s.push_str(&format!("{:04X}: ", addr));
        for i in addr..addr + 8 {
            if i < line_end {
                s.push_str(&format!("{:04X} ", mem[i]));
            } else {
                s.push_str("     ");
            }
            if i == addr + 3 { s.push(' '); }
        }
        s.push(' ');
        for &w in &mem[addr..line_end] {
            let c = w as u8;
            if (0x20..0x7F).contains(&c) {
                s.push(c as char);
            } else {
                s.push('.');
            }
        }
        s.push('\n');
        addr += 8;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_memory() {
        let mut mem = vec![0u16; 512];
        mem[0x100] = 0x0041; // 'A'
        mem[0x101] = 0x0042; // 'B'
        mem[0x107] = 0xFFFF;
        let dump = dump_memory(&mem, 0x100, 8);
        assert!(dump.starts_with("0100:"));
        assert!(dump.contains("0041 0042"));
        assert!(dump.contains("AB"));
        assert_eq!(dump.lines().count(), 1);
    }

    #[test]
    fn test_watchpoint_write() {
        let mut dbg = Debugger::new();
        dbg.add_watchpoint(Space::Data, 0x100, WatchKind::Write);
        dbg.check_read(Space::Data, 0x100, 1);
        assert!(dbg.take_hit().is_none());
        dbg.check_write(Space::Io, 0x100, 0, 1);
        assert!(dbg.take_hit().is_none());
        dbg.check_write(Space::Data, 0x100, 0x0000, 0xFFFF);
        let hit = dbg.take_hit().unwrap();
        assert_eq!(hit.addr, 0x100);
        assert_eq!(hit.new_val, 0xFFFF);
        assert!(dbg.take_hit().is_none());
    }

    #[test]
    fn test_disabled_and_removed_watchpoints() {
        let mut dbg = Debugger::new();
        let a = dbg.add_watchpoint(Space::Data, 0x20, WatchKind::Write);
        dbg.add_watchpoint(Space::Data, 0x21, WatchKind::Write);
        assert_eq!(dbg.toggle_watchpoint(a), Some(false));
        assert!(dbg.list_watchpoints().contains("[0]! mem 0x0020"));
        dbg.check_write(Space::Data, 0x20, 0, 1);
        assert!(dbg.take_hit().is_none());
        assert_eq!(dbg.watchpoints[a].hits, 0);
        assert_eq!(dbg.toggle_watchpoint(a), Some(true));
        dbg.check_write(Space::Data, 0x20, 1, 2);
        assert!(dbg.take_hit().is_some());
        assert_eq!(dbg.toggle_watchpoint(5), None);

        assert!(dbg.remove_watchpoint(a));
        assert!(!dbg.remove_watchpoint(5));
        dbg.check_write(Space::Data, 0x20, 2, 3);
        assert!(dbg.take_hit().is_none());
        // indices shift down after a removal
        dbg.check_write(Space::Data, 0x21, 0, 1);
        assert_eq!(dbg.take_hit().map(|h| h.index), Some(0));
    }

    #[test]
    fn test_watchpoint_value_match() {
        let mut dbg = Debugger::new();
        let i = dbg.add_watchpoint(Space::Io, 0xFE09, WatchKind::ReadWrite);
        dbg.watchpoints[i].value_match = Some(0x0A);
        dbg.check_write(Space::Io, 0xFE09, 0, 0x41);
        assert!(dbg.take_hit().is_none());
        dbg.check_write(Space::Io, 0xFE09, 0x41, 0x0A);
        assert_eq!(dbg.take_hit().map(|h| h.access), Some(WatchKind::Write));
        assert_eq!(dbg.watchpoints[i].hits, 1);
        assert!(dbg.list_watchpoints().contains("io 0xFE09 RW"));
    }
}
