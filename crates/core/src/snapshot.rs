//! Machine state snapshots for rewind.
//!
//! A snapshot holds everything needed to put the machine back at an earlier
//! instruction boundary: core registers and FSM, word memory and I/O latches.
//! Snapshots are stored in a ring buffer, taken every `interval` retired
//! instructions, so the step debugger can walk backwards.

use crate::cpu::CoreState;

/// A frozen copy of machine state.
#[derive(Clone)]
pub struct Snapshot {
    pub core: CoreState,
    /// Full 64K-word memory image
    pub memory: Vec<u16>,
    /// Non-zero I/O latches
    pub io: Vec<(u16, u16)>,
    /// Instruction count when this snapshot was taken
    pub step: u64,
}

/// Ring buffer of snapshots for rewind.
pub struct RewindBuffer {
    buf: Vec<Option<Snapshot>>,
    /// Write position (next slot to overwrite)
    write_pos: usize,
    /// Number of valid snapshots
    count: usize,
    /// Instructions between snapshots
    pub interval: u32,
    step_counter: u32,
}

impl RewindBuffer {
    /// Create a rewind buffer holding up to `capacity` snapshots.
    pub fn new(capacity: usize, interval: u32) -> Self {
        RewindBuffer {
            buf: vec![None; capacity.max(1)],
            write_pos: 0,
            count: 0,
            interval: interval.max(1),
            step_counter: 0,
        }
    }

    /// Notify that an instruction has completed. Returns true if a snapshot
    /// should be taken.
    pub fn tick_step(&mut self) -> bool {
        self.step_counter += 1;
        if self.step_counter >= self.interval {
            self.step_counter = 0;
            true
        } else {
            false
        }
    }

    /// Push a snapshot, overwriting the oldest when full.
    pub fn push(&mut self, snap: Snapshot) {
        self.buf[self.write_pos] = Some(snap);
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        if self.count < self.buf.len() {
            self.count += 1;
        }
    }

    /// Pop the most recent snapshot. Returns None if empty.
    pub fn pop(&mut self) -> Option<Snapshot> {
        if self.count == 0 { return None; }
        self.write_pos = if self.write_pos == 0 { self.buf.len() - 1 } else { self.write_pos - 1 };
        self.count -= 1;
        self.buf[self.write_pos].take()
    }

    pub fn len(&self) -> usize { self.count }

    pub fn is_empty(&self) -> bool { self.count == 0 }

    pub fn clear(&mut self) {
        for slot in self.buf.iter_mut() { *slot = None; }
        self.count = 0;
        self.write_pos = 0;
        self.step_counter = 0;
    }

    /// Estimated memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.buf.iter().flatten()
            .map(|s| std::mem::size_of::<Snapshot>() + s.memory.len() * 2 + s.io.len() * 4)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_snap(step: u64) -> Snapshot {
        Snapshot { core: CoreState::default(), memory: vec![0; 16], io: Vec::new(), step }
    }

    #[test]
    fn test_push_pop() {
        let mut rb = RewindBuffer::new(3, 1);
        rb.push(make_snap(1));
        rb.push(make_snap(2));
        rb.push(make_snap(3));
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.pop().unwrap().step, 3);
        assert_eq!(rb.pop().unwrap().step, 2);
        assert_eq!(rb.len(), 1);
    }

    #[test]
    fn test_ring_overflow() {
        let mut rb = RewindBuffer::new(2, 1);
        rb.push(make_snap(1));
        rb.push(make_snap(2));
        rb.push(make_snap(3)); // overwrites step 1
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.pop().unwrap().step, 3);
        assert_eq!(rb.pop().unwrap().step, 2);
        assert!(rb.pop().is_none());
        assert!(rb.is_empty());
    }

    #[test]
    fn test_tick_step() {
        let mut rb = RewindBuffer::new(10, 4);
        for _ in 0..3 { assert!(!rb.tick_step()); }
        assert!(rb.tick_step());
        assert!(!rb.tick_step());
    }

    #[test]
    fn test_memory_usage_counts_images() {
        let mut rb = RewindBuffer::new(4, 1);
        assert_eq!(rb.memory_usage(), 0);
        rb.push(make_snap(0));
        assert!(rb.memory_usage() >= 32);
    }
}
