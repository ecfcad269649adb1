//! Execution profiler for OPC6 programs.
//!
//! Tracks instruction-level execution statistics:
//! - Per-address retire counts (PC histogram)
//! - Total instruction, skipped-instruction and cycle counts
//! - Top-N hotspot analysis with disassembly
//! - Call edges (JSR caller → target)
//!
//! The machine calls into the profiler only while it is enabled.

use std::collections::HashMap;

/// Execution profiler state.
pub struct Profiler {
    pub enabled: bool,
    /// Per-address retire counts
    pc_hits: HashMap<u16, u64>,
    pub total_instructions: u64,
    /// Instructions dropped by a false predicate
    pub total_skipped: u64,
    pub total_interrupts: u64,
    /// Total cycles elapsed while profiling
    pub total_cycles: u64,
    start_tick: u64,
    /// (caller, callee) → count
    call_graph: HashMap<(u16, u16), u64>,
}

impl Profiler {
    pub fn new() -> Self {
        Profiler {
            enabled: false,
            pc_hits: HashMap::new(),
            total_instructions: 0,
            total_skipped: 0,
            total_interrupts: 0,
            total_cycles: 0,
            start_tick: 0,
            call_graph: HashMap::new(),
        }
    }

    /// Start or restart profiling, clearing all accumulated data.
    pub fn start(&mut self, tick: u64) {
        self.pc_hits.clear();
        self.call_graph.clear();
        self.total_instructions = 0;
        self.total_skipped = 0;
        self.total_interrupts = 0;
        self.total_cycles = 0;
        self.start_tick = tick;
        self.enabled = true;
    }

    /// Stop profiling, finalize cycle count.
    pub fn stop(&mut self, tick: u64) {
        self.total_cycles = tick.saturating_sub(self.start_tick);
        self.enabled = false;
    }

    /// Record a retired instruction.
    #[inline]
    pub fn record(&mut self, pc: u16) {
        *self.pc_hits.entry(pc).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    #[inline]
    pub fn record_skip(&mut self) {
        self.total_skipped += 1;
    }

    #[inline]
    pub fn record_interrupt(&mut self) {
        self.total_interrupts += 1;
    }

    /// Record a JSR.
    #[inline]
    pub fn record_call(&mut self, caller_pc: u16, target_pc: u16) {
        *self.call_graph.entry((caller_pc, target_pc)).or_insert(0) += 1;
    }

    pub fn unique_addresses(&self) -> usize {
        self.pc_hits.len()
    }

    /// Top-N hottest addresses by retire count.
    pub fn top_hits(&self, n: usize) -> Vec<(u16, u64)> {
        let mut v: Vec<_> = self.pc_hits.iter().map(|(&pc, &cnt)| (pc, cnt)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v.truncate(n);
        v
    }

    /// Top-N call edges by invocation count.
    pub fn top_calls(&self, n: usize) -> Vec<((u16, u16), u64)> {
        let mut v: Vec<_> = self.call_graph.iter()
            .map(|(&edge, &cnt)| (edge, cnt)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v.truncate(n);
        v
    }

    /// Format a full profiling report. `mem` is used for disassembly.
    pub fn report(&self, mem: &[u16]) -> String {
        let mut s = String::new();
        s.push_str("=== Profiler Report ===\n");
        s.push_str(&format!("Instructions: {}\n", self.total_instructions));
        s.push_str(&format!("Skipped: {}\n", self.total_skipped));
        s.push_str(&format!("Interrupts: {}\n", self.total_interrupts));
        s.push_str(&format!("Cycles: {}\n", self.total_cycles));
        s.push_str(&format!("Unique addresses: {}\n", self.unique_addresses()));
        if self.total_instructions > 0 {
            let cpi = self.total_cycles as f64 / self.total_instructions as f64;
            s.push_str(&format!("Cycles/instruction: {:.2}\n", cpi));
        }

        s.push_str("\n--- Top 20 Hotspots ---\n");
        s.push_str(&format!("{:>6}  {:>8}  {:>7}  {}\n", "Addr", "Hits", "%", "Instruction"));
        for (pc, cnt) in self.top_hits(20) {
            let pct = if self.total_instructions > 0 {
                cnt as f64 / self.total_instructions as f64 * 100.0
            } else { 0.0 };
            let word = mem.get(pc as usize).copied().unwrap_or(0);
            let next = mem.get(pc as usize + 1).copied().unwrap_or(0);
            let (inst, _) = crate::opcodes::decode(word, next);
            let asm = crate::disasm::disassemble(inst);
            s.push_str(&format!("0x{:04X}  {:>8}  {:>6.2}%  {}\n", pc, cnt, pct, asm));
        }

        let calls = self.top_calls(10);
        if !calls.is_empty() {
            s.push_str("\n--- Top 10 Call Edges ---\n");
            s.push_str(&format!("{:>6} → {:>6}  {:>6}\n", "Caller", "Callee", "Count"));
            for ((from, to), cnt) in calls {
                s.push_str(&format!("0x{:04X} → 0x{:04X}  {:>6}\n", from, to, cnt));
            }
        }

        s
    }
}

impl Default for Profiler {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_basic() {
        let mut p = Profiler::new();
        p.start(0);
        p.record(0x100);
        p.record(0x100);
        p.record(0x101);
        p.record(0x100);
        p.record_skip();
        assert_eq!(p.total_instructions, 4);
        assert_eq!(p.total_skipped, 1);
        assert_eq!(p.unique_addresses(), 2);
        assert_eq!(p.top_hits(1)[0], (0x100, 3));
    }

    #[test]
    fn test_call_graph() {
        let mut p = Profiler::new();
        p.start(0);
        p.record_call(0x10, 0x200);
        p.record_call(0x10, 0x200);
        p.record_call(0x20, 0x300);
        let calls = p.top_calls(2);
        assert_eq!(calls[0], ((0x10, 0x200), 2));
    }

    #[test]
    fn test_report_disassembles_hotspots() {
        let mut p = Profiler::new();
        p.start(0);
        p.record(0);
        p.stop(4);
        let mem = [0x1001u16, 0x0005];
        let r = p.report(&mem);
        assert!(r.contains("mov r1, r0, 0x0005"));
        assert!(r.contains("Cycles: 4"));
    }
}
