//! # opc6-core
//!
//! Cycle-level model of the OPC6 16-bit processor core.
//!
//! OPC6 is a small predicated load/store machine: sixteen 16-bit registers
//! (r15 is the program counter), a processor status register with zero,
//! carry, sign, interrupt-enable and software-interrupt fields, and a single
//! synchronous bus with separate strobes for instruction fetch, data and I/O.
//! Every clock is evaluated as a pure function of the registered state and
//! the bus inputs, then committed in one step.
//!
//! ## Architecture
//!
//! - [`Machine`]: Top-level harness that wires a CPU to memory, I/O and the debugger
//! - [`Cpu`]: Fetch/execute state machine, register file, PSR, interrupt entry
//! - [`alu`]: Combinational ALU
//! - [`opcodes`]: Instruction word decoder, predicate evaluation and encoder
//! - [`Memory`]: Unified 64K-word program/data memory
//! - [`io`]: Latched I/O space with serial capture
//! - [`hex`]: Intel HEX and word-list image loaders
//! - [`disasm`]: Instruction disassembler for debug views
//! - [`profiler`]: Execution profiler with PC histogram and call graph
//! - [`debugger`]: Memory viewer, data and I/O watchpoints
//! - [`savestate`]: Compressed save state files
//! - [`snapshot`]: In-memory snapshots for rewind
//!
//! ## Interrupts
//!
//! Two interrupt sources reach the `Interrupt` state:
//!
//! 1. **Hardware**: `int_b != 3` while EI is set, sampled at `Execute` and
//!    `WriteMemory` boundaries. `int_b[1]` low selects vector A, high vector B.
//! 2. **Software**: `putpsr` writing a non-zero swi field, regardless of EI.
//!
//! Entry saves the PC and PSR bits 3..0 and clears EI; `rti` restores both.

pub mod alu;
pub mod bus;
pub mod config;
pub mod cpu;
pub mod debugger;
pub mod disasm;
pub mod error;
pub mod hex;
pub mod io;
pub mod memory;
pub mod opcodes;
pub mod profiler;
pub mod regfile;
pub mod savestate;
pub mod snapshot;

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

pub use bus::{Bus, BusCycle, Pins, Space};
pub use config::{CoreConfig, Predication};
pub use cpu::{CoreState, Cpu, Cycle, Events, State};
pub use debugger::{Debugger, WatchHit, WatchKind};
pub use error::{Error, Result};
pub use io::IoSpace;
pub use memory::Memory;

/// Words of unified program/data memory
pub const MEM_WORDS: usize = 0x10000;

/// PSR bit: zero
pub const PSR_Z: u8 = 0;
/// PSR bit: carry
pub const PSR_C: u8 = 1;
/// PSR bit: sign
pub const PSR_S: u8 = 2;
/// PSR bit: interrupt enable
pub const PSR_EI: u8 = 3;

/// Default vector for `int_b[1]` low
pub const VECTOR_A: u16 = 0x0004;
/// Default vector for `int_b[1]` high and software interrupts
pub const VECTOR_B: u16 = 0x0002;
/// Default I/O address captured as serial output
pub const UART_TX: u16 = 0xFE09;

/// Upper bound on clocks spent by one `step_instruction`.
const MAX_STEP_CYCLES: u32 = 32;

/// Why [`Machine::run`] returned.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Halted,
    /// An opcode at this address was latched for execution.
    Breakpoint(u16),
    Watchpoint(WatchHit),
    CycleLimit,
}

/// Everything on the far side of the bus.
pub struct Board {
    pub mem: Memory,
    pub io: IoSpace,
    pub debugger: Debugger,
}

impl Bus for Board {
    fn read(&mut self, space: Space, addr: u16) -> u16 {
        match space {
            Space::Program => self.mem.read(addr),
            Space::Data => {
                let v = self.mem.read(addr);
                self.debugger.check_read(space, addr, v);
                v
            }
            Space::Io => {
                let v = self.io.read(addr);
                self.debugger.check_read(space, addr, v);
                v
            }
        }
    }

    fn write(&mut self, space: Space, addr: u16, value: u16) {
        match space {
            Space::Program | Space::Data => {
                let old = self.mem.read(addr);
                self.debugger.check_write(space, addr, old, value);
                self.mem.write(addr, value);
            }
            Space::Io => {
                let old = self.io.read(addr);
                self.debugger.check_write(space, addr, old, value);
                self.io.write(addr, value);
            }
        }
    }
}

/// An OPC6 core with 64K words of memory, latched I/O and debug hooks.
pub struct Machine {
    pub cpu: Cpu,
    pub board: Board,
    /// Pin levels applied on every clock
    pub pins: Pins,
    /// Opcode addresses that stop [`Machine::run`]
    pub breakpoints: HashSet<u16>,
    pub profiler: profiler::Profiler,
}

impl Machine {
    pub fn new(config: CoreConfig) -> Self {
        let io = IoSpace::new(config.uart_tx);
        Machine {
            cpu: Cpu::new(config),
            board: Board { mem: Memory::new(), io, debugger: Debugger::new() },
            pins: Pins::default(),
            breakpoints: HashSet::new(),
            profiler: profiler::Profiler::new(),
        }
    }

    /// Load an Intel HEX or word-list image and reset the core.
    ///
    /// Returns the number of words spanned.
    pub fn load_image(&mut self, text: &str) -> Result<usize> {
        let size = hex::load_image(text, &mut self.board.mem.words)?;
        debug!("loaded image: {} words", size);
        self.reset();
        Ok(size)
    }

    /// Copy raw words into memory at `origin`. The core is not reset.
    pub fn load_words(&mut self, origin: u16, words: &[u16]) {
        self.board.mem.load(origin, words);
    }

    /// Reset the core immediately. Memory and I/O keep their contents.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.board.debugger.watch_hit = None;
    }

    /// Run one clock with the current pins.
    pub fn tick(&mut self) -> Cycle {
        let cycle = self.cpu.cycle(&mut self.board, self.pins);
        if self.profiler.enabled {
            let ev = cycle.events;
            if let Some(r) = ev.retired {
                self.profiler.record(r.addr);
                if r.opcode == opcodes::Opcode::Jsr {
                    self.profiler.record_call(r.addr, self.cpu.pc());
                }
            }
            if ev.skipped.is_some() {
                self.profiler.record_skip();
            }
            if ev.interrupt.is_some() {
                self.profiler.record_interrupt();
            }
        }
        cycle
    }

    /// Clock until an instruction retires or is skipped.
    ///
    /// Returns the events of the last clock. Stops early when the core is
    /// halted, and gives up after a bounded number of clocks so a held
    /// clock enable or reset cannot hang the caller.
    pub fn step_instruction(&mut self) -> Events {
        let mut last = Events::default();
        for _ in 0..MAX_STEP_CYCLES {
            if self.cpu.halted() {
                break;
            }
            last = self.tick().events;
            if last.retired.is_some() || last.skipped.is_some() || last.halted {
                break;
            }
        }
        last
    }

    /// Run until halt, breakpoint, watchpoint or `max_cycles` clocks.
    pub fn run(&mut self, max_cycles: u64) -> StopReason {
        let start = self.cpu.state.cycles;
        let mut ticks = 0u64;
        let reason = loop {
            if self.cpu.halted() {
                break StopReason::Halted;
            }
            if ticks >= max_cycles {
                break StopReason::CycleLimit;
            }
            let ev = self.tick().events;
            ticks += 1;

            if let Some(hit) = self.board.debugger.take_hit() {
                break StopReason::Watchpoint(hit);
            }
            if let Some(addr) = ev.fetched {
                if !self.breakpoints.is_empty() && self.breakpoints.contains(&addr) {
                    break StopReason::Breakpoint(addr);
                }
            }
        };
        info!(
            "run stopped: {:?} after {} cycles ({} retired, pc=0x{:04X})",
            reason, self.cpu.state.cycles - start, self.cpu.state.retired, self.cpu.pc()
        );
        reason
    }

    /// Drive `int_b`. 3 removes the request.
    pub fn set_interrupt(&mut self, level: u8) {
        self.pins.int_b = level & 3;
    }

    pub fn set_clock_enable(&mut self, enabled: bool) {
        self.pins.clken = enabled;
    }

    /// Assert or release the reset pin.
    pub fn set_reset(&mut self, asserted: bool) {
        self.pins.reset_b = !asserted;
    }

    /// Take and clear accumulated serial output bytes.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.board.io.take_serial_output()
    }

    /// Execute one instruction and return its disassembly.
    ///
    /// Used by the debugger for step-by-step execution.
    pub fn step_one(&mut self) -> String {
        let line = self.disasm_at_pc();
        self.step_instruction();
        line
    }

    /// Disassemble the instruction about to run without executing it.
    pub fn disasm_at_pc(&self) -> String {
        let pc = self.cpu.current_instruction_addr();
        let (word, next) = self.board.mem.read_pair(pc);
        let (inst, _) = opcodes::decode(word, next);
        format!("0x{:04X}: {}", pc, disasm::disassemble(inst))
    }

    /// Format a register dump with r0-r15, PSR and controller state.
    pub fn dump_regs(&self) -> String {
        let mut s = String::new();
        for i in 0..16 {
            if i % 8 == 0 && i > 0 { s.push('\n'); }
            s.push_str(&format!("r{:<2}={:04X} ", i, self.cpu.reg(i)));
        }
        let st = &self.cpu.state;
        s.push_str(&format!("\nPC={:04X} PSR={} (0x{:02X}) state={:?}",
            self.cpu.pc(), disasm::format_psr(st.psr.0), st.psr.0, st.fsm));
        s.push_str(&format!("\ncycles={} retired={} skipped={} interrupts={}{}",
            st.cycles, st.retired, st.skipped, st.interrupts,
            if st.halted { " HALTED" } else { "" }));
        s
    }

    /// Dump a memory region as hex + ASCII.
    pub fn dump_memory(&self, start: u16, length: u16) -> String {
        debugger::dump_memory(&self.board.mem.words, start, length)
    }

    /// Dump non-zero I/O latches.
    pub fn dump_io(&self) -> String {
        io::dump_io(&self.board.io)
    }

    pub fn profiler_report(&self) -> String {
        self.profiler.report(&self.board.mem.words)
    }

    /// Capture the whole machine for a save state file.
    pub fn save_state(&self) -> savestate::SaveState {
        savestate::SaveState {
            config: self.cpu.config.clone(),
            core: self.cpu.state.clone(),
            pins: self.pins,
            memory: self.board.mem.words.clone(),
            io: self.board.io.latches(),
        }
    }

    pub fn load_state(&mut self, state: savestate::SaveState) {
        self.board.io.uart_tx = state.config.uart_tx;
        self.cpu.config = state.config;
        self.cpu.state = state.core;
        self.pins = state.pins;
        self.board.mem.clear();
        self.board.mem.load(0, &state.memory);
        self.board.io.restore_latches(&state.io);
        self.board.debugger.watch_hit = None;
    }

    pub fn save_state_file(&self, path: &Path) -> Result<()> {
        savestate::save_to_file(&self.save_state(), path)
    }

    pub fn load_state_file(&mut self, path: &Path) -> Result<()> {
        let state = savestate::load_from_file(path)?;
        self.load_state(state);
        Ok(())
    }

    /// Capture current state as a snapshot (for rewind).
    pub fn save_snapshot(&self) -> snapshot::Snapshot {
        snapshot::Snapshot {
            core: self.cpu.state.clone(),
            memory: self.board.mem.words.clone(),
            io: self.board.io.latches(),
            step: self.cpu.state.retired + self.cpu.state.skipped,
        }
    }

    /// Restore state from a snapshot (rewind).
    pub fn restore_snapshot(&mut self, snap: &snapshot::Snapshot) {
        self.cpu.state = snap.core.clone();
        let len = snap.memory.len().min(self.board.mem.words.len());
        self.board.mem.words[..len].copy_from_slice(&snap.memory[..len]);
        self.board.io.restore_latches(&snap.io);
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{encode, Instruction, Opcode::*, Predicate};

    fn assemble(prog: &[Instruction]) -> Vec<u16> {
        prog.iter().flat_map(|&i| encode(i).unwrap()).collect()
    }

    fn machine(prog: &[Instruction]) -> Machine {
        let mut m = Machine::default();
        m.load_words(0, &assemble(prog));
        m
    }

    #[test]
    fn test_machine_creation() {
        let m = Machine::default();
        assert_eq!(m.cpu.pc(), 0);
        assert_eq!(m.cpu.fsm(), State::Fetch0);
        assert_eq!(m.board.mem.words.len(), MEM_WORDS);
        assert_eq!(m.board.io.uart_tx, UART_TX);
    }

    #[test]
    fn test_scenario_add_and_store() {
        let mut m = machine(&[
            Instruction::new(Mov, 0, 0).imm(5),
            Instruction::new(Add, 0, 0),
            Instruction::new(Sto, 0, 0).imm(0x10),
            Instruction::new(Hlt, 0, 0),
        ]);
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.cpu.reg(0), 10);
        assert_eq!(m.board.mem.read(0x10), 10);
        assert!(!m.cpu.psr().zero());
        assert!(!m.cpu.psr().carry());
        assert_eq!(m.cpu.state.retired, 4);
    }

    #[test]
    fn test_scenario_compare_zero() {
        let mut m = machine(&[
            Instruction::new(Cmp, 1, 0).imm(0),
            Instruction::new(Hlt, 0, 0),
        ]);
        assert_eq!(m.run(100), StopReason::Halted);
        assert!(m.cpu.psr().zero());
        assert!(m.cpu.psr().carry());
        assert_eq!(m.cpu.reg(1), 0);
    }

    #[test]
    fn test_scenario_hardware_interrupt() {
        let mut m = machine(&[
            Instruction::new(Ppsr, 0, 0).imm(1 << PSR_EI),
            Instruction::new(Mov, 15, 0).imm(0x10),
        ]);
        // handler at vector A
        m.load_words(VECTOR_A, &assemble(&[Instruction::new(Hlt, 0, 0)]));
        m.load_words(0x10, &assemble(&[Instruction::new(Mov, 15, 0).imm(0x10)]));
        m.set_interrupt(0);

        let mut entered = None;
        for _ in 0..20 {
            let c = m.tick();
            if let Some(v) = c.events.interrupt {
                entered = Some(v);
                break;
            }
        }
        assert_eq!(entered, Some(VECTOR_A));
        assert!(!m.cpu.psr().interrupts_enabled());
        // the jump had retired, so its target is the return address
        assert_eq!(m.cpu.state.saved_pc, 0x10);

        let fetch = m.tick();
        assert!(fetch.bus.vpa);
        assert_eq!(fetch.bus.address, VECTOR_A);

        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.cpu.state.interrupts, 1);
    }

    #[test]
    fn test_scenario_halt_until_reset() {
        let mut m = machine(&[
            Instruction::new(Mov, 1, 0).imm(7),
            Instruction::new(Hlt, 0, 0),
        ]);
        assert_eq!(m.run(100), StopReason::Halted);
        let cycles = m.cpu.state.cycles;
        for _ in 0..10 {
            assert!(m.tick().bus.is_idle());
        }
        assert_eq!(m.cpu.state.cycles, cycles);
        assert_eq!(m.run(100), StopReason::Halted);

        m.set_reset(true);
        for _ in 0..3 {
            m.tick();
        }
        assert!(!m.cpu.halted());
        assert_eq!(m.cpu.reg(1), 0);
        m.set_reset(false);
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.cpu.reg(1), 7);
    }

    #[test]
    fn test_serial_output() {
        let mut m = machine(&[
            Instruction::new(Mov, 1, 0).imm('H' as u16),
            Instruction::new(Out, 1, 0).imm(UART_TX),
            Instruction::new(Mov, 1, 0).imm('i' as u16),
            Instruction::new(Out, 1, 0).imm(UART_TX),
            Instruction::new(Hlt, 0, 0),
        ]);
        assert_eq!(m.run(200), StopReason::Halted);
        assert_eq!(m.take_serial_output(), b"Hi".to_vec());
        assert!(m.take_serial_output().is_empty());
        assert!(m.dump_io().contains("(uart tx)"));
    }

    #[test]
    fn test_breakpoint_and_resume() {
        let mut m = machine(&[
            Instruction::new(Mov, 1, 0).imm(1),
            Instruction::new(Inc, 1, 1),
            Instruction::new(Hlt, 0, 0),
        ]);
        m.breakpoints.insert(2);
        assert_eq!(m.run(100), StopReason::Breakpoint(2));
        assert_eq!(m.cpu.reg(1), 1);
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.cpu.reg(1), 2);
    }

    #[test]
    fn test_breakpoint_ignores_false_predicate() {
        let mut m = machine(&[
            Instruction::new(Mov, 1, 0).imm(1),
            Instruction::new(Mov, 2, 0).imm(7).when(Predicate::Z),
            Instruction::new(Hlt, 0, 0),
        ]);
        m.breakpoints.insert(2);
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.cpu.reg(2), 0);
        assert_eq!(m.cpu.state.skipped, 1);
    }

    #[test]
    fn test_watchpoint_stops_run() {
        let mut m = machine(&[
            Instruction::new(Mov, 0, 0).imm(5),
            Instruction::new(Add, 0, 0),
            Instruction::new(Sto, 0, 0).imm(0x10),
            Instruction::new(Hlt, 0, 0),
        ]);
        m.board.debugger.add_watchpoint(Space::Data, 0x10, WatchKind::Write);
        match m.run(100) {
            StopReason::Watchpoint(hit) => {
                assert_eq!(hit.addr, 0x10);
                assert_eq!(hit.new_val, 10);
            }
            other => panic!("expected watchpoint, got {:?}", other),
        }
        assert_eq!(m.run(100), StopReason::Halted);
    }

    #[test]
    fn test_cycle_limit() {
        let mut m = machine(&[Instruction::new(Mov, 15, 0).imm(0)]);
        assert_eq!(m.run(50), StopReason::CycleLimit);
        assert_eq!(m.cpu.state.cycles, 50);
    }

    #[test]
    fn test_step_one_and_dump() {
        let mut m = machine(&[
            Instruction::new(Mov, 1, 0).imm(0x1234),
            Instruction::new(Hlt, 0, 0),
        ]);
        assert_eq!(m.step_one(), "0x0000: mov r1, r0, 0x1234");
        assert_eq!(m.cpu.reg(1), 0x1234);
        assert_eq!(m.disasm_at_pc(), "0x0002: halt");
        let regs = m.dump_regs();
        assert!(regs.contains("r1 =1234"));
        assert!(regs.contains("retired=1"));
    }

    #[test]
    fn test_load_image_resets() {
        let mut m = Machine::default();
        m.cpu.set_reg(3, 9);
        let n = m.load_image("1003 0042\n2000\n").unwrap();
        assert_eq!(n, 3);
        assert_eq!(m.cpu.reg(3), 0);
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.cpu.reg(3), 0x42);
        assert!(m.load_image("xyz").is_err());
    }

    #[test]
    fn test_snapshot_rewind() {
        let mut m = machine(&[
            Instruction::new(Mov, 1, 0).imm(1),
            Instruction::new(Sto, 1, 0).imm(0x20),
            Instruction::new(Hlt, 0, 0),
        ]);
        m.step_instruction();
        let snap = m.save_snapshot();
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.board.mem.read(0x20), 1);
        m.restore_snapshot(&snap);
        assert!(!m.cpu.halted());
        assert_eq!(m.board.mem.read(0x20), 0);
        assert_eq!(m.run(100), StopReason::Halted);
        assert_eq!(m.board.mem.read(0x20), 1);
    }

    #[test]
    fn test_save_state_round_trip() {
        let mut m = machine(&[
            Instruction::new(Mov, 2, 0).imm(0xABCD),
            Instruction::new(Out, 2, 0).imm(0x0100),
            Instruction::new(Hlt, 0, 0),
        ]);
        m.run(100);
        let state = m.save_state();
        let mut other = Machine::default();
        other.load_state(state);
        assert!(other.cpu.halted());
        assert_eq!(other.cpu.reg(2), 0xABCD);
        assert_eq!(other.board.io.read(0x0100), 0xABCD);
        assert_eq!(other.board.mem.words, m.board.mem.words);
    }

    #[test]
    fn test_profiler_counts_calls() {
        let mut m = machine(&[
            Instruction::new(Jsr, 13, 0).imm(0x10),
            Instruction::new(Hlt, 0, 0),
        ]);
        m.load_words(0x10, &assemble(&[Instruction::new(Mov, 15, 13)]));
        m.profiler.start(0);
        assert_eq!(m.run(100), StopReason::Halted);
        m.profiler.stop(m.cpu.state.cycles);
        assert_eq!(m.profiler.total_instructions, 3);
        assert_eq!(m.profiler.top_calls(1), vec![((0x0000, 0x0010), 1)]);
        assert!(m.profiler_report().contains("jsr r13, r0, 0x0010"));
    }
}
