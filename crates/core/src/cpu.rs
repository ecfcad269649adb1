//! OPC6 fetch/execute controller.
//!
//! The core is modelled the way the hardware is built: every clock is a
//! pure evaluation of the registered [`CoreState`] plus the sampled inputs
//! into a complete next state ([`Cpu::evaluate`]), followed by a single
//! commit. Bus outputs are a function of the registered state only
//! ([`Cpu::outputs`]), so nothing ever observes a value written in the
//! same cycle.
//!
//! ```text
//! Fetch0          -> Fetch1 | ComputeAddress | Execute | Fetch0 (skip)
//! Fetch1          -> ComputeAddress | Execute | Fetch0 (skip)
//! ComputeAddress  -> ReadMemory | WriteMemory | Execute | Fetch0 (skip)
//! ReadMemory      -> Execute
//! Execute         -> Execute | Fetch1 | ComputeAddress | Fetch0 | Interrupt
//! WriteMemory     -> Fetch0 | Interrupt
//! Interrupt       -> Fetch0
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::alu;
use crate::bus::{Bus, BusCycle, Pins};
use crate::config::{CoreConfig, Predication};
use crate::opcodes::{Opcode, Predicate};
use crate::regfile::{Psr, RegisterFile, PC_REG};
use crate::PSR_EI;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum State {
    #[default]
    Fetch0,
    Fetch1,
    ComputeAddress,
    ReadMemory,
    Execute,
    WriteMemory,
    Interrupt,
}

/// Instruction register: the fetched word plus the class flags computed
/// when it was latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ir {
    pub word: u16,
    pub load: bool,
    pub store: bool,
    pub stack: bool,
}

impl Ir {
    pub fn latch(word: u16) -> Ir {
        let op = Opcode::from_word(word);
        Ir { word, load: op.is_load(), store: op.is_store(), stack: op.is_stack() }
    }

    /// The 5-bit opcode. Swapping register fields never changes it.
    #[inline(always)]
    pub fn opcode(&self) -> Opcode {
        Opcode::from_word(self.word)
    }

    #[inline(always)]
    pub fn dst(&self) -> usize {
        (self.word & 0xF) as usize
    }

    #[inline(always)]
    pub fn src(&self) -> usize {
        ((self.word >> 4) & 0xF) as usize
    }

    #[inline(always)]
    pub fn two_word(&self) -> bool {
        self.word & 0x1000 != 0
    }

    /// Exchange the source and destination fields (memory sub-cycles).
    pub fn swapped(self) -> Ir {
        let w = self.word;
        Ir { word: (w & 0xFF00) | ((w & 0xF) << 4) | ((w >> 4) & 0xF), ..self }
    }
}

/// Every registered value in the core, plus host-side counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreState {
    pub regs: RegisterFile,
    pub psr: Psr,
    pub fsm: State,
    pub ir: Ir,
    /// Address the instruction in `ir` was fetched from.
    pub ir_addr: u16,
    /// Operand register: immediate or effective address.
    pub or: u16,
    /// Latched predicate of the instruction in `ir`.
    pub pred: bool,
    pub saved_pc: u16,
    /// PSR bits 3..0 captured on interrupt entry.
    pub saved_psr: u8,
    pub halted: bool,
    /// Two-flop reset synchroniser (active low).
    pub reset_sync: [bool; 2],
    pub cycles: u64,
    pub retired: u64,
    pub skipped: u64,
    pub interrupts: u64,
}

impl Default for CoreState {
    /// Freshly reset, reset released.
    fn default() -> Self {
        CoreState {
            regs: RegisterFile::new(),
            psr: Psr(0),
            fsm: State::Fetch0,
            ir: Ir::default(),
            ir_addr: 0,
            or: 0,
            pred: false,
            saved_pc: 0,
            saved_psr: 0,
            halted: false,
            reset_sync: [true, true],
            cycles: 0,
            retired: 0,
            skipped: 0,
            interrupts: 0,
        }
    }
}

impl CoreState {
    /// Clear architectural state; counters and the synchroniser survive.
    fn clear_architectural(&mut self) {
        self.regs.clear();
        self.psr = Psr(0);
        self.fsm = State::Fetch0;
        self.ir = Ir::default();
        self.ir_addr = 0;
        self.or = 0;
        self.pred = false;
        self.saved_pc = 0;
        self.saved_psr = 0;
        self.halted = false;
    }
}

/// An instruction that completed with a true predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retired {
    pub addr: u16,
    pub opcode: Opcode,
}

/// Instruction-level events produced by one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Events {
    pub retired: Option<Retired>,
    /// Address of an instruction dropped because its predicate was false.
    pub skipped: Option<u16>,
    /// Address of an opcode latched into IR whose predicate holds.
    pub fetched: Option<u16>,
    /// Vector taken on interrupt entry.
    pub interrupt: Option<u16>,
    pub halted: bool,
}

/// Record of one clock: the state it ran in, the bus traffic and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub state: State,
    pub bus: BusCycle,
    pub events: Events,
}

/// OPC6 processor core.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub config: CoreConfig,
    pub state: CoreState,
}

impl Cpu {
    pub fn new(config: CoreConfig) -> Self {
        Cpu { config, state: CoreState::default() }
    }

    /// Immediate reset, bypassing the pin synchroniser. Counters restart.
    pub fn reset(&mut self) {
        self.state = CoreState::default();
    }

    #[inline(always)]
    pub fn pc(&self) -> u16 {
        self.state.regs.pc()
    }

    #[inline(always)]
    pub fn psr(&self) -> Psr {
        self.state.psr
    }

    #[inline(always)]
    pub fn halted(&self) -> bool {
        self.state.halted
    }

    #[inline(always)]
    pub fn fsm(&self) -> State {
        self.state.fsm
    }

    /// Register as the datapath sees it: r15 is the PC, r0 is zero in
    /// zero-register mode.
    #[inline(always)]
    pub fn reg(&self, r: usize) -> u16 {
        if r == 0 && self.config.zero_register {
            0
        } else {
            self.state.regs.get(r)
        }
    }

    pub fn set_reg(&mut self, r: usize, v: u16) {
        self.state.regs.set(r, v);
    }

    /// Address base: register 0 contributes nothing.
    #[inline(always)]
    fn base(&self, r: usize) -> u16 {
        if r == 0 { 0 } else { self.reg(r) }
    }

    /// ALU operand B.
    fn operand(&self) -> u16 {
        let ir = self.state.ir;
        let op = ir.opcode();
        if ir.two_word() || ir.load || ir.stack || matches!(op, Opcode::Inc | Opcode::Dec) {
            self.state.or
        } else {
            self.reg(ir.src())
        }
    }

    /// Address of the instruction that runs next: the one in flight, or
    /// the one at PC when the controller is about to fetch.
    pub fn current_instruction_addr(&self) -> u16 {
        match self.state.fsm {
            State::Fetch0 | State::Interrupt => self.pc(),
            _ => self.state.ir_addr,
        }
    }

    /// Bus outputs for the current registered state.
    pub fn outputs(&self, clken: bool) -> BusCycle {
        let s = &self.state;
        let op = s.ir.opcode();
        let mut out = BusCycle {
            address: s.regs.pc(),
            dout: self.reg(s.ir.src()),
            rnw: s.fsm != State::WriteMemory,
            ..Default::default()
        };
        if !clken || s.halted {
            return out;
        }
        match s.fsm {
            State::Fetch0 | State::Fetch1 | State::Execute => out.vpa = true,
            State::ReadMemory | State::WriteMemory => {
                out.address = if op == Opcode::Pop { self.base(s.ir.dst()) } else { s.or };
                // a squashed instruction keeps its memory cycle but drives no strobe
                if s.pred {
                    if op.is_io() { out.vio = true; } else { out.vda = true; }
                }
            }
            State::ComputeAddress | State::Interrupt => {}
        }
        out
    }

    /// Where a freshly latched opcode goes next.
    fn route(&self, ir: Ir, pred: bool, from_execute: bool) -> State {
        let squash = self.config.predication == Predication::Squash;
        if ir.two_word() {
            State::Fetch1
        } else if ir.load || ir.store {
            // from Execute the false predicate is caught in ComputeAddress
            if pred || squash || from_execute { State::ComputeAddress } else { State::Fetch0 }
        } else if pred || squash {
            State::Execute
        } else {
            State::Fetch0
        }
    }

    /// Latch an opcode word into IR/OR and pick the next state.
    fn latch(&self, n: &mut CoreState, ev: &mut Events, word: u16, addr: u16, pred: bool, from_execute: bool) -> State {
        let ir = Ir::latch(word);
        n.ir = ir;
        n.ir_addr = addr;
        n.or = initial_operand(word);
        n.pred = pred;
        let next = self.route(ir, pred, from_execute);
        if next == State::Fetch0 {
            ev.skipped = Some(addr);
            n.skipped += 1;
            debug!("skip 0x{:04X}: predicate false", addr);
        } else if pred {
            ev.fetched = Some(addr);
        }
        next
    }

    /// Compute the next state from the registered state and inputs.
    ///
    /// `din` is whatever the bus returned for [`Cpu::outputs`] this cycle.
    pub fn evaluate(&self, din: u16, pins: Pins) -> (CoreState, Events) {
        let s = &self.state;
        let mut n = s.clone();
        let mut ev = Events::default();
        if !pins.clken {
            return (n, ev);
        }

        n.reset_sync = [pins.reset_b, s.reset_sync[0]];
        if !s.reset_sync[1] {
            n.clear_architectural();
            return (n, ev);
        }
        if s.halted {
            return (n, ev);
        }
        n.cycles += 1;

        let squash = self.config.predication == Predication::Squash;
        let pc = s.regs.pc();
        let ir = s.ir;
        let op = ir.opcode();
        let live = s.pred;
        let irq = pins.irq() && s.psr.interrupts_enabled();

        n.fsm = match s.fsm {
            State::Fetch0 => {
                n.regs.set_pc(pc.wrapping_add(1));
                let pred = Predicate::from_word(din).holds(s.psr);
                self.latch(&mut n, &mut ev, din, pc, pred, false)
            }

            State::Fetch1 => {
                n.or = din;
                n.regs.set_pc(pc.wrapping_add(1));
                if !live && !squash {
                    skip(&mut n, &mut ev, s.ir_addr)
                } else if ir.src() != 0 || ir.load || ir.store {
                    // the base is the source field: `mov r0, r2, imm` still adds r2
                    State::ComputeAddress
                } else {
                    State::Execute
                }
            }

            State::ComputeAddress => {
                if !live && !squash {
                    skip(&mut n, &mut ev, s.ir_addr)
                } else {
                    n.or = self.base(ir.src()).wrapping_add(s.or);
                    if ir.load || ir.store {
                        n.ir = ir.swapped();
                    }
                    if ir.load {
                        State::ReadMemory
                    } else if ir.store {
                        State::WriteMemory
                    } else {
                        State::Execute
                    }
                }
            }

            State::ReadMemory => {
                if live {
                    n.or = din;
                    if ir.stack {
                        n.regs.set(ir.dst(), s.or);
                    }
                }
                n.ir = ir.swapped();
                State::Execute
            }

            State::WriteMemory => {
                if live {
                    if ir.stack {
                        n.regs.set(ir.dst(), s.or);
                    }
                    retire(&mut n, &mut ev, s.ir_addr, op);
                } else {
                    skip(&mut n, &mut ev, s.ir_addr);
                }
                if irq { State::Interrupt } else { State::Fetch0 }
            }

            State::Execute => {
                let a = self.reg(ir.dst());
                let b = self.operand();
                let (result, carry) = alu::execute(op, a, b, s.psr);
                let mut next_psr = s.psr;
                let mut jump = false;
                let mut swi = false;
                let mut halt = false;
                let mut rti = false;

                if live {
                    let writes = !matches!(op, Opcode::Cmp | Opcode::Cmpc | Opcode::Hlt | Opcode::Rti);
                    if writes {
                        n.regs.set(ir.dst(), if op == Opcode::Jsr { pc } else { result });
                    }
                    next_psr = match op {
                        Opcode::Rti => Psr(s.saved_psr & 0xF),
                        Opcode::Ppsr => Psr(b as u8),
                        Opcode::Hlt => s.psr,
                        _ if ir.dst() == PC_REG => s.psr,
                        _ => s.psr.with_flags(result == 0, carry, result & 0x8000 != 0),
                    };
                    jump = op == Opcode::Jsr || (writes && ir.dst() == PC_REG);
                    swi = op == Opcode::Ppsr && next_psr.swiid() != 0;
                    halt = op == Opcode::Hlt;
                    rti = op == Opcode::Rti;
                    if let Opcode::Reserved(bits) = op {
                        warn!("reserved opcode 0x{:02X} at 0x{:04X}", bits, s.ir_addr);
                    }
                    retire(&mut n, &mut ev, s.ir_addr, op);
                } else {
                    skip(&mut n, &mut ev, s.ir_addr);
                }

                n.psr = next_psr;
                // register write first, PC rule wins
                let next_pc = if rti {
                    s.saved_pc
                } else if jump {
                    result
                } else if halt || irq || swi {
                    pc
                } else {
                    pc.wrapping_add(1)
                };
                n.regs.set_pc(next_pc);

                if halt {
                    n.halted = true;
                    ev.halted = true;
                    info!("halted at 0x{:04X} after {} cycles", s.ir_addr, n.cycles);
                    State::Fetch0
                } else if irq || swi {
                    State::Interrupt
                } else if jump || rti {
                    if rti {
                        debug!("rti to 0x{:04X}, psr=0x{:02X}", next_pc, next_psr.0);
                    }
                    State::Fetch0
                } else {
                    let pred = Predicate::from_word(din).holds(next_psr);
                    self.latch(&mut n, &mut ev, din, pc, pred, true)
                }
            }

            State::Interrupt => {
                let vector = if pins.int_b & 0b10 == 0 { self.config.vector_a } else { self.config.vector_b };
                n.saved_pc = pc;
                n.saved_psr = s.psr.0 & 0xF;
                n.psr.set_flag(PSR_EI, false);
                n.regs.set_pc(vector);
                n.interrupts += 1;
                ev.interrupt = Some(vector);
                debug!("interrupt: int_b={} saved pc=0x{:04X} -> 0x{:04X}", pins.int_b, pc, vector);
                State::Fetch0
            }
        };

        (n, ev)
    }

    /// Run one clock against `bus`: drive outputs, sample, evaluate, commit.
    pub fn cycle<B: Bus>(&mut self, bus: &mut B, pins: Pins) -> Cycle {
        let state = self.state.fsm;
        let mut out = self.outputs(pins.clken);
        if out.rnw {
            if let Some(space) = out.space() {
                out.din = bus.read(space, out.address);
            }
        }
        let (next, events) = self.evaluate(out.din, pins);
        if !out.rnw {
            if let Some(space) = out.space() {
                bus.write(space, out.address, out.dout);
            }
        }
        trace!(
            "{:?} addr={:04X} din={:04X} dout={:04X} rnw={} vpa={} vda={} vio={}",
            state, out.address, out.din, out.dout, out.rnw as u8, out.vpa as u8, out.vda as u8, out.vio as u8
        );
        self.state = next;
        Cycle { state, bus: out, events }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

/// OR value loaded alongside every opcode fetch.
fn initial_operand(word: u16) -> u16 {
    match Opcode::from_word(word) {
        Opcode::Push => 0xFFFF,
        Opcode::Pop => 1,
        Opcode::Inc | Opcode::Dec => (word >> 4) & 0xF,
        _ => 0,
    }
}

fn skip(n: &mut CoreState, ev: &mut Events, addr: u16) -> State {
    n.skipped += 1;
    ev.skipped = Some(addr);
    debug!("skip 0x{:04X}: predicate false", addr);
    State::Fetch0
}

fn retire(n: &mut CoreState, ev: &mut Events, addr: u16, opcode: Opcode) {
    n.retired += 1;
    ev.retired = Some(Retired { addr, opcode });
}
