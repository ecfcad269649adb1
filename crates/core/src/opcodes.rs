//! OPC6 instruction decoder and encoder.
//!
//! Every instruction is one 16-bit word, optionally followed by an
//! extension word carrying an immediate or address offset:
//!
//! ```text
//!  15 14 13 | 12  | 11..8  | 7..4 | 3..0
//!  P0 P1 P2 | len | opcode | src  | dst
//! ```
//!
//! The predicate field value `001` is not a condition: it selects the
//! second opcode bank (HLT..CMPC) and executes unconditionally. The
//! resulting 5-bit opcode is `bank << 4 | bits[11:8]`.

use crate::error::Error;
use crate::regfile::Psr;

/// 5-bit operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov,
    And,
    Or,
    Xor,
    Add,
    Adc,
    Sto,
    Ld,
    Ror,
    Jsr,
    Sub,
    Sbc,
    Inc,
    Lsr,
    Dec,
    Asr,
    // Second bank (no predicate)
    Hlt,
    Bswp,
    Ppsr,
    Gpsr,
    Rti,
    Not,
    Out,
    In,
    Push,
    Pop,
    Cmp,
    Cmpc,
    /// 0x1C..=0x1F: behaves as an operand pass-through.
    Reserved(u8),
}

impl Opcode {
    pub fn from_bits(bits: u8) -> Opcode {
        use Opcode::*;
        match bits & 0x1F {
            0x00 => Mov, 0x01 => And, 0x02 => Or, 0x03 => Xor,
            0x04 => Add, 0x05 => Adc, 0x06 => Sto, 0x07 => Ld,
            0x08 => Ror, 0x09 => Jsr, 0x0A => Sub, 0x0B => Sbc,
            0x0C => Inc, 0x0D => Lsr, 0x0E => Dec, 0x0F => Asr,
            0x10 => Hlt, 0x11 => Bswp, 0x12 => Ppsr, 0x13 => Gpsr,
            0x14 => Rti, 0x15 => Not, 0x16 => Out, 0x17 => In,
            0x18 => Push, 0x19 => Pop, 0x1A => Cmp, 0x1B => Cmpc,
            b => Reserved(b),
        }
    }

    /// Opcode of an instruction word (predicate bank included).
    pub fn from_word(word: u16) -> Opcode {
        let bank = if word >> 13 == 1 { 0x10 } else { 0 };
        Opcode::from_bits(bank | ((word >> 8) & 0xF) as u8)
    }

    pub fn bits(self) -> u8 {
        use Opcode::*;
        match self {
            Mov => 0x00, And => 0x01, Or => 0x02, Xor => 0x03,
            Add => 0x04, Adc => 0x05, Sto => 0x06, Ld => 0x07,
            Ror => 0x08, Jsr => 0x09, Sub => 0x0A, Sbc => 0x0B,
            Inc => 0x0C, Lsr => 0x0D, Dec => 0x0E, Asr => 0x0F,
            Hlt => 0x10, Bswp => 0x11, Ppsr => 0x12, Gpsr => 0x13,
            Rti => 0x14, Not => 0x15, Out => 0x16, In => 0x17,
            Push => 0x18, Pop => 0x19, Cmp => 0x1A, Cmpc => 0x1B,
            Reserved(b) => b & 0x1F,
        }
    }

    /// True for opcodes in the no-predicate bank.
    pub fn unconditional(self) -> bool {
        self.bits() & 0x10 != 0
    }

    /// Reads memory or I/O before executing (LD, IN, POP).
    pub fn is_load(self) -> bool {
        self.bits() & 0xF == 0x7 || self == Opcode::Pop
    }

    /// Writes memory or I/O instead of executing (STO, OUT, PUSH).
    pub fn is_store(self) -> bool {
        self.bits() & 0xF == 0x6 || self == Opcode::Push
    }

    /// PUSH/POP: the stack register is written back during the memory cycle.
    pub fn is_stack(self) -> bool {
        matches!(self, Opcode::Push | Opcode::Pop)
    }

    /// Memory cycles go to I/O space rather than data space.
    pub fn is_io(self) -> bool {
        matches!(self, Opcode::In | Opcode::Out)
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Mov => "mov", And => "and", Or => "or", Xor => "xor",
            Add => "add", Adc => "adc", Sto => "sto", Ld => "ld",
            Ror => "ror", Jsr => "jsr", Sub => "sub", Sbc => "sbc",
            Inc => "inc", Lsr => "lsr", Dec => "dec", Asr => "asr",
            Hlt => "halt", Bswp => "bswp", Ppsr => "putpsr", Gpsr => "getpsr",
            Rti => "rti", Not => "not", Out => "out", In => "in",
            Push => "push", Pop => "pop", Cmp => "cmp", Cmpc => "cmpc",
            Reserved(_) => ".op",
        }
    }
}

/// Condition field (bits 15..13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `000`: execute unconditionally.
    Always,
    /// `001`: second opcode bank, always executes.
    Unconditional,
    /// `010`: Zero set.
    Z,
    /// `011`: Zero clear.
    Nz,
    /// `100`: Carry set.
    C,
    /// `101`: Carry clear.
    Nc,
    /// `110`: Sign set.
    Mi,
    /// `111`: Sign clear.
    Pl,
}

impl Predicate {
    pub fn from_field(field: u8) -> Predicate {
        match field & 7 {
            0 => Predicate::Always,
            1 => Predicate::Unconditional,
            2 => Predicate::Z,
            3 => Predicate::Nz,
            4 => Predicate::C,
            5 => Predicate::Nc,
            6 => Predicate::Mi,
            _ => Predicate::Pl,
        }
    }

    #[inline(always)]
    pub fn from_word(word: u16) -> Predicate {
        Predicate::from_field((word >> 13) as u8)
    }

    pub fn field(self) -> u8 {
        match self {
            Predicate::Always => 0,
            Predicate::Unconditional => 1,
            Predicate::Z => 2,
            Predicate::Nz => 3,
            Predicate::C => 4,
            Predicate::Nc => 5,
            Predicate::Mi => 6,
            Predicate::Pl => 7,
        }
    }

    /// Evaluate against a set of flags.
    ///
    /// P1/P0 select the flag (11 sign, 10 zero, 01 carry, 00 constant one)
    /// and P2 inverts it.
    pub fn holds(self, psr: Psr) -> bool {
        let field = self.field();
        if field == 1 {
            return true;
        }
        let p0 = field & 0b100 != 0;
        let p1 = field & 0b010 != 0;
        let p2 = field & 0b001 != 0;
        let flag = match (p1, p0) {
            (true, true) => psr.sign(),
            (true, false) => psr.zero(),
            (false, true) => psr.carry(),
            (false, false) => true,
        };
        flag ^ p2
    }

    /// Assembler prefix, e.g. `"nz."`.
    pub fn prefix(self) -> &'static str {
        match self {
            Predicate::Always | Predicate::Unconditional => "",
            Predicate::Z => "z.",
            Predicate::Nz => "nz.",
            Predicate::C => "c.",
            Predicate::Nc => "nc.",
            Predicate::Mi => "mi.",
            Predicate::Pl => "pl.",
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pred: Predicate,
    pub op: Opcode,
    /// Destination register (ALU operand A).
    pub dst: u8,
    /// Source register (operand B, or address base).
    pub src: u8,
    /// Extension word, present for two-word forms.
    pub imm: Option<u16>,
}

impl Instruction {
    /// Single-word `op dst, src`, executed unconditionally.
    pub fn new(op: Opcode, dst: u8, src: u8) -> Self {
        let pred = if op.unconditional() { Predicate::Unconditional } else { Predicate::Always };
        Instruction { pred, op, dst, src, imm: None }
    }

    /// Attach an extension word.
    pub fn imm(mut self, value: u16) -> Self {
        self.imm = Some(value);
        self
    }

    /// Attach a condition.
    pub fn when(mut self, pred: Predicate) -> Self {
        self.pred = pred;
        self
    }

    /// Length in words.
    pub fn size(&self) -> u8 {
        if self.imm.is_some() { 2 } else { 1 }
    }
}

/// Decode an instruction word (with the following word for two-word forms).
/// Returns (Instruction, size_in_words).
pub fn decode(word: u16, next_word: u16) -> (Instruction, u8) {
    let two_word = word & 0x1000 != 0;
    let inst = Instruction {
        pred: Predicate::from_word(word),
        op: Opcode::from_word(word),
        dst: (word & 0xF) as u8,
        src: ((word >> 4) & 0xF) as u8,
        imm: if two_word { Some(next_word) } else { None },
    };
    (inst, if two_word { 2 } else { 1 })
}

/// Encode an instruction into one or two words.
pub fn encode(inst: Instruction) -> Result<Vec<u16>, Error> {
    if inst.dst > 15 {
        return Err(Error::Encode(format!("register r{} out of range", inst.dst)));
    }
    if inst.src > 15 {
        return Err(Error::Encode(format!("register r{} out of range", inst.src)));
    }
    let field = if inst.op.unconditional() {
        match inst.pred {
            Predicate::Always | Predicate::Unconditional => 1,
            p => {
                return Err(Error::Encode(format!(
                    "{} cannot be predicated ({})", inst.op.mnemonic(), p.prefix())));
            }
        }
    } else {
        match inst.pred {
            Predicate::Unconditional => 0,
            p => p.field(),
        }
    };
    let word = ((field as u16) << 13)
        | if inst.imm.is_some() { 0x1000 } else { 0 }
        | (((inst.op.bits() & 0xF) as u16) << 8)
        | ((inst.src as u16) << 4)
        | inst.dst as u16;
    let mut words = vec![word];
    words.extend(inst.imm);
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PSR_C, PSR_S, PSR_Z};

    #[test]
    fn test_decode_mov_immediate() {
        // mov r1, r0, 0x1234
        let (inst, size) = decode(0x1001, 0x1234);
        assert_eq!(size, 2);
        assert_eq!(inst.op, Opcode::Mov);
        assert_eq!(inst.pred, Predicate::Always);
        assert_eq!(inst.dst, 1);
        assert_eq!(inst.src, 0);
        assert_eq!(inst.imm, Some(0x1234));
    }

    #[test]
    fn test_decode_second_bank() {
        // 001 0 0000 ... = halt
        let (inst, size) = decode(0x2000, 0);
        assert_eq!(size, 1);
        assert_eq!(inst.op, Opcode::Hlt);
        assert_eq!(inst.pred, Predicate::Unconditional);
        assert_eq!(Opcode::from_word(0x2A21), Opcode::Cmp);
        assert_eq!(Opcode::from_word(0x2C00), Opcode::Reserved(0x1C));
        // same nibble in the predicated bank is SUB
        assert_eq!(Opcode::from_word(0x4A21), Opcode::Sub);
    }

    #[test]
    fn test_load_store_classes() {
        assert!(Opcode::Ld.is_load() && Opcode::In.is_load() && Opcode::Pop.is_load());
        assert!(Opcode::Sto.is_store() && Opcode::Out.is_store() && Opcode::Push.is_store());
        assert!(!Opcode::Mov.is_load() && !Opcode::Mov.is_store());
        assert!(Opcode::In.is_io() && !Opcode::Ld.is_io());
    }

    #[test]
    fn test_predicate_truth_table() {
        // (field, z, c, s) -> expected
        for bits in 0u8..8 {
            let z = bits & 1 != 0;
            let c = bits & 2 != 0;
            let s = bits & 4 != 0;
            let mut psr = Psr(0);
            psr.set_flag(PSR_Z, z);
            psr.set_flag(PSR_C, c);
            psr.set_flag(PSR_S, s);
            assert!(Predicate::Always.holds(psr));
            assert!(Predicate::Unconditional.holds(psr));
            assert_eq!(Predicate::Z.holds(psr), z);
            assert_eq!(Predicate::Nz.holds(psr), !z);
            assert_eq!(Predicate::C.holds(psr), c);
            assert_eq!(Predicate::Nc.holds(psr), !c);
            assert_eq!(Predicate::Mi.holds(psr), s);
            assert_eq!(Predicate::Pl.holds(psr), !s);
        }
    }

    #[test]
    fn test_encode_layout() {
        let words = encode(Instruction::new(Opcode::Add, 3, 2).when(Predicate::Nz)).unwrap();
        assert_eq!(words, vec![0x6423]);
        let words = encode(Instruction::new(Opcode::Sto, 0, 0).imm(0x10)).unwrap();
        assert_eq!(words, vec![0x1600, 0x0010]);
        let words = encode(Instruction::new(Opcode::Push, 1, 14)).unwrap();
        assert_eq!(words, vec![0x28E1]);
    }

    #[test]
    fn test_encode_rejects_predicated_second_bank() {
        let inst = Instruction::new(Opcode::Hlt, 0, 0).when(Predicate::Z);
        assert!(encode(inst).is_err());
        assert!(encode(Instruction::new(Opcode::Mov, 16, 0)).is_err());
    }

    #[test]
    fn test_decode_matches_encode() {
        let inst = Instruction::new(Opcode::Jsr, 13, 0).imm(0x0200).when(Predicate::C);
        let words = encode(inst).unwrap();
        let (back, size) = decode(words[0], words[1]);
        assert_eq!(size, 2);
        assert_eq!(back, inst);
    }
}
