//! OPC6 disassembler.
//!
//! Converts decoded [`Instruction`] values back to assembly text in the
//! usual OPC syntax: `[cond.]mnemonic rd, rs[, imm]`, with r15 shown as
//! `pc`. Used by the step debugger, breakpoint reports and the profiler.

use crate::opcodes::{self, Instruction, Opcode};

fn reg(r: u8) -> String {
    if r == 15 { "pc".into() } else { format!("r{}", r) }
}

/// Format a decoded instruction as an assembly string.
pub fn disassemble(inst: Instruction) -> String {
    let name = format!("{}{}", inst.pred.prefix(), inst.op.mnemonic());
    let operands = match inst.op {
        // operands are meaningless for these
        Opcode::Hlt => None,
        // constant lives in the source field
        Opcode::Inc | Opcode::Dec if inst.imm.is_none() => {
            Some(format!("{}, {}", reg(inst.dst), inst.src))
        }
        Opcode::Reserved(bits) => {
            return format!(".op 0x{:02X} {}, {}", bits, reg(inst.dst), reg(inst.src));
        }
        _ => Some(format!("{}, {}", reg(inst.dst), reg(inst.src))),
    };
    match (operands, inst.imm) {
        (None, _) => name,
        (Some(ops), Some(imm)) => format!("{} {}, 0x{:04X}", name, ops, imm),
        (Some(ops), None) => format!("{} {}", name, ops),
    }
}

/// Format the PSR as `swi=N iscz` (lowercase = clear, UPPER = set).
pub fn format_psr(psr: u8) -> String {
    let flags = ['I', 'S', 'C', 'Z'];
    let mut s = format!("swi={:X} ", psr >> 4);
    for (i, &f) in flags.iter().enumerate() {
        let bit = 3 - i;
        if psr & (1 << bit) != 0 {
            s.push(f);
        } else {
            s.push(f.to_ascii_lowercase());
        }
    }
    s
}

/// Disassemble a range of word memory.
///
/// Returns lines of `"0xAAAA: WORD [WORD]  MNEMONIC"` for `start..end`.
pub fn disassemble_range(mem: &[u16], start: usize, end: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut addr = start;
    while addr < end && addr < mem.len() {
        let word = mem[addr];
        let next = mem.get(addr + 1).copied().unwrap_or(0);
        let (inst, size) = opcodes::decode(word, next);
        let asm = disassemble(inst);
        if size == 2 {
            lines.push(format!("0x{:04X}: {:04X} {:04X}  {}", addr, word, next, asm));
            addr += 2;
        } else {
            lines.push(format!("0x{:04X}: {:04X}       {}", addr, word, asm));
            addr += 1;
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{Instruction, Opcode, Predicate};

    #[test]
    fn test_disasm_basic() {
        assert_eq!(disassemble(Instruction::new(Opcode::Add, 1, 2)), "add r1, r2");
        assert_eq!(disassemble(Instruction::new(Opcode::Mov, 15, 13)), "mov pc, r13");
        assert_eq!(disassemble(Instruction::new(Opcode::Hlt, 0, 0)), "halt");
        assert_eq!(disassemble(Instruction::new(Opcode::Inc, 14, 2)), "inc r14, 2");
    }

    #[test]
    fn test_disasm_predicate_and_immediate() {
        let inst = Instruction::new(Opcode::Sto, 3, 0).imm(0x0010).when(Predicate::Nz);
        assert_eq!(disassemble(inst), "nz.sto r3, r0, 0x0010");
        let inst = Instruction::new(Opcode::Jsr, 13, 0).imm(0x0200).when(Predicate::C);
        assert_eq!(disassemble(inst), "c.jsr r13, r0, 0x0200");
    }

    #[test]
    fn test_disasm_reserved() {
        assert_eq!(disassemble(Instruction::new(Opcode::Reserved(0x1D), 1, 2)), ".op 0x1D r1, r2");
    }

    #[test]
    fn test_format_psr() {
        assert_eq!(format_psr(0x0F), "swi=0 ISCZ");
        assert_eq!(format_psr(0x00), "swi=0 iscz");
        // 0x5A = swi 5, EI=1, S=0, C=1, Z=0
        assert_eq!(format_psr(0x5A), "swi=5 IsCz");
    }

    #[test]
    fn test_disassemble_range() {
        let mem = [0x1001, 0x0005, 0x2000];
        let lines = disassemble_range(&mem, 0, 3);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0x0000: 1001 0005  mov r1, r0, 0x0005");
        assert_eq!(lines[1], "0x0002: 2000       halt");
    }
}
