//! Arithmetic-logic unit.
//!
//! A pure function of (opcode, A, B, PSR). A is the register named by the
//! destination field, B the resolved operand. Subtraction is carried out
//! as `A + !B + cin` so that Carry set means "no borrow".

use crate::opcodes::Opcode;
use crate::regfile::Psr;

/// Compute `(result, carry_out)`.
pub fn execute(op: Opcode, a: u16, b: u16, psr: Psr) -> (u16, bool) {
    use Opcode::*;
    let cin = psr.carry();
    match op {
        And => (a & b, cin),
        Or => (a | b, cin),
        Xor => (a ^ b, cin),
        Add | Inc => add(a, b, false),
        Adc => add(a, b, cin),
        Sub | Dec | Cmp => add(a, !b, true),
        Sbc | Cmpc => add(a, !b, cin),
        Gpsr => (psr.0 as u16, cin),
        Not => (!b, cin),
        Bswp => (b.swap_bytes(), cin),
        Ror => ((b >> 1) | ((cin as u16) << 15), b & 1 != 0),
        Asr => ((b >> 1) | (b & 0x8000), b & 1 != 0),
        Lsr => (b >> 1, b & 1 != 0),
        // MOV, LD, IN, POP, JSR, PPSR, STO, OUT, PUSH, HLT, RTI, reserved
        _ => (b, cin),
    }
}

#[inline(always)]
fn add(a: u16, b: u16, cin: bool) -> (u16, bool) {
    let sum = a as u32 + b as u32 + cin as u32;
    (sum as u16, sum > 0xFFFF)
}
