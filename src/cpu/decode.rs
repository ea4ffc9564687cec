//! Instruction encoding.
//!
//! Every instruction is one 16-bit word:
//!
//! ```text
//!  15  13  12  11                    0
//! +------+----+-----------------------+
//! |  op  | r  |        address        |
//! +------+----+-----------------------+
//! ```
//!
//! - `op`: 3-bit opcode, all eight values are defined
//! - `r`: register select (0 = A, 1 = B)
//! - `address`: 12-bit memory address

use crate::cpu::memory::{Word, ADDRESS_MASK};
use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// The eight operations, in opcode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// `Reg += [addr]`
    Add = 0b000,
    /// `Reg -= [addr]`
    Sub = 0b001,
    /// `Reg &= [addr]`
    And = 0b010,
    /// `Reg |= [addr]`
    Orr = 0b011,
    /// `Reg := [addr]`
    Red = 0b100,
    /// `[addr] := Reg`, or console output when `addr` is the output port
    Wrt = 0b101,
    /// `if z { pc := addr }`
    Beq = 0b110,
    /// Stop the machine
    Hlt = 0b111,
}

impl Opcode {
    /// All opcodes, indexed by their numeric value.
    pub const ALL: [Opcode; 8] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::And,
        Opcode::Orr,
        Opcode::Red,
        Opcode::Wrt,
        Opcode::Beq,
        Opcode::Hlt,
    ];

    /// Build from the low three bits of `bits`. Total: every value maps.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Self::ALL[usize::from(bits & 0b111)]
    }

    /// The 3-bit opcode value.
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// The assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Orr => "ORR",
            Opcode::Red => "RED",
            Opcode::Wrt => "WRT",
            Opcode::Beq => "BEQ",
            Opcode::Hlt => "HLT",
        }
    }
}

/// Look up an opcode by mnemonic. Case-sensitive.
pub fn opcode_of(mnemonic: &str) -> Result<Opcode, UnknownMnemonic> {
    Opcode::ALL
        .iter()
        .copied()
        .find(|op| op.mnemonic() == mnemonic)
        .ok_or_else(|| UnknownMnemonic(mnemonic.to_string()))
}

/// A decoded instruction word.
///
/// For `HLT` the register and address fields carry whatever bits were in the
/// word; execution ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub reg: Reg,
    pub addr: u16,
}

impl Instruction {
    pub fn new(op: Opcode, reg: Reg, addr: u16) -> Self {
        Self { op, reg, addr: addr & ADDRESS_MASK }
    }

    /// The canonical halt instruction (register A, address 0).
    pub fn halt() -> Self {
        Self::new(Opcode::Hlt, Reg::A, 0)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Opcode::Hlt => f.write_str("HLT"),
            op => write!(f, "{} {} {:03X}", op.mnemonic(), self.reg, self.addr),
        }
    }
}

/// Pack the three fields into a word. The address is masked to 12 bits.
#[inline]
pub fn encode(op: Opcode, reg: Reg, addr: u16) -> Word {
    (u16::from(op.bits()) << 13) | (reg.bit() << 12) | (addr & ADDRESS_MASK)
}

/// Split a word into its three fields.
#[inline]
pub fn decode(word: Word) -> Instruction {
    Instruction {
        op: Opcode::from_bits((word >> 13) as u8),
        reg: Reg::from_bit((word >> 12) & 1),
        addr: word & ADDRESS_MASK,
    }
}

impl From<Instruction> for Word {
    fn from(instr: Instruction) -> Word {
        encode(instr.op, instr.reg, instr.addr)
    }
}

/// Mnemonic lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown instruction '{0}'")]
pub struct UnknownMnemonic(pub String);
