//! Register file.
//!
//! Two general registers (A and B), a zero flag set by every instruction
//! that writes a register, and the program counter.

use crate::cpu::memory::Word;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Register selector, bit 12 of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    A,
    B,
}

impl Reg {
    /// Select a register from the `regSelect` bit (0 = A, anything else = B).
    pub fn from_bit(bit: u16) -> Self {
        if bit & 1 == 0 { Reg::A } else { Reg::B }
    }

    /// The `regSelect` bit for this register.
    pub fn bit(self) -> u16 {
        match self {
            Reg::A => 0,
            Reg::B => 1,
        }
    }

    /// Parse an assembler register token. Only the exact letters `A` and `B`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "A" => Some(Reg::A),
            "B" => Some(Reg::B),
            _ => None,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::A => f.write_str("A"),
            Reg::B => f.write_str("B"),
        }
    }
}

/// The register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General register A
    pub a: Word,

    /// General register B
    pub b: Word,

    /// Zero flag: true iff the last register written was zero.
    pub z: bool,

    /// Program counter
    pub pc: u16,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Read a general register.
    #[inline]
    pub fn get(&self, reg: Reg) -> Word {
        match reg {
            Reg::A => self.a,
            Reg::B => self.b,
        }
    }

    /// Write a general register and update the zero flag from the new value.
    #[inline]
    pub fn set(&mut self, reg: Reg, value: Word) {
        match reg {
            Reg::A => self.a = value,
            Reg::B => self.b = value,
        }
        self.z = value == 0;
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr;
    }
}
