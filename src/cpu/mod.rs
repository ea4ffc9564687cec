//! The machine.
//!
//! - 4096 sixteen-bit words of shared code and data memory
//! - Registers A and B, a zero flag and the program counter
//! - Eight single-word instructions with a 12-bit address operand
//! - A store-mapped output port

pub mod memory;
pub mod registers;
pub mod decode;
pub mod port;
pub mod execute;

pub use memory::{Memory, Word, MEMORY_SIZE};
pub use registers::{Reg, Registers};
pub use decode::{decode, encode, opcode_of, Instruction, Opcode, UnknownMnemonic};
pub use port::{BufferedOutput, Console, OutputSink};
pub use execute::{Cpu, CpuError, CpuState, RunOutcome, StopReason};
