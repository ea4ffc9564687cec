//! # acc16
//!
//! A simulator for a minimal 16-bit accumulator machine with two general
//! registers, a zero flag and an eight-instruction set, together with the
//! one-pass assembler that loads its text programs into memory.

pub mod config;
pub mod cpu;
pub mod asm;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use config::{ConfigError, MachineConfig};
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Reg, Instruction, Opcode, Word};
pub use cpu::{BufferedOutput, Console, OutputSink, RunOutcome, StopReason};
pub use asm::{load, load_into, LoadError, LoadSummary, LoadedProgram};
