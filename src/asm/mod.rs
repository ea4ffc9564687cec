//! Assembler for programs in text form.
//!
//! Source is translated line by line straight into a memory image.

pub mod assembler;

pub use assembler::{load, load_into, LoadError, LoadSummary, LoadedProgram};
