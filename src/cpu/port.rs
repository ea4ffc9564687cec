//! Output port sinks.
//!
//! A `WRT` to the configured output port never touches memory; the value is
//! handed to an [`OutputSink`] instead.

use crate::cpu::memory::Word;
use crate::cpu::registers::Reg;
use std::io::Write;

/// Receives values written to the output port, in program order.
pub trait OutputSink {
    fn emit(&mut self, reg: Reg, value: Word);
}

/// Prints each value to stdout as `A: 7`.
#[derive(Debug, Default)]
pub struct Console;

impl OutputSink for Console {
    fn emit(&mut self, reg: Reg, value: Word) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = writeln!(out, "{}: {}", reg, value) {
            log::error!("Console: failed to write output: {}", e);
        }
    }
}

/// Collects output in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedOutput {
    pub values: Vec<(Reg, Word)>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render as console text, one `REG: value` line per write.
    pub fn to_text(&self) -> String {
        self.values
            .iter()
            .map(|(reg, value)| format!("{}: {}\n", reg, value))
            .collect()
    }

    /// Drain and return everything collected so far.
    pub fn take(&mut self) -> Vec<(Reg, Word)> {
        std::mem::take(&mut self.values)
    }
}

impl OutputSink for BufferedOutput {
    fn emit(&mut self, reg: Reg, value: Word) {
        self.values.push((reg, value));
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn emit(&mut self, reg: Reg, value: Word) {
        (**self).emit(reg, value);
    }
}
