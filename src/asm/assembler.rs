//! One-pass assembler and loader.
//!
//! Syntax, one statement per line:
//! ```text
//! @100 0003       ; data: poke hex value 0003 into address 100
//! RED A 100       ; instruction: mnemonic, register, hex address
//! ADD A 101
//! WRT A 077
//! HLT             ; no operands
//! ```
//!
//! Tokens are separated by spaces or tabs. There is no comment syntax (the
//! `;` notes above are illustration only). Instructions are placed at
//! consecutive addresses starting at 0; data lines write straight to their
//! address and do not move the instruction cursor. Later writes to the same
//! address win.

use crate::cpu::decode::{opcode_of, Instruction, Opcode};
use crate::cpu::memory::{Memory, Word, MEMORY_SIZE};
use crate::cpu::registers::Reg;
use log::debug;
use thiserror::Error;

/// What a successful load produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    /// Instruction words written.
    pub instructions: usize,
    /// Data words poked.
    pub data_words: usize,
    /// Where the next instruction would have gone. Execution still starts at 0.
    pub next_addr: usize,
}

/// A freshly loaded memory image.
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    pub memory: Memory,
    pub summary: LoadSummary,
}

/// Load `source` into a zeroed memory.
pub fn load(source: &str) -> Result<LoadedProgram, LoadError> {
    let mut memory = Memory::new();
    let summary = load_into(&mut memory, source)?;
    Ok(LoadedProgram { memory, summary })
}

/// Load `source` into an existing memory.
///
/// Stops at the first bad line. Words written by earlier lines are left in
/// place, so a failed load leaves `mem` partially written.
pub fn load_into(mem: &mut Memory, source: &str) -> Result<LoadSummary, LoadError> {
    let mut loader = Loader::new(mem);

    for (line_num, line) in source.lines().enumerate() {
        loader.process_line(line, line_num + 1)?;
    }

    Ok(loader.summary)
}

/// The loader state.
struct Loader<'a> {
    mem: &'a mut Memory,
    summary: LoadSummary,
}

impl<'a> Loader<'a> {
    fn new(mem: &'a mut Memory) -> Self {
        Self {
            mem,
            summary: LoadSummary::default(),
        }
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), LoadError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        match line.strip_prefix('@') {
            Some(rest) => self.process_data(rest, line_num),
            None => self.process_instruction(line, line_num),
        }
    }

    fn process_data(&mut self, rest: &str, line_num: usize) -> Result<(), LoadError> {
        let malformed = || LoadError::MalformedDataLine { line: line_num };

        let mut tokens = rest.split_whitespace();
        let (Some(addr_tok), Some(value_tok)) = (tokens.next(), tokens.next()) else {
            return Err(malformed());
        };

        let addr = parse_hex(addr_tok).ok_or_else(malformed)?;
        if addr as usize >= MEMORY_SIZE {
            return Err(LoadError::AddressOutOfRange { line: line_num, address: addr });
        }
        let value = parse_hex(value_tok)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(malformed)?;

        debug!("Line {}: data {:04X} -> [{:03X}]", line_num, value, addr);
        self.mem.write(addr as u16, value);
        self.summary.data_words += 1;
        Ok(())
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), LoadError> {
        let mut tokens = line.split_whitespace();
        let Some(mnemonic) = tokens.next() else {
            return Ok(());
        };

        let op = opcode_of(mnemonic).map_err(|_| LoadError::UnknownInstruction {
            line: line_num,
            mnemonic: mnemonic.to_string(),
        })?;

        // HLT takes no operands; anything after it is ignored.
        if op == Opcode::Hlt {
            return self.emit(Instruction::halt(), line_num);
        }

        let (Some(reg_tok), Some(addr_tok)) = (tokens.next(), tokens.next()) else {
            return Err(LoadError::MissingOperands { line: line_num });
        };

        let reg = Reg::from_token(reg_tok).ok_or_else(|| LoadError::InvalidRegister {
            line: line_num,
            register: reg_tok.to_string(),
        })?;

        let addr = parse_hex(addr_tok).ok_or_else(|| LoadError::InvalidAddress {
            line: line_num,
            token: addr_tok.to_string(),
        })?;
        if addr as usize >= MEMORY_SIZE {
            return Err(LoadError::AddressOutOfRange { line: line_num, address: addr });
        }

        self.emit(Instruction::new(op, reg, addr as u16), line_num)
    }

    fn emit(&mut self, instr: Instruction, line_num: usize) -> Result<(), LoadError> {
        let addr = self.summary.next_addr;
        if addr >= MEMORY_SIZE {
            return Err(LoadError::MemoryFull { line: line_num });
        }

        let word = Word::from(instr);
        debug!("Line {}: {} = {:04X} -> [{:03X}]", line_num, instr, word, addr);
        self.mem.write(addr as u16, word);

        self.summary.next_addr += 1;
        self.summary.instructions += 1;
        Ok(())
    }
}

/// Parse a hexadecimal token, with or without a `0x` prefix.
///
/// `None` means the token is not hex. Values too large for `u32` saturate to
/// `u32::MAX` so they are reported as out of range, not as malformed.
fn parse_hex(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    // Only overflow can fail once the digits are checked.
    Some(u32::from_str_radix(digits, 16).unwrap_or(u32::MAX))
}

/// Errors that can occur during loading. Each carries the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("unknown instruction on line {line}: '{mnemonic}'")]
    UnknownInstruction { line: usize, mnemonic: String },

    #[error("invalid register on line {line}: '{register}'")]
    InvalidRegister { line: usize, register: String },

    #[error("missing operands on line {line}")]
    MissingOperands { line: usize },

    #[error("malformed data line {line}: expected '@<hex address> <hex value>'")]
    MalformedDataLine { line: usize },

    #[error("address out of range on line {line}: 0x{address:X}")]
    AddressOutOfRange { line: usize, address: u32 },

    #[error("invalid hex address on line {line}: '{token}'")]
    InvalidAddress { line: usize, token: String },

    #[error("memory full on line {line}")]
    MemoryFull { line: usize },
}

impl LoadError {
    /// The 1-based source line that failed.
    pub fn line(&self) -> usize {
        match self {
            LoadError::UnknownInstruction { line, .. }
            | LoadError::InvalidRegister { line, .. }
            | LoadError::MissingOperands { line }
            | LoadError::MalformedDataLine { line }
            | LoadError::AddressOutOfRange { line, .. }
            | LoadError::InvalidAddress { line, .. }
            | LoadError::MemoryFull { line } => *line,
        }
    }
}
