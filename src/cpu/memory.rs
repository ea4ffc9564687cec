//! Word memory.
//!
//! A single flat array of 16-bit words shared by code and data. Programs
//! may store into a cell and later fetch it as an instruction.

use serde::{Serialize, Deserialize};

/// A 16-bit machine word.
pub type Word = u16;

/// The number of words in memory. Matches the 12-bit operand field.
pub const MEMORY_SIZE: usize = 4096;

/// Mask selecting the 12 address bits of an instruction word.
pub const ADDRESS_MASK: u16 = 0x0FFF;

/// Main memory: 4096 sixteen-bit words.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Word>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a word.
    ///
    /// # Panics
    /// Panics if `addr` is not below [`MEMORY_SIZE`].
    #[inline]
    pub fn read(&self, addr: u16) -> Word {
        self.cells[usize::from(addr)]
    }

    /// Write a word.
    ///
    /// # Panics
    /// Panics if `addr` is not below [`MEMORY_SIZE`].
    #[inline]
    pub fn write(&mut self, addr: u16, value: Word) {
        self.cells[usize::from(addr)] = value;
    }

    /// Checked read, `None` past the end of memory.
    pub fn get(&self, addr: usize) -> Option<Word> {
        self.cells.get(addr).copied()
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// The raw cell array.
    pub fn as_slice(&self) -> &[Word] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
