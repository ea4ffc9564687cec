//! Machine configuration.

use crate::cpu::memory::MEMORY_SIZE;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Address of the output port in the reference machine.
pub const DEFAULT_OUTPUT_PORT: u16 = 0x0077;

/// Tunables for a simulator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Store target that is diverted to the console.
    pub output_port: u16,
    /// Stop after this many instructions. `None` runs until halt.
    pub max_steps: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            output_port: DEFAULT_OUTPUT_PORT,
            max_steps: None,
        }
    }
}

impl MachineConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Check that the output port is reachable by a 12-bit operand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if usize::from(self.output_port) >= MEMORY_SIZE {
            return Err(ConfigError::PortOutOfRange(self.output_port));
        }
        Ok(())
    }
}

/// Errors from loading or validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("output port 0x{0:X} is outside memory (0x000-0xFFF)")]
    PortOutOfRange(u16),
}
