//! WebAssembly bindings for the simulator.
//!
//! This module provides JavaScript-friendly wrappers around a simulator session.

use wasm_bindgen::prelude::*;
use crate::{BufferedOutput, Cpu, MachineConfig};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly simulator session.
#[wasm_bindgen]
pub struct WasmMachine {
    cpu: Cpu,
    source: String,
    output: BufferedOutput,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a new session with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            source: String::new(),
            output: BufferedOutput::new(),
        }
    }

    /// Set the output port address. Takes effect on the next load.
    #[wasm_bindgen]
    pub fn set_output_port(&mut self, port: u16) -> Result<(), JsError> {
        let config = MachineConfig { output_port: port, ..self.cpu.config().clone() };
        config.validate().map_err(|e| JsError::new(&e.to_string()))?;
        self.cpu = Cpu::with_config(config);
        Ok(())
    }

    /// Load a program from source. Returns the number of instruction words.
    ///
    /// The running session is only replaced when the load succeeds.
    #[wasm_bindgen]
    pub fn load_source(&mut self, source: &str) -> Result<usize, JsError> {
        let (cpu, summary) = Cpu::from_source(source, self.cpu.config().clone())
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.cpu = cpu;
        self.output = BufferedOutput::new();
        self.source = source.to_string();
        Ok(summary.instructions)
    }

    /// Step one instruction. Returns it in assembler form.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self.cpu.step(&mut self.output)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(instr.to_string())
    }

    /// Run until the machine stops or `max_steps` instructions have run.
    /// Returns the total step count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_steps: u32) -> u64 {
        let _ = self.cpu.run_limited(u64::from(max_steps), &mut self.output);
        self.cpu.steps
    }

    /// Reload the last program into a fresh session.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        let source = self.source.clone();
        self.load_source(&source).map(|_| ())
    }

    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    #[wasm_bindgen]
    pub fn steps(&self) -> u64 {
        self.cpu.steps
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.cpu.regs.pc
    }

    #[wasm_bindgen]
    pub fn reg_a(&self) -> u16 {
        self.cpu.regs.a
    }

    #[wasm_bindgen]
    pub fn reg_b(&self) -> u16 {
        self.cpu.regs.b
    }

    #[wasm_bindgen]
    pub fn zero_flag(&self) -> bool {
        self.cpu.regs.z
    }

    /// Memory word at `addr`, or 0 past the end of memory.
    #[wasm_bindgen]
    pub fn peek(&self, addr: usize) -> u16 {
        self.cpu.mem.get(addr).unwrap_or(0)
    }

    /// A copy of all of memory.
    #[wasm_bindgen]
    pub fn memory(&self) -> js_sys::Uint16Array {
        js_sys::Uint16Array::from(self.cpu.mem.as_slice())
    }

    /// Drain the console output produced so far, one `REG: value` per line.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> String {
        let text = self.output.to_text();
        self.output.values.clear();
        text
    }

    /// Get registers as JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.regs).map_err(|e| JsError::new(&e.to_string()))
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `source` loads. Returns the number of instruction words.
#[wasm_bindgen]
pub fn wasm_check(source: &str) -> Result<usize, JsError> {
    let program = crate::load(source)
        .map_err(|e| JsError::new(&e.to_string()))?;
    Ok(program.summary.instructions)
}
