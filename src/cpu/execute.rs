//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::asm::assembler::{self, LoadError, LoadSummary};
use crate::config::MachineConfig;
use crate::cpu::decode::{self, Instruction, Opcode};
use crate::cpu::memory::{Memory, MEMORY_SIZE};
use crate::cpu::port::OutputSink;
use crate::cpu::registers::Registers;
use log::{info, trace, warn};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU executed HLT.
    Halted,
    /// The program counter ran past the last memory cell.
    EndOfMemory,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Halted,
    EndOfMemory,
    /// The step budget ran out while the CPU was still running.
    StepLimit,
}

/// Result of [`Cpu::run`] or [`Cpu::run_limited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Instructions executed during this run.
    pub steps: u64,
    pub stop: StopReason,
}

/// A simulator session: registers, memory and run state.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions executed since the last reset.
    pub steps: u64,
    config: MachineConfig,
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU with zeroed state and the default configuration.
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self::with_memory(Memory::new(), config)
    }

    /// Create a CPU over an already loaded memory image.
    pub fn with_memory(mem: Memory, config: MachineConfig) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            state: CpuState::Running,
            steps: 0,
            config,
            last_instr: None,
        }
    }

    /// Load `source` into a fresh session.
    ///
    /// Nothing is returned for a failed load, so a partially written memory
    /// can never be run.
    pub fn from_source(source: &str, config: MachineConfig) -> Result<(Self, LoadSummary), LoadError> {
        let program = assembler::load(source)?;
        Ok((Self::with_memory(program.memory, config), program.summary))
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Reset registers, memory and run state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.steps = 0;
        self.last_instr = None;
    }

    /// Assemble `source` into this session's memory.
    ///
    /// On error the words written before the failing line stay in memory;
    /// the session must not be run.
    pub fn load_source(&mut self, source: &str) -> Result<LoadSummary, LoadError> {
        assembler::load_into(&mut self.mem, source)
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed. Fails only when the CPU is
    /// no longer running.
    pub fn step<S: OutputSink + ?Sized>(&mut self, out: &mut S) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }
        if usize::from(self.regs.pc) >= MEMORY_SIZE {
            self.state = CpuState::EndOfMemory;
            return Err(CpuError::NotRunning(self.state));
        }

        // Fetch
        let pc = self.regs.advance_pc();
        let word = self.mem.read(pc);

        // Decode
        let instr = decode::decode(word);

        // Execute
        self.execute(instr, out);
        trace!(
            "PC: {:03X}: {} A={:04X} B={:04X} z={}",
            pc, instr, self.regs.a, self.regs.b, self.regs.z as u8
        );

        self.steps += 1;
        self.last_instr = Some(instr);

        // Falling off the end is a silent stop.
        if self.state == CpuState::Running && usize::from(self.regs.pc) >= MEMORY_SIZE {
            self.state = CpuState::EndOfMemory;
        }

        Ok(instr)
    }

    /// Run until the CPU stops, honoring the configured step limit.
    pub fn run<S: OutputSink + ?Sized>(&mut self, out: &mut S) -> RunOutcome {
        match self.config.max_steps {
            Some(max) => self.run_limited(max, out),
            None => {
                let start = self.steps;
                while self.is_running() {
                    if self.step(out).is_err() {
                        break;
                    }
                }
                self.finish(start)
            }
        }
    }

    /// Run for at most `max_steps` instructions.
    pub fn run_limited<S: OutputSink + ?Sized>(&mut self, max_steps: u64, out: &mut S) -> RunOutcome {
        let start = self.steps;
        let limit = start.saturating_add(max_steps);

        while self.is_running() && self.steps < limit {
            if self.step(out).is_err() {
                break;
            }
        }

        self.finish(start)
    }

    fn finish(&self, start: u64) -> RunOutcome {
        let outcome = RunOutcome {
            steps: self.steps - start,
            stop: self.stop_reason(),
        };
        match outcome.stop {
            StopReason::StepLimit => warn!(
                "Step limit reached after {} instructions at PC {:03X}",
                outcome.steps, self.regs.pc
            ),
            stop => info!("Stopped ({:?}) after {} instructions", stop, outcome.steps),
        }
        outcome
    }

    /// Execute a decoded instruction.
    fn execute<S: OutputSink + ?Sized>(&mut self, instr: Instruction, out: &mut S) {
        let Instruction { op, reg, addr } = instr;

        match op {
            Opcode::Add => {
                let result = self.regs.get(reg).wrapping_add(self.mem.read(addr));
                self.regs.set(reg, result);
            }

            Opcode::Sub => {
                let result = self.regs.get(reg).wrapping_sub(self.mem.read(addr));
                self.regs.set(reg, result);
            }

            Opcode::And => {
                let result = self.regs.get(reg) & self.mem.read(addr);
                self.regs.set(reg, result);
            }

            Opcode::Orr => {
                let result = self.regs.get(reg) | self.mem.read(addr);
                self.regs.set(reg, result);
            }

            Opcode::Red => {
                let value = self.mem.read(addr);
                self.regs.set(reg, value);
            }

            Opcode::Wrt => {
                let value = self.regs.get(reg);
                if addr == self.config.output_port {
                    out.emit(reg, value);
                } else {
                    self.mem.write(addr, value);
                }
            }

            Opcode::Beq => {
                if self.regs.z {
                    self.regs.jump(addr);
                }
            }

            Opcode::Hlt => {
                self.state = CpuState::Halted;
            }
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    fn stop_reason(&self) -> StopReason {
        match self.state {
            CpuState::Running => StopReason::StepLimit,
            CpuState::Halted => StopReason::Halted,
            CpuState::EndOfMemory => StopReason::EndOfMemory,
        }
    }

    /// Check if the CPU executed HLT.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::memory::Word;
    use crate::cpu::port::BufferedOutput;
    use crate::cpu::registers::Reg;
    use proptest::prelude::*;

    fn make_cpu(cells: &[(u16, Word)]) -> Cpu {
        let mut cpu = Cpu::new();
        for &(addr, word) in cells {
            cpu.mem.write(addr, word);
        }
        cpu
    }

    fn load(source: &str) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_source(source).unwrap();
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = make_cpu(&[(0, encode(Opcode::Hlt, Reg::A, 0))]);
        let mut out = BufferedOutput::new();

        let outcome = cpu.run(&mut out);

        assert_eq!(outcome, RunOutcome { steps: 1, stop: StopReason::Halted });
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 1);
        assert_eq!(cpu.step(&mut out), Err(CpuError::NotRunning(CpuState::Halted)));
    }

    #[test]
    fn test_hlt_ignores_operand_fields() {
        let mut cpu = make_cpu(&[(0, 0xFFFF)]);
        cpu.run(&mut BufferedOutput::new());
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs, Registers { a: 0, b: 0, z: false, pc: 1 });
    }

    #[test]
    fn test_add_wraps() {
        let mut cpu = make_cpu(&[
            (0, encode(Opcode::Red, Reg::B, 0x100)),
            (1, encode(Opcode::Add, Reg::B, 0x101)),
            (2, encode(Opcode::Hlt, Reg::A, 0)),
            (0x100, 0xFFFF),
            (0x101, 0x0001),
        ]);
        cpu.run(&mut BufferedOutput::new());

        assert_eq!(cpu.regs.b, 0);
        assert!(cpu.regs.z);
        assert_eq!(cpu.regs.a, 0);
    }

    #[test]
    fn test_sub_wraps_twos_complement() {
        let mut cpu = make_cpu(&[
            (0, encode(Opcode::Sub, Reg::A, 0x100)),
            (1, encode(Opcode::Hlt, Reg::A, 0)),
            (0x100, 1),
        ]);
        cpu.run(&mut BufferedOutput::new());

        assert_eq!(cpu.regs.a, 0xFFFF);
        assert!(!cpu.regs.z);
    }

    #[test]
    fn test_and_orr() {
        let mut cpu = load("@100 F0F0\n@101 0FF0\n@102 000F\nRED A 100\nAND A 101\nORR A 102\nHLT");
        cpu.run(&mut BufferedOutput::new());
        assert_eq!(cpu.regs.a, 0x00FF);
    }

    #[test]
    fn test_beq_taken_when_zero() {
        // A is zero after RED of an empty cell, so the branch skips the RED B.
        let mut cpu = load("RED A 100\nBEQ A 003\nRED B 101\nHLT\n@101 0009");
        let outcome = cpu.run(&mut BufferedOutput::new());

        assert_eq!(outcome.steps, 3);
        assert_eq!(cpu.regs.b, 0);
        assert!(cpu.regs.z);
    }

    #[test]
    fn test_beq_not_taken() {
        let mut cpu = load("RED A 100\nBEQ A 000\nHLT\n@100 0001");
        let outcome = cpu.run(&mut BufferedOutput::new());

        assert_eq!(outcome.steps, 3);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 3);
    }

    #[test]
    fn test_zero_flag_persists_across_wrt_and_beq() {
        // z set by RED A survives the store and drives the branch.
        let mut cpu = load("RED A 100\nWRT B 101\nBEQ B 004\nHLT\nRED B 102\nHLT\n@102 0002");
        cpu.run(&mut BufferedOutput::new());

        assert_eq!(cpu.regs.b, 2);
        assert!(!cpu.regs.z);
    }

    #[test]
    fn test_wrt_to_port_does_not_touch_memory() {
        let mut cpu = load("@077 1234\n@100 0042\nRED B 100\nWRT B 077\nHLT");
        let mut out = BufferedOutput::new();
        cpu.run(&mut out);

        assert_eq!(out.values, vec![(Reg::B, 0x42)]);
        assert_eq!(cpu.mem.read(0x077), 0x1234);
    }

    #[test]
    fn test_wrt_stores_elsewhere() {
        let mut cpu = load("@100 0042\nRED A 100\nWRT A 200\nHLT");
        let mut out = BufferedOutput::new();
        cpu.run(&mut out);

        assert!(out.values.is_empty());
        assert_eq!(cpu.mem.read(0x200), 0x42);
    }

    #[test]
    fn test_custom_output_port() {
        let config = MachineConfig { output_port: 0x0FF, max_steps: None };
        let mut cpu = Cpu::with_config(config);
        cpu.load_source("@100 0005\nRED A 100\nWRT A 077\nWRT A 0FF\nHLT").unwrap();
        let mut out = BufferedOutput::new();
        cpu.run(&mut out);

        assert_eq!(out.values, vec![(Reg::A, 5)]);
        assert_eq!(cpu.mem.read(0x077), 5);
    }

    #[test]
    fn test_self_modifying_store() {
        // Word at 0x100 is "HLT"; storing it over address 3 turns the
        // RED B at 3 into a halt before it executes.
        let mut cpu = load("RED A 100\nWRT A 003\nRED B 100\nRED B 100\nHLT\n@100 E000");
        cpu.run(&mut BufferedOutput::new());

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 4);
        assert_eq!(cpu.regs.b, 0xE000);
    }

    #[test]
    fn test_falls_off_end_of_memory() {
        // All-zero memory decodes as ADD A 000 everywhere.
        let mut cpu = Cpu::new();
        let outcome = cpu.run(&mut BufferedOutput::new());

        assert_eq!(outcome, RunOutcome { steps: MEMORY_SIZE as u64, stop: StopReason::EndOfMemory });
        assert_eq!(cpu.state, CpuState::EndOfMemory);
        assert!(!cpu.is_halted());
    }

    #[test]
    fn test_from_source() {
        let config = MachineConfig { output_port: 0x0FF, max_steps: None };
        let (mut cpu, summary) = Cpu::from_source("@100 0009\nRED B 100\nWRT B 0FF\nHLT", config).unwrap();
        assert_eq!(summary.instructions, 3);
        assert_eq!(cpu.config().output_port, 0x0FF);

        let mut out = BufferedOutput::new();
        cpu.run(&mut out);
        assert_eq!(out.values, vec![(Reg::B, 9)]);
    }

    #[test]
    fn test_from_source_failed_load_yields_no_session() {
        let err = Cpu::from_source("RED A 001\nNOPE", MachineConfig::default()).unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_reset() {
        let mut cpu = load("@100 0001\nRED A 100\nHLT");
        cpu.run(&mut BufferedOutput::new());
        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.steps, 0);
        assert_eq!(cpu.regs, Registers::new());
        assert_eq!(cpu.mem, Memory::new());
        assert_eq!(cpu.last_instruction(), None);
    }

    #[test]
    fn test_scenario_a_red_then_halt() {
        let mut cpu = load("@000 0005\nRED\tA\t000\nHLT");
        let outcome = cpu.run(&mut BufferedOutput::new());

        // The RED word overwrote the data at 0; it reads itself.
        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(cpu.regs.a, encode(Opcode::Red, Reg::A, 0));
        assert_eq!(cpu.regs.b, 0);
    }

    #[test]
    fn test_scenario_a_data_loaded_after_code() {
        let mut cpu = load("RED\tA\t002\nHLT\n@002 0005");
        let outcome = cpu.run(&mut BufferedOutput::new());

        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(cpu.regs.a, 5);
        assert_eq!(cpu.regs.b, 0);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_scenario_b_output() {
        let mut cpu = load("@100 0003\n@101 0004\nRED A 100\nADD A 101\nWRT A 077\nHLT");
        let mut out = BufferedOutput::new();
        cpu.run(&mut out);

        assert_eq!(out.to_text(), "A: 7\n");
        assert_eq!(cpu.regs.a, 7);
    }

    #[test]
    fn test_scenario_c_infinite_loop_is_bounded() {
        let mut cpu = load("RED A 100\nBEQ A 001");
        let outcome = cpu.run_limited(1_000, &mut BufferedOutput::new());

        assert_eq!(outcome, RunOutcome { steps: 1_000, stop: StopReason::StepLimit });
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, 1);
    }

    #[test]
    fn test_config_step_limit() {
        let config = MachineConfig { max_steps: Some(10), ..MachineConfig::default() };
        let mut cpu = Cpu::with_config(config);
        cpu.load_source("RED A 100\nBEQ A 001").unwrap();

        let outcome = cpu.run(&mut BufferedOutput::new());
        assert_eq!(outcome.stop, StopReason::StepLimit);
        assert_eq!(cpu.steps, 10);
    }

    #[test]
    fn test_countdown_program() {
        let mut cpu = load(include_str!("../../programs/countdown.prog"));
        let mut out = BufferedOutput::new();
        let outcome = cpu.run_limited(100, &mut out);

        assert_eq!(outcome.stop, StopReason::Halted);
        assert_eq!(out.to_text(), "A: 3\nA: 2\nA: 1\n");
        assert_eq!(cpu.regs.a, 0);
    }

    proptest! {
        #[test]
        fn prop_register_ops_wrap_and_set_z(
            bits in 0u8..5,
            use_b in any::<bool>(),
            initial in any::<u16>(),
            operand in any::<u16>(),
        ) {
            let op = Opcode::from_bits(bits);
            let reg = if use_b { Reg::B } else { Reg::A };
            let mut cpu = make_cpu(&[(0, encode(op, reg, 0x800)), (0x800, operand)]);
            cpu.regs.set(reg, initial);
            cpu.regs.z = false;

            cpu.step(&mut BufferedOutput::new()).unwrap();

            let expected = match op {
                Opcode::Add => ((u32::from(initial) + u32::from(operand)) % 65536) as u16,
                Opcode::Sub => ((i64::from(initial) - i64::from(operand)).rem_euclid(65536)) as u16,
                Opcode::And => initial & operand,
                Opcode::Orr => initial | operand,
                _ => operand,
            };
            prop_assert_eq!(cpu.regs.get(reg), expected);
            prop_assert_eq!(cpu.regs.z, expected == 0);
        }

        #[test]
        fn prop_beq_never_touches_z(z in any::<bool>(), target in 0u16..0x1000) {
            let mut cpu = make_cpu(&[(0, encode(Opcode::Beq, Reg::A, target))]);
            cpu.regs.z = z;

            cpu.step(&mut BufferedOutput::new()).unwrap();

            prop_assert_eq!(cpu.regs.z, z);
            prop_assert_eq!(cpu.regs.pc, if z { target } else { 1 });
        }

        #[test]
        fn prop_wrt_port_vs_store(addr in 1u16..0x1000, value in any::<u16>()) {
            let mut cpu = make_cpu(&[(0, encode(Opcode::Wrt, Reg::B, addr)), (addr, 0x5A5A)]);
            cpu.regs.b = value;
            let mut out = BufferedOutput::new();

            cpu.step(&mut out).unwrap();

            if addr == cpu.config().output_port {
                prop_assert_eq!(cpu.mem.read(addr), 0x5A5A);
                prop_assert_eq!(out.values, vec![(Reg::B, value)]);
            } else {
                prop_assert_eq!(cpu.mem.read(addr), value);
                prop_assert!(out.values.is_empty());
            }
        }
    }
}
