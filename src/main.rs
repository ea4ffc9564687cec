//! acc16 - CLI Entry Point
//!
//! `acc16 <program>` loads a text program, runs it from address 0 and prints
//! the final registers. Exits with status 1 if the program cannot be read or
//! loaded.

use acc16::{ConfigError, Console, Cpu, CpuState, MachineConfig, Registers, StopReason};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::process;

#[derive(Parser)]
#[command(name = "acc16")]
#[command(version = "0.1.0")]
#[command(about = "Simulator for a minimal 16-bit two-register accumulator machine")]
struct Cli {
    /// Path to the program source
    program: String,
    /// Stop after this many instructions (default: run until halt)
    #[arg(short, long)]
    max_steps: Option<u64>,
    /// Output port address, in hex (default: 077)
    #[arg(long, value_parser = parse_port)]
    output_port: Option<u16>,
    /// JSON machine configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Print the final state as JSON
    #[arg(long)]
    json: bool,
}

/// Final state, as printed with `--json`.
#[derive(Serialize)]
struct Report<'a> {
    state: CpuState,
    stop: StopReason,
    steps: u64,
    registers: &'a Registers,
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    run_program(&cli.program, config, cli.json);
}

fn parse_port(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address '{}': {}", s, e))
}

fn build_config(cli: &Cli) -> Result<MachineConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };

    if let Some(max_steps) = cli.max_steps {
        config.max_steps = Some(max_steps);
    }
    if let Some(port) = cli.output_port {
        config.output_port = port;
    }

    config.validate()?;
    Ok(config)
}

fn run_program(path: &str, config: MachineConfig, json: bool) {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file {}: {}", path, e);
            process::exit(1);
        }
    };

    let mut cpu = match Cpu::from_source(&source, config) {
        Ok((cpu, summary)) => {
            info!(
                "Loaded {}: {} instructions, {} data words",
                path, summary.instructions, summary.data_words
            );
            cpu
        }
        Err(e) => {
            eprintln!("❌ Load error: {}", e);
            process::exit(1);
        }
    };

    let outcome = cpu.run(&mut Console);

    if json {
        let report = Report {
            state: cpu.state,
            stop: outcome.stop,
            steps: outcome.steps,
            registers: &cpu.regs,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to serialize report: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Execution finished.");
    println!("Register A = {}, Register B = {}", cpu.regs.a, cpu.regs.b);

    if outcome.stop == StopReason::StepLimit {
        println!();
        println!("⚠️  Reached step limit ({}). Use --max-steps to increase.", outcome.steps);
    }
}
