//! `minima` — compile and run Minima parse-tree documents.
//!
//! The tokenizer and parser live upstream; this host consumes the
//! parse-tree JSON they emit, compiles it to TAC, and drives the VM,
//! servicing INPUT suspensions from stdin.

use clap::{Parser, Subcommand};
use minima_compiler::compiler::tree::ParseNode;
use minima_vm::vm::{DebugEvent, Outcome, Vm};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "minima", version, about = "Minima compiler backend and VM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a parse-tree document and execute it.
    Run {
        /// Parse-tree JSON file produced by the Minima parser.
        file: PathBuf,
        /// Step budget; 0 disables the limit.
        #[arg(long, default_value_t = 10_000)]
        limit: u64,
        /// Print each executed instruction to stderr.
        #[arg(long)]
        trace: bool,
    },
    /// Compile a parse-tree document and print the TAC listing.
    Tac {
        /// Parse-tree JSON file produced by the Minima parser.
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    match Cli::parse().command {
        Command::Run { file, limit, trace } => run(&file, limit, trace),
        Command::Tac { file } => tac(&file),
    }
}

fn load_tree(file: &PathBuf) -> Result<ParseNode, String> {
    let text = fs::read_to_string(file).map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid parse-tree document: {}", e))
}

fn compile(file: &PathBuf) -> Result<minima_compiler::compiler::tac::Program, ExitCode> {
    let tree = match load_tree(file) {
        Ok(tree) => tree,
        Err(message) => {
            eprintln!("error: {}", message);
            return Err(ExitCode::FAILURE);
        }
    };
    match minima_compiler::compile(&tree) {
        Ok(program) => Ok(program),
        Err(error) => {
            for diagnostic in error.diagnostics() {
                eprintln!("{}", diagnostic.render_plain());
            }
            Err(ExitCode::FAILURE)
        }
    }
}

fn tac(file: &PathBuf) -> ExitCode {
    match compile(file) {
        Ok(program) => {
            println!("{}", program.listing());
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn run(file: &PathBuf, limit: u64, trace: bool) -> ExitCode {
    let program = match compile(file) {
        Ok(program) => program,
        Err(code) => return code,
    };
    let mut vm = Vm::new(program);
    vm.set_step_limit((limit > 0).then_some(limit));
    if trace {
        vm.set_debug_callback(Box::new(|event| {
            if let DebugEvent::Step { ip, opcode } = event {
                eprintln!("step {}: {}", ip, opcode);
            }
        }));
    }

    // Output accumulates across suspensions; print only the new tail
    // after each segment.
    let mut printed = 0usize;
    let mut outcome = vm.run();
    loop {
        match outcome {
            Ok(Outcome::Complete { output }) => {
                print!("{}", &output[printed..]);
                return ExitCode::SUCCESS;
            }
            Ok(Outcome::LimitReached { output, steps }) => {
                print!("{}", &output[printed..]);
                eprintln!("execution stopped after {} steps", steps);
                return ExitCode::SUCCESS;
            }
            Ok(Outcome::Suspended { prompt, token }) => {
                print!("{}", &vm.output[printed..]);
                printed = vm.output.len();
                print!("{}", prompt);
                let _ = io::stdout().flush();
                let mut line = String::new();
                if io::stdin().lock().read_line(&mut line).is_err() {
                    eprintln!("error: failed to read input");
                    return ExitCode::FAILURE;
                }
                let input = line.trim_end_matches(['\n', '\r']);
                outcome = vm.resume(token, input);
            }
            Err(error) => {
                // Runtime errors preserve whatever output was produced.
                print!("{}", &vm.output[printed..]);
                eprintln!("error: {}", error);
                return ExitCode::FAILURE;
            }
        }
    }
}
