//! AVM2 runtime CLI front-end.
//!
//! Loads a raw `.abc` file from argv, decodes it, links it into a VM, and
//! runs either the conventional entry point (the last script's init) or a
//! caller-named method, printing the result or a formatted error to stderr.
//!
//! Usage:
//!     avm2_rt <file.abc> [--entry <qualified-name>] [--trace]
//!
//! `--entry <qualified-name>` calls `"<class>.<member>"` via
//! `vm.lookup-method` instead of running `vm.entry-point()`. `--trace`
//! installs a per-instruction observer that prints the opcode and program
//! counter to stderr as it executes.

use std::env;
use std::fs;
use std::process;

use avm2_rt::{decode_abc, ProgramImage, Vm};

const VERSION: &str = "0.1.0";

fn usage() -> String {
    format!(
        r#"avm2_rt v{0}

Usage:
    avm2_rt <file.abc> [--entry <qualified-name>] [--trace]

Arguments:
    <file.abc>
        Path to a raw AVM2 ABC block to decode and execute.

Options:
    --entry <qualified-name>
        Call "<class>.<member>" instead of running the conventional entry
        point (the last script's init).
    --trace
        Print each executed opcode and program counter to stderr.
    -h, --help
        Show this help message and exit."#,
        VERSION
    )
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "-h" || args[1] == "--help" {
        println!("{}", usage());
        return;
    }

    let abc_path = &args[1];
    let mut entry: Option<String> = None;
    let mut trace = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--entry" => {
                i += 1;
                match args.get(i) {
                    Some(v) => entry = Some(v.clone()),
                    None => {
                        eprintln!("--entry requires a qualified-name argument");
                        process::exit(1);
                    }
                }
            }
            "--trace" => trace = true,
            other => {
                eprintln!("unrecognized argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let bytes = match fs::read(abc_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("failed to read {}: {}", abc_path, e);
            process::exit(1);
        }
    };

    let file = match decode_abc(&bytes) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let mut vm = Vm::new(ProgramImage::new(file));

    if trace {
        vm.set_trace_hook(Some(Box::new(|pc, instr| {
            eprintln!("{:04}: {:?}", pc, instr);
        })));
    }

    let result = match entry {
        Some(qname) => match vm.lookup_method(&qname) {
            Ok(method_ix) => vm.call_static(method_ix, &[]),
            Err(e) => Err(e),
        },
        None => vm.entry_point(),
    };

    match result {
        Ok(value) => println!("{}", value),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
