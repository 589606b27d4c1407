use std::env;
use std::fs;
use std::io;
use std::process::exit;

use iropt::commons::{has_flag, Valid};
use iropt::middle_end::ir::Program;
use iropt::middle_end::optimization::trace::{trace_opt, Trace};

fn read_program() -> Valid<Program> {
    let program = match Program::from_reader(io::stdin()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("malformed program: {e}");
            exit(1);
        }
    };
    match program.validate() {
        Ok(valid) => valid,
        Err(e) => {
            eprintln!("malformed program: {e}");
            exit(1);
        }
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let pretty = has_flag(&args, "--pretty-print");

    let Some(trace_path) = args.iter().skip(1).find(|a| !a.starts_with("--")) else {
        eprintln!("usage: trace-opt <trace-file> [--pretty-print] < program.json");
        exit(1);
    };
    let trace: Trace = match fs::read_to_string(trace_path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(trace) => trace,
            Err(e) => {
                eprintln!("malformed trace: {e}");
                exit(1);
            }
        },
        Err(e) => {
            eprintln!("could not read trace file {trace_path}: {e}");
            exit(1);
        }
    };

    let program = read_program();
    if pretty {
        program.0.to_writer(io::stdout(), true).unwrap();
        println!();
    }

    let optimized = trace_opt(program, &trace);

    if pretty {
        optimized.0.to_writer(io::stdout(), true).unwrap();
        println!();
    }
    optimized.0.to_writer(io::stdout(), false).unwrap();
    println!();
}
