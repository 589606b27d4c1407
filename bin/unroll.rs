use std::env;
use std::io;
use std::process::exit;

use iropt::commons::{flag_value, has_flag, Valid};
use iropt::middle_end::ir::Program;
use iropt::middle_end::optimization::unroll::{fully_unroll, partial_unroll};

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

    let program = read_program();
    if pretty {
        program.0.to_writer(io::stdout(), true).unwrap();
        println!();
    }

    let optimized = match flag_value(&args, "--partial") {
        Some(k) => {
            let factor: usize = k.parse().unwrap_or_else(|_| {
                eprintln!("--partial expects a replication count");
                exit(1);
            });
            partial_unroll(program, factor)
        }
        None => fully_unroll(program),
    };

    if pretty {
        optimized.0.to_writer(io::stdout(), true).unwrap();
        println!();
    }
    optimized.0.to_writer(io::stdout(), false).unwrap();
    println!();
}
