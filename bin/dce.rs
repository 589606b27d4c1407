use std::env;
use std::io;
use std::process::exit;

use iropt::commons::{has_flag, Valid};
use iropt::middle_end::ir::Program;
use iropt::middle_end::optimization::dce::{adce, adce_unsafe, dce};

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

    let global = has_flag(&args, "--global-delete");
    let local = has_flag(&args, "--local-delete");
    let optimized = if has_flag(&args, "--adce") {
        if has_flag(&args, "--unsafe") {
            adce_unsafe(program)
        } else {
            adce(program)
        }
    } else {
        // default: both trivial modes
        dce(program, global, local)
    };

    if pretty {
        optimized.0.to_writer(io::stdout(), true).unwrap();
        println!();
    }
    optimized.0.to_writer(io::stdout(), false).unwrap();
    println!();
}
