use std::env;
use std::io;
use std::process::exit;

use iropt::commons::{has_flag, Valid};
use iropt::middle_end::analysis::{available_exprs, constant_prop, live_variables, reaching_defs};
use iropt::middle_end::ir::Program;

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

    let program = read_program();
    if has_flag(&args, "--pretty-print") {
        program.0.to_writer(io::stdout(), true).unwrap();
        println!();
    }

    if has_flag(&args, "--reaching") {
        println!("Reaching Definitions Analysis");
        print!("{}", reaching_defs::report(&program));
    }
    if has_flag(&args, "--constant") {
        println!("Constant Propagation Analysis");
        print!("{}", constant_prop::report(&program));
    }
    if has_flag(&args, "--live") {
        println!("Live Variables Analysis");
        print!("{}", live_variables::report(&program));
    }
    if has_flag(&args, "--available") {
        println!("Available Expressions Analysis");
        print!("{}", available_exprs::report(&program));
    }
}
