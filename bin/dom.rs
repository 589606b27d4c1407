use std::env;
use std::io;
use std::process::exit;

use iropt::commons::{has_flag, Valid};
use iropt::middle_end::cfg::form_cfg;
use iropt::middle_end::dominators::Dominators;
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

    for func in &program.0.functions {
        let cfg = form_cfg(&func.instrs);
        let dominators = Dominators::compute(&cfg);

        if has_flag(&args, "--dominator") {
            for (block, dominated_by) in &dominators.domby {
                let list = dominated_by
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("\t{block}:\t[{list}]");
            }
        }
        if has_flag(&args, "--tree") {
            println!("digraph {} {{", func.name);
            for block in cfg.keys() {
                println!("  {block};");
            }
            for (parent, children) in &dominators.tree {
                for child in children {
                    println!("  {parent} -> {child};");
                }
            }
            println!("}}");
        }
        if has_flag(&args, "--frontier") {
            for (block, frontier) in &dominators.frontier {
                let list = frontier.iter().cloned().collect::<Vec<_>>().join(", ");
                println!("\t{block}:\t[{list}]");
            }
        }
    }
}
