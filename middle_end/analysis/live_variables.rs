//! Intraprocedural live variables.  Backwards: a variable is live at a
//! point when some path from that point reads it before writing it.

use std::collections::BTreeSet as Set;
use std::fmt::Write;

use crate::commons::Valid;

use super::super::cfg::{form_cfg, BlockData, Cfg};
use super::super::dataflow::{solve_backward, Dataflow, Solution};
use super::super::ir::{Label, Program, Var};

pub struct LiveVariables;

/// Variables read in the block before any write to them, scanning forward
/// while subtracting definitions from the running use set.
fn block_uses(block: &BlockData) -> Set<Var> {
    let mut uses = Set::new();
    let mut defined = Set::new();
    for instr in &block.instrs {
        for arg in instr.args() {
            if !defined.contains(arg) {
                uses.insert(arg.clone());
            }
        }
        if let Some(dest) = instr.dest() {
            defined.insert(dest.clone());
        }
    }
    uses
}

fn block_defs(block: &BlockData) -> Set<Var> {
    block
        .instrs
        .iter()
        .filter_map(|instr| instr.dest().cloned())
        .collect()
}

impl Dataflow for LiveVariables {
    type Fact = Set<Var>;

    fn entry_fact(&self) -> Self::Fact {
        Set::new()
    }

    fn bottom(&self) -> Self::Fact {
        Set::new()
    }

    fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact {
        facts.into_iter().flatten().cloned().collect()
    }

    fn transfer(&self, live_out: &Self::Fact, _label: &Label, block: &BlockData) -> Self::Fact {
        let defs = block_defs(block);
        let mut live_in = block_uses(block);
        live_in.extend(live_out.difference(&defs).cloned());
        live_in
    }
}

/// `input` holds live-in sets, `output` live-out sets.
pub fn analyze_cfg(cfg: &Cfg) -> Solution<Set<Var>> {
    solve_backward(&LiveVariables, cfg)
}

pub fn analyze(program: &Valid<Program>, func: &str) -> Solution<Set<Var>> {
    let f = program
        .0
        .get_function(func)
        .unwrap_or_else(|| panic!("unknown function {func}"));
    analyze_cfg(&form_cfg(&f.instrs))
}

pub fn report(program: &Valid<Program>) -> String {
    let mut out = String::new();
    for func in &program.0.functions {
        let solution = analyze(program, &func.name);
        writeln!(out, "Function: {}", func.name).unwrap();
        for (title, side) in [("In:", &solution.input), ("Out:", &solution.output)] {
            writeln!(out, "{title}").unwrap();
            for (block, vars) in side {
                if vars.is_empty() {
                    writeln!(out, "\t{block}: No Live Variables.").unwrap();
                } else {
                    let list = vars.iter().cloned().collect::<Vec<_>>().join(", ");
                    writeln!(out, "\t{block}: {list} live.").unwrap();
                }
            }
        }
    }
    out
}
