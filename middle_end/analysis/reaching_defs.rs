//! Intraprocedural reaching definitions.

use std::collections::BTreeSet as Set;
use std::fmt::Write;

use indexmap::IndexMap;

use crate::commons::Valid;

use super::super::cfg::{form_cfg, BlockData, Cfg};
use super::super::dataflow::{solve, Dataflow, Solution};
use super::super::ir::{Function, Instruction, Label, Program, Var};
use super::{number_instructions, InstrId};

/// A definition site: instruction id paired with the variable it writes.
/// Function arguments are definitions with negative ids.
pub type Def = (InstrId, Var);

pub struct ReachingDefs {
    numbered: IndexMap<Label, Vec<(InstrId, Instruction)>>,
    args: Vec<Var>,
}

impl ReachingDefs {
    pub fn new(func: &Function, cfg: &Cfg) -> Self {
        ReachingDefs {
            numbered: number_instructions(cfg),
            args: func.args.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

impl Dataflow for ReachingDefs {
    type Fact = Set<Def>;

    fn entry_fact(&self) -> Self::Fact {
        self.args
            .iter()
            .enumerate()
            .map(|(i, name)| (-(i as InstrId) - 1, name.clone()))
            .collect()
    }

    fn bottom(&self) -> Self::Fact {
        Set::new()
    }

    fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact {
        facts.into_iter().flatten().cloned().collect()
    }

    fn transfer(&self, input: &Self::Fact, label: &Label, _block: &BlockData) -> Self::Fact {
        let numbered = &self.numbered[label];

        // last definition of each variable in the block
        let mut last_def: IndexMap<&Var, InstrId> = IndexMap::new();
        for (id, instr) in numbered {
            if let Some(dest) = instr.dest() {
                last_def.insert(dest, *id);
            }
        }

        let mut out: Set<Def> = input
            .iter()
            .filter(|(_, var)| !last_def.contains_key(var))
            .cloned()
            .collect();
        out.extend(last_def.into_iter().map(|(var, id)| (id, var.clone())));
        out
    }
}

pub fn analyze(program: &Valid<Program>, func: &str) -> Solution<Set<Def>> {
    let f = program
        .0
        .get_function(func)
        .unwrap_or_else(|| panic!("unknown function {func}"));
    let cfg = form_cfg(&f.instrs);
    solve(&ReachingDefs::new(f, &cfg), &cfg)
}

pub fn report(program: &Valid<Program>) -> String {
    let mut out = String::new();
    for func in &program.0.functions {
        let solution = analyze(program, &func.name);
        writeln!(out, "Function: {}", func.name).unwrap();
        for (title, side) in [("In:", &solution.input), ("Out:", &solution.output)] {
            writeln!(out, "{title}").unwrap();
            for (block, defs) in side {
                if defs.is_empty() {
                    writeln!(out, "\t{block}: No Reaching Definitions.").unwrap();
                } else {
                    for (id, var) in defs {
                        writeln!(out, "\t{block}: {var} on line {id}.").unwrap();
                    }
                }
            }
        }
    }
    out
}
