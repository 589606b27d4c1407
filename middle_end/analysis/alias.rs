//! Flow-sensitive, intraprocedural alias analysis.
//!
//! An abstract heap location is the static `alloc` site (its instruction
//! id) paired with the allocated type.  Pointer function parameters start
//! with the empty set: the caller may hand in anything, and this analysis
//! does not look across the call boundary.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::Write;

use indexmap::IndexMap;

use crate::commons::Valid;

use super::super::cfg::{form_cfg, BlockData, Cfg};
use super::super::dataflow::{solve, Dataflow, Solution};
use super::super::ir::{Function, Instruction, Label, Op, Program, Type, Var};
use super::{number_instructions, variable_types, InstrId};

/// (alloc site, allocated type)
pub type HeapLoc = (InstrId, Type);

pub type Env = Map<Var, Set<HeapLoc>>;

pub struct AliasAnalysis {
    numbered: IndexMap<Label, Vec<(InstrId, Instruction)>>,
    types: Map<Var, Type>,
}

impl AliasAnalysis {
    pub fn new(func: &Function, cfg: &Cfg) -> Self {
        AliasAnalysis {
            numbered: number_instructions(cfg),
            types: variable_types(&func.args, &func.instrs),
        }
    }

    fn locations_of_type(&self, env: &Env, typ: &Type) -> Set<HeapLoc> {
        let mut locs = Set::new();
        for (var, var_locs) in env {
            if self.types.get(var) == Some(typ) {
                locs.extend(var_locs.iter().cloned());
            }
        }
        locs
    }
}

impl Dataflow for AliasAnalysis {
    type Fact = Env;

    fn entry_fact(&self) -> Self::Fact {
        // pointer parameters begin unbound to any location
        self.types
            .iter()
            .filter(|(_, typ)| typ.is_ptr())
            .map(|(var, _)| (var.clone(), Set::new()))
            .collect()
    }

    fn bottom(&self) -> Self::Fact {
        Map::new()
    }

    fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact {
        let mut merged: Env = Map::new();
        for env in facts {
            for (var, locs) in env {
                merged
                    .entry(var.clone())
                    .or_default()
                    .extend(locs.iter().cloned());
            }
        }
        merged
    }

    fn transfer(&self, input: &Self::Fact, label: &Label, _block: &BlockData) -> Self::Fact {
        let mut env = input.clone();
        for (id, instr) in &self.numbered[label] {
            let Some(code) = instr.as_code() else {
                continue;
            };
            let Some(dest) = &code.dest else {
                continue;
            };
            match code.op {
                Op::Const => {
                    env.insert(dest.clone(), Set::new());
                }
                Op::Alloc => {
                    let typ = code.typ.clone().expect("alloc carries its type");
                    env.insert(dest.clone(), [(*id, typ)].into());
                }
                Op::Id | Op::PtrAdd => {
                    let locs = env.get(&code.args[0]).cloned().unwrap_or_default();
                    env.insert(dest.clone(), locs);
                }
                // a load (or call) producing a pointer may surface any
                // location some variable of that pointer type holds
                Op::Load | Op::Call => {
                    if let Some(typ @ Type::Ptr(_)) = &code.typ {
                        let locs = self.locations_of_type(&env, typ);
                        env.insert(dest.clone(), locs);
                    }
                }
                _ => {}
            }
        }
        env
    }
}

pub fn analyze_cfg(func: &Function, cfg: &Cfg) -> Solution<Env> {
    solve(&AliasAnalysis::new(func, cfg), cfg)
}

pub fn analyze(program: &Valid<Program>, func: &str) -> Solution<Env> {
    let f = program
        .0
        .get_function(func)
        .unwrap_or_else(|| panic!("unknown function {func}"));
    analyze_cfg(f, &form_cfg(&f.instrs))
}

/// May p and q refer to the same cell under `env`?
pub fn may_alias(env: &Env, p: &Var, q: &Var) -> bool {
    if p == q {
        return true;
    }
    let (Some(p_locs), Some(q_locs)) = (env.get(p), env.get(q)) else {
        return false;
    };
    p_locs.intersection(q_locs).next().is_some()
}

pub fn report(program: &Valid<Program>) -> String {
    let mut out = String::new();
    for func in &program.0.functions {
        let solution = analyze(program, &func.name);
        writeln!(out, "Function: {}", func.name).unwrap();
        for (block, env) in &solution.output {
            writeln!(out, "\t{block}:").unwrap();
            for (var, locs) in env {
                let rendered = locs
                    .iter()
                    .map(|(id, typ)| format!("({id}, {typ})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(out, "\t\t{var} -> {{{rendered}}}").unwrap();
            }
        }
    }
    out
}
