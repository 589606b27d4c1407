//! Dataflow analyses over the IR.
//!
//! Every analysis instantiates the worklist solver with one of the
//! lattices described in the design notes and exposes the same interface:
//! `analyze` for callers that consume the solution, `report` for the
//! analysis-printing entry point.

use std::collections::BTreeMap as Map;

use indexmap::IndexMap;

use super::cfg::Cfg;
use super::ir::{Instruction, Label, Var};

pub mod alias;
pub mod available_exprs;
pub mod constant_prop;
pub mod live_variables;
pub mod reaching_defs;

#[cfg(test)]
mod tests;

/// Identifier of an instruction within a function.  Instructions are
/// numbered 1..n across the function in block order; function arguments
/// take -1..-n so they can stand in as definition sites.
pub type InstrId = i64;

/// Number every instruction of a CFG, in block order.
pub fn number_instructions(cfg: &Cfg) -> IndexMap<Label, Vec<(InstrId, Instruction)>> {
    let mut id: InstrId = 0;
    cfg.iter()
        .map(|(name, data)| {
            let numbered = data
                .instrs
                .iter()
                .map(|instr| {
                    id += 1;
                    (id, instr.clone())
                })
                .collect();
            (name.clone(), numbered)
        })
        .collect()
}

/// Static types of every variable in a function: parameters plus each
/// definition's declared type.
pub fn variable_types(
    args: &[super::ir::Param],
    instrs: &[Instruction],
) -> Map<Var, super::ir::Type> {
    let mut types = Map::new();
    for param in args {
        types.insert(param.name.clone(), param.typ.clone());
    }
    for instr in instrs {
        if let (Some(dest), Some(typ)) = (instr.dest(), instr.typ()) {
            types.insert(dest.clone(), typ.clone());
        }
    }
    types
}
