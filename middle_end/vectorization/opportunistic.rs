//! Opportunistic LVN-style packing.
//!
//! A table maps tuples of source names to the vector register already
//! holding them.  Each run's operand tuple is served three ways: an exact
//! hit reuses the register outright; a partial hit (at least two matching
//! lanes) copies the old register with `vecmove` and reloads only the
//! differing lanes, bumping the lane index by each gap; a miss builds a
//! fresh register.  Result registers are recorded under their destination
//! tuple so a later run consuming those destinations packs for free.
//! Integer literals for lane bumps are cached in a map that is never
//! overwritten once a constant is bound.

use indexmap::IndexMap;
use log::trace;

use crate::commons::{NameSupply, Valid};

use super::super::cfg::{form_blocks, join_blocks};
use super::super::ir::{Instruction, Op, Program, Type, Var};
use super::naive::{replace_runs, run_triples};
use super::runs::{build_runs, Run};

const MIN_MATCHES_FOR_PARTIAL: usize = 2;

struct PackState {
    /// tuple of scalar names -> vector register holding them, in the
    /// order the packs were built
    packs: IndexMap<Vec<Var>, Var>,
    /// integer literal -> the variable bound to it (immutable once set)
    constants: IndexMap<i64, Var>,
}

impl PackState {
    fn new() -> Self {
        PackState {
            packs: IndexMap::new(),
            constants: IndexMap::new(),
        }
    }

    /// The earliest-built pack sharing at least
    /// `MIN_MATCHES_FOR_PARTIAL` lane positions with `args`.
    fn partial_match(&self, args: &[Var]) -> Option<(Var, Vec<usize>)> {
        for (pack, vec_name) in &self.packs {
            let overlap = args.len().min(pack.len());
            let matched = (0..overlap).filter(|i| args[*i] == pack[*i]).count();
            if matched >= MIN_MATCHES_FOR_PARTIAL {
                let unmatched = (0..args.len())
                    .filter(|i| *i >= overlap || args[*i] != pack[*i])
                    .collect();
                return Some((vec_name.clone(), unmatched));
            }
        }
        None
    }

    fn literal(&mut self, value: i64, out: &mut Vec<Instruction>, supply: &mut NameSupply) -> Var {
        if let Some(name) = self.constants.get(&value) {
            return name.clone();
        }
        let name = if value == 1 {
            supply.suffixed("one")
        } else {
            supply.suffixed("vector_const")
        };
        out.push(Instruction::const_int(name.clone(), value));
        self.constants.insert(value, name.clone());
        name
    }
}

/// Fresh vector from scratch: zero it, then load every lane.
fn build_full(
    args: &[Var],
    state: &mut PackState,
    out: &mut Vec<Instruction>,
    supply: &mut NameSupply,
) -> Var {
    let vec_name = supply.suffixed("new_vector_var");
    out.push(Instruction::veczero(vec_name.clone()));
    let mut idx = supply.suffixed("new_vector_idx");
    out.push(Instruction::const_int(idx.clone(), 0));
    for (lane, arg) in args.iter().enumerate() {
        out.push(Instruction::vecload(vec_name.clone(), idx.clone(), arg.clone()));
        if lane + 1 < args.len() {
            let one = state.literal(1, out, supply);
            let next = supply.suffixed("new_vector_idx");
            out.push(Instruction::binop(Op::Add, next.clone(), Type::Int, idx, one));
            idx = next;
        }
    }
    vec_name
}

/// Copy a near-miss pack and reload only the differing lanes, walking the
/// lane index forward by the literal gap between them.
fn build_partial(
    args: &[Var],
    prior_vec: Var,
    unmatched: &[usize],
    state: &mut PackState,
    out: &mut Vec<Instruction>,
    supply: &mut NameSupply,
) -> Var {
    let vec_name = supply.suffixed("new_vector_var");
    out.push(Instruction::vecmove(vec_name.clone(), prior_vec));
    let mut idx = supply.suffixed("new_vector_idx");
    out.push(Instruction::const_int(idx.clone(), 0));
    let mut at = 0usize;
    for lane in unmatched {
        if *lane != at {
            let gap = (*lane - at) as i64;
            let gap_name = state.literal(gap, out, supply);
            let next = supply.suffixed("new_vector_idx");
            out.push(Instruction::binop(
                Op::Add,
                next.clone(),
                Type::Int,
                idx,
                gap_name,
            ));
            idx = next;
            at = *lane;
        }
        out.push(Instruction::vecload(vec_name.clone(), idx.clone(), args[*lane].clone()));
    }
    vec_name
}

fn operand_vector(
    args: &[Var],
    state: &mut PackState,
    out: &mut Vec<Instruction>,
    supply: &mut NameSupply,
) -> Var {
    if let Some(existing) = state.packs.get(args) {
        trace!("slp: exact pack reuse for {args:?}");
        return existing.clone();
    }
    let built = match state.partial_match(args) {
        Some((prior, unmatched)) => {
            trace!("slp: partial pack reuse for {args:?}");
            build_partial(args, prior, &unmatched, state, out, supply)
        }
        None => build_full(args, state, out, supply),
    };
    state.packs.insert(args.to_vec(), built.clone());
    built
}

fn destructure(
    result: &Var,
    dests: &[Var],
    state: &mut PackState,
    out: &mut Vec<Instruction>,
    supply: &mut NameSupply,
) {
    let mut idx = supply.suffixed("new_vector_idx");
    out.push(Instruction::const_int(idx.clone(), 0));
    for (lane, dest) in dests.iter().enumerate() {
        out.push(Instruction::vecstore(dest.clone(), result.clone(), idx.clone()));
        if lane + 1 < dests.len() {
            let one = state.literal(1, out, supply);
            let next = supply.suffixed("new_vector_idx");
            out.push(Instruction::binop(Op::Add, next.clone(), Type::Int, idx, one));
            idx = next;
        }
    }
}

fn pack_run(
    instrs: &[Instruction],
    run: &Run,
    state: &mut PackState,
    supply: &mut NameSupply,
) -> Vec<Instruction> {
    let triples = run_triples(instrs, run);
    let lefts: Vec<Var> = triples.iter().map(|t| t.1.clone()).collect();
    let rights: Vec<Var> = triples.iter().map(|t| t.2.clone()).collect();
    let dests: Vec<Var> = triples.iter().map(|t| t.0.clone()).collect();

    let mut out = vec![];
    let left_vec = operand_vector(&lefts, state, &mut out, supply);
    let right_vec = operand_vector(&rights, state, &mut out, supply);

    let result = supply.suffixed("result_vector_var");
    out.push(Instruction::vecbinop(
        run.op.vec_op().expect("run ops have vector counterparts"),
        result.clone(),
        left_vec,
        right_vec,
    ));
    state.packs.insert(dests.clone(), result.clone());

    destructure(&result, &dests, state, &mut out, supply);
    out
}

/// The actual strategy.  Callers wrap it in an SSA round trip so the pack
/// table never sees a name redefined.
pub fn opportunistic_vectorize(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    let mut supply = NameSupply::new();
    for func in &mut program.functions {
        let blocks = form_blocks(&func.instrs);
        let mut new_blocks = vec![];
        for block in blocks {
            let runs = build_runs(&block);
            let mut state = PackState::new();
            let packed: Vec<(Run, Vec<Instruction>)> = runs
                .into_iter()
                .map(|run| {
                    let code = pack_run(&block, &run, &mut state, &mut supply);
                    (run, code)
                })
                .collect();
            new_blocks.push(replace_runs(block, packed));
        }
        func.instrs = join_blocks(new_blocks);
    }
    program.validate().expect("vectorization produced malformed IR")
}
