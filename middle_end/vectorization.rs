//! Auto-vectorization.
//!
//! The driver preprocesses (cleanup passes, run canonicalization, full
//! unrolling, store sinking, constant hoisting, block coalescing) and then
//! applies one of two strategies: naive packing, or the opportunistic
//! LVN-style packer that reuses vector registers across runs.

use log::debug;

use crate::commons::Valid;

use super::cfg::{coalesce, form_cfg, join_cfg};
use super::ir::{Function, Program};
use super::optimization::dce::dce;
use super::optimization::licm::licm;
use super::optimization::unroll::fully_unroll;
use super::ssa::{from_ssa, to_ssa};

pub mod canonicalize;
pub mod naive;
pub mod opportunistic;
pub mod runs;
pub mod store_movement;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Naive,
    Opportunistic,
}

fn coalesce_blocks(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    for func in &mut program.functions {
        let mut cfg = form_cfg(&func.instrs);
        coalesce(&mut cfg);
        func.instrs = join_cfg(&cfg);
    }
    program.validate().expect("coalescing produced malformed IR")
}

/// DCE then LICM, applied per function to the functions with no memory
/// traffic; a function that touches the heap keeps its body as written.
fn scalar_cleanup(program: Valid<Program>) -> Valid<Program> {
    let mut inner = program.0;
    if inner.functions.iter().all(Function::has_mem_ops) {
        return inner.validate().expect("program was valid");
    }
    let cleaned = licm(dce(Valid(inner.clone()), true, true));
    for func in inner.functions.iter_mut() {
        if func.has_mem_ops() {
            continue;
        }
        if let Some(done) = cleaned.0.get_function(&func.name) {
            func.instrs = done.instrs.clone();
        }
    }
    inner.validate().expect("scalar cleanup produced malformed IR")
}

/// Cleanup and normalization before packing.
fn preprocess(program: Valid<Program>) -> Valid<Program> {
    let mut program = scalar_cleanup(program);
    program = canonicalize::canonicalize(program);
    program = fully_unroll(program);
    program = store_movement::move_stores(program);
    program = canonicalize::constant_movement(program);
    coalesce_blocks(program)
}

/// The actual pass.
pub fn vectorize(program: Valid<Program>, strategy: Strategy) -> Valid<Program> {
    let program = preprocess(program);
    debug!("vectorize: preprocessing done, strategy {strategy:?}");
    match strategy {
        Strategy::Naive => naive::naive_vectorize(program),
        Strategy::Opportunistic => {
            // the packing table needs single definitions per name
            let ssa = to_ssa(program);
            from_ssa(opportunistic::opportunistic_vectorize(ssa))
        }
    }
}
