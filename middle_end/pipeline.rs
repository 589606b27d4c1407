//! Pass registry and sequential driver.
//!
//! Passes run in the order given; the ones that need SSA establish it on
//! entry and are checked for SSA on exit.  Pass selection and ordering is
//! deterministic for a given option set and input.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::commons::Valid;

use super::ir::Program;
use super::optimization::dce;
use super::optimization::gvn::gvn;
use super::optimization::induction_variables::ive;
use super::optimization::inlining::inline;
use super::optimization::licm::licm;
use super::optimization::lvn::lvn;
use super::optimization::unroll::fully_unroll;
use super::ssa::{from_ssa, is_ssa, to_ssa};
use super::vectorization::{vectorize, Strategy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    GlobalDelete,
    LocalDelete,
    Adce,
    AdceUnsafe,
    ToSsa,
    FromSsa,
    Lvn,
    Gvn,
    Licm,
    Ive,
    Unroll,
    Inline,
    VectorizeNaive,
    VectorizeOpportunistic,
}

impl Pass {
    pub fn all_names() -> &'static [&'static str] {
        &[
            "global-delete",
            "local-delete",
            "adce",
            "adce-unsafe",
            "to-ssa",
            "from-ssa",
            "lvn",
            "gvn",
            "licm",
            "ive",
            "unroll",
            "inline",
            "naive",
            "op",
        ]
    }

    fn name(&self) -> &'static str {
        match self {
            Pass::GlobalDelete => "global-delete",
            Pass::LocalDelete => "local-delete",
            Pass::Adce => "adce",
            Pass::AdceUnsafe => "adce-unsafe",
            Pass::ToSsa => "to-ssa",
            Pass::FromSsa => "from-ssa",
            Pass::Lvn => "lvn",
            Pass::Gvn => "gvn",
            Pass::Licm => "licm",
            Pass::Ive => "ive",
            Pass::Unroll => "unroll",
            Pass::Inline => "inline",
            Pass::VectorizeNaive => "naive",
            Pass::VectorizeOpportunistic => "op",
        }
    }

    /// Passes that must be handed SSA and promise to emit SSA.
    fn ssa_bound(&self) -> bool {
        matches!(self, Pass::Adce | Pass::AdceUnsafe | Pass::Gvn)
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pass = match s.trim_start_matches("--") {
            "global-delete" => Pass::GlobalDelete,
            "local-delete" => Pass::LocalDelete,
            "adce" => Pass::Adce,
            "adce-unsafe" => Pass::AdceUnsafe,
            "to-ssa" => Pass::ToSsa,
            "from-ssa" => Pass::FromSsa,
            "lvn" => Pass::Lvn,
            "gvn" => Pass::Gvn,
            "licm" => Pass::Licm,
            "ive" => Pass::Ive,
            "unroll" => Pass::Unroll,
            "inline" => Pass::Inline,
            "naive" => Pass::VectorizeNaive,
            "op" => Pass::VectorizeOpportunistic,
            other => return Err(format!("unknown pass {other}")),
        };
        Ok(pass)
    }
}

fn run_pass(program: Valid<Program>, pass: Pass) -> Valid<Program> {
    match pass {
        Pass::GlobalDelete => dce::delete_unused(program),
        Pass::LocalDelete => dce::local_dce(program),
        Pass::Adce => dce::adce(program),
        Pass::AdceUnsafe => dce::adce_unsafe(program),
        Pass::ToSsa => to_ssa(program),
        Pass::FromSsa => from_ssa(program),
        Pass::Lvn => lvn(program),
        Pass::Gvn => gvn(program),
        Pass::Licm => licm(program),
        Pass::Ive => ive(program),
        Pass::Unroll => fully_unroll(program),
        Pass::Inline => inline(program),
        Pass::VectorizeNaive => vectorize(program, Strategy::Naive),
        Pass::VectorizeOpportunistic => vectorize(program, Strategy::Opportunistic),
    }
}

/// Run the selected passes in order.
pub fn run_passes(program: Valid<Program>, passes: &[Pass]) -> Valid<Program> {
    let mut program = program;
    for pass in passes {
        debug!("pipeline: running {pass}");
        program = run_pass(program, *pass);
        if pass.ssa_bound() {
            is_ssa(&program.0).unwrap_or_else(|e| panic!("{pass} broke the SSA invariant: {e}"));
        }
    }
    program
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pass_names_round_trip() {
        for name in Pass::all_names() {
            let pass: Pass = name.parse().unwrap();
            assert_eq!(&pass.name(), name);
        }
        assert!("frobnicate".parse::<Pass>().is_err());
    }

    #[test]
    fn flags_parse_with_dashes() {
        assert_eq!("--gvn".parse::<Pass>(), Ok(Pass::Gvn));
    }
}
