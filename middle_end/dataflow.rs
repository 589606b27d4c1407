//! Generic monotone worklist solver.
//!
//! The solver is parameterized over a lattice and its transfer function
//! through the [Dataflow] trait; forward and backward instantiations share
//! the same fixpoint loop, the backward one running over the reversed CFG.
//! For monotone transfer functions on a finite lattice the result is
//! unique regardless of pop order; we pop LIFO.

use std::collections::BTreeMap as Map;

use super::cfg::{reverse_cfg, BlockData, Cfg};
use super::ir::Label;

pub trait Dataflow {
    type Fact: Clone + PartialEq;

    /// The fact flowing into the entry (or out of the exits, backwards).
    fn entry_fact(&self) -> Self::Fact;

    /// The ⊥ element every other block starts from.
    fn bottom(&self) -> Self::Fact;

    /// Binary-lifted merge over all incoming facts.
    fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact;

    fn transfer(&self, input: &Self::Fact, label: &Label, block: &BlockData) -> Self::Fact;
}

/// Per-block solution: `input` is the fact at block entry, `output` at
/// block exit, in program order for both directions.
#[derive(Clone, Debug)]
pub struct Solution<F> {
    pub input: Map<Label, F>,
    pub output: Map<Label, F>,
}

pub fn solve<A: Dataflow>(analysis: &A, cfg: &Cfg) -> Solution<A::Fact> {
    let (merged, transferred) = fixpoint(analysis, cfg);
    Solution {
        input: merged,
        output: transferred,
    }
}

pub fn solve_backward<A: Dataflow>(analysis: &A, cfg: &Cfg) -> Solution<A::Fact> {
    let reversed = reverse_cfg(cfg);
    let (merged, transferred) = fixpoint(analysis, &reversed);
    // merged facts live at the block's exit in program order
    Solution {
        input: transferred,
        output: merged,
    }
}

/// The worklist loop.  Blocks with no predecessors (in the direction of
/// travel) merge to the entry fact.
fn fixpoint<A: Dataflow>(
    analysis: &A,
    cfg: &Cfg,
) -> (Map<Label, A::Fact>, Map<Label, A::Fact>) {
    let mut merged: Map<Label, A::Fact> = Map::new();
    let mut out: Map<Label, A::Fact> = Map::new();
    for name in cfg.keys() {
        merged.insert(name.clone(), analysis.bottom());
        out.insert(name.clone(), analysis.bottom());
    }

    let mut worklist: Vec<Label> = cfg.keys().cloned().collect();
    while let Some(name) = worklist.pop() {
        let block = &cfg[&name];
        let in_b = if block.preds.is_empty() {
            analysis.entry_fact()
        } else {
            analysis.merge(block.preds.iter().map(|p| &out[p]).collect())
        };
        let new_out = analysis.transfer(&in_b, &name, block);
        merged.insert(name.clone(), in_b);
        if new_out != out[&name] {
            out.insert(name.clone(), new_out);
            for succ in &block.succs {
                worklist.push(succ.clone());
            }
        }
    }

    (merged, out)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet as Set;

    use pretty_assertions::assert_eq;

    use super::super::cfg::form_cfg;
    use super::super::ir::*;
    use super::*;

    /// Forward may-analysis collecting every label seen on some path.
    struct ReachableLabels;

    impl Dataflow for ReachableLabels {
        type Fact = Set<Label>;

        fn entry_fact(&self) -> Self::Fact {
            Set::new()
        }

        fn bottom(&self) -> Self::Fact {
            Set::new()
        }

        fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact {
            facts.into_iter().flatten().cloned().collect()
        }

        fn transfer(&self, input: &Self::Fact, label: &Label, _block: &BlockData) -> Self::Fact {
            let mut out = input.clone();
            out.insert(label.clone());
            out
        }
    }

    #[test]
    fn loops_converge() {
        let instrs = vec![
            Instruction::const_int("i", 0),
            Instruction::label("loop"),
            Instruction::br("c", "loop", "done"),
            Instruction::label("done"),
            Instruction::ret(None),
        ];
        let cfg = form_cfg(&instrs);
        let solution = solve(&ReachableLabels, &cfg);
        let expected: Set<Label> = ["b0", "loop"].map(String::from).into();
        assert_eq!(solution.output["loop"], expected);
        let expected_done: Set<Label> = ["b0", "loop", "done"].map(String::from).into();
        assert_eq!(solution.output["done"], expected_done);
    }

    #[test]
    fn backward_orientation() {
        let instrs = vec![
            Instruction::const_int("x", 1),
            Instruction::label("next"),
            Instruction::ret(None),
        ];
        let cfg = form_cfg(&instrs);
        let solution = solve_backward(&ReachableLabels, &cfg);
        // going backwards, the entry block sees everything below it
        let expected: Set<Label> = ["b0", "next"].map(String::from).into();
        assert_eq!(solution.input["b0"], expected);
        let expected_next: Set<Label> = ["next"].map(String::from).into();
        assert_eq!(solution.input["next"], expected_next);
    }
}
