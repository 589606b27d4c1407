//! Run construction: contiguous groups of same-opcode, independent,
//! vectorizable arithmetic.

use super::super::ir::{Instruction, Op, Var, VECTOR_LANE_WIDTH};

/// Indices (into the block) of a run's member instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    pub op: Op,
    pub members: Vec<usize>,
}

/// `add`/`sub`/`mul` only: packing a `div` could materialize a division
/// by zero in a lane the scalar program never executes.
pub fn packable(instr: &Instruction) -> bool {
    matches!(instr.op(), Some(Op::Add) | Some(Op::Sub) | Some(Op::Mul))
        && instr.dest().is_some()
        && instr.args().len() == 2
}

fn mentions_any(instr: &Instruction, dests: &[&Var]) -> bool {
    instr
        .args()
        .iter()
        .any(|arg| dests.iter().any(|d| *d == arg))
        || instr
            .dest()
            .map(|d| dests.iter().any(|m| *m == d))
            .unwrap_or(false)
}

/// Scan one block.  A run ends at a store (alias barrier), at an
/// instruction touching a member's destination, at an opcode change, or
/// at the lane width.
pub fn build_runs(instrs: &[Instruction]) -> Vec<Run> {
    let mut runs: Vec<Run> = vec![];
    let mut current: Vec<usize> = vec![];
    let mut current_op: Option<Op> = None;

    let close = |current: &mut Vec<usize>, current_op: &mut Option<Op>, runs: &mut Vec<Run>| {
        if current.len() >= 2 {
            runs.push(Run {
                op: current_op.unwrap(),
                members: std::mem::take(current),
            });
        } else {
            current.clear();
        }
        *current_op = None;
    };

    for (i, instr) in instrs.iter().enumerate() {
        let member_dests: Vec<&Var> = current
            .iter()
            .map(|m| instrs[*m].dest().unwrap())
            .collect();

        if instr.is_store() {
            close(&mut current, &mut current_op, &mut runs);
            continue;
        }
        let dependent = mentions_any(instr, &member_dests);
        if dependent {
            close(&mut current, &mut current_op, &mut runs);
        }
        if packable(instr) {
            let fits = current_op == instr.op() && current.len() < VECTOR_LANE_WIDTH;
            if current.is_empty() {
                current.push(i);
                current_op = instr.op();
            } else if fits && !dependent {
                current.push(i);
            } else {
                close(&mut current, &mut current_op, &mut runs);
                current.push(i);
                current_op = instr.op();
            }
        }
    }
    close(&mut current, &mut current_op, &mut runs);
    runs
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::super::ir::Type;
    use super::*;

    fn add(d: &str, a: &str, b: &str) -> Instruction {
        Instruction::binop(Op::Add, d, Type::Int, a, b)
    }

    #[test]
    fn eight_adds_make_two_runs() {
        let instrs: Vec<Instruction> = (0..8)
            .map(|k| add(&format!("d{k}"), &format!("a{k}"), &format!("b{k}")))
            .collect();
        let runs = build_runs(&instrs);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].members, vec![0, 1, 2, 3]);
        assert_eq!(runs[1].members, vec![4, 5, 6, 7]);
    }

    #[test]
    fn dependency_ends_a_run() {
        let instrs = vec![
            add("d0", "a0", "b0"),
            add("d1", "a1", "b1"),
            add("d2", "d0", "b2"),
            add("d3", "a3", "b3"),
        ];
        let runs = build_runs(&instrs);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].members, vec![0, 1]);
        assert_eq!(runs[1].members, vec![2, 3]);
    }

    #[test]
    fn opcode_change_and_div_exclusion() {
        let instrs = vec![
            add("d0", "a0", "b0"),
            add("d1", "a1", "b1"),
            Instruction::binop(Op::Mul, "m0", Type::Int, "a2", "b2"),
            Instruction::binop(Op::Mul, "m1", Type::Int, "a3", "b3"),
            Instruction::binop(Op::Div, "q0", Type::Int, "a4", "b4"),
            Instruction::binop(Op::Div, "q1", Type::Int, "a5", "b5"),
        ];
        let runs = build_runs(&instrs);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].op, Op::Add);
        assert_eq!(runs[1].op, Op::Mul);
    }

    #[test]
    fn store_is_a_barrier() {
        let mut instrs = vec![add("d0", "a0", "b0"), add("d1", "a1", "b1")];
        instrs.push(Instruction::Code(super::super::super::ir::Code {
            op: Op::Store,
            dest: None,
            typ: None,
            args: vec!["p".into(), "d0".into()],
            funcs: vec![],
            labels: vec![],
            value: None,
        }));
        instrs.push(add("d2", "a2", "b2"));
        instrs.push(add("d3", "a3", "b3"));
        let runs = build_runs(&instrs);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].members, vec![0, 1]);
        assert_eq!(runs[1].members, vec![3, 4]);
    }
}
