//! Available expressions: which pure expressions have already been
//! computed on every path into a block.  The lattice runs the other way
//! round from the may-analyses: merge is intersection.

use std::collections::BTreeSet as Set;
use std::fmt::Write;

use crate::commons::Valid;

use super::super::cfg::{form_cfg, BlockData};
use super::super::dataflow::{solve, Dataflow, Solution};
use super::super::ir::{Instruction, Label, Op, Program, Var};

/// An expression tuple: the operator plus its argument variables in order.
pub type Expr = (Op, Vec<Var>);

/// The pure operators that generate availability.
fn generates(op: Op) -> bool {
    op.is_core_binop() || op.is_core_unop()
}

pub fn instr_to_expr(instr: &Instruction) -> Option<Expr> {
    let code = instr.as_code()?;
    if generates(code.op) {
        Some((code.op, code.args.clone()))
    } else {
        None
    }
}

pub fn expr_to_string(expr: &Expr) -> String {
    let (op, args) = expr;
    match op {
        Op::Add => format!("({} + {})", args[0], args[1]),
        Op::Sub => format!("({} - {})", args[0], args[1]),
        Op::Mul => format!("({} * {})", args[0], args[1]),
        Op::Div => format!("({} / {})", args[0], args[1]),
        Op::Eq => format!("({} == {})", args[0], args[1]),
        Op::Lt => format!("({} < {})", args[0], args[1]),
        Op::Gt => format!("({} > {})", args[0], args[1]),
        Op::Le => format!("({} <= {})", args[0], args[1]),
        Op::Ge => format!("({} >= {})", args[0], args[1]),
        Op::And => format!("({} && {})", args[0], args[1]),
        Op::Or => format!("({} || {})", args[0], args[1]),
        Op::Not => format!("(not {})", args[0]),
        _ => format!("({op} {})", args.join(" ")),
    }
}

pub struct AvailableExprs;

impl Dataflow for AvailableExprs {
    type Fact = Set<Expr>;

    fn entry_fact(&self) -> Self::Fact {
        Set::new()
    }

    fn bottom(&self) -> Self::Fact {
        Set::new()
    }

    fn merge(&self, facts: Vec<&Self::Fact>) -> Self::Fact {
        let mut iter = facts.into_iter();
        let Some(first) = iter.next() else {
            return Set::new();
        };
        let mut out = first.clone();
        for f in iter {
            out = out.intersection(f).cloned().collect();
        }
        out
    }

    fn transfer(&self, input: &Self::Fact, _label: &Label, block: &BlockData) -> Self::Fact {
        let mut avail = input.clone();
        for instr in &block.instrs {
            if let Some(expr) = instr_to_expr(instr) {
                avail.insert(expr);
            }
            // a write invalidates every expression mentioning the variable
            if let Some(dest) = instr.dest() {
                avail.retain(|(_, args)| !args.contains(dest));
            }
        }
        avail
    }
}

pub fn analyze(program: &Valid<Program>, func: &str) -> Solution<Set<Expr>> {
    let f = program
        .0
        .get_function(func)
        .unwrap_or_else(|| panic!("unknown function {func}"));
    let cfg = form_cfg(&f.instrs);
    solve(&AvailableExprs, &cfg)
}

pub fn report(program: &Valid<Program>) -> String {
    let mut out = String::new();
    for func in &program.0.functions {
        let solution = analyze(program, &func.name);
        writeln!(out, "Function: {}", func.name).unwrap();
        for (title, side) in [("In:", &solution.input), ("Out:", &solution.output)] {
            writeln!(out, "{title}").unwrap();
            for (block, exprs) in side {
                if exprs.is_empty() {
                    writeln!(out, "\t{block}: No Available Expressions.").unwrap();
                } else {
                    for expr in exprs {
                        writeln!(out, "\t{block}: {} is available.", expr_to_string(expr)).unwrap();
                    }
                }
            }
        }
    }
    out
}
