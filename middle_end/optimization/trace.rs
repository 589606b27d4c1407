//! Ahead-of-time trace optimization.
//!
//! Given a recorded straight-line trace, splice a speculative fast path at
//! the trace entry: `speculate`, the traced instructions with every
//! branch turned into a `guard` on its (possibly negated) condition,
//! `commit`, and a jump past the traced region.  Guard failure resumes at
//! the original code, which stays in place behind the bailout label.
//! Traces touching memory or I/O are rejected unchanged.

use serde::{Deserialize, Serialize};

use log::debug;

use crate::commons::{NameSupply, Valid};

use super::super::ir::{Instruction, Op, Program, Type};
use super::lvn::lvn;

/// One recorded step: the instruction, and for a `br` whether the trace
/// took the true arm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceStep {
    pub instr: Instruction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trace {
    pub start_func: String,
    pub start_offset: usize,
    pub end_func: String,
    pub end_offset: usize,
    pub instrs: Vec<TraceStep>,
}

/// Build the speculative body, or `None` when the trace is unfit.
fn trace_body(
    trace: &Trace,
    bailout: &str,
    resume: &str,
    supply: &mut NameSupply,
) -> Option<Vec<Instruction>> {
    let mut body = vec![Instruction::speculate()];
    for step in &trace.instrs {
        let instr = &step.instr;
        if instr.is_label() || instr.is(Op::Jmp) {
            continue;
        }
        if instr.is_mem() || instr.is_print() {
            debug!("trace: rejected, contains memory or I/O");
            return None;
        }
        if instr.is(Op::Br) {
            let cond = instr.args()[0].clone();
            let guarded = match step.branch {
                Some(true) | None => cond,
                Some(false) => {
                    // the trace fell through the false arm: guard on the
                    // negated condition
                    let negated = supply.suffixed("trace.not");
                    body.push(Instruction::unop(Op::Not, negated.clone(), Type::Bool, cond));
                    negated
                }
            };
            body.push(Instruction::guard(guarded, bailout.to_string()));
            continue;
        }
        if instr.is(Op::Ret) {
            // a trace must stay inside the function
            return None;
        }
        body.push(instr.clone());
    }
    body.push(Instruction::commit());
    body.push(Instruction::jmp(resume.to_string()));
    Some(body)
}

fn touches_float(trace: &Trace) -> bool {
    trace.instrs.iter().any(|step| step.instr.touches_float())
}

/// The actual pass.  On any structural mismatch the original program is
/// returned unchanged.
pub fn trace_opt(program: Valid<Program>, trace: &Trace) -> Valid<Program> {
    if trace.start_func != trace.end_func {
        debug!("trace: rejected, spans functions");
        return program;
    }
    let mut supply = NameSupply::new();
    let bailout = supply.dotted("trace.bailout");
    let resume = supply.dotted("trace.resume");

    let Some(body) = trace_body(trace, &bailout, &resume, &mut supply) else {
        return program;
    };

    let mut modified = program.0;
    let fits = modified
        .get_function(&trace.start_func)
        .map(|f| trace.start_offset <= trace.end_offset && trace.end_offset <= f.instrs.len())
        .unwrap_or(false);
    if !fits {
        debug!("trace: rejected, offsets do not fit {}", trace.start_func);
        return modified.validate().expect("program was valid");
    }
    {
        let func = modified.get_function_mut(&trace.start_func).unwrap();
        // resume point first (later offset), then the speculative body
        func.instrs
            .insert(trace.end_offset, Instruction::label(resume.clone()));
        let mut splice = body;
        splice.push(Instruction::label(bailout.clone()));
        func.instrs
            .splice(trace.start_offset..trace.start_offset, splice);
    }

    let validated = modified.validate().expect("trace splice produced malformed IR");
    if touches_float(trace) {
        // float arithmetic is not re-associated through value numbering
        validated
    } else {
        lvn(validated)
    }
}
