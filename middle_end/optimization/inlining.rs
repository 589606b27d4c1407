//! Function inlining.
//!
//! The call graph is walked callees-before-callers; whatever remains of a
//! strongly connected component (self or mutual recursion) is skipped.
//! Each call site gets a private copy of the callee with every name and
//! label suffixed by a per-site counter, all returns funneled through one
//! exit label, arguments bound with copies before the body and the result
//! bound after it.

use std::collections::BTreeSet as Set;

use log::debug;

use crate::commons::Valid;

use super::super::ir::{Function, Instruction, Label, Op, Program, Type, Var};

/// (callee, caller) edges over direct calls.
pub fn call_graph(program: &Program) -> (Vec<String>, Vec<(String, String)>) {
    let mut vertices = vec![];
    let mut edges = vec![];
    for func in &program.functions {
        vertices.push(func.name.clone());
        for instr in &func.instrs {
            if instr.is_call() {
                let callee = instr.as_code().unwrap().funcs[0].clone();
                edges.push((callee, func.name.clone()));
            }
        }
    }
    (vertices, edges)
}

/// Topological order with callees first.  Vertices left over when no
/// progress can be made form cycles and are dropped.
pub fn topological_sort(
    mut vertices: Vec<String>,
    mut edges: Vec<(String, String)>,
) -> Vec<String> {
    let mut order = vec![];
    loop {
        let next = vertices
            .iter()
            .position(|v| !edges.iter().any(|(_, caller)| caller == v));
        match next {
            Some(at) => {
                let vertex = vertices.remove(at);
                edges.retain(|(callee, _)| *callee != vertex);
                order.push(vertex);
            }
            None => break,
        }
        if vertices.is_empty() {
            break;
        }
    }
    if !vertices.is_empty() {
        debug!("inline: skipping recursive component {vertices:?}");
    }
    order
}

fn suffix_var(var: &Var, site: u64) -> Var {
    format!("{var}_{site}_inlined")
}

fn suffix_label(label: &Label, site: u64) -> Label {
    format!("{label}.inlined.{site}")
}

/// Rename every destination, argument, label and parameter in the copied
/// callee so nothing collides with the caller.
fn mangle(callee: &mut Function, site: u64) {
    for instr in &mut callee.instrs {
        match instr {
            Instruction::Label { label } => *label = suffix_label(label, site),
            Instruction::Code(code) => {
                if let Some(dest) = &code.dest {
                    code.dest = Some(suffix_var(dest, site));
                }
                for arg in code.args.iter_mut() {
                    *arg = suffix_var(arg, site);
                }
                for label in code.labels.iter_mut() {
                    *label = suffix_label(label, site);
                }
            }
        }
    }
    for param in &mut callee.args {
        param.name = suffix_var(&param.name, site);
    }
}

/// Reroute every `ret` through a single exit label, storing the returned
/// value in `ret_var`.  Returns whether any value-carrying `ret` existed.
fn add_unique_exit(callee: &mut Function, exit_label: &Label, ret_var: &Var) -> bool {
    let ret_type = callee.typ.clone().unwrap_or(Type::Int);
    let mut has_ret_value = false;
    let mut rerouted = vec![];
    for instr in callee.instrs.drain(..) {
        if instr.is(Op::Ret) {
            if let Some(arg) = instr.args().first() {
                rerouted.push(Instruction::id(ret_var.clone(), ret_type.clone(), arg.clone()));
                has_ret_value = true;
            }
            rerouted.push(Instruction::jmp(exit_label.clone()));
        } else {
            rerouted.push(instr);
        }
    }
    rerouted.push(Instruction::label(exit_label.clone()));
    callee.instrs = rerouted;
    has_ret_value
}

struct SiteCounter(u64);

impl SiteCounter {
    fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Inline every direct call to `callee` inside `caller`.
fn inline_into(callee: &Function, caller: &mut Function, counter: &mut SiteCounter) {
    let mut spliced: Vec<Instruction> = vec![];
    for instr in caller.instrs.drain(..) {
        let is_site = instr.is_call()
            && instr.as_code().map(|c| c.funcs.first() == Some(&callee.name)).unwrap_or(false);
        if !is_site {
            spliced.push(instr);
            continue;
        }

        let site = counter.next();
        let mut body = callee.clone();
        mangle(&mut body, site);

        let exit_label = format!("return.loc.{site}");
        let ret_var = format!("return_var_{site}");
        let has_ret_value = add_unique_exit(&mut body, &exit_label, &ret_var);

        let call = instr.as_code().unwrap();
        debug!("inline: splicing {} into {} (site {site})", callee.name, caller.name);

        // bind arguments to the renamed parameters
        for (param, arg) in body.args.iter().zip(&call.args) {
            spliced.push(Instruction::id(
                param.name.clone(),
                param.typ.clone(),
                arg.clone(),
            ));
        }
        spliced.extend(body.instrs);
        // bind the result where the caller expects it
        if has_ret_value {
            if let (Some(dest), Some(typ)) = (&call.dest, &call.typ) {
                spliced.push(Instruction::id(dest.clone(), typ.clone(), ret_var));
            }
        }
    }
    caller.instrs = spliced;
}

/// The actual pass: inline along the call graph, callees first.
pub fn inline(program: Valid<Program>) -> Valid<Program> {
    let mut program = program.0;
    let (vertices, edges) = call_graph(&program);
    let order = topological_sort(vertices, edges.clone());
    let mut counter = SiteCounter(0);

    for callee_name in order {
        let callers: Set<String> = edges
            .iter()
            .filter(|(callee, _)| *callee == callee_name)
            .map(|(_, caller)| caller.clone())
            .collect();
        for caller_name in callers {
            if caller_name == callee_name {
                continue;
            }
            let Some(callee) = program.get_function(&callee_name).cloned() else {
                continue; // call into an external function
            };
            if let Some(caller) = program.get_function_mut(&caller_name) {
                inline_into(&callee, caller, &mut counter);
            }
        }
    }
    program.validate().expect("inlining produced malformed IR")
}
