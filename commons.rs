//! Shared plumbing used by every pass: the `Valid` wrapper for programs
//! that survived validation, validation diagnostics, and the fresh-name
//! supply that passes thread through instead of keeping global counters.

use std::collections::BTreeMap as Map;

use derive_more::Display;

/// A witness that the wrapped value passed structural validation.
///
/// Passes take and return `Valid<Program>` so that a malformed program is
/// caught at the pass boundary where it was produced.
pub struct Valid<T>(pub T);

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum ValidationError {
    #[display(fmt = "duplicate function {}", _0)]
    DuplicateFunction(String),
    #[display(fmt = "program has no functions")]
    EmptyProgram,
    #[display(fmt = "function {}: unknown label {} referenced", func, label)]
    UnknownLabel { func: String, label: String },
    #[display(fmt = "function {}: {} expects {} label(s), got {}", func, op, want, got)]
    LabelArity {
        func: String,
        op: String,
        want: usize,
        got: usize,
    },
    #[display(fmt = "function {}: {} expects {} argument(s), got {}", func, op, want, got)]
    ArgArity {
        func: String,
        op: String,
        want: usize,
        got: usize,
    },
    #[display(fmt = "function {}: const {} has no value", func, dest)]
    MissingValue { func: String, dest: String },
    #[display(fmt = "function {}: definition of {} has no type", func, dest)]
    MissingType { func: String, dest: String },
    #[display(fmt = "function {}: phi into {} has {} args but {} labels", func, dest, args, labels)]
    PhiArity {
        func: String,
        dest: String,
        args: usize,
        labels: usize,
    },
    #[display(fmt = "function {}: {} is used but never defined", func, var)]
    UndefinedVariable { func: String, var: String },
    #[display(fmt = "function {}: {} is defined more than once under an SSA claim", func, var)]
    NotSsa { func: String, var: String },
}

impl std::error::Error for ValidationError {}

/// Fresh-name counters, one per prefix.  A pass owns its supply for the
/// duration of the pass; counters are monotone within a run so output is
/// reproducible.
#[derive(Clone, Debug, Default)]
pub struct NameSupply {
    counters: Map<String, u64>,
}

impl NameSupply {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, key: &str) -> u64 {
        let n = self.counters.entry(key.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    /// `base.N` names, used for synthesized labels.
    pub fn dotted(&mut self, base: &str) -> String {
        let n = self.bump(base);
        format!("{base}.{n}")
    }

    /// `base_N` names, used for synthesized variables.
    pub fn suffixed(&mut self, base: &str) -> String {
        let n = self.bump(base);
        format!("{base}_{n}")
    }
}

/// Minimal flag scanning for the bin entry points.
pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Value of `--flag value`, if present.
pub fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
