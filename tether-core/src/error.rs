//! Error types.
//!
//! Every error in this crate is raised while a path is being built.
//! Once a `PathTracker` exists, tracking itself has no recoverable error
//! states.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or validating attribute paths.
#[derive(Error, Debug)]
pub enum Error {
    /// The path text could not be tokenized or parsed.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// The expression contains something other than a chained attribute read.
    #[error("unsupported path shape `{expression}`: {reason}")]
    UnsupportedPathShape { expression: String, reason: String },

    /// The attribute is missing, write-only or abstract on a concrete type.
    #[error("invalid attribute `{attribute}` on `{type_name}`: {reason}")]
    InvalidAttribute {
        type_name: String,
        attribute: String,
        reason: String,
    },

    /// One or more segments cannot be observed.
    #[error("{}", render_problems(.path, .problems))]
    PathValidationFailed {
        path: String,
        problems: Vec<SegmentProblem>,
    },

    /// An instance was handed to an accessor declared on an unrelated type.
    #[error("cannot read `{attribute}` declared on `{expected}` from an instance of `{found}`")]
    InvalidCast {
        expected: String,
        found: String,
        attribute: String,
    },

    /// A tracker was constructed for a segment that cannot be observed.
    #[error("cannot track segment {position} (`{attribute}` on `{type_name}`): {reason}")]
    InvalidTracker {
        position: usize,
        type_name: String,
        attribute: String,
        reason: String,
    },

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Why a single path segment failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// The declaring type is copied by value, so replacements are invisible.
    ValueType,
    /// The declaring type never raises attribute-changed events.
    NotNotifying,
}

/// A single offending segment inside a `PathValidationFailed` error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProblem {
    /// 1-based position of the segment in the path.
    pub position: usize,
    pub attribute: String,
    pub type_name: String,
    pub kind: ProblemKind,
}

impl fmt::Display for SegmentProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            ProblemKind::ValueType => "is declared on a value type; copies never observe replacement",
            ProblemKind::NotNotifying => "is declared on a type that does not support change notification",
        };
        write!(
            f,
            "segment {} (`{}` on `{}`) {}",
            self.position, self.attribute, self.type_name, reason
        )
    }
}

fn render_problems(path: &str, problems: &[SegmentProblem]) -> String {
    let mut message = format!("path `{path}` cannot be tracked:");
    for problem in problems {
        message.push_str("\n  - ");
        message.push_str(&problem.to_string());
    }
    message
}
