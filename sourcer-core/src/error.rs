use thiserror::Error;

use crate::runtime::{Position, Value};

/// Errors detected while turning a grammar description into an engine.
///
/// Any of these aborts generation: no partially generated engine is ever
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("Syntax error on line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Expected one or more grammar rules.")]
    NoRules,

    #[error(
        "Grammar rule names must start with a letter. Found a rule that starts \
         with an underscore: \"{0}\"."
    )]
    UnderscoreName(String),

    #[error("The name \"{0}\" is reserved for a built-in expression and cannot name a rule.")]
    ReservedName(String),

    #[error("Each grammar rule must have a unique name. Found two or more rules named \"{0}\".")]
    DuplicateRule(String),

    #[error("The \"{0}\" rule must not have the \"ignore\" modifier.")]
    IgnoredStartRule(String),

    #[error("The rule \"{rule}\" refers to \"{name}\", which is not defined.")]
    UndefinedRule { rule: String, name: String },

    #[error("The rule \"{name}\" expects {expected} argument(s), but {found} were given in \"{rule}\".")]
    Arity {
        rule: String,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown host value `{0}`. Register it with the generator before generating.")]
    UnknownHost(String),

    #[error("The repetition bound \"{name}\" must be a non-negative integer, found {found}.")]
    BoundType { name: String, found: String },

    #[error("Invalid regular expression /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("The grammar extends \"{0}\", but no parent engine was given to the generator.")]
    MissingParent(String),

    #[error("The grammar extends \"{expected}\", but the parent engine is \"{found}\".")]
    ParentMismatch { expected: String, found: String },
}

/// A total parse failure: no alternative matched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

/// The input starts with a valid document, but does not end with it.
///
/// Only raised for full parses. The successfully parsed prefix is kept in
/// `partial_result`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Incomplete parse. Unexpected input on line {}, column {}:\n{excerpt}",
    last_position.line,
    last_position.column
)]
pub struct PartialParseError {
    pub partial_result: Value,
    pub last_position: Position,
    pub excerpt: String,
}

/// Common error type of every parse entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Partial(#[from] PartialParseError),
}

impl InputError {
    /// The position the error is reported at.
    pub fn position(&self) -> Position {
        match self {
            InputError::Parse(e) => e.position,
            InputError::Partial(e) => e.last_position,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, InputError::Partial(_))
    }
}
