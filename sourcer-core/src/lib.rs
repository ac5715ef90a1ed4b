//! Core of the `sourcer` parser generator.
//!
//! A grammar description goes through four stages: the front-end parses it
//! into a [`Grammar`], analysis checks it and binds every reference, code
//! generation lowers it to a [`Program`], and an [`Engine`] runs that
//! program on the trampoline in [`runtime`].
//!
//! Use the `sourcer` crate instead of this one: it re-exports everything
//! here and adds the `grammar!` macro.

pub mod analysis;
pub mod codegen;
mod config;
mod engine;
mod error;
pub mod expr;
pub mod frontend;
pub mod grammar;
mod host;
mod optable;
pub mod runtime;

pub use analysis::{analyze, summarize, Analysis, AnalysisOptions, Definition, Summary};
pub use codegen::{generate, Program};
pub use config::ParseOptions;
pub use engine::{Engine, Generator, Parsed, RuleParser};
pub use error::{GrammarError, InputError, ParseError, PartialParseError};
pub use frontend::parse_grammar;
pub use grammar::Grammar;
pub use host::HostFunctions;
pub use runtime::{
    extract_excerpt, transform, traverse, visit, Field, HostFn, Input, LineMap, List, Node, NodeType, ParserRef, Position,
    PositionInfo, Traversal, Value,
};
