//! Grammar front-end: description text to `Grammar`.

mod lexer;
mod parser;

use crate::error::GrammarError;
use crate::grammar::Grammar;

/// Constructors that can be called by name inside a grammar. No rule may
/// use one of these names.
pub const BUILTINS: &[&str] = &[
    "Opt", "List", "Some", "Sep", "Expect", "ExpectNot", "Longest", "Skip", "Choice", "Seq", "Fail",
];

/// Parses a grammar description.
pub fn parse_grammar(text: &str) -> Result<Grammar, GrammarError> {
    let tokens = lexer::tokenize(text)?;
    parser::Parser::new(tokens).grammar()
}
