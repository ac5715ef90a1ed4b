//! Packrat parser generator.
//!
//! A grammar is a list of rules written in a small PEG notation. It can be
//! turned into a parser at runtime with a [`Generator`], or at compile time
//! with the [`grammar!`] macro, which checks the grammar while the crate is
//! being built and wraps the generated [`Engine`] in a module.
//!
//! ```
//! sourcer::grammar! {
//!     %module calc;
//!     %grammar r#"
//!         start = Int with {
//!             left "*" | "/"
//!             left "+" | "-"
//!         }
//!         Int = /[0-9]+/ |> `int`
//!         ignore /\s+/
//!     "#;
//! }
//!
//! fn main() {
//!     let tree = calc::parse("1 + 2 * 3").unwrap();
//!     assert_eq!(tree.to_string(), r#"Infix(1, "+", Infix(2, "*", 3))"#);
//! }
//! ```
//!
//! Results are [`Value`]s: strings, byte strings, numbers, lists and AST
//! [`Node`]s. Nodes are immutable, compare structurally and carry the
//! [`PositionInfo`] of the text they were parsed from.
//!
//! Rust expressions between backquotes are host snippets. The macro
//! registers every snippet it finds; a closure or a path becomes a function
//! applied to its operand, anything else a constant. `%host` and `%const`
//! name them explicitly, and `%include` adds items to the generated module.

extern crate self as sourcer;

pub use sourcer_core::*;

#[doc(hidden)]
pub use sourcer_impl::grammar_impl as __grammar_impl;

/// Generates a module holding a parser.
///
/// Declarations:
///
/// * `%grammar "text";` the grammar. Required.
/// * `%module name;` the name of the module, `grammar` by default.
/// * `%extends path;` the module of the grammar this one extends.
/// * `%host name = expr;` a function value for the snippet `name`.
/// * `%const name = expr;` any other value: constants, repetition bounds.
/// * `%include { items }` Rust items to put in the module.
///
/// The module exposes `engine()`, `parse()`, `parse_with()` and, for every
/// public rule `R`, `rules::parse_R()`.
#[macro_export]
macro_rules! grammar {
    ($($body:tt)*) => {
        $crate::__grammar_impl! { $($body)* }
    };
}

#[cfg(test)]
mod tests;
