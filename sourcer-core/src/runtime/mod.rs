//! Runtime support library shared by every generated engine.
//!
//! Everything in here is grammar independent: AST values and nodes, the
//! trampoline that executes compiled rules, line/column mapping, excerpts
//! and tree traversal.

mod node;
mod position;
mod traverse;
mod value;
pub(crate) mod vm;

pub use node::{Node, NodeType};
pub use position::{extract_excerpt, LineMap, Position, PositionInfo};
pub use traverse::{transform, traverse, visit, Field, Traversal};
pub use value::{HostFn, List, ParserRef, Value};

pub(crate) use position::error_title;

/// The buffer a parse runs over. Positions are byte offsets in both cases.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> Input<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            Input::Text(s) => s.as_bytes(),
            Input::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wraps a matched slice in the value type that fits this input.
    pub(crate) fn slice_value(&self, from: usize, to: usize) -> Value {
        match *self {
            Input::Text(s) => match s.get(from..to) {
                Some(sub) => Value::from(sub),
                None => Value::from(String::from_utf8_lossy(&s.as_bytes()[from..to]).as_ref()),
            },
            Input::Bytes(b) => Value::Bytes(b[from..to].into()),
        }
    }
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(s: &'a str) -> Self {
        Input::Text(s)
    }
}

impl<'a> From<&'a String> for Input<'a> {
    fn from(s: &'a String) -> Self {
        Input::Text(s)
    }
}

impl<'a> From<&'a [u8]> for Input<'a> {
    fn from(b: &'a [u8]) -> Self {
        Input::Bytes(b)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Input<'a> {
    fn from(b: &'a [u8; N]) -> Self {
        Input::Bytes(b)
    }
}

impl<'a> From<&'a Vec<u8>> for Input<'a> {
    fn from(b: &'a Vec<u8>) -> Self {
        Input::Bytes(b)
    }
}
