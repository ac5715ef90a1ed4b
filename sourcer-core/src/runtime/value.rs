use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ops::Deref;
use std::sync::Arc;

use super::node::Node;

/// A function supplied by the host program: transforms for `|>`/`<|`,
/// predicates for `where`.
#[derive(Clone)]
pub struct HostFn(Arc<dyn Fn(Value) -> Value + Send + Sync>);

impl HostFn {
    pub fn new<F>(f: F) -> HostFn
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        HostFn(Arc::new(f))
    }

    pub fn call(&self, arg: Value) -> Value {
        (self.0)(arg)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<host fn {:#x}>", self.addr())
    }
}

/// An argument bound to a rule parameter: a rule of the same engine plus
/// the arguments (or captured locals) it runs with.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ParserRef {
    pub(crate) rule: usize,
    pub(crate) args: Arc<[Value]>,
}

impl fmt::Debug for ParserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<parser #{}>", self.rule)
    }
}

/// An immutable, shared list of values.
///
/// Dropping the last handle releases nested lists and nodes with a work
/// stack, so trees of any depth can be freed.
#[derive(Clone)]
pub struct List(Arc<[Value]>);

impl List {
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn ptr_eq(a: &List, b: &List) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const Value as usize
    }

    /// Moves the items onto `stack` when this is the only handle.
    fn take_items(&mut self, stack: &mut Vec<Value>) {
        if let Some(items) = Arc::get_mut(&mut self.0) {
            stack.extend(items.iter_mut().filter(|v| v.has_children()).map(mem::take));
        }
    }
}

impl Deref for List {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl Drop for List {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        self.take_items(&mut stack);
        release(stack);
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> List {
        List(items.into())
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> List {
        List(iter.into_iter().collect())
    }
}

/// Frees a set of values without recursing: every uniquely owned list or
/// node gives up its children to the stack before it is dropped.
pub(crate) fn release(mut stack: Vec<Value>) {
    while let Some(value) = stack.pop() {
        match value {
            Value::List(mut list) => list.take_items(&mut stack),
            Value::Node(mut node) => node.take_values(&mut stack),
            _ => {}
        }
    }
}

/// Everything a parse can produce.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(List),
    Node(Node),
    Func(HostFn),
    Parser(ParserRef),
}

impl Default for Value {
    fn default() -> Value {
        Value::None
    }
}

impl Value {
    /// Wraps a host function.
    pub fn func<F>(f: F) -> Value
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Value::Func(HostFn::new(f))
    }

    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Truthiness used by `where` predicates.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Node(_) | Value::Func(_) | Value::Parser(_) => true,
        }
    }

    /// Calls a host function value. `None` if the value is not callable.
    pub fn call(&self, arg: Value) -> Option<Value> {
        match self {
            Value::Func(f) => Some(f.call(arg)),
            _ => None,
        }
    }

    /// Cheap "did this change" test used by `transform`: nodes and lists
    /// compare by identity, everything else by value.
    pub(crate) fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Node(a), Value::Node(b)) => Node::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => List::ptr_eq(a, b),
            (a, b) => a == b,
        }
    }

    fn has_children(&self) -> bool {
        matches!(self, Value::List(_) | Value::Node(_))
    }

    /// Hash of the value as a single word. Equal values hash equally; a
    /// node hashes as the XOR of its field hashes.
    pub fn structural_hash(&self) -> u64 {
        fold_hash(vec![HashStep::Enter(self)])
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Node(_) => "node",
            Value::Func(_) => "function",
            Value::Parser(_) => "parser",
        }
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} {}", self.kind_name(), self)
    }
}

pub(crate) fn hash_u64<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut h = DefaultHasher::new();
    value.hash(&mut h);
    h.finish()
}

fn scalar_hash(value: &Value) -> u64 {
    match value {
        Value::None => hash_u64(&0u8),
        Value::Bool(b) => hash_u64(&(1u8, b)),
        Value::Int(i) => hash_u64(&(2u8, i)),
        Value::Float(f) => hash_u64(&(3u8, f.to_bits())),
        Value::Str(s) => hash_u64(&(4u8, &**s)),
        Value::Bytes(b) => hash_u64(&(5u8, &**b)),
        Value::Func(f) => hash_u64(&(8u8, f.addr())),
        Value::Parser(p) => hash_u64(&(9u8, p.rule, p.args.len())),
        Value::List(_) | Value::Node(_) => 0,
    }
}

pub(crate) enum HashStep<'a> {
    Enter(&'a Value),
    List(usize),
    Node(&'a Node),
}

/// Post-order hash over an explicit stack. Node hashes are cached on the
/// node as they are computed.
pub(crate) fn fold_hash(mut steps: Vec<HashStep<'_>>) -> u64 {
    let mut done: Vec<u64> = Vec::new();
    while let Some(step) = steps.pop() {
        match step {
            HashStep::Enter(Value::List(items)) => {
                steps.push(HashStep::List(items.len()));
                steps.extend(items.iter().rev().map(HashStep::Enter));
            }
            HashStep::Enter(Value::Node(node)) => match node.cached_hash() {
                Some(h) => done.push(h),
                None => {
                    steps.push(HashStep::Node(node));
                    steps.extend(node.values().iter().rev().map(HashStep::Enter));
                }
            },
            HashStep::Enter(value) => done.push(scalar_hash(value)),
            HashStep::List(len) => {
                let mut h = DefaultHasher::new();
                (6u8, len).hash(&mut h);
                for item in done.drain(done.len() - len..) {
                    h.write_u64(item);
                }
                done.push(h.finish());
            }
            HashStep::Node(node) => {
                let len = node.values().len();
                let h = done.drain(done.len() - len..).fold(0, |acc, x| acc ^ x);
                node.cache_hash(h);
                done.push(h);
            }
        }
    }
    done.pop().unwrap_or(0)
}

/// Structural equality over an explicit stack of pairs.
pub(crate) fn eq_pairs<'a>(mut pairs: Vec<(&'a Value, &'a Value)>) -> bool {
    while let Some(pair) = pairs.pop() {
        match pair {
            (Value::List(a), Value::List(b)) => {
                if List::ptr_eq(a, b) {
                    continue;
                }
                if a.len() != b.len() {
                    return false;
                }
                pairs.extend(a.iter().zip(b.iter()));
            }
            (Value::Node(a), Value::Node(b)) => {
                if Node::ptr_eq(a, b) {
                    continue;
                }
                if !a.same_type(b) {
                    return false;
                }
                pairs.extend(a.values().iter().zip(b.values()));
            }
            (Value::None, Value::None) => {}
            (Value::Bool(a), Value::Bool(b)) if a == b => {}
            (Value::Int(a), Value::Int(b)) if a == b => {}
            (Value::Float(a), Value::Float(b)) if a.to_bits() == b.to_bits() => {}
            (Value::Str(a), Value::Str(b)) if a == b => {}
            (Value::Bytes(a), Value::Bytes(b)) if a == b => {}
            (Value::Func(a), Value::Func(b)) if a.addr() == b.addr() => {}
            (Value::Parser(a), Value::Parser(b)) if a == b => {}
            _ => return false,
        }
    }
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        eq_pairs(vec![(self, other)])
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

pub(crate) enum Piece<'a> {
    Value(&'a Value),
    Node(&'a Node),
    Text(&'static str),
}

/// Writes values without recursing into nested lists and nodes.
pub(crate) fn write_pieces(f: &mut fmt::Formatter<'_>, mut pieces: Vec<Piece<'_>>) -> fmt::Result {
    fn push_items<'a>(pieces: &mut Vec<Piece<'a>>, items: &'a [Value], close: &'static str) {
        pieces.push(Piece::Text(close));
        for (i, item) in items.iter().enumerate().rev() {
            pieces.push(Piece::Value(item));
            if i > 0 {
                pieces.push(Piece::Text(", "));
            }
        }
    }

    while let Some(piece) = pieces.pop() {
        match piece {
            Piece::Text(text) => f.write_str(text)?,
            Piece::Node(node) => {
                write!(f, "{}(", node.type_name())?;
                push_items(&mut pieces, node.values(), ")");
            }
            Piece::Value(Value::Node(node)) => pieces.push(Piece::Node(node)),
            Piece::Value(Value::List(items)) => {
                f.write_str("[")?;
                push_items(&mut pieces, items, "]");
            }
            Piece::Value(Value::None) => f.write_str("None")?,
            Piece::Value(Value::Bool(b)) => write!(f, "{}", b)?,
            Piece::Value(Value::Int(i)) => write!(f, "{}", i)?,
            Piece::Value(Value::Float(x)) => write!(f, "{:?}", x)?,
            Piece::Value(Value::Str(s)) => write!(f, "{:?}", &**s)?,
            Piece::Value(Value::Bytes(b)) => {
                f.write_str("b\"")?;
                for &byte in b.iter() {
                    for c in std::ascii::escape_default(byte) {
                        write!(f, "{}", c as char)?;
                    }
                }
                f.write_str("\"")?
            }
            Piece::Value(Value::Func(func)) => write!(f, "{:?}", func)?,
            Piece::Value(Value::Parser(p)) => write!(f, "{:?}", p)?,
        }
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pieces(f, vec![Piece::Value(self)])
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s.into())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::Bytes(b.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Value {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Value {
        Value::Node(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::List(items.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map_or(Value::None, Into::into)
    }
}
