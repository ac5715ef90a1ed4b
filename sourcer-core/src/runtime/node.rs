use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::{Arc, OnceLock};

use once_cell::sync::Lazy;

use super::position::PositionInfo;
use super::value::{eq_pairs, fold_hash, release, write_pieces, HashStep, Piece, Value};

/// Name and ordered field list of a kind of AST node.
///
/// Classes declared in a grammar get one of these each; the operator-table
/// results use the three built-in types.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct NodeType {
    pub name: String,
    pub fields: Vec<String>,
}

static INFIX: Lazy<Arc<NodeType>> = Lazy::new(|| NodeType::new("Infix", &["left", "operator", "right"]));
static PREFIX: Lazy<Arc<NodeType>> = Lazy::new(|| NodeType::new("Prefix", &["operator", "right"]));
static POSTFIX: Lazy<Arc<NodeType>> = Lazy::new(|| NodeType::new("Postfix", &["left", "operator"]));

impl NodeType {
    pub fn new(name: &str, fields: &[&str]) -> Arc<NodeType> {
        Arc::new(NodeType {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    pub fn infix() -> Arc<NodeType> {
        INFIX.clone()
    }

    pub fn prefix() -> Arc<NodeType> {
        PREFIX.clone()
    }

    pub fn postfix() -> Arc<NodeType> {
        POSTFIX.clone()
    }

    fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

struct NodeData {
    ty: Arc<NodeType>,
    values: Vec<Value>,
    span: Option<(usize, usize)>,
    position: OnceLock<PositionInfo>,
    hash: OnceLock<u64>,
}

impl Drop for NodeData {
    fn drop(&mut self) {
        if self.values.iter().any(|v| matches!(v, Value::List(_) | Value::Node(_))) {
            release(mem::take(&mut self.values));
        }
    }
}

/// An immutable, shared AST node.
///
/// Cloning a `Node` clones a handle. Two nodes are equal when they have the
/// same type name and equal fields; `Node::ptr_eq` tells distinct instances
/// apart.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl Node {
    /// Builds a node. Missing trailing fields are filled with `Value::None`
    /// and extra values are dropped.
    pub fn new(ty: Arc<NodeType>, mut values: Vec<Value>) -> Node {
        values.resize(ty.fields.len(), Value::None);
        Node(Arc::new(NodeData {
            ty,
            values,
            span: None,
            position: OnceLock::new(),
            hash: OnceLock::new(),
        }))
    }

    pub(crate) fn with_span(ty: Arc<NodeType>, values: Vec<Value>, start: usize, end: usize) -> Node {
        let mut node = Node::new(ty, values);
        if let Some(data) = Arc::get_mut(&mut node.0) {
            data.span = Some((start, end));
        }
        node
    }

    pub fn infix(left: Value, operator: Value, right: Value) -> Node {
        Node::new(NodeType::infix(), vec![left, operator, right])
    }

    pub fn prefix(operator: Value, right: Value) -> Node {
        Node::new(NodeType::prefix(), vec![operator, right])
    }

    pub fn postfix(left: Value, operator: Value) -> Node {
        Node::new(NodeType::postfix(), vec![left, operator])
    }

    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.0.ty
    }

    pub fn type_name(&self) -> &str {
        &self.0.ty.name
    }

    /// Field values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.0.values
    }

    /// `(name, value)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.ty.fields.iter().map(String::as_str).zip(self.0.values.iter())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.ty.index_of(field).map(|i| &self.0.values[i])
    }

    /// Start and end of the node in the input, once the parse that built it
    /// has finished successfully.
    pub fn position_info(&self) -> Option<PositionInfo> {
        self.0.position.get().copied()
    }

    /// Byte range `[start, end)` the node was built from, if any.
    pub fn span(&self) -> Option<(usize, usize)> {
        self.0.span
    }

    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// A copy of this node with some fields replaced. Span and position
    /// metadata are carried over. Returns `None` if a field does not exist.
    pub fn replace(&self, updates: &[(&str, Value)]) -> Option<Node> {
        let mut values = self.0.values.clone();
        for (field, value) in updates {
            let i = self.0.ty.index_of(field)?;
            values[i] = value.clone();
        }
        Some(self.rebuild(values))
    }

    /// Same type and metadata, new field values.
    pub(crate) fn rebuild(&self, values: Vec<Value>) -> Node {
        let node = Node(Arc::new(NodeData {
            ty: self.0.ty.clone(),
            values,
            span: self.0.span,
            position: OnceLock::new(),
            hash: OnceLock::new(),
        }));
        if let Some(info) = self.position_info() {
            let _ = node.0.position.set(info);
        }
        node
    }

    /// Copies span and position from `from` if this node has neither.
    pub(crate) fn adopt_metadata(self, from: &Node) -> Node {
        if Node::ptr_eq(&self, from) || self.0.span.is_some() || self.position_info().is_some() {
            return self;
        }
        let mut node = self;
        match Arc::get_mut(&mut node.0) {
            Some(data) => {
                data.span = from.0.span;
                if let Some(info) = from.position_info() {
                    let _ = data.position.set(info);
                }
                node
            }
            None => {
                let copy = node.rebuild(node.0.values.clone());
                copy.adopt_metadata(from)
            }
        }
    }

    pub(crate) fn set_position_info(&self, info: PositionInfo) {
        let _ = self.0.position.set(info);
    }

    /// XOR of the hashes of every field, computed once.
    pub fn structural_hash(&self) -> u64 {
        match self.cached_hash() {
            Some(h) => h,
            None => {
                let mut steps = vec![HashStep::Node(self)];
                steps.extend(self.values().iter().rev().map(HashStep::Enter));
                fold_hash(steps)
            }
        }
    }

    pub(crate) fn cached_hash(&self) -> Option<u64> {
        self.0.hash.get().copied()
    }

    pub(crate) fn cache_hash(&self, h: u64) {
        let _ = self.0.hash.set(h);
    }

    pub(crate) fn same_type(&self, other: &Node) -> bool {
        self.0.ty.name == other.0.ty.name && self.0.ty.fields == other.0.ty.fields
    }

    /// Moves the field values onto `stack` when this is the only handle.
    pub(crate) fn take_values(&mut self, stack: &mut Vec<Value>) {
        if let Some(data) = Arc::get_mut(&mut self.0) {
            stack.append(&mut data.values);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        if Node::ptr_eq(self, other) {
            return true;
        }
        self.same_type(other) && eq_pairs(self.values().iter().zip(other.values()).collect())
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pieces(f, vec![Piece::Node(self)])
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
