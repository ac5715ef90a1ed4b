//! Generic walks over parse results.

use std::collections::HashSet;

use super::node::Node;
use super::value::{List, Value};

/// Every node reachable from `root`, depth-first and pre-order. A node
/// shared by several parents is reported once.
pub fn visit(root: &Value) -> Vec<Node> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![root];

    while let Some(value) = stack.pop() {
        match value {
            Value::Node(node) => {
                if !seen.insert(node.addr()) {
                    continue;
                }
                out.push(node.clone());
                stack.extend(node.values().iter().rev());
            }
            Value::List(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    out
}

/// Where a child sits in its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Index(usize),
    Name(String),
}

/// One step of a [`traverse`] walk.
#[derive(Debug, Clone)]
pub struct Traversal {
    /// The list or node holding `child`, `None` for the root.
    pub parent: Option<Value>,
    pub field: Option<Field>,
    pub child: Value,
    /// `false` when the walk enters `child`, `true` once everything below
    /// it has been reported.
    pub is_finished: bool,
}

/// Every value reachable from `root` with its parent and field, depth-first.
///
/// Each list and node is reported twice: on the way down and again, with
/// `is_finished` set, on the way up. A list or node shared by several
/// parents is walked once.
pub fn traverse(root: &Value) -> Vec<Traversal> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![Traversal {
        parent: None,
        field: None,
        child: root.clone(),
        is_finished: false,
    }];

    while let Some(step) = stack.pop() {
        if step.is_finished {
            out.push(step);
            continue;
        }
        let addr = match &step.child {
            Value::Node(node) => Some(node.addr()),
            Value::List(items) => Some(items.addr()),
            _ => None,
        };
        if let Some(addr) = addr {
            if !seen.insert(addr) {
                continue;
            }
            stack.push(Traversal { is_finished: true, ..step.clone() });
        }
        let child = step.child.clone();
        out.push(step);

        match &child {
            Value::List(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push(Traversal {
                        parent: Some(child.clone()),
                        field: Some(Field::Index(i)),
                        child: item.clone(),
                        is_finished: false,
                    });
                }
            }
            Value::Node(node) => {
                let fields: Vec<_> = node.fields().collect();
                for (name, value) in fields.into_iter().rev() {
                    stack.push(Traversal {
                        parent: Some(child.clone()),
                        field: Some(Field::Name(name.to_string())),
                        child: value.clone(),
                        is_finished: false,
                    });
                }
            }
            _ => {}
        }
    }
    out
}

/// Rebuilds the tree bottom-up, calling `f` on every node after its
/// children have been transformed.
///
/// A node is only reallocated when one of its fields actually changed. When
/// `f` returns a node without position metadata, the metadata of the node it
/// replaces is copied over.
pub fn transform<F>(root: Value, mut f: F) -> Value
where
    F: FnMut(Node) -> Value,
{
    enum Frame {
        Enter(Value),
        Node(Node),
        List(List),
    }

    let mut frames = vec![Frame::Enter(root)];
    let mut done: Vec<Value> = Vec::new();

    while let Some(frame) = frames.pop() {
        match frame {
            Frame::Enter(Value::Node(node)) => {
                let children: Vec<Value> = node.values().to_vec();
                frames.push(Frame::Node(node));
                frames.extend(children.into_iter().rev().map(Frame::Enter));
            }
            Frame::Enter(Value::List(items)) => {
                let children: Vec<Value> = items.to_vec();
                frames.push(Frame::List(items));
                frames.extend(children.into_iter().rev().map(Frame::Enter));
            }
            Frame::Enter(other) => done.push(other),
            Frame::Node(node) => {
                let values = done.split_off(done.len() - node.values().len());
                let changed = values.iter().zip(node.values()).any(|(a, b)| !a.same(b));
                let rebuilt = if changed { node.rebuild(values) } else { node.clone() };
                done.push(match f(rebuilt) {
                    Value::Node(replacement) => Value::Node(replacement.adopt_metadata(&node)),
                    other => other,
                });
            }
            Frame::List(items) => {
                let values = done.split_off(done.len() - items.len());
                if values.iter().zip(items.iter()).all(|(a, b)| a.same(b)) {
                    done.push(Value::List(items));
                } else {
                    done.push(Value::list(values));
                }
            }
        }
    }
    done.pop().unwrap_or(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::NodeType;

    fn tree() -> Value {
        let leaf = Value::Node(Node::infix(Value::Int(3), Value::from("*"), Value::Int(4)));
        Value::Node(Node::infix(Value::Int(2), Value::from("+"), leaf))
    }

    #[test]
    fn visit_is_preorder_and_deduplicated() {
        let shared = Value::Node(Node::prefix(Value::from("-"), Value::Int(1)));
        let root = Value::list(vec![shared.clone(), tree(), shared]);
        let names: Vec<String> = visit(&root).iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            [
                "Prefix(\"-\", 1)",
                "Infix(2, \"+\", Infix(3, \"*\", 4))",
                "Infix(3, \"*\", 4)",
            ]
        );
    }

    #[test]
    fn traverse_reports_parents_and_fields() {
        let root = Value::list(vec![tree(), Value::Int(7)]);
        let steps = traverse(&root);
        let entered: Vec<(Option<Field>, String)> = steps
            .iter()
            .filter(|s| !s.is_finished)
            .map(|s| (s.field.clone(), s.child.to_string()))
            .collect();
        let name = |n: &str| Some(Field::Name(n.to_string()));
        assert_eq!(
            entered,
            [
                (None, "[Infix(2, \"+\", Infix(3, \"*\", 4)), 7]".to_string()),
                (Some(Field::Index(0)), "Infix(2, \"+\", Infix(3, \"*\", 4))".to_string()),
                (name("left"), "2".to_string()),
                (name("operator"), "\"+\"".to_string()),
                (name("right"), "Infix(3, \"*\", 4)".to_string()),
                (name("left"), "3".to_string()),
                (name("operator"), "\"*\"".to_string()),
                (name("right"), "4".to_string()),
                (Some(Field::Index(1)), "7".to_string()),
            ]
        );

        // The inner node finishes before its parent, the root list last.
        let finished: Vec<String> = steps.iter().filter(|s| s.is_finished).map(|s| s.child.to_string()).collect();
        assert_eq!(finished.len(), 3);
        assert_eq!(finished[0], "Infix(3, \"*\", 4)");
        assert!(finished[2].starts_with('['));

        let inner = steps.iter().find(|s| s.child.to_string() == "3").unwrap();
        assert_eq!(inner.parent.as_ref().unwrap().to_string(), "Infix(3, \"*\", 4)");
        assert!(steps[0].parent.is_none());
    }

    #[test]
    fn traverse_walks_shared_values_once() {
        let shared = Value::list(vec![Value::Int(1)]);
        let root = Value::list(vec![shared.clone(), shared]);
        let entered = traverse(&root).iter().filter(|s| !s.is_finished).count();
        // root, the shared list once, and its single item
        assert_eq!(entered, 3);
    }

    #[test]
    fn deep_trees_are_walked_without_recursion() {
        let mut value = Value::Int(0);
        for i in 0..200_000 {
            value = Value::Node(Node::infix(value, Value::from("+"), Value::Int(i)));
        }
        let copy = transform(value.clone(), Value::Node);
        assert!(Node::ptr_eq(copy.as_node().unwrap(), value.as_node().unwrap()));
        assert_eq!(visit(&value).len(), 200_000);
        let bumped = transform(value, |node| match node.get("right").and_then(Value::as_int) {
            Some(n) => Value::Node(node.replace(&[("right", Value::Int(n + 1))]).unwrap()),
            None => Value::Node(node),
        });
        assert_eq!(bumped.as_node().unwrap().get("right"), Some(&Value::Int(200_000)));
    }

    #[test]
    fn transform_rebuilds_only_on_change() {
        let root = tree();
        let same = transform(root.clone(), Value::Node);
        assert!(Node::ptr_eq(same.as_node().unwrap(), root.as_node().unwrap()));

        let folded = transform(root, |node| {
            let lhs = node.get("left").and_then(Value::as_int);
            let rhs = node.get("right").and_then(Value::as_int);
            match (lhs, rhs, node.get("operator").and_then(Value::as_str)) {
                (Some(a), Some(b), Some("+")) => Value::Int(a + b),
                (Some(a), Some(b), Some("*")) => Value::Int(a * b),
                _ => Value::Node(node),
            }
        });
        assert_eq!(folded, Value::Int(14));
    }

    #[test]
    fn transform_copies_metadata_to_replacements() {
        let ty = NodeType::new("Name", &["id"]);
        let original = Node::with_span(ty.clone(), vec![Value::from("x")], 4, 5);
        let out = transform(Value::Node(original), |_| Value::Node(Node::new(ty.clone(), vec![Value::from("y")])));
        assert_eq!(out.as_node().unwrap().span(), Some((4, 5)));
    }
}
