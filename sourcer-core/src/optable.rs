//! Operator tables.
//!
//! At generation time the rows of a table are split into the groups the
//! table loop parses (prefixes, operands, postfixes, infixes), each
//! operator tagged with its row's precedence and associativity. At parse
//! time a [`TableState`] runs the shunting-yard reduction over what the
//! loop matched.

use crate::expr::{Assoc, Expr, OperatorTable};
use crate::runtime::{Node, NodeType, Value};

/// An operator expression with the tag of the row it comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tagged<'a> {
    pub expr: &'a Expr,
    pub precedence: usize,
    pub assoc: Assoc,
}

#[derive(Debug, Default)]
pub(crate) struct TableParts<'a> {
    /// The base operand first, then every `mixfix` row.
    pub operands: Vec<&'a Expr>,
    pub prefixes: Vec<Tagged<'a>>,
    pub postfixes: Vec<Tagged<'a>>,
    pub infixes: Vec<Tagged<'a>>,
}

/// Splits the rows of `table`. The first row binds tightest and gets the
/// highest precedence.
pub(crate) fn partition(table: &OperatorTable) -> TableParts<'_> {
    let mut parts = TableParts {
        operands: vec![&*table.operand],
        ..TableParts::default()
    };
    let count = table.rows.len();
    for (index, row) in table.rows.iter().enumerate() {
        let tagged = Tagged {
            expr: &row.operator,
            precedence: count - index,
            assoc: row.assoc,
        };
        match row.assoc {
            Assoc::Prefix => parts.prefixes.push(tagged),
            Assoc::Postfix => parts.postfixes.push(tagged),
            Assoc::Left | Assoc::Right | Assoc::NonAssoc => parts.infixes.push(tagged),
            Assoc::Mixfix => parts.operands.push(&row.operator),
        }
    }
    parts
}

#[derive(Debug, Clone)]
struct Operand {
    value: Value,
    start: usize,
    end: usize,
}

/// A matched operator. `start..end` is the input it consumed.
#[derive(Debug, Clone)]
pub(crate) struct Operator {
    pub value: Value,
    pub precedence: usize,
    pub assoc: Assoc,
    pub start: usize,
    pub end: usize,
}

/// Operand and operator stacks of one running table.
#[derive(Debug)]
pub(crate) struct TableState {
    pub start: usize,
    operands: Vec<Operand>,
    operators: Vec<Operator>,
    /// Where to resume, and how many operators to keep, when the operand
    /// after the last infix operator fails.
    checkpoint: Option<(usize, usize)>,
}

impl TableState {
    pub fn new(start: usize) -> TableState {
        TableState {
            start,
            operands: Vec::new(),
            operators: Vec::new(),
            checkpoint: None,
        }
    }

    pub fn push_prefix(&mut self, op: Operator) {
        self.operators.push(op);
    }

    pub fn push_operand(&mut self, value: Value, start: usize, end: usize) {
        self.operands.push(Operand { value, start, end });
    }

    /// Postfix operators bind tighter than anything pending and are
    /// applied as soon as they are matched.
    pub fn apply_postfix(&mut self, op: Operator) {
        if let Some(left) = self.operands.pop() {
            let node = Node::with_span(NodeType::postfix(), vec![left.value, op.value], left.start, op.end);
            self.operands.push(Operand {
                value: Value::Node(node),
                start: left.start,
                end: op.end,
            });
        }
    }

    /// Reduces what binds tighter than `op`, then pushes it.
    ///
    /// Returns `false`, leaving `op` out, when `op` would chain with a
    /// non-associative operator of the same precedence. The expression
    /// ends before `op` in that case.
    pub fn push_infix(&mut self, op: Operator) -> bool {
        while let Some(top) = self.operators.last() {
            if top.precedence > op.precedence || (top.precedence == op.precedence && op.assoc == Assoc::Left) {
                if !self.reduce() {
                    break;
                }
            } else if top.precedence == op.precedence && op.assoc == Assoc::NonAssoc && top.assoc == Assoc::NonAssoc {
                return false;
            } else {
                break;
            }
        }
        self.checkpoint = Some((op.start, self.operators.len()));
        self.operators.push(op);
        true
    }

    /// Drops the last infix operator, and any prefix after it, when no
    /// operand follows it. Returns the position the table ends at.
    pub fn rollback(&mut self) -> Option<usize> {
        if self.operands.is_empty() {
            return None;
        }
        let (pos, len) = self.checkpoint.take()?;
        self.operators.truncate(len);
        Some(pos)
    }

    /// Reduces everything left and returns the single remaining operand.
    pub fn finish(mut self) -> Option<Value> {
        while !self.operators.is_empty() {
            if !self.reduce() {
                break;
            }
        }
        self.operands.pop().map(|o| o.value)
    }

    fn reduce(&mut self) -> bool {
        let op = match self.operators.pop() {
            Some(op) => op,
            None => return false,
        };
        let right = match self.operands.pop() {
            Some(right) => right,
            None => return false,
        };
        let (node, start) = if op.assoc == Assoc::Prefix {
            let node = Node::with_span(NodeType::prefix(), vec![op.value, right.value], op.start, right.end);
            (node, op.start)
        } else {
            let left = match self.operands.pop() {
                Some(left) => left,
                None => return false,
            };
            let node = Node::with_span(
                NodeType::infix(),
                vec![left.value, op.value, right.value],
                left.start,
                right.end,
            );
            (node, left.start)
        };
        self.operands.push(Operand {
            value: Value::Node(node),
            start,
            end: right.end,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::OperatorRow;

    fn op(text: &str, precedence: usize, assoc: Assoc, at: usize) -> Operator {
        Operator {
            value: Value::from(text),
            precedence,
            assoc,
            start: at,
            end: at + 1,
        }
    }

    fn infix(l: Value, o: &str, r: Value) -> Value {
        Value::Node(Node::infix(l, Value::from(o), r))
    }

    #[test]
    fn rows_are_tagged_tightest_first() {
        let row = |assoc, s: &str| OperatorRow {
            assoc,
            operator: Expr::string(s),
        };
        let table = OperatorTable {
            operand: Expr::reference("Int").boxed(),
            rows: vec![
                row(Assoc::Prefix, "-"),
                row(Assoc::Left, "*"),
                row(Assoc::Mixfix, "("),
                row(Assoc::Right, "^"),
            ],
        };
        let parts = partition(&table);
        assert_eq!(parts.operands.len(), 2);
        assert_eq!(parts.prefixes[0].precedence, 4);
        let infixes: Vec<(usize, Assoc)> = parts.infixes.iter().map(|t| (t.precedence, t.assoc)).collect();
        assert_eq!(infixes, [(3, Assoc::Left), (1, Assoc::Right)]);
        assert!(parts.postfixes.is_empty());
    }

    #[test]
    fn precedence_before_associativity() {
        // 1 + 2 * 3
        let mut t = TableState::new(0);
        t.push_operand(Value::Int(1), 0, 1);
        assert!(t.push_infix(op("+", 1, Assoc::Left, 1)));
        t.push_operand(Value::Int(2), 2, 3);
        assert!(t.push_infix(op("*", 2, Assoc::Left, 3)));
        t.push_operand(Value::Int(3), 4, 5);
        let expected = infix(Value::Int(1), "+", infix(Value::Int(2), "*", Value::Int(3)));
        assert_eq!(t.finish(), Some(expected));
    }

    #[test]
    fn left_and_right_associativity() {
        let chain = |assoc| {
            let mut t = TableState::new(0);
            t.push_operand(Value::Int(1), 0, 1);
            t.push_infix(op("-", 1, assoc, 1));
            t.push_operand(Value::Int(2), 2, 3);
            t.push_infix(op("-", 1, assoc, 3));
            t.push_operand(Value::Int(3), 4, 5);
            t.finish()
        };
        let (one, two, three) = (Value::Int(1), Value::Int(2), Value::Int(3));
        assert_eq!(
            chain(Assoc::Left),
            Some(infix(infix(one.clone(), "-", two.clone()), "-", three.clone()))
        );
        assert_eq!(chain(Assoc::Right), Some(infix(one, "-", infix(two, "-", three))));
    }

    #[test]
    fn non_associative_chain_stops() {
        let mut t = TableState::new(0);
        t.push_operand(Value::from("a"), 0, 1);
        assert!(t.push_infix(op("==", 1, Assoc::NonAssoc, 1)));
        t.push_operand(Value::from("b"), 3, 4);
        assert!(!t.push_infix(op("==", 1, Assoc::NonAssoc, 4)));
        assert_eq!(t.finish(), Some(infix(Value::from("a"), "==", Value::from("b"))));
    }

    #[test]
    fn prefix_and_postfix() {
        // -a!
        let mut t = TableState::new(0);
        t.push_prefix(op("-", 3, Assoc::Prefix, 0));
        t.push_operand(Value::from("a"), 1, 2);
        t.apply_postfix(op("!", 2, Assoc::Postfix, 2));
        let value = t.finish().unwrap();
        let node = value.as_node().unwrap();
        assert_eq!(node.type_name(), "Prefix");
        assert_eq!(node.span(), Some((0, 3)));
        assert_eq!(
            node.get("right").and_then(Value::as_node).map(|n| n.type_name()),
            Some("Postfix")
        );
    }

    #[test]
    fn rollback_drops_the_dangling_operator() {
        // 1 + -
        let mut t = TableState::new(0);
        assert_eq!(t.rollback(), None);
        t.push_operand(Value::Int(1), 0, 1);
        t.push_infix(op("+", 1, Assoc::Left, 2));
        t.push_prefix(op("-", 2, Assoc::Prefix, 4));
        assert_eq!(t.rollback(), Some(2));
        assert_eq!(t.finish(), Some(Value::Int(1)));
    }
}
