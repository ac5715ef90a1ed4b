//! The trampoline: runs compiled rules on an explicit stack of frames.
//!
//! A frame only ever suspends at a rule call. The trampoline answers the
//! call from the memo table when it can, fails it when the same call is
//! already in progress (left recursion), and otherwise pushes a new frame.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

use log::trace;

use super::{Input, Node, ParserRef, Value};
use crate::codegen::{Arg, Op, Program, RuleId};
use crate::expr::{Assoc, ExprId};
use crate::optable::{Operator, TableState};

/// Memo key of a rule call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CallKey {
    pub rule: RuleId,
    pub pos: usize,
    pub args: Arc<[Value]>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FailureKind {
    /// The expression with this id did not match.
    Expected(ExprId),
    LeftRecursion(RuleId),
    /// The rule failed without a more precise reason.
    Rule(RuleId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    pub kind: FailureKind,
    pub pos: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Success { value: Value, pos: usize },
    Failure(Failure),
}

enum Step {
    Call(CallKey),
    Return(Outcome),
}

/// State of one `Choice` or `Longest`.
struct Attempt {
    start: usize,
    best: Option<(usize, Value)>,
    failure: Option<Failure>,
}

impl Attempt {
    /// Keeps the failure that got furthest; later ones win ties.
    fn record(&mut self, failure: Option<Failure>) {
        if let Some(f) = failure {
            if self.failure.map_or(true, |best| best.pos <= f.pos) {
                self.failure = Some(f);
            }
        }
    }
}

struct Frame {
    key: CallKey,
    pc: usize,
    pos: usize,
    ok: bool,
    value: Value,
    failure: Option<Failure>,
    locals: Vec<Value>,
    values: Vec<Value>,
    marks: Vec<usize>,
    counters: Vec<usize>,
    depths: Vec<usize>,
    attempts: Vec<Attempt>,
    tables: Vec<TableState>,
    tag: Option<(usize, Assoc)>,
}

impl Frame {
    fn new(program: &Program, key: CallKey) -> Frame {
        let mut locals = key.args.to_vec();
        let slots = program.rules.get(key.rule).map_or(0, |r| r.slots);
        if locals.len() < slots {
            locals.resize(slots, Value::None);
        }
        Frame {
            pc: 0,
            pos: key.pos,
            ok: false,
            value: Value::None,
            failure: None,
            locals,
            values: Vec::new(),
            marks: Vec::new(),
            counters: Vec::new(),
            depths: Vec::new(),
            attempts: Vec::new(),
            tables: Vec::new(),
            tag: None,
            key,
        }
    }

    fn resume(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success { value, pos } => {
                self.ok = true;
                self.value = value;
                self.pos = pos;
            }
            Outcome::Failure(f) => {
                self.ok = false;
                self.failure = Some(f);
            }
        }
    }

    fn outcome(&mut self) -> Outcome {
        if self.ok {
            Outcome::Success {
                value: mem::take(&mut self.value),
                pos: self.pos,
            }
        } else {
            Outcome::Failure(self.failure.unwrap_or(Failure {
                kind: FailureKind::Rule(self.key.rule),
                pos: self.key.pos,
            }))
        }
    }

    fn fail(&mut self, id: ExprId) {
        self.ok = false;
        self.failure = Some(Failure {
            kind: FailureKind::Expected(id),
            pos: self.pos,
        });
    }

    fn pop_mark(&mut self) -> usize {
        self.marks.pop().unwrap_or(self.pos)
    }

    fn argument(&self, program: &Program, arg: &Arg) -> Value {
        match *arg {
            Arg::Rule(rule) => Value::Parser(ParserRef {
                rule,
                args: Vec::new().into(),
            }),
            Arg::Thunk(rule) => Value::Parser(ParserRef {
                rule,
                args: self.locals.clone().into(),
            }),
            Arg::Const(index) => program.consts.get(index).cloned().unwrap_or_default(),
            Arg::Local(slot) => self.locals.get(slot).cloned().unwrap_or_default(),
        }
    }

    /// The operator just matched, tagged by the arm that matched it.
    fn operator(&mut self, start: usize) -> Operator {
        let (precedence, assoc) = self.tag.take().unwrap_or((0, Assoc::Left));
        Operator {
            value: mem::take(&mut self.value),
            precedence,
            assoc,
            start,
            end: self.pos,
        }
    }

    /// Runs until the next call or the end of the rule.
    fn step(&mut self, program: &Program, input: Input<'_>) -> Step {
        let ops = match program.rules.get(self.key.rule) {
            Some(rule) => &rule.ops[..],
            None => &[],
        };
        loop {
            let op = match ops.get(self.pc) {
                Some(op) => op,
                None => return Step::Return(self.outcome()),
            };
            self.pc += 1;
            match op {
                Op::Match { matcher, id } => {
                    let matcher = &program.matchers[*matcher];
                    match matcher.find(input, self.pos) {
                        Some(end) => {
                            self.value = matcher.value(input, self.pos, end);
                            self.pos = end;
                            self.ok = true;
                        }
                        None => self.fail(*id),
                    }
                }
                Op::Jump(target) => self.pc = *target,
                Op::JumpIfOk(target) => {
                    if self.ok {
                        self.pc = *target;
                    }
                }
                Op::JumpIfFail(target) => {
                    if !self.ok {
                        self.pc = *target;
                    }
                }
                Op::Call { rule, args } => {
                    let args: Vec<Value> = args.iter().map(|a| self.argument(program, a)).collect();
                    return Step::Call(CallKey {
                        rule: *rule,
                        pos: self.pos,
                        args: args.into(),
                    });
                }
                Op::Invoke(slot) => match self.locals.get(*slot).cloned().unwrap_or_default() {
                    Value::Parser(parser) => {
                        return Step::Call(CallKey {
                            rule: parser.rule,
                            pos: self.pos,
                            args: parser.args,
                        })
                    }
                    value => {
                        self.value = value;
                        self.ok = true;
                    }
                },
                Op::Const(index) => {
                    self.value = program.consts.get(*index).cloned().unwrap_or_default();
                    self.ok = true;
                }
                Op::Fail(id) => self.fail(*id),
                Op::Negate(id) => {
                    if self.ok {
                        self.fail(*id);
                    } else {
                        self.ok = true;
                        self.value = Value::None;
                    }
                }
                Op::SetNone => {
                    self.ok = true;
                    self.value = Value::None;
                }
                Op::Store(slot) => {
                    if let Some(local) = self.locals.get_mut(*slot) {
                        *local = self.value.clone();
                    }
                }

                Op::Push => self.values.push(mem::take(&mut self.value)),
                Op::Pop => self.value = self.values.pop().unwrap_or_default(),
                Op::Drop => {
                    self.values.pop();
                }
                Op::SaveDepth => self.depths.push(self.values.len()),
                Op::Collect => {
                    let depth = self.depths.pop().unwrap_or(0);
                    self.value = Value::list(self.values.split_off(depth));
                    self.ok = true;
                }
                Op::RestoreDepth => {
                    let depth = self.depths.pop().unwrap_or(0);
                    self.values.truncate(depth);
                    self.ok = false;
                }

                Op::Mark => self.marks.push(self.pos),
                Op::Restore => {
                    if let Some(&mark) = self.marks.last() {
                        self.pos = mark;
                    }
                }
                Op::Unmark => {
                    self.marks.pop();
                }
                Op::Reset => self.pos = self.pop_mark(),
                Op::Progress(target) => {
                    if self.marks.last() == Some(&self.pos) {
                        self.pc = *target;
                    }
                }

                Op::PushCount => self.counters.push(0),
                Op::Inc => {
                    if let Some(count) = self.counters.last_mut() {
                        *count += 1;
                    }
                }
                Op::JumpIfCount { at_least, target } => {
                    if self.counters.last().copied().unwrap_or(0) >= *at_least {
                        self.pc = *target;
                    }
                }
                Op::EndRepeat { min, id } => {
                    let count = self.counters.pop().unwrap_or(0);
                    let depth = self.depths.pop().unwrap_or(0);
                    if count >= *min {
                        self.value = Value::list(self.values.split_off(depth));
                        self.ok = true;
                    } else {
                        self.values.truncate(depth);
                        if self.ok || self.failure.is_none() {
                            self.fail(*id);
                        }
                        self.ok = false;
                    }
                }

                Op::AttemptBegin => self.attempts.push(Attempt {
                    start: self.pos,
                    best: None,
                    failure: None,
                }),
                Op::AttemptFail => {
                    if let Some(attempt) = self.attempts.last_mut() {
                        attempt.record(self.failure);
                    }
                }
                Op::AttemptEnd => {
                    if let Some(attempt) = self.attempts.pop() {
                        self.failure = attempt.failure.or(self.failure);
                    }
                    self.ok = false;
                }
                Op::AttemptDrop => {
                    self.attempts.pop();
                }
                Op::LongestMerge => {
                    if let Some(attempt) = self.attempts.last_mut() {
                        if self.ok {
                            // Strictly further only: the earliest arm wins ties.
                            if attempt.best.as_ref().map_or(true, |(end, _)| self.pos > *end) {
                                attempt.best = Some((self.pos, mem::take(&mut self.value)));
                            }
                        } else {
                            attempt.record(self.failure);
                        }
                        self.pos = attempt.start;
                    }
                }
                Op::LongestEnd => match self.attempts.pop() {
                    Some(Attempt {
                        best: Some((end, value)),
                        ..
                    }) => {
                        self.ok = true;
                        self.pos = end;
                        self.value = value;
                    }
                    Some(Attempt { failure, .. }) => {
                        self.ok = false;
                        self.failure = failure.or(self.failure);
                    }
                    None => self.ok = false,
                },

                Op::Apply { apply_left } => {
                    let left = self.values.pop().unwrap_or_default();
                    let right = mem::take(&mut self.value);
                    let (func, arg) = if *apply_left { (left, right) } else { (right, left) };
                    self.value = match func.call(arg) {
                        Some(result) => result,
                        None => func,
                    };
                    self.ok = true;
                }
                Op::Test(id) => {
                    let pred = mem::take(&mut self.value);
                    let arg = self.values.pop().unwrap_or_default();
                    let start = self.pop_mark();
                    let verdict = match pred.call(arg.clone()) {
                        Some(result) => result,
                        None => pred,
                    };
                    if verdict.is_truthy() {
                        self.value = arg;
                        self.ok = true;
                    } else {
                        self.pos = start;
                        self.fail(*id);
                    }
                }
                Op::Construct { node_type, slots } => {
                    let start = self.pop_mark();
                    let values = slots
                        .iter()
                        .map(|&s| self.locals.get(s).cloned().unwrap_or_default())
                        .collect();
                    let node = Node::with_span(program.node_types[*node_type].clone(), values, start, self.pos);
                    self.value = Value::Node(node);
                    self.ok = true;
                }

                Op::TableBegin => self.tables.push(TableState::new(self.pos)),
                Op::TagOperator { precedence, assoc } => self.tag = Some((*precedence, *assoc)),
                Op::TablePrefix => {
                    let start = self.pop_mark();
                    let op = self.operator(start);
                    if let Some(table) = self.tables.last_mut() {
                        table.push_prefix(op);
                    }
                }
                Op::TableOperand => {
                    let start = self.pop_mark();
                    let value = mem::take(&mut self.value);
                    if let Some(table) = self.tables.last_mut() {
                        table.push_operand(value, start, self.pos);
                    }
                }
                Op::TableOperandFailed { exit } => {
                    self.pos = self.pop_mark();
                    match self.tables.last_mut().and_then(TableState::rollback) {
                        Some(end) => {
                            self.pos = end;
                            self.ok = true;
                            self.pc = *exit;
                        }
                        None => {
                            if let Some(table) = self.tables.pop() {
                                self.pos = table.start;
                            }
                        }
                    }
                }
                Op::TablePostfix => {
                    let start = self.pop_mark();
                    let op = self.operator(start);
                    if let Some(table) = self.tables.last_mut() {
                        table.apply_postfix(op);
                    }
                }
                Op::TableInfix { exit } => {
                    let start = self.pop_mark();
                    let op = self.operator(start);
                    if let Some(table) = self.tables.last_mut() {
                        if !table.push_infix(op) {
                            self.pos = start;
                            self.ok = true;
                            self.pc = *exit;
                        }
                    }
                }
                Op::TableEnd => {
                    self.value = self.tables.pop().and_then(TableState::finish).unwrap_or_default();
                    self.ok = true;
                }

                Op::Return => return Step::Return(self.outcome()),
            }
        }
    }
}

/// Runs `rule` at `pos` to completion.
pub(crate) fn run(program: &Program, input: Input<'_>, rule: RuleId, pos: usize) -> Outcome {
    let root = CallKey {
        rule,
        pos,
        args: Vec::new().into(),
    };
    let mut memo: HashMap<CallKey, Outcome> = HashMap::new();
    let mut active: HashSet<CallKey> = HashSet::new();
    active.insert(root.clone());
    let mut stack = vec![Frame::new(program, root)];
    let mut reply: Option<Outcome> = None;

    while let Some(frame) = stack.last_mut() {
        if let Some(outcome) = reply.take() {
            frame.resume(outcome);
        }
        match frame.step(program, input) {
            Step::Call(key) => {
                if let Some(outcome) = memo.get(&key) {
                    trace!("memo hit: {} at {}", program.rule_name(key.rule), key.pos);
                    reply = Some(outcome.clone());
                } else if active.contains(&key) {
                    trace!("left recursion: {} at {}", program.rule_name(key.rule), key.pos);
                    reply = Some(Outcome::Failure(Failure {
                        kind: FailureKind::LeftRecursion(key.rule),
                        pos: key.pos,
                    }));
                } else {
                    trace!("call {} at {}", program.rule_name(key.rule), key.pos);
                    active.insert(key.clone());
                    stack.push(Frame::new(program, key));
                }
            }
            Step::Return(outcome) => {
                if let Some(done) = stack.pop() {
                    trace!(
                        "return from {}: {}",
                        program.rule_name(done.key.rule),
                        match &outcome {
                            Outcome::Success { pos, .. } => format!("matched up to {}", pos),
                            Outcome::Failure(f) => format!("failed at {}", f.pos),
                        }
                    );
                    active.remove(&done.key);
                    memo.insert(done.key, outcome.clone());
                }
                if stack.is_empty() {
                    return outcome;
                }
                reply = Some(outcome);
            }
        }
    }

    Outcome::Failure(Failure {
        kind: FailureKind::Rule(rule),
        pos,
    })
}
