//! Lowers an analyzed grammar to a [`Program`]: one op-code vector per
//! rule, plus the matcher, constant, node type and error tables the ops
//! refer to.
//!
//! Every compiled expression leaves three registers behind: `ok`, `value`
//! and `pos`. On failure `pos` is only left where it started when the
//! expression cannot partially succeed; the constructs that retry save a
//! mark first in the other case.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::debug;

use crate::analysis::{Analysis, Definition, MemberDef, RuleBody, RuleDef};
use crate::error::GrammarError;
use crate::expr::{Assoc, Bound, Expr, ExprId, ExprKind, Ref, Resolution};
use crate::host::HostFunctions;
use crate::optable::{self, Tagged};
use crate::runtime::{Input, NodeType, Value};

pub type RuleId = usize;

type Tag = (usize, Assoc);

/// Something a `Match` op tries at the current position.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    Literal(Box<[u8]>),
    /// Anchored pattern. `text` is missing for binary patterns.
    Pattern {
        text: Option<regex::Regex>,
        bytes: regex::bytes::Regex,
    },
    Byte(u8),
}

impl Matcher {
    /// End of the match starting at `pos`.
    pub fn find(&self, input: Input<'_>, pos: usize) -> Option<usize> {
        let rest = input.as_bytes().get(pos..)?;
        match self {
            Matcher::Literal(lit) => rest.starts_with(lit).then(|| pos + lit.len()),
            Matcher::Byte(b) => (rest.first() == Some(b)).then(|| pos + 1),
            Matcher::Pattern { text, bytes } => match (input, text) {
                (Input::Text(s), Some(re)) => re.find(s.get(pos..)?).map(|m| pos + m.end()),
                _ => bytes.find(rest).map(|m| pos + m.end()),
            },
        }
    }

    pub fn value(&self, input: Input<'_>, from: usize, to: usize) -> Value {
        match self {
            Matcher::Byte(b) => Value::Int(i64::from(*b)),
            _ => input.slice_value(from, to),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MatcherKey {
    Literal(Vec<u8>),
    Pattern(String, bool, bool),
    Byte(u8),
}

/// How a call argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arg {
    /// A parameterless rule, passed as a parser.
    Rule(RuleId),
    /// An argument expression compiled to its own rule. It runs with the
    /// caller's locals.
    Thunk(RuleId),
    Const(usize),
    Local(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Match { matcher: usize, id: ExprId },
    Jump(usize),
    JumpIfOk(usize),
    JumpIfFail(usize),
    /// Suspends the frame until the callee returns.
    Call { rule: RuleId, args: Vec<Arg> },
    /// Runs a local: a parser value is called, anything else is the result.
    Invoke(usize),
    Const(usize),
    Fail(ExprId),
    /// Turns success into failure and failure into success.
    Negate(ExprId),
    SetNone,
    Store(usize),

    Push,
    Pop,
    Drop,
    SaveDepth,
    /// Result is the list of values pushed since the last `SaveDepth`.
    Collect,
    RestoreDepth,

    Mark,
    /// Back to the last mark, keeping it.
    Restore,
    Unmark,
    /// Back to the last mark, dropping it.
    Reset,
    /// Jumps when nothing was consumed since the last mark.
    Progress(usize),

    PushCount,
    Inc,
    JumpIfCount { at_least: usize, target: usize },
    EndRepeat { min: usize, id: ExprId },

    AttemptBegin,
    AttemptFail,
    AttemptEnd,
    AttemptDrop,
    LongestMerge,
    LongestEnd,

    Apply { apply_left: bool },
    Test(ExprId),
    Construct { node_type: usize, slots: Vec<usize> },

    TableBegin,
    TagOperator { precedence: usize, assoc: Assoc },
    TablePrefix,
    TableOperand,
    TableOperandFailed { exit: usize },
    TablePostfix,
    TableInfix { exit: usize },
    TableEnd,

    Return,
}

#[derive(Debug)]
pub(crate) struct RuleCode {
    pub name: String,
    pub ops: Vec<Op>,
    pub slots: usize,
}

/// What a failure of one expression is reported as.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ErrorInfo {
    pub rule: String,
    pub expression: String,
    pub complain: String,
}

/// An executable grammar. Immutable once generated.
#[derive(Debug)]
pub struct Program {
    pub(crate) name: Option<String>,
    pub(crate) rules: Vec<RuleCode>,
    pub(crate) rule_index: BTreeMap<String, RuleId>,
    pub(crate) start: RuleId,
    pub(crate) matchers: Vec<Matcher>,
    pub(crate) consts: Vec<Value>,
    pub(crate) node_types: Vec<Arc<NodeType>>,
    pub(crate) errors: HashMap<ExprId, ErrorInfo>,
    pub(crate) definition: Definition,
    pub(crate) hosts: HostFunctions,
}

impl Program {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Rules that can be run by name.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rule_index.keys().map(String::as_str)
    }

    pub(crate) fn rule_name(&self, rule: RuleId) -> &str {
        self.rules.get(rule).map_or("?", |r| r.name.as_str())
    }
}

#[derive(Default)]
struct Code {
    ops: Vec<Op>,
}

impl Code {
    fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    fn here(&self) -> usize {
        self.ops.len()
    }

    /// Points the forward jump emitted at `at` to `target`.
    fn patch(&mut self, at: usize, target: usize) {
        match &mut self.ops[at] {
            Op::Jump(t) | Op::JumpIfOk(t) | Op::JumpIfFail(t) | Op::Progress(t) => *t = target,
            Op::JumpIfCount { target: t, .. } => *t = target,
            Op::TableOperandFailed { exit } | Op::TableInfix { exit } => *exit = target,
            _ => {}
        }
    }

    fn patch_here(&mut self, at: usize) {
        let here = self.here();
        self.patch(at, here);
    }
}

/// The rule an expression is compiled for. Thunks compile with the context
/// of the rule they were written in.
struct Ctx<'r> {
    rule: &'r str,
    slots: usize,
}

struct Compiler<'a> {
    analysis: &'a Analysis,
    hosts: &'a HostFunctions,
    rule_ids: HashMap<String, RuleId>,
    rules: Vec<RuleCode>,
    ignored: Option<RuleId>,
    matchers: Vec<Matcher>,
    matcher_index: HashMap<MatcherKey, usize>,
    consts: Vec<Value>,
    const_index: HashMap<String, usize>,
    node_types: Vec<Arc<NodeType>>,
    errors: HashMap<ExprId, ErrorInfo>,
}

/// Generates the program of an analyzed grammar. Host snippets and bounds
/// are looked up in `hosts`.
pub fn generate(analysis: &Analysis, hosts: &HostFunctions) -> Result<Program, GrammarError> {
    let rule_ids: HashMap<String, RuleId> = analysis
        .rules
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.clone(), i))
        .collect();
    let ignored = analysis.ignored.as_ref().and_then(|n| rule_ids.get(n)).copied();
    let mut compiler = Compiler {
        analysis,
        hosts,
        rules: analysis
            .rules
            .iter()
            .map(|r| RuleCode {
                name: r.name.clone(),
                ops: Vec::new(),
                slots: r.slots,
            })
            .collect(),
        rule_ids,
        ignored,
        matchers: Vec::new(),
        matcher_index: HashMap::new(),
        consts: Vec::new(),
        const_index: HashMap::new(),
        node_types: Vec::new(),
        errors: HashMap::new(),
    };

    for (id, rule) in analysis.rules.iter().enumerate() {
        let ctx = Ctx {
            rule: &rule.name,
            slots: rule.slots,
        };
        let mut code = Code::default();
        match &rule.body {
            RuleBody::Expr(e) => compiler.compile(e, &ctx, &mut code)?,
            RuleBody::Class { members, .. } => compiler.class(rule, members, &ctx, &mut code)?,
        }
        code.emit(Op::Return);
        compiler.rules[id].ops = code.ops;
    }

    let start = compiler.rule_id(&analysis.start, &analysis.start)?;
    let rule_index = analysis
        .rules
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_public())
        .map(|(i, r)| (r.name.clone(), i))
        .collect();

    debug!(
        "generated {} rules ({} argument thunks), {} matchers, {} constants",
        analysis.rules.len(),
        compiler.rules.len() - analysis.rules.len(),
        compiler.matchers.len(),
        compiler.consts.len()
    );

    Ok(Program {
        name: analysis.name.clone(),
        rules: compiler.rules,
        rule_index,
        start,
        matchers: compiler.matchers,
        consts: compiler.consts,
        node_types: compiler.node_types,
        errors: compiler.errors,
        definition: analysis.definition.clone(),
        hosts: hosts.clone(),
    })
}

fn id_of(e: &Expr) -> ExprId {
    e.id.unwrap_or_default()
}

impl Compiler<'_> {
    /// Id of the rule `name`, referenced from the rule `referrer`.
    fn rule_id(&self, name: &str, referrer: &str) -> Result<RuleId, GrammarError> {
        self.rule_ids.get(name).copied().ok_or_else(|| GrammarError::UndefinedRule {
            rule: referrer.to_string(),
            name: name.to_string(),
        })
    }

    fn target(&self, r: &Ref, ctx: &Ctx<'_>) -> Result<Resolution, GrammarError> {
        r.resolution.clone().ok_or_else(|| GrammarError::UndefinedRule {
            rule: ctx.rule.to_string(),
            name: r.name.clone(),
        })
    }

    fn bound(&self, b: &Bound) -> Result<usize, GrammarError> {
        match b {
            Bound::Int(n) => Ok(*n),
            Bound::Name(name) => Err(GrammarError::UnknownHost(name.clone())),
        }
    }

    fn constant(&mut self, code: &str) -> Result<usize, GrammarError> {
        if let Some(&index) = self.const_index.get(code) {
            return Ok(index);
        }
        let value = self
            .hosts
            .get(code)
            .cloned()
            .ok_or_else(|| GrammarError::UnknownHost(code.to_string()))?;
        self.consts.push(value);
        self.const_index.insert(code.to_string(), self.consts.len() - 1);
        Ok(self.consts.len() - 1)
    }

    fn matcher(&mut self, key: MatcherKey) -> Result<usize, GrammarError> {
        if let Some(&index) = self.matcher_index.get(&key) {
            return Ok(index);
        }
        let matcher = match &key {
            MatcherKey::Literal(bytes) => Matcher::Literal(bytes.clone().into_boxed_slice()),
            MatcherKey::Byte(b) => Matcher::Byte(*b),
            MatcherKey::Pattern(pattern, ignore_case, binary) => compile_pattern(pattern, *ignore_case, *binary)?,
        };
        self.matchers.push(matcher);
        self.matcher_index.insert(key, self.matchers.len() - 1);
        Ok(self.matchers.len() - 1)
    }

    fn note_error(&mut self, e: &Expr, ctx: &Ctx<'_>) {
        let id = match e.id {
            Some(id) if !e.always_succeeds() => id,
            _ => return,
        };
        let expression = self
            .analysis
            .delegates
            .get(&id)
            .cloned()
            .unwrap_or_else(|| e.to_string());
        self.errors.entry(id).or_insert_with(|| ErrorInfo {
            rule: ctx.rule.to_string(),
            expression,
            complain: e.complain(),
        });
    }

    fn compile(&mut self, e: &Expr, ctx: &Ctx<'_>, code: &mut Code) -> Result<(), GrammarError> {
        self.note_error(e, ctx);
        let id = id_of(e);
        match &e.kind {
            ExprKind::Str(s) => {
                let m = self.matcher(MatcherKey::Literal(s.as_bytes().to_vec()))?;
                self.matched(e, m, code);
            }
            ExprKind::Regex {
                pattern,
                ignore_case,
                binary,
            } => {
                let m = self.matcher(MatcherKey::Pattern(pattern.clone(), *ignore_case, *binary))?;
                self.matched(e, m, code);
            }
            ExprKind::Byte(b) => {
                let m = self.matcher(MatcherKey::Byte(*b))?;
                self.matched(e, m, code);
            }
            ExprKind::Ref(r) => match self.target(r, ctx)? {
                Resolution::Rule(name) => {
                    let rule = self.rule_id(&name, ctx.rule)?;
                    code.emit(Op::Call { rule, args: Vec::new() });
                }
                Resolution::Local(slot) => {
                    code.emit(Op::Invoke(slot));
                }
            },
            ExprKind::Call { target, args } => {
                let rule = match self.target(target, ctx)? {
                    Resolution::Rule(name) => self.rule_id(&name, ctx.rule)?,
                    Resolution::Local(_) => {
                        return Err(GrammarError::Arity {
                            rule: ctx.rule.to_string(),
                            name: target.name.clone(),
                            expected: 0,
                            found: args.len(),
                        })
                    }
                };
                let args = args
                    .iter()
                    .map(|a| self.argument(a, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                code.emit(Op::Call { rule, args });
            }
            ExprKind::Seq(items) => {
                code.emit(Op::SaveDepth);
                let mut failures = Vec::new();
                for item in items {
                    self.compile(item, ctx, code)?;
                    failures.push(code.emit(Op::JumpIfFail(0)));
                    code.emit(Op::Push);
                }
                code.emit(Op::Collect);
                let end = code.emit(Op::Jump(0));
                for f in failures {
                    code.patch_here(f);
                }
                code.emit(Op::RestoreDepth);
                code.patch_here(end);
            }
            ExprKind::Choice(arms) => {
                let arms: Vec<(&Expr, Option<Tag>)> = arms.iter().map(|a| (a, None)).collect();
                self.alternatives(&arms, ctx, code)?;
            }
            ExprKind::Longest(arms) => {
                code.emit(Op::AttemptBegin);
                for arm in arms {
                    self.compile(arm, ctx, code)?;
                    code.emit(Op::LongestMerge);
                }
                code.emit(Op::LongestEnd);
            }
            ExprKind::List { expr, min, max } => {
                let min = self.bound(min)?;
                let max = max.as_ref().map(|m| self.bound(m)).transpose()?;
                code.emit(Op::SaveDepth);
                code.emit(Op::PushCount);
                let top = code.here();
                let full = max.map(|at_least| code.emit(Op::JumpIfCount { at_least, target: 0 }));
                code.emit(Op::Mark);
                self.compile(expr, ctx, code)?;
                let failed = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Push);
                code.emit(Op::Inc);
                let stalled = code.emit(Op::Progress(0));
                code.emit(Op::Unmark);
                code.emit(Op::Jump(top));
                code.patch_here(stalled);
                code.emit(Op::Unmark);
                let done = code.emit(Op::Jump(0));
                code.patch_here(failed);
                code.emit(Op::Reset);
                code.patch_here(done);
                if let Some(full) = full {
                    code.patch_here(full);
                }
                code.emit(Op::EndRepeat { min, id });
            }
            ExprKind::Opt(inner) => {
                let partial = inner.can_partially_succeed();
                if partial {
                    code.emit(Op::Mark);
                }
                self.compile(inner, ctx, code)?;
                let matched = code.emit(Op::JumpIfOk(0));
                if partial {
                    code.emit(Op::Reset);
                }
                code.emit(Op::SetNone);
                let end = code.emit(Op::Jump(0));
                code.patch_here(matched);
                if partial {
                    code.emit(Op::Unmark);
                }
                code.patch_here(end);
            }
            ExprKind::Sep {
                expr,
                sep,
                trailing,
                min,
            } => {
                let min = self.bound(min)?;
                self.separated(expr, sep, *trailing, min, id, ctx, code)?;
            }
            ExprKind::Expect(inner) => {
                code.emit(Op::Mark);
                self.compile(inner, ctx, code)?;
                code.emit(Op::Reset);
            }
            ExprKind::ExpectNot(inner) => {
                code.emit(Op::Mark);
                self.compile(inner, ctx, code)?;
                code.emit(Op::Reset);
                code.emit(Op::Negate(id));
            }
            ExprKind::Left(a, b) => {
                self.compile(a, ctx, code)?;
                let end = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Push);
                self.compile(b, ctx, code)?;
                let failed = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Pop);
                let done = code.emit(Op::Jump(0));
                code.patch_here(failed);
                code.emit(Op::Drop);
                code.patch_here(end);
                code.patch_here(done);
            }
            ExprKind::Right(a, b) => {
                self.compile(a, ctx, code)?;
                let end = code.emit(Op::JumpIfFail(0));
                self.compile(b, ctx, code)?;
                code.patch_here(end);
            }
            ExprKind::Let { expr, body, slot, .. } => {
                self.compile(expr, ctx, code)?;
                let end = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Store(slot.unwrap_or_default()));
                self.compile(body, ctx, code)?;
                code.patch_here(end);
            }
            ExprKind::Apply {
                left,
                right,
                apply_left,
            } => {
                self.compile(left, ctx, code)?;
                let end = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Push);
                self.compile(right, ctx, code)?;
                let failed = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Apply {
                    apply_left: *apply_left,
                });
                let done = code.emit(Op::Jump(0));
                code.patch_here(failed);
                code.emit(Op::Drop);
                code.patch_here(end);
                code.patch_here(done);
            }
            ExprKind::Where { expr, pred } => {
                code.emit(Op::Mark);
                self.compile(expr, ctx, code)?;
                let failed = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Push);
                self.compile(pred, ctx, code)?;
                let pred_failed = code.emit(Op::JumpIfFail(0));
                code.emit(Op::Test(id));
                let done = code.emit(Op::Jump(0));
                code.patch_here(pred_failed);
                code.emit(Op::Drop);
                code.patch_here(failed);
                code.emit(Op::Reset);
                code.patch_here(done);
            }
            ExprKind::Table(table) => self.table(table, ctx, code)?,
            ExprKind::Host(snippet) => {
                let index = self.constant(snippet)?;
                code.emit(Op::Const(index));
            }
            ExprKind::Skip(arms) => {
                let top = code.here();
                code.emit(Op::Mark);
                let mut matched = Vec::new();
                for arm in arms {
                    self.compile(arm, ctx, code)?;
                    matched.push(code.emit(Op::JumpIfOk(0)));
                    if arm.can_partially_succeed() {
                        code.emit(Op::Restore);
                    }
                }
                code.emit(Op::Unmark);
                let done = code.emit(Op::Jump(0));
                for m in matched {
                    code.patch_here(m);
                }
                let stalled = code.emit(Op::Progress(0));
                code.emit(Op::Unmark);
                code.emit(Op::Jump(top));
                code.patch_here(stalled);
                code.emit(Op::Unmark);
                code.patch_here(done);
                code.emit(Op::SetNone);
            }
            ExprKind::Fail(_) => {
                code.emit(Op::Fail(id));
            }
        }
        Ok(())
    }

    /// A terminal match, followed by a pass over the ignored rules.
    fn matched(&mut self, e: &Expr, matcher: usize, code: &mut Code) {
        code.emit(Op::Match { matcher, id: id_of(e) });
        if let (true, Some(ignored)) = (e.skip_ignored, self.ignored) {
            let end = code.emit(Op::JumpIfFail(0));
            code.emit(Op::Push);
            code.emit(Op::Call {
                rule: ignored,
                args: Vec::new(),
            });
            code.emit(Op::Pop);
            code.patch_here(end);
        }
    }

    fn argument(&mut self, arg: &Expr, ctx: &Ctx<'_>) -> Result<Arg, GrammarError> {
        match &arg.kind {
            ExprKind::Ref(r) => {
                return Ok(match self.target(r, ctx)? {
                    Resolution::Rule(name) => Arg::Rule(self.rule_id(&name, ctx.rule)?),
                    Resolution::Local(slot) => Arg::Local(slot),
                })
            }
            ExprKind::Host(snippet) => return Ok(Arg::Const(self.constant(snippet)?)),
            _ => {}
        }
        let id = self.rules.len();
        self.rules.push(RuleCode {
            name: format!("{}#arg{}", ctx.rule, id),
            ops: Vec::new(),
            slots: ctx.slots,
        });
        let mut code = Code::default();
        self.compile(arg, ctx, &mut code)?;
        code.emit(Op::Return);
        self.rules[id].ops = code.ops;
        Ok(Arg::Thunk(id))
    }

    /// First successful arm wins. The failure kept is the one that got
    /// furthest, later arms winning ties.
    fn alternatives(&mut self, arms: &[(&Expr, Option<Tag>)], ctx: &Ctx<'_>, code: &mut Code) -> Result<(), GrammarError> {
        // Arms after one that always succeeds are never tried.
        let cut = arms
            .iter()
            .position(|(a, _)| a.always_succeeds())
            .map_or(arms.len(), |i| i + 1);
        let arms = &arms[..cut];
        let partial = arms.iter().any(|(a, _)| a.can_partially_succeed());

        code.emit(Op::AttemptBegin);
        if partial {
            code.emit(Op::Mark);
        }
        let mut successes = Vec::new();
        for (arm, tag) in arms {
            self.compile(arm, ctx, code)?;
            let next = code.emit(Op::JumpIfFail(0));
            if let Some((precedence, assoc)) = *tag {
                code.emit(Op::TagOperator { precedence, assoc });
            }
            successes.push(code.emit(Op::Jump(0)));
            code.patch_here(next);
            code.emit(Op::AttemptFail);
            if arm.can_partially_succeed() {
                code.emit(Op::Restore);
            }
        }
        if partial {
            code.emit(Op::Unmark);
        }
        code.emit(Op::AttemptEnd);
        let end = code.emit(Op::Jump(0));
        for s in successes {
            code.patch_here(s);
        }
        if partial {
            code.emit(Op::Unmark);
        }
        code.emit(Op::AttemptDrop);
        code.patch_here(end);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn separated(
        &mut self,
        expr: &Expr,
        sep: &Expr,
        trailing: bool,
        min: usize,
        id: ExprId,
        ctx: &Ctx<'_>,
        code: &mut Code,
    ) -> Result<(), GrammarError> {
        code.emit(Op::SaveDepth);
        code.emit(Op::PushCount);
        code.emit(Op::Mark);
        self.compile(expr, ctx, code)?;
        let first_failed = code.emit(Op::JumpIfFail(0));
        code.emit(Op::Push);
        code.emit(Op::Inc);
        code.emit(Op::Unmark);

        let top = code.here();
        // Before the separator.
        code.emit(Op::Mark);
        self.compile(sep, ctx, code)?;
        let sep_failed = code.emit(Op::JumpIfFail(0));
        // After the separator.
        code.emit(Op::Mark);
        self.compile(expr, ctx, code)?;
        let item_failed = code.emit(Op::JumpIfFail(0));
        code.emit(Op::Push);
        code.emit(Op::Inc);
        code.emit(Op::Unmark);
        let stalled = code.emit(Op::Progress(0));
        code.emit(Op::Unmark);
        code.emit(Op::Jump(top));

        code.patch_here(stalled);
        code.emit(Op::Unmark);
        let done_stalled = code.emit(Op::Jump(0));

        code.patch_here(item_failed);
        if trailing {
            code.emit(Op::Reset);
            code.emit(Op::Unmark);
        } else {
            code.emit(Op::Unmark);
            code.emit(Op::Reset);
        }
        let done_item = code.emit(Op::Jump(0));

        code.patch_here(sep_failed);
        code.emit(Op::Reset);
        let done_sep = code.emit(Op::Jump(0));

        code.patch_here(first_failed);
        code.emit(Op::Reset);

        for done in [done_stalled, done_item, done_sep] {
            code.patch_here(done);
        }
        code.emit(Op::EndRepeat { min, id });
        Ok(())
    }

    fn operators(&mut self, group: &[Tagged<'_>], ctx: &Ctx<'_>, code: &mut Code) -> Result<(), GrammarError> {
        let arms: Vec<(&Expr, Option<Tag>)> = group
            .iter()
            .map(|t| (t.expr, Some((t.precedence, t.assoc))))
            .collect();
        self.alternatives(&arms, ctx, code)
    }

    fn table(&mut self, table: &crate::expr::OperatorTable, ctx: &Ctx<'_>, code: &mut Code) -> Result<(), GrammarError> {
        let parts = optable::partition(table);
        code.emit(Op::TableBegin);

        let operand_loop = code.here();
        if !parts.prefixes.is_empty() {
            code.emit(Op::Mark);
            self.operators(&parts.prefixes, ctx, code)?;
            let none = code.emit(Op::JumpIfFail(0));
            code.emit(Op::TablePrefix);
            code.emit(Op::Jump(operand_loop));
            code.patch_here(none);
            code.emit(Op::Unmark);
        }

        code.emit(Op::Mark);
        match parts.operands.as_slice() {
            [single] => self.compile(single, ctx, code)?,
            operands => {
                let arms: Vec<(&Expr, Option<Tag>)> = operands.iter().map(|&o| (o, None)).collect();
                self.alternatives(&arms, ctx, code)?;
            }
        }
        let got = code.emit(Op::JumpIfOk(0));
        let operand_failed = code.emit(Op::TableOperandFailed { exit: 0 });
        let failed = code.emit(Op::Jump(0));
        code.patch_here(got);
        code.emit(Op::TableOperand);

        if !parts.postfixes.is_empty() {
            let postfix_loop = code.here();
            code.emit(Op::Mark);
            self.operators(&parts.postfixes, ctx, code)?;
            let none = code.emit(Op::JumpIfFail(0));
            code.emit(Op::TablePostfix);
            code.emit(Op::Jump(postfix_loop));
            code.patch_here(none);
            code.emit(Op::Unmark);
        }

        let mut infix_stop = None;
        if !parts.infixes.is_empty() {
            code.emit(Op::Mark);
            self.operators(&parts.infixes, ctx, code)?;
            let none = code.emit(Op::JumpIfFail(0));
            infix_stop = Some(code.emit(Op::TableInfix { exit: 0 }));
            code.emit(Op::Jump(operand_loop));
            code.patch_here(none);
            code.emit(Op::Unmark);
        }

        code.patch_here(operand_failed);
        if let Some(stop) = infix_stop {
            code.patch_here(stop);
        }
        code.emit(Op::TableEnd);
        code.patch_here(failed);
        Ok(())
    }

    /// A class parses its members in order, binding each to its slot, then
    /// builds a node from the non-omitted ones.
    fn class(&mut self, rule: &RuleDef, members: &[MemberDef], ctx: &Ctx<'_>, code: &mut Code) -> Result<(), GrammarError> {
        let fields: Vec<&str> = members
            .iter()
            .filter(|m| !m.is_omitted)
            .map(|m| m.name.as_str())
            .collect();
        self.node_types.push(NodeType::new(&rule.name, &fields));
        let node_type = self.node_types.len() - 1;

        code.emit(Op::Mark);
        let mut failures = Vec::new();
        for m in members {
            self.compile(&m.expr, ctx, code)?;
            failures.push(code.emit(Op::JumpIfFail(0)));
            code.emit(Op::Store(m.slot));
        }
        code.emit(Op::Construct {
            node_type,
            slots: members.iter().filter(|m| !m.is_omitted).map(|m| m.slot).collect(),
        });
        let done = code.emit(Op::Jump(0));
        for f in failures {
            code.patch_here(f);
        }
        code.emit(Op::Unmark);
        code.patch_here(done);
        Ok(())
    }
}

fn compile_pattern(pattern: &str, ignore_case: bool, binary: bool) -> Result<Matcher, GrammarError> {
    let anchored = format!(r"\A(?:{})", pattern);
    let invalid = |e: regex::Error| GrammarError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    };
    let bytes = regex::bytes::RegexBuilder::new(&anchored)
        .case_insensitive(ignore_case)
        .unicode(!binary)
        .build()
        .map_err(invalid)?;
    let text = if binary {
        None
    } else {
        Some(
            regex::RegexBuilder::new(&anchored)
                .case_insensitive(ignore_case)
                .build()
                .map_err(invalid)?,
        )
    };
    Ok(Matcher::Pattern { text, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze, AnalysisOptions};
    use crate::frontend::parse_grammar;

    fn program(text: &str) -> Result<Program, GrammarError> {
        let hosts = HostFunctions::new();
        let analysis = analyze(
            &parse_grammar(text)?,
            AnalysisOptions {
                hosts: Some(&hosts),
                ..AnalysisOptions::default()
            },
        )?;
        generate(&analysis, &hosts)
    }

    fn ops<'p>(p: &'p Program, rule: &str) -> &'p [Op] {
        &p.rules[p.rule_index[rule]].ops
    }

    #[test]
    fn missing_rules_are_blamed_on_the_referrer() {
        let hosts = HostFunctions::new();
        let grammar = parse_grammar("start = A\nA = \"(\" B\nB = \"x\"").unwrap();
        let mut analysis = analyze(
            &grammar,
            AnalysisOptions {
                hosts: Some(&hosts),
                ..AnalysisOptions::default()
            },
        )
        .unwrap();
        analysis.rules.retain(|r| r.name != "B");
        match generate(&analysis, &hosts) {
            Err(GrammarError::UndefinedRule { rule, name }) => assert_eq!((rule.as_str(), name.as_str()), ("A", "B")),
            other => panic!("{:?}", other.map(|p| p.rules.len())),
        }
    }

    #[test]
    fn matchers_are_anchored_and_shared() {
        let p = program("A = /[a-z]+/ \"x\" /[a-z]+/").unwrap();
        assert_eq!(p.matchers.len(), 2);
        let word = &p.matchers[0];
        assert_eq!(word.find(Input::Text("1abc"), 0), None);
        assert_eq!(word.find(Input::Text("1abc"), 1), Some(4));
        assert_eq!(word.find(Input::Bytes(b"1abc"), 1), Some(4));
    }

    #[test]
    fn binary_patterns_match_raw_bytes() {
        let m = compile_pattern(r"\xFF+", false, true).unwrap();
        assert_eq!(m.find(Input::Bytes(&[0xFF, 0xFF, 0x01]), 0), Some(2));
        let m = compile_pattern("abc", true, false).unwrap();
        assert_eq!(m.find(Input::Text("ABC"), 0), Some(3));
    }

    #[test]
    fn invalid_regex_is_a_grammar_error() {
        assert!(matches!(program("A = /[a-/"), Err(GrammarError::InvalidRegex { .. })));
    }

    #[test]
    fn checkpoints_only_where_needed() {
        let p = program("A = \"a\" | \"b\"\nB = (\"a\" \"b\") | \"c\"").unwrap();
        assert!(!ops(&p, "A").contains(&Op::Mark));
        assert!(ops(&p, "B").contains(&Op::Mark));
        assert!(ops(&p, "B").contains(&Op::Restore));
    }

    #[test]
    fn arms_after_an_always_succeeding_arm_are_dropped() {
        let p = program("A = \"a\"? | \"b\"").unwrap();
        let matches = ops(&p, "A").iter().filter(|op| matches!(op, Op::Match { .. })).count();
        assert_eq!(matches, 1);
    }

    #[test]
    fn argument_expressions_become_thunks() {
        let p = program("A = W(\"x\" \"y\") W(B)\nB = \"b\"\nW(p) = p").unwrap();
        let calls: Vec<&Vec<Arg>> = ops(&p, "A")
            .iter()
            .filter_map(|op| match op {
                Op::Call { args, .. } => Some(args),
                _ => None,
            })
            .collect();
        assert!(matches!(calls[0].as_slice(), [Arg::Thunk(_)]));
        assert_eq!(calls[1].as_slice(), &[Arg::Rule(p.rule_index["B"])]);
        assert!(p.rules.iter().any(|r| r.name.starts_with("A#arg")));
        assert!(!p.rule_index.contains_key("W"));
    }

    #[test]
    fn error_table_uses_delegates() {
        let p = program("A = \"x\" | Fail(\"bad\")").unwrap();
        let info = p.errors.values().find(|i| i.complain == "bad").unwrap();
        assert_eq!(info.expression, "\"x\"");
        assert_eq!(info.rule, "A");
    }
}
