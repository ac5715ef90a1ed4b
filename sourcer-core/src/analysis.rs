//! Static analysis: definition checks, parent merging, ignored-rule
//! threading, reference resolution, id assignment and error delegates.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::error::GrammarError;
use crate::expr::{Bound, Expr, ExprId, ExprKind, Ref, Resolution};
use crate::frontend::{parse_grammar, BUILTINS};
use crate::grammar::{Grammar, Item};
use crate::host::HostFunctions;
use crate::runtime::Value;

/// Name of the synthesized rule that skips every ignored rule.
pub const IGNORED: &str = "_ignored";

/// A grammar as kept by its engine so that other grammars can extend it.
///
/// `items` already contains everything inherited from its own parent, with
/// overridden parent rules renamed `super.<name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: Option<String>,
    pub items: Vec<Item>,
    pub start: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDef {
    pub name: String,
    pub expr: Expr,
    pub slot: usize,
    pub is_omitted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody {
    Expr(Expr),
    Class {
        members: Vec<MemberDef>,
        id: Option<ExprId>,
        extra_id: Option<ExprId>,
    },
}

/// A rule or class after analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDef {
    pub name: String,
    pub params: Option<Vec<String>>,
    /// Local slots a frame of this rule needs (parameters included).
    pub slots: usize,
    pub is_ignored: bool,
    pub body: RuleBody,
}

impl RuleDef {
    pub fn arity(&self) -> usize {
        self.params.as_ref().map_or(0, Vec::len)
    }

    /// Rules a caller can run by name.
    pub fn is_public(&self) -> bool {
        !(self.name.starts_with('_') || self.name.contains('#') || self.name.contains('.')) && self.arity() == 0
    }

    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.body {
            RuleBody::Expr(e) => vec![e],
            RuleBody::Class { members, .. } => members.iter_mut().map(|m| &mut m.expr).collect(),
        }
    }

    fn exprs(&self) -> Vec<&Expr> {
        match &self.body {
            RuleBody::Expr(e) => vec![e],
            RuleBody::Class { members, .. } => members.iter().map(|m| &m.expr).collect(),
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct AnalysisOptions<'a> {
    pub parent: Option<&'a Definition>,
    /// When given, host snippets must be registered and repetition bounds
    /// are resolved against it.
    pub hosts: Option<&'a HostFunctions>,
    /// Leave unknown rule names unresolved. Used to check a grammar whose
    /// parent is not available yet.
    pub allow_undefined: bool,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub name: Option<String>,
    pub rules: Vec<RuleDef>,
    pub start: String,
    pub ignored: Option<String>,
    /// Text describing what a `Fail` arm stands for, by id of the arm.
    pub delegates: HashMap<ExprId, String>,
    /// One past the largest id in use.
    pub id_count: usize,
    pub definition: Definition,
    inherited: BTreeSet<String>,
    allow_undefined: bool,
}

impl Analysis {
    pub fn rule(&self, name: &str) -> Option<&RuleDef> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Binds every reference to a rule or a local slot.
    ///
    /// Only depends on the rule table, so running it again gives the same
    /// bindings.
    pub fn resolve(&mut self) -> Result<(), GrammarError> {
        let table: HashMap<String, usize> = self.rules.iter().map(|r| (r.name.clone(), r.arity())).collect();
        for rule in &mut self.rules {
            let mut scope = Scope {
                table: &table,
                inherited: &self.inherited,
                allow_undefined: self.allow_undefined,
                rule: rule.name.clone(),
                names: Vec::new(),
                next: 0,
            };
            for p in rule.params.iter().flatten() {
                scope.bind(p);
            }
            match &mut rule.body {
                RuleBody::Expr(e) => scope.walk(e)?,
                RuleBody::Class { members, .. } => {
                    for m in members {
                        scope.walk(&mut m.expr)?;
                        m.slot = scope.bind(&m.name);
                    }
                }
            }
            rule.slots = scope.next;
        }
        Ok(())
    }
}

/// Runs every analysis pass over `grammar`.
pub fn analyze(grammar: &Grammar, options: AnalysisOptions<'_>) -> Result<Analysis, GrammarError> {
    check(grammar, options.parent.is_some() || options.allow_undefined)?;

    if let Some(expected) = &grammar.extends {
        match options.parent {
            None if !options.allow_undefined => return Err(GrammarError::MissingParent(expected.clone())),
            Some(Definition { name: Some(found), .. }) if found != expected => {
                return Err(GrammarError::ParentMismatch {
                    expected: expected.clone(),
                    found: found.clone(),
                })
            }
            _ => {}
        }
    }

    let (items, inherited) = merge(grammar, options.parent);
    let start = start_rule(grammar, options.parent).ok_or(GrammarError::NoRules)?;
    if items.iter().any(|i| i.name() == Some(start.as_str()) && i.is_ignored()) {
        return Err(GrammarError::IgnoredStartRule(start));
    }
    let definition = Definition {
        name: grammar.name.clone(),
        items: items.clone(),
        start: start.clone(),
    };

    let mut rules = lower(&items);
    let ignored = thread_ignored(&mut rules, &start);
    if let Some(hosts) = options.hosts {
        for rule in &mut rules {
            for e in rule.exprs_mut() {
                resolve_hosts(e, hosts)?;
            }
        }
    }

    debug!(
        "analyzing grammar {:?}: {} rules, start rule {:?}, ignored rules threaded: {}",
        grammar.name,
        rules.len(),
        start,
        ignored.is_some()
    );

    let mut analysis = Analysis {
        name: grammar.name.clone(),
        rules,
        start,
        ignored,
        delegates: HashMap::new(),
        id_count: 0,
        definition,
        inherited,
        allow_undefined: options.allow_undefined,
    };
    analysis.resolve()?;
    analysis.id_count = assign_ids(&mut analysis.rules);
    for rule in &analysis.rules {
        for e in rule.exprs() {
            collect_delegates(e, &mut analysis.delegates);
        }
    }
    Ok(analysis)
}

/// What the `grammar!` macro needs to know about a grammar when it expands.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub name: Option<String>,
    pub extends: Option<String>,
    /// Rules of this grammar that can be run by name.
    pub rules: Vec<String>,
    /// Host snippets used as expressions, in order of appearance.
    pub snippets: Vec<String>,
    /// Host names used as repetition bounds.
    pub bound_names: Vec<String>,
    pub host_sections: Vec<String>,
}

/// Parses and checks a grammar without a host registry. With `has_parent`,
/// names that may come from the parent are not reported.
pub fn summarize(text: &str, has_parent: bool) -> Result<Summary, GrammarError> {
    let grammar = parse_grammar(text)?;
    let analysis = analyze(
        &grammar,
        AnalysisOptions {
            parent: None,
            hosts: None,
            allow_undefined: has_parent || grammar.extends.is_some(),
        },
    )?;

    let mut summary = Summary {
        name: grammar.name.clone(),
        extends: grammar.extends.clone(),
        host_sections: grammar.host_sections().map(str::to_string).collect(),
        ..Summary::default()
    };
    summary.rules = analysis
        .rules
        .iter()
        .filter(|r| r.is_public())
        .map(|r| r.name.clone())
        .collect();
    for rule in &analysis.rules {
        for e in rule.exprs() {
            collect_hosts(e, &mut summary);
        }
    }
    Ok(summary)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn collect_hosts(e: &Expr, summary: &mut Summary) {
    match &e.kind {
        ExprKind::Host(code) => push_unique(&mut summary.snippets, code),
        ExprKind::List { min, max, .. } => {
            for b in std::iter::once(min).chain(max.as_ref()) {
                if let Bound::Name(n) = b {
                    push_unique(&mut summary.bound_names, n);
                }
            }
        }
        ExprKind::Sep { min: Bound::Name(n), .. } => push_unique(&mut summary.bound_names, n),
        _ => {}
    }
    for c in e.children() {
        collect_hosts(c, summary);
    }
}

fn check(grammar: &Grammar, has_parent: bool) -> Result<(), GrammarError> {
    if grammar.definitions().next().is_none() && !has_parent {
        return Err(GrammarError::NoRules);
    }
    let mut seen = HashSet::new();
    for item in grammar.definitions() {
        let name = item.name().unwrap_or_default();
        if name.contains('#') {
            continue;
        }
        if name.starts_with('_') {
            return Err(GrammarError::UnderscoreName(name.to_string()));
        }
        if BUILTINS.contains(&name) {
            return Err(GrammarError::ReservedName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(GrammarError::DuplicateRule(name.to_string()));
        }
    }
    Ok(())
}

fn start_rule(grammar: &Grammar, parent: Option<&Definition>) -> Option<String> {
    let named = grammar
        .definitions()
        .filter_map(Item::name)
        .find(|n| n.eq_ignore_ascii_case("start"));
    named
        .map(str::to_string)
        .or_else(|| parent.map(|p| p.start.clone()))
        .or_else(|| grammar.start_rule().map(str::to_string))
}

fn rename(item: &mut Item, name: String) {
    match item {
        Item::Rule(r) => r.name = name,
        Item::Class(c) => c.name = name,
        Item::Host(_) => {}
    }
}

/// Parent definitions first, then the grammar's own. A parent rule the
/// grammar redefines stays reachable as `super.<name>`.
fn merge(grammar: &Grammar, parent: Option<&Definition>) -> (Vec<Item>, BTreeSet<String>) {
    let own: HashSet<&str> = grammar.definitions().filter_map(Item::name).collect();
    let mut items: Vec<Item> = Vec::new();
    let mut inherited = BTreeSet::new();

    for item in parent.iter().flat_map(|p| p.items.iter()) {
        let name = match item.name() {
            Some(name) => name,
            None => continue,
        };
        let mut item = item.clone();
        if name.contains('#') {
            rename(&mut item, format!("^{}", name));
        } else if own.contains(name) {
            let renamed = format!("super.{}", name);
            items.retain(|i| i.name() != Some(renamed.as_str()));
            rename(&mut item, renamed);
        }
        if let Some(name) = item.name() {
            inherited.insert(name.to_string());
        }
        items.push(item);
    }
    items.extend(grammar.definitions().cloned());
    (items, inherited)
}

fn lower(items: &[Item]) -> Vec<RuleDef> {
    items
        .iter()
        .filter_map(|item| match item {
            Item::Rule(r) => Some(RuleDef {
                name: r.name.clone(),
                params: r.params.clone(),
                slots: 0,
                is_ignored: r.is_ignored,
                body: RuleBody::Expr(r.expr.clone()),
            }),
            Item::Class(c) => Some(RuleDef {
                name: c.name.clone(),
                params: c.params.clone(),
                slots: 0,
                is_ignored: false,
                body: RuleBody::Class {
                    members: c
                        .members
                        .iter()
                        .map(|m| MemberDef {
                            name: m.name.clone(),
                            expr: m.expr.clone(),
                            slot: 0,
                            is_omitted: m.is_omitted,
                        })
                        .collect(),
                    id: c.id,
                    extra_id: c.extra_id,
                },
            }),
            Item::Host(_) => None,
        })
        .collect()
}

fn mark_skip_ignored(e: &mut Expr) {
    if matches!(e.kind, ExprKind::Str(_) | ExprKind::Regex { .. } | ExprKind::Byte(_)) {
        e.skip_ignored = true;
    }
    for c in e.children_mut() {
        mark_skip_ignored(c);
    }
}

fn prefix_ignored(e: &mut Expr) {
    let body = std::mem::replace(e, Expr::reference(IGNORED));
    *e = Expr::new(ExprKind::Right(Expr::reference(IGNORED).boxed(), body.boxed()));
}

/// Builds `_ignored` when there are ignored rules, marks every literal of
/// the other rules to skip them, and makes the start rule skip leading
/// ignored input.
fn thread_ignored(rules: &mut Vec<RuleDef>, start: &str) -> Option<String> {
    let ignored: Vec<Expr> = rules
        .iter()
        .filter(|r| r.is_ignored && !r.name.starts_with("super."))
        .map(|r| Expr::reference(r.name.clone()))
        .collect();
    if ignored.is_empty() {
        return None;
    }

    for rule in rules.iter_mut().filter(|r| !r.is_ignored) {
        for e in rule.exprs_mut() {
            mark_skip_ignored(e);
        }
        if rule.name == start {
            match &mut rule.body {
                RuleBody::Expr(e) => prefix_ignored(e),
                RuleBody::Class { members, .. } => {
                    if let Some(m) = members.first_mut() {
                        prefix_ignored(&mut m.expr);
                    }
                }
            }
        }
    }

    rules.push(RuleDef {
        name: IGNORED.to_string(),
        params: None,
        slots: 0,
        is_ignored: true,
        body: RuleBody::Expr(Expr::new(ExprKind::Skip(ignored))),
    });
    Some(IGNORED.to_string())
}

fn resolve_bound(bound: &mut Bound, hosts: &HostFunctions) -> Result<(), GrammarError> {
    let name = match bound {
        Bound::Int(_) => return Ok(()),
        Bound::Name(name) => name.clone(),
    };
    match hosts.get(&name) {
        None => Err(GrammarError::UnknownHost(name)),
        Some(Value::Int(n)) if *n >= 0 => {
            *bound = Bound::Int(*n as usize);
            Ok(())
        }
        Some(other) => Err(GrammarError::BoundType {
            name,
            found: other.describe(),
        }),
    }
}

fn resolve_hosts(e: &mut Expr, hosts: &HostFunctions) -> Result<(), GrammarError> {
    match &mut e.kind {
        ExprKind::Host(code) if !hosts.contains(code) => return Err(GrammarError::UnknownHost(code.clone())),
        ExprKind::List { min, max, .. } => {
            resolve_bound(min, hosts)?;
            if let Some(max) = max {
                resolve_bound(max, hosts)?;
            }
        }
        ExprKind::Sep { min, .. } => resolve_bound(min, hosts)?,
        _ => {}
    }
    for c in e.children_mut() {
        resolve_hosts(c, hosts)?;
    }
    Ok(())
}

struct Scope<'a> {
    table: &'a HashMap<String, usize>,
    inherited: &'a BTreeSet<String>,
    allow_undefined: bool,
    rule: String,
    names: Vec<(String, usize)>,
    next: usize,
}

impl Scope<'_> {
    fn bind(&mut self, name: &str) -> usize {
        let slot = self.next;
        self.next += 1;
        self.names.push((name.to_string(), slot));
        slot
    }

    fn local(&self, name: &str) -> Option<usize> {
        self.names.iter().rev().find(|(n, _)| n == name).map(|&(_, slot)| slot)
    }

    fn rule_ref(&self, name: &str, argc: usize) -> Result<Option<Resolution>, GrammarError> {
        let target = if self.table.contains_key(name) {
            Some(name.to_string())
        } else {
            name.strip_prefix("super.")
                .filter(|base| self.inherited.contains(*base))
                .map(str::to_string)
        };
        let target = match target {
            Some(t) => t,
            None if self.allow_undefined => return Ok(None),
            None => {
                return Err(GrammarError::UndefinedRule {
                    rule: self.rule.clone(),
                    name: name.to_string(),
                })
            }
        };
        let expected = self.table.get(&target).copied().unwrap_or(0);
        if expected != argc {
            return Err(GrammarError::Arity {
                rule: self.rule.clone(),
                name: name.to_string(),
                expected,
                found: argc,
            });
        }
        Ok(Some(Resolution::Rule(target)))
    }

    fn resolve(&self, r: &mut Ref) -> Result<(), GrammarError> {
        r.resolution = match self.local(&r.name) {
            Some(slot) => Some(Resolution::Local(slot)),
            None => self.rule_ref(&r.name, 0)?,
        };
        Ok(())
    }

    fn walk(&mut self, e: &mut Expr) -> Result<(), GrammarError> {
        match &mut e.kind {
            ExprKind::Ref(r) => return self.resolve(r),
            ExprKind::Call { target, args } => {
                for a in args.iter_mut() {
                    self.walk(a)?;
                }
                if self.local(&target.name).is_some() {
                    return Err(GrammarError::Arity {
                        rule: self.rule.clone(),
                        name: target.name.clone(),
                        expected: 0,
                        found: args.len(),
                    });
                }
                target.resolution = self.rule_ref(&target.name, args.len())?;
                return Ok(());
            }
            ExprKind::Let { name, expr, body, slot } => {
                self.walk(expr)?;
                *slot = Some(self.bind(name));
                self.walk(body)?;
                self.names.pop();
                return Ok(());
            }
            _ => {}
        }
        for c in e.children_mut() {
            self.walk(c)?;
        }
        Ok(())
    }
}

fn number(e: &mut Expr, next: &mut usize) {
    if e.id.is_none() {
        e.id = Some(*next);
        *next += 1;
    }
    for c in e.children_mut() {
        number(c, next);
    }
}

fn max_id(e: &Expr) -> Option<ExprId> {
    e.children().into_iter().filter_map(max_id).chain(e.id).max()
}

/// Depth-first numbering of every expression without an id. Classes get a
/// second id for their constructor. Returns one past the largest id.
fn assign_ids(rules: &mut [RuleDef]) -> usize {
    let mut next = rules
        .iter()
        .flat_map(|r| r.exprs().into_iter().filter_map(max_id))
        .max()
        .map_or(0, |m| m + 1);
    for rule in rules.iter_mut() {
        match &mut rule.body {
            RuleBody::Expr(e) => number(e, &mut next),
            RuleBody::Class { members, id, extra_id } => {
                for slot in [id, extra_id] {
                    if slot.is_none() {
                        *slot = Some(next);
                        next += 1;
                    }
                }
                for m in members {
                    number(&mut m.expr, &mut next);
                }
            }
        }
    }
    next
}

fn collect_delegates(e: &Expr, out: &mut HashMap<ExprId, String>) {
    if let ExprKind::Choice(arms) = &e.kind {
        let (fails, real): (Vec<&Expr>, Vec<&Expr>) = arms.iter().partition(|a| matches!(a.kind, ExprKind::Fail(_)));
        if let (Some(last), false) = (fails.last(), real.is_empty()) {
            let text = match real.as_slice() {
                [single] => single.to_string(),
                _ => Expr::new(ExprKind::Choice(real.into_iter().cloned().collect())).to_string(),
            };
            if let Some(id) = last.id {
                out.insert(id, text);
            }
        }
    }
    for c in e.children() {
        collect_delegates(c, out);
    }
}
