//! Recursive-descent parser for grammar descriptions.

use crate::error::GrammarError;
use crate::expr::{Bound, Expr, ExprKind, OperatorRow, OperatorTable, Ref};
use crate::grammar::{Class, Grammar, Item, Member, Rule};

use super::lexer::{Tok, Token};
use super::BUILTINS;

const KEYWORDS: &[&str] = &[
    "class", "ignore", "grammar", "extends", "let", "in", "where", "with", "omit", "super",
];

const INFIX_OPERATORS: &[&str] = &["|>", "<|", ">>", "<<", "//", "/?"];

type PResult<T> = Result<T, GrammarError>;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    anonymous: usize,
}

/// A keyword argument of a built-in constructor call.
enum KwValue {
    Int(usize),
    Bool(bool),
    Name(String),
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            pos: 0,
            anonymous: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let i = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().tok, Tok::Punct(q) if *q == p)
    }

    fn is_keyword(&self, k: &str) -> bool {
        matches!(&self.peek().tok, Tok::Name(n) if n == k)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> GrammarError {
        let t = self.peek();
        GrammarError::Syntax {
            message: message.into(),
            line: t.line,
            column: t.column,
        }
    }

    fn expected(&self, what: &str) -> GrammarError {
        let found = describe(&self.peek().tok);
        self.error_here(format!("Expected {}, found {}", what, found))
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.expected(&format!("'{}'", p)))
        }
    }

    fn expect_keyword(&mut self, k: &str) -> PResult<()> {
        if self.is_keyword(k) {
            self.advance();
            Ok(())
        } else {
            Err(self.expected(&format!("'{}'", k)))
        }
    }

    fn name(&mut self) -> PResult<String> {
        match &self.peek().tok {
            Tok::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.expected("a name")),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().tok == Tok::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while self.peek().tok == Tok::Newline || self.is_punct(";") {
            self.advance();
        }
    }

    fn end_statement(&mut self) -> PResult<()> {
        match &self.peek().tok {
            Tok::Newline | Tok::Eof | Tok::Punct(";") => {
                self.skip_separators();
                Ok(())
            }
            _ => Err(self.expected("the end of the statement")),
        }
    }

    /// Like `pred` on the next token, but also looks past a run of newlines
    /// so that a line starting with an operator continues the previous one.
    fn continues(&mut self, pred: impl Fn(&Tok) -> bool) -> bool {
        if pred(&self.peek().tok) {
            return true;
        }
        let mut i = 0;
        while self.peek_at(i).tok == Tok::Newline {
            i += 1;
        }
        if i > 0 && pred(&self.peek_at(i).tok) {
            self.skip_newlines();
            return true;
        }
        false
    }

    /// `Name =` or `Name(params) =` ahead.
    fn at_definition(&self) -> bool {
        match &self.peek().tok {
            Tok::Name(n) if !KEYWORDS.contains(&n.as_str()) => {}
            _ => return false,
        }
        let next = self.peek_at(1);
        match &next.tok {
            Tok::Punct("=") => true,
            Tok::Punct("(") if !next.space_before => {
                let mut depth = 0;
                let mut i = 1;
                loop {
                    match &self.peek_at(i).tok {
                        Tok::Punct("(") => depth += 1,
                        Tok::Punct(")") => {
                            depth -= 1;
                            if depth == 0 {
                                return self.peek_at(i + 1).tok == Tok::Punct("=");
                            }
                        }
                        Tok::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        }
    }

    pub fn grammar(&mut self) -> PResult<Grammar> {
        let mut grammar = Grammar::default();
        self.skip_separators();
        while self.peek().tok != Tok::Eof {
            self.statement(&mut grammar)?;
            self.end_statement()?;
        }
        Ok(grammar)
    }

    fn statement(&mut self, grammar: &mut Grammar) -> PResult<()> {
        if let Tok::HostSection(code) = &self.peek().tok {
            grammar.items.push(Item::Host(code.clone()));
            self.advance();
            return Ok(());
        }
        if self.is_keyword("grammar") {
            self.advance();
            grammar.name = Some(self.name()?);
            if self.is_keyword("extends") {
                self.advance();
                grammar.extends = Some(self.name()?);
            }
            return Ok(());
        }
        if self.is_keyword("extends") {
            self.advance();
            grammar.extends = Some(self.name()?);
            return Ok(());
        }
        if self.is_keyword("class") {
            self.advance();
            let class = self.class()?;
            grammar.items.push(Item::Class(class));
            return Ok(());
        }
        if self.is_keyword("ignore") {
            self.advance();
            let rule = if self.at_definition() {
                let mut rule = self.rule()?;
                rule.is_ignored = true;
                rule
            } else {
                self.anonymous += 1;
                Rule {
                    name: format!("ignore#{}", self.anonymous),
                    params: None,
                    expr: self.expr()?,
                    is_ignored: true,
                }
            };
            grammar.items.push(Item::Rule(rule));
            return Ok(());
        }
        if self.at_definition() {
            let rule = self.rule()?;
            grammar.items.push(Item::Rule(rule));
            return Ok(());
        }
        Err(self.expected("a rule definition"))
    }

    fn params(&mut self) -> PResult<Option<Vec<String>>> {
        let t = self.peek();
        if !(t.tok == Tok::Punct("(") && !t.space_before) {
            return Ok(None);
        }
        self.advance();
        let mut params = Vec::new();
        if !self.is_punct(")") {
            loop {
                params.push(self.name()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        Ok(Some(params))
    }

    fn rule(&mut self) -> PResult<Rule> {
        let name = self.name()?;
        let params = self.params()?;
        self.expect_punct("=")?;
        self.skip_newlines();
        let expr = self.expr()?;
        Ok(Rule {
            name,
            params,
            expr,
            is_ignored: false,
        })
    }

    fn class(&mut self) -> PResult<Class> {
        let name = self.name()?;
        let params = self.params()?;
        self.expect_punct("{")?;
        let mut members = Vec::new();
        loop {
            self.skip_separators();
            if self.eat_punct("}") {
                break;
            }
            let is_omitted = if self.is_keyword("omit") {
                self.advance();
                true
            } else {
                false
            };
            let name = self.name()?;
            self.expect_punct(":")?;
            self.skip_newlines();
            let expr = self.expr()?;
            members.push(Member {
                name,
                expr,
                is_omitted,
            });
            if !(self.is_punct("}") || self.is_punct(";") || self.peek().tok == Tok::Newline) {
                return Err(self.expected("';', a newline or '}'"));
            }
        }
        Ok(Class {
            name,
            params,
            members,
            id: None,
            extra_id: None,
        })
    }

    pub fn expr(&mut self) -> PResult<Expr> {
        self.choice()
    }

    /// `let name = value in body`; the body extends as far as possible.
    fn let_expr(&mut self) -> PResult<Expr> {
        self.expect_keyword("let")?;
        let name = self.name()?;
        self.expect_punct("=")?;
        self.skip_newlines();
        let value = self.expr()?;
        self.skip_newlines();
        self.expect_keyword("in")?;
        self.skip_newlines();
        let body = self.expr()?;
        Ok(Expr::new(ExprKind::Let {
            name,
            expr: value.boxed(),
            body: body.boxed(),
            slot: None,
        }))
    }

    fn choice(&mut self) -> PResult<Expr> {
        let mut arms = vec![self.infix()?];
        while self.continues(|t| *t == Tok::Punct("|")) {
            self.advance();
            self.skip_newlines();
            arms.push(self.infix()?);
        }
        Ok(if arms.len() == 1 {
            arms.remove(0)
        } else {
            Expr::new(ExprKind::Choice(arms))
        })
    }

    fn infix(&mut self) -> PResult<Expr> {
        let mut left = self.seq()?;
        loop {
            let is_operator = |t: &Tok| match t {
                Tok::Punct(p) => INFIX_OPERATORS.contains(p),
                Tok::Name(n) => n == "where",
                _ => false,
            };
            if !self.continues(is_operator) {
                return Ok(left);
            }
            let op = match self.advance().tok {
                Tok::Punct(p) => p,
                _ => "where",
            };
            self.skip_newlines();
            let right = self.seq()?;
            let (a, b) = (left.boxed(), right.boxed());
            left = Expr::new(match op {
                "|>" => ExprKind::Apply {
                    left: a,
                    right: b,
                    apply_left: false,
                },
                "<|" => ExprKind::Apply {
                    left: a,
                    right: b,
                    apply_left: true,
                },
                ">>" => ExprKind::Right(a, b),
                "<<" => ExprKind::Left(a, b),
                "//" | "/?" => ExprKind::Sep {
                    expr: a,
                    sep: b,
                    trailing: op == "/?",
                    min: Bound::Int(0),
                },
                _ => ExprKind::Where { expr: a, pred: b },
            });
        }
    }

    fn starts_atom(&self) -> bool {
        match &self.peek().tok {
            Tok::Name(n) => n == "super" || !KEYWORDS.contains(&n.as_str()),
            Tok::Str { .. } | Tok::Regex { .. } | Tok::Byte(_) | Tok::Host(_) => true,
            Tok::Punct(p) => *p == "(",
            _ => false,
        }
    }

    fn seq(&mut self) -> PResult<Expr> {
        let mut items = vec![self.postfix()?];
        while self.starts_atom() {
            items.push(self.postfix()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::new(ExprKind::Seq(items))
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut e = self.atom()?;
        loop {
            e = if self.eat_punct("?") {
                Expr::new(ExprKind::Opt(e.boxed()))
            } else if self.eat_punct("*") {
                list(e, Bound::Int(0), None)
            } else if self.eat_punct("+") {
                list(e, Bound::Int(1), None)
            } else if self.is_punct("{") {
                self.bounds(e)?
            } else if self.is_keyword("with") {
                self.advance();
                self.table(e)?
            } else {
                return Ok(e);
            };
        }
    }

    fn bound(&mut self) -> PResult<Option<Bound>> {
        let b = match &self.peek().tok {
            Tok::Int(n) => Bound::Int(*n),
            Tok::Name(n) => Bound::Name(n.clone()),
            Tok::Host(code) => Bound::Name(code.clone()),
            _ => return Ok(None),
        };
        self.advance();
        Ok(Some(b))
    }

    fn bounds(&mut self, e: Expr) -> PResult<Expr> {
        self.expect_punct("{")?;
        let first = self.bound()?;
        let (min, max) = if self.eat_punct(",") {
            (first.unwrap_or(Bound::Int(0)), self.bound()?)
        } else {
            match first {
                Some(n) => (n.clone(), Some(n)),
                None => return Err(self.expected("a repetition count")),
            }
        };
        self.expect_punct("}")?;
        Ok(list(e, min, max))
    }

    fn table(&mut self, operand: Expr) -> PResult<Expr> {
        self.expect_punct("{")?;
        let mut rows = Vec::new();
        loop {
            self.skip_separators();
            if self.eat_punct("}") {
                break;
            }
            let assoc = match &self.peek().tok {
                Tok::Name(n) => crate::expr::Assoc::from_keyword(n),
                _ => None,
            }
            .ok_or_else(|| self.expected("prefix, left, right, infix, postfix or mixfix"))?;
            self.advance();
            let operator = self.choice()?;
            rows.push(OperatorRow { assoc, operator });
            if !(self.is_punct("}") || self.is_punct(";") || self.peek().tok == Tok::Newline) {
                return Err(self.expected("';', a newline or '}'"));
            }
        }
        Ok(Expr::new(ExprKind::Table(OperatorTable {
            operand: operand.boxed(),
            rows,
        })))
    }

    fn atom(&mut self) -> PResult<Expr> {
        let (line, column) = (self.peek().line, self.peek().column);
        let kind = match self.peek().tok.clone() {
            Tok::Str { value, ignore_case } => {
                self.advance();
                if ignore_case {
                    ExprKind::Regex {
                        pattern: regex::escape(&value),
                        ignore_case,
                        binary: false,
                    }
                } else {
                    ExprKind::Str(value)
                }
            }
            Tok::Regex {
                pattern,
                ignore_case,
                binary,
            } => {
                self.advance();
                ExprKind::Regex {
                    pattern,
                    ignore_case,
                    binary,
                }
            }
            Tok::Byte(b) => {
                self.advance();
                ExprKind::Byte(b)
            }
            Tok::Host(code) => {
                self.advance();
                ExprKind::Host(code)
            }
            Tok::Punct("(") => {
                self.advance();
                let e = self.expr()?;
                self.expect_punct(")")?;
                return Ok(e);
            }
            // `[a, b, c]` is the sequence `a b c`; a trailing comma is allowed.
            Tok::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.expr()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                ExprKind::Seq(items)
            }
            Tok::Name(n) if n == "let" => return self.let_expr(),
            Tok::Name(n) if n == "super" => {
                self.advance();
                self.expect_punct(".")?;
                let name = self.name()?;
                return Ok(Expr::reference(format!("super.{}", name)));
            }
            Tok::Name(_) => {
                let name = self.name()?;
                let next = self.peek();
                if next.tok == Tok::Punct("(") && !next.space_before {
                    return self.call(name, line, column);
                }
                return Ok(Expr::reference(name));
            }
            _ => return Err(self.expected("an expression")),
        };
        Ok(Expr::new(kind))
    }

    fn call(&mut self, name: String, line: usize, column: usize) -> PResult<Expr> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if !self.is_punct(")") {
            loop {
                let is_kwarg = matches!(self.peek().tok, Tok::Name(_)) && self.peek_at(1).tok == Tok::Punct("=");
                if is_kwarg {
                    let key = self.name()?;
                    self.advance();
                    let value = match self.advance().tok {
                        Tok::Int(n) => KwValue::Int(n),
                        Tok::Name(n) if n == "true" => KwValue::Bool(true),
                        Tok::Name(n) if n == "false" => KwValue::Bool(false),
                        Tok::Name(n) | Tok::Host(n) => KwValue::Name(n),
                        other => {
                            return Err(self.error_here(format!(
                                "Invalid value for keyword argument '{}': {}",
                                key,
                                describe(&other)
                            )))
                        }
                    };
                    kwargs.push((key, value));
                } else {
                    if !kwargs.is_empty() {
                        return Err(self.error_here("Positional argument after keyword argument"));
                    }
                    args.push(self.expr()?);
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;

        if BUILTINS.contains(&name.as_str()) {
            return builtin(&name, args, kwargs).map_err(|message| GrammarError::Syntax {
                message,
                line,
                column,
            });
        }
        if let Some((key, _)) = kwargs.first() {
            return Err(GrammarError::Syntax {
                message: format!("Unexpected keyword argument '{}' in call to {}", key, name),
                line,
                column,
            });
        }
        Ok(Expr::new(ExprKind::Call {
            target: Ref {
                name,
                resolution: None,
            },
            args,
        }))
    }
}

fn list(e: Expr, min: Bound, max: Option<Bound>) -> Expr {
    Expr::new(ExprKind::List {
        expr: e.boxed(),
        min,
        max,
    })
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Name(n) => format!("'{}'", n),
        Tok::Int(n) => n.to_string(),
        Tok::Byte(b) => format!("0x{:02X}", b),
        Tok::Str { value, .. } => format!("{:?}", value),
        Tok::Regex { pattern, .. } => format!("/{}/", pattern),
        Tok::Host(code) => format!("`{}`", code),
        Tok::HostSection(_) => "a host section".to_string(),
        Tok::Punct(p) => format!("'{}'", p),
        Tok::Newline => "end of line".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}

fn bound_kwarg(key: &str, value: KwValue) -> Result<Bound, String> {
    match value {
        KwValue::Int(n) => Ok(Bound::Int(n)),
        KwValue::Name(n) => Ok(Bound::Name(n)),
        KwValue::Bool(_) => Err(format!("'{}' must be a count", key)),
    }
}

fn builtin(name: &str, mut args: Vec<Expr>, kwargs: Vec<(String, KwValue)>) -> Result<Expr, String> {
    let arity = |n: usize, args: &[Expr]| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("{} takes {} argument(s), found {}", name, n, args.len()))
        }
    };
    let mut min = Bound::Int(0);
    let mut max = None;
    let mut trailing = false;
    for (key, value) in kwargs {
        match (name, key.as_str()) {
            ("List", "min") | ("Sep", "min") => min = bound_kwarg(&key, value)?,
            ("List", "max") => max = Some(bound_kwarg(&key, value)?),
            ("Sep", "trailing") => match value {
                KwValue::Bool(b) => trailing = b,
                _ => return Err("'trailing' must be true or false".to_string()),
            },
            _ => return Err(format!("{} does not take the keyword argument '{}'", name, key)),
        }
    }

    let kind = match name {
        "Opt" | "Some" | "List" | "Expect" | "ExpectNot" => {
            arity(1, &args)?;
            let e = args.remove(0).boxed();
            match name {
                "Opt" => ExprKind::Opt(e),
                "Some" => ExprKind::List {
                    expr: e,
                    min: Bound::Int(1),
                    max: None,
                },
                "List" => ExprKind::List { expr: e, min, max },
                "Expect" => ExprKind::Expect(e),
                _ => ExprKind::ExpectNot(e),
            }
        }
        "Sep" => {
            arity(2, &args)?;
            let sep = args.remove(1).boxed();
            let expr = args.remove(0).boxed();
            ExprKind::Sep {
                expr,
                sep,
                trailing,
                min,
            }
        }
        "Fail" => {
            arity(1, &args)?;
            match args.remove(0).kind {
                ExprKind::Str(message) => ExprKind::Fail(message),
                _ => return Err("Fail takes a string message".to_string()),
            }
        }
        _ => {
            if args.is_empty() {
                return Err(format!("{} needs at least one argument", name));
            }
            match name {
                "Longest" => ExprKind::Longest(args),
                "Skip" => ExprKind::Skip(args),
                "Choice" => ExprKind::Choice(args),
                _ => ExprKind::Seq(args),
            }
        }
    };
    Ok(Expr::new(kind))
}
