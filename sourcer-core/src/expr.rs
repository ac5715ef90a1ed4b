//! The expression model: one closed enum over every parsing construct.

use std::fmt;

/// Index of an expression in its program, assigned once by analysis.
pub type ExprId = usize;

/// A parsing expression plus the annotations analysis attaches to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub id: Option<ExprId>,
    /// Run the ignored rules after a successful match.
    pub skip_ignored: bool,
}

/// Repetition bound: a literal count, or the name of a host constant
/// resolved when the engine is generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Int(usize),
    Name(String),
}

/// What a name refers to once analysis has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A rule of the grammar, by its final name (`super.X` for overridden
    /// parent rules).
    Rule(String),
    /// A `let` binding, class member or rule parameter, by frame slot.
    Local(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub name: String,
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Assoc {
    Prefix,
    Left,
    Right,
    /// Non-associative binary operator (`infix` rows).
    NonAssoc,
    Postfix,
    Mixfix,
}

impl Assoc {
    pub fn keyword(self) -> &'static str {
        match self {
            Assoc::Prefix => "prefix",
            Assoc::Left => "left",
            Assoc::Right => "right",
            Assoc::NonAssoc => "infix",
            Assoc::Postfix => "postfix",
            Assoc::Mixfix => "mixfix",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Assoc> {
        Some(match s {
            "prefix" => Assoc::Prefix,
            "left" => Assoc::Left,
            "right" => Assoc::Right,
            "infix" => Assoc::NonAssoc,
            "postfix" => Assoc::Postfix,
            "mixfix" => Assoc::Mixfix,
            _ => return None,
        })
    }
}

/// One row of an operator table. Rows are listed tightest first.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRow {
    pub assoc: Assoc,
    pub operator: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorTable {
    pub operand: Box<Expr>,
    pub rows: Vec<OperatorRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Str(String),
    Regex {
        pattern: String,
        ignore_case: bool,
        binary: bool,
    },
    Byte(u8),
    Ref(Ref),
    /// Call of a parameterized rule.
    Call {
        target: Ref,
        args: Vec<Expr>,
    },
    Seq(Vec<Expr>),
    Choice(Vec<Expr>),
    Longest(Vec<Expr>),
    List {
        expr: Box<Expr>,
        min: Bound,
        max: Option<Bound>,
    },
    Opt(Box<Expr>),
    Sep {
        expr: Box<Expr>,
        sep: Box<Expr>,
        trailing: bool,
        min: Bound,
    },
    Expect(Box<Expr>),
    ExpectNot(Box<Expr>),
    /// `a << b`: both must match, the result is `a`'s.
    Left(Box<Expr>, Box<Expr>),
    /// `a >> b`: both must match, the result is `b`'s.
    Right(Box<Expr>, Box<Expr>),
    Let {
        name: String,
        expr: Box<Expr>,
        body: Box<Expr>,
        /// Frame slot of the binding, assigned by analysis.
        slot: Option<usize>,
    },
    /// `a |> f` calls `f(a)`; with `apply_left`, `f <| a` calls `f(a)`.
    Apply {
        left: Box<Expr>,
        right: Box<Expr>,
        apply_left: bool,
    },
    Where {
        expr: Box<Expr>,
        pred: Box<Expr>,
    },
    Table(OperatorTable),
    /// A host snippet, looked up in the host registry by its text.
    Host(String),
    /// Zero or more matches of any of the alternatives; the value is `None`.
    Skip(Vec<Expr>),
    Fail(String),
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Expr {
        Expr::new(kind)
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Expr {
        Expr {
            kind,
            id: None,
            skip_ignored: false,
        }
    }

    pub fn string(s: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Str(s.into()))
    }

    pub fn regex(pattern: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Regex {
            pattern: pattern.into(),
            ignore_case: false,
            binary: false,
        })
    }

    pub fn reference(name: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Ref(Ref {
            name: name.into(),
            resolution: None,
        }))
    }

    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    /// True when this expression matches whatever the input is.
    pub fn always_succeeds(&self) -> bool {
        use ExprKind::*;
        match &self.kind {
            Opt(_) | Host(_) | Skip(_) => true,
            List { min, .. } | Sep { min, .. } => *min == Bound::Int(0),
            Seq(items) => items.iter().all(Expr::always_succeeds),
            Left(a, b) | Right(a, b) => a.always_succeeds() && b.always_succeeds(),
            Let { expr, body, .. } => expr.always_succeeds() && body.always_succeeds(),
            Apply { left, right, .. } => left.always_succeeds() && right.always_succeeds(),
            Choice(arms) | Longest(arms) => arms.iter().any(Expr::always_succeeds),
            Expect(e) => e.always_succeeds(),
            Str(_) | Regex { .. } | Byte(_) | Ref(_) | Call { .. } | ExpectNot(_) | Where { .. }
            | Table(_) | Fail(_) => false,
        }
    }

    /// True when a failure of this expression may leave the position
    /// somewhere other than where it started.
    pub fn can_partially_succeed(&self) -> bool {
        use ExprKind::*;
        match &self.kind {
            Str(_) | Regex { .. } | Byte(_) | Ref(_) | Call { .. } | Choice(_) | Longest(_)
            | Opt(_) | Expect(_) | ExpectNot(_) | Host(_) | Skip(_) | Fail(_) => false,
            Seq(items) => {
                items.iter().any(Expr::can_partially_succeed)
                    || items.iter().skip(1).any(|e| !e.always_succeeds())
            }
            List { min, .. } | Sep { min, .. } => match min {
                Bound::Int(n) => *n >= 2,
                Bound::Name(_) => true,
            },
            Left(a, b) | Right(a, b) => pair_partial(a, b),
            Let { expr, body, .. } => pair_partial(expr, body),
            Apply { left, right, .. } => pair_partial(left, right),
            Where { .. } | Table(_) => true,
        }
    }

    /// What went wrong when this expression is the deepest failure.
    pub fn complain(&self) -> String {
        use ExprKind::*;
        match &self.kind {
            Str(s) => format!("Expected to match the string {:?}", s),
            Regex {
                pattern,
                ignore_case,
                ..
            } => format!(
                "Expected to match the regular expression /{}/{}",
                pattern,
                if *ignore_case { "i" } else { "" }
            ),
            Byte(b) => format!("Expected to match the byte value 0x{:02X}", b),
            ExpectNot(e) => format!("Did not expect to match: {}", e),
            List { min, .. } | Sep { min, .. } => format!("Expected at least {} item(s)", bound_text(min)),
            Where { pred, .. } => format!("Expected the predicate {} to hold", pred),
            Fail(message) => message.clone(),
            _ => format!("Expected to match {}", self),
        }
    }

    /// Children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        use ExprKind::*;
        match &self.kind {
            Str(_) | Regex { .. } | Byte(_) | Ref(_) | Host(_) | Fail(_) => vec![],
            Call { args, .. } => args.iter().collect(),
            Seq(v) | Choice(v) | Longest(v) | Skip(v) => v.iter().collect(),
            List { expr, .. } | Opt(expr) | Expect(expr) | ExpectNot(expr) => vec![expr],
            Sep { expr, sep, .. } => vec![expr, sep],
            Left(a, b) | Right(a, b) => vec![a, b],
            Let { expr, body, .. } => vec![expr, body],
            Apply { left, right, .. } => vec![left, right],
            Where { expr, pred } => vec![expr, pred],
            Table(t) => std::iter::once(&*t.operand)
                .chain(t.rows.iter().map(|r| &r.operator))
                .collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        use ExprKind::*;
        match &mut self.kind {
            Str(_) | Regex { .. } | Byte(_) | Ref(_) | Host(_) | Fail(_) => vec![],
            Call { args, .. } => args.iter_mut().collect(),
            Seq(v) | Choice(v) | Longest(v) | Skip(v) => v.iter_mut().collect(),
            List { expr, .. } | Opt(expr) | Expect(expr) | ExpectNot(expr) => vec![expr],
            Sep { expr, sep, .. } => vec![expr, sep],
            Left(a, b) | Right(a, b) => vec![a, b],
            Let { expr, body, .. } => vec![expr, body],
            Apply { left, right, .. } => vec![left, right],
            Where { expr, pred } => vec![expr, pred],
            Table(t) => std::iter::once(&mut *t.operand)
                .chain(t.rows.iter_mut().map(|r| &mut r.operator))
                .collect(),
        }
    }

    fn is_atomic(&self) -> bool {
        use ExprKind::*;
        matches!(
            self.kind,
            Str(_) | Regex { .. } | Byte(_) | Ref(_) | Call { .. } | Host(_) | Fail(_) | Expect(_)
                | ExpectNot(_) | Longest(_) | Skip(_) | List { .. } | Opt(_)
        )
    }
}

fn pair_partial(a: &Expr, b: &Expr) -> bool {
    a.can_partially_succeed() || b.can_partially_succeed() || !b.always_succeeds()
}

fn bound_text(b: &Bound) -> String {
    match b {
        Bound::Int(n) => n.to_string(),
        Bound::Name(name) => format!("`{}`", name),
    }
}

struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_atomic() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "({})", self.0)
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", Operand(item))?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExprKind::*;
        match &self.kind {
            Str(s) => write!(f, "{:?}", s),
            Regex {
                pattern,
                ignore_case,
                binary,
            } => write!(
                f,
                "{}/{}/{}",
                if *binary { "b" } else { "" },
                pattern,
                if *ignore_case { "i" } else { "" }
            ),
            Byte(b) => write!(f, "0x{:02X}", b),
            Ref(r) => f.write_str(&r.name),
            Call { target, args } => {
                write!(f, "{}(", target.name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
            Seq(items) => join(f, items, " "),
            Choice(arms) => join(f, arms, " | "),
            Longest(arms) => {
                f.write_str("Longest(")?;
                join(f, arms, ", ")?;
                f.write_str(")")
            }
            List { expr, min, max } => {
                write!(f, "{}", Operand(expr))?;
                match (min, max) {
                    (Bound::Int(0), None) => f.write_str("*"),
                    (Bound::Int(1), None) => f.write_str("+"),
                    (min, None) => write!(f, "{{{},}}", bound_text(min)),
                    (min, Some(max)) if min == max => write!(f, "{{{}}}", bound_text(min)),
                    (min, Some(max)) => write!(f, "{{{},{}}}", bound_text(min), bound_text(max)),
                }
            }
            Opt(e) => write!(f, "{}?", Operand(e)),
            Sep {
                expr, sep, trailing, ..
            } => write!(
                f,
                "{} {} {}",
                Operand(expr),
                if *trailing { "/?" } else { "//" },
                Operand(sep)
            ),
            Expect(e) => write!(f, "Expect({})", e),
            ExpectNot(e) => write!(f, "ExpectNot({})", e),
            Left(a, b) => write!(f, "{} << {}", Operand(a), Operand(b)),
            Right(a, b) => write!(f, "{} >> {}", Operand(a), Operand(b)),
            Let { name, expr, body, .. } => write!(f, "let {} = {} in {}", name, Operand(expr), Operand(body)),
            Apply {
                left,
                right,
                apply_left,
            } => write!(
                f,
                "{} {} {}",
                Operand(left),
                if *apply_left { "<|" } else { "|>" },
                Operand(right)
            ),
            Where { expr, pred } => write!(f, "{} where {}", Operand(expr), Operand(pred)),
            Table(t) => {
                write!(f, "{} with {{", Operand(&t.operand))?;
                for (i, row) in t.rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, " {} {}", row.assoc.keyword(), row.operator)?;
                }
                f.write_str(" }")
            }
            Host(code) => write!(f, "`{}`", code),
            Skip(arms) => {
                f.write_str("Skip(")?;
                join(f, arms, ", ")?;
                f.write_str(")")
            }
            Fail(message) => write!(f, "Fail({:?})", message),
        }
    }
}
