use proc_macro2::Span;
use syn::{Expr, Ident, Item, LitStr, Path};

/// The text a grammar uses to name a host value: an identifier or, for
/// snippets that are not identifiers, a string literal.
#[derive(Debug, Clone)]
pub struct HostName {
    pub text: String,
    pub span: Span,
}

impl From<Ident> for HostName {
    fn from(ident: Ident) -> HostName {
        HostName {
            text: ident.to_string(),
            span: ident.span(),
        }
    }
}

impl From<LitStr> for HostName {
    fn from(lit: LitStr) -> HostName {
        HostName {
            text: lit.value(),
            span: lit.span(),
        }
    }
}

#[derive(Debug)]
pub enum Decl {
    Module(Ident),
    Grammar(LitStr),
    Include(Vec<Item>),
    /// A callable host value.
    Host(HostName, Expr),
    /// Any other host value: a bound, a constant.
    Const(HostName, Expr),
    Extends(Path),
}
