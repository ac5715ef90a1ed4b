//! Containers produced by the front-end: rules, classes and whole grammars.

use crate::expr::{Expr, ExprId};

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    /// `Some` for parameterized rules, even with zero parameters.
    pub params: Option<Vec<String>>,
    pub expr: Expr,
    pub is_ignored: bool,
}

/// One field of a class. Omitted members are parsed and bound but do not
/// become fields of the node.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub expr: Expr,
    pub is_omitted: bool,
}

/// A record: parses its members in order and builds a node with one field
/// per non-omitted member.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub members: Vec<Member>,
    pub id: Option<ExprId>,
    /// Reserved for the constructor.
    pub extra_id: Option<ExprId>,
}

impl Class {
    pub fn field_names(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| !m.is_omitted)
            .map(|m| m.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Rule(Rule),
    Class(Class),
    /// Raw host code; the macro splices it into the generated module.
    Host(String),
}

impl Item {
    pub fn name(&self) -> Option<&str> {
        match self {
            Item::Rule(r) => Some(&r.name),
            Item::Class(c) => Some(&c.name),
            Item::Host(_) => None,
        }
    }

    pub fn params(&self) -> Option<&[String]> {
        match self {
            Item::Rule(r) => r.params.as_deref(),
            Item::Class(c) => c.params.as_deref(),
            Item::Host(_) => None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Item::Rule(r) if r.is_ignored)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grammar {
    pub name: Option<String>,
    pub extends: Option<String>,
    pub items: Vec<Item>,
}

impl Grammar {
    /// Rules and classes, in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.name().is_some())
    }

    pub fn host_sections(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|i| match i {
            Item::Host(code) => Some(code.as_str()),
            _ => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&Item> {
        self.definitions().find(|i| i.name() == Some(name))
    }

    /// Name of the start rule: `start` in any case, else the first rule.
    pub fn start_rule(&self) -> Option<&str> {
        self.definitions()
            .filter_map(Item::name)
            .find(|n| n.eq_ignore_ascii_case("start"))
            .or_else(|| self.definitions().filter(|i| !i.is_ignored()).find_map(Item::name))
    }
}
