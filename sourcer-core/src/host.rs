//! Named host values that grammar snippets resolve against.

use std::collections::BTreeMap;

use crate::runtime::Value;

/// Registry of host values, keyed by the text of the snippet that refers to
/// them (`` `int` `` looks up `"int"`).
///
/// `HostFunctions::new()` starts with a few conversions every grammar tends
/// to need: `int`, `float`, `join`, `none`, `true` and `false`.
#[derive(Clone, Debug)]
pub struct HostFunctions {
    values: BTreeMap<String, Value>,
}

impl Default for HostFunctions {
    fn default() -> Self {
        HostFunctions::new()
    }
}

impl HostFunctions {
    pub fn new() -> HostFunctions {
        let mut hosts = HostFunctions::empty();
        hosts.insert("int", Value::func(to_int));
        hosts.insert("float", Value::func(to_float));
        hosts.insert("join", Value::func(join));
        hosts.insert("none", Value::None);
        hosts.insert("true", Value::Bool(true));
        hosts.insert("false", Value::Bool(false));
        hosts
    }

    pub fn empty() -> HostFunctions {
        HostFunctions {
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into().trim().to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name.trim())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Adds every entry of `other` that is not defined here yet.
    pub fn inherit(&mut self, other: &HostFunctions) {
        for (name, value) in &other.values {
            self.values.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.trim().to_string()),
        Value::Bytes(b) => std::str::from_utf8(b).ok().map(|s| s.trim().to_string()),
        _ => None,
    }
}

fn to_int(v: Value) -> Value {
    match v {
        Value::Int(_) => v,
        Value::Float(f) => Value::Int(f as i64),
        Value::Bool(b) => Value::Int(b as i64),
        other => text_of(&other)
            .and_then(|s| s.parse::<i64>().ok())
            .map_or(Value::None, Value::Int),
    }
}

fn to_float(v: Value) -> Value {
    match v {
        Value::Float(_) => v,
        Value::Int(i) => Value::Float(i as f64),
        other => text_of(&other)
            .and_then(|s| s.parse::<f64>().ok())
            .map_or(Value::None, Value::Float),
    }
}

fn join(v: Value) -> Value {
    let mut out = String::new();
    let mut stack = vec![&v];
    while let Some(value) = stack.pop() {
        match value {
            Value::Str(s) => out.push_str(s),
            Value::Bytes(b) => out.push_str(&String::from_utf8_lossy(b)),
            Value::List(items) => stack.extend(items.iter().rev()),
            Value::None => {}
            other => out.push_str(&other.to_string()),
        }
    }
    Value::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_conversions() {
        let hosts = HostFunctions::new();
        let call = |name: &str, v: Value| hosts.get(name).and_then(|f| f.call(v));
        assert_eq!(call("int", Value::from(" 42 ")), Some(Value::Int(42)));
        assert_eq!(call("int", Value::from("x")), Some(Value::None));
        assert_eq!(call("float", Value::from("2.5")), Some(Value::Float(2.5)));
        let parts = Value::list(vec![Value::from("ab"), Value::list(vec![Value::from("c")])]);
        assert_eq!(call("join", parts), Some(Value::from("abc")));
        assert_eq!(hosts.get("none"), Some(&Value::None));
    }

    #[test]
    fn inherit_keeps_own_entries() {
        let mut child = HostFunctions::empty();
        child.insert("limit", Value::Int(1));
        let mut parent = HostFunctions::empty();
        parent.insert("limit", Value::Int(2));
        parent.insert("other", Value::Int(3));
        child.inherit(&parent);
        assert_eq!(child.get("limit"), Some(&Value::Int(1)));
        assert_eq!(child.get("other"), Some(&Value::Int(3)));
    }
}
