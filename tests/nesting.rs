//! Deeply nested input parses, compares, hashes and is freed without
//! running out of stack.

use sourcer::*;

const DEPTH: usize = 100_000;

fn engine(grammar: &str) -> Result<Engine, String> {
    Generator::new().generate(grammar).map_err(|e| e.to_string())
}

fn parens(depth: usize) -> String {
    let mut text = "(".repeat(depth);
    text.push('x');
    text.push_str(&")".repeat(depth));
    text
}

fn chain(len: usize, op: &str) -> String {
    let mut text = String::from("1");
    for _ in 0..len {
        text.push_str(op);
        text.push('1');
    }
    text
}

#[test]
fn nested_parentheses() -> Result<(), String> {
    let e = engine("start = \"(\" start \")\" | \"x\"")?;
    let text = parens(DEPTH);

    let a = e.parse(&text).map_err(|e| e.to_string())?;
    let b = e.parse(&text).map_err(|e| e.to_string())?;
    assert_eq!(a, b);
    assert_eq!(a.structural_hash(), b.structural_hash());
    assert_ne!(a, e.parse(&parens(DEPTH - 1)).map_err(|e| e.to_string())?);
    drop(a);

    let prefix = e
        .parse_with(&text, ParseOptions::prefix_at(1))
        .map_err(|e| e.to_string())?;
    assert_eq!(prefix.end, text.len() - 1);
    drop(prefix);
    drop(b);
    Ok(())
}

#[test]
fn unbalanced_nesting_fails_cleanly() -> Result<(), String> {
    let e = engine("start = \"(\" start \")\" | \"x\"")?;
    let mut text = parens(DEPTH);
    text.pop();
    let err = e.parse(&text).unwrap_err();
    assert_eq!(err.position().index, text.len());
    Ok(())
}

#[test]
fn long_operator_chains() -> Result<(), String> {
    let e = engine("start = Int with {\n  right \"^\"\n  left \"+\"\n}\nInt = /[0-9]+/ |> `int`")?;

    let sum = e.parse(&chain(DEPTH, "+")).map_err(|e| e.to_string())?;
    let top = sum.as_node().ok_or("expected a node")?;
    assert_eq!(top.get("right"), Some(&Value::Int(1)));
    assert_eq!(visit(&sum).len(), DEPTH);
    assert_eq!(sum, e.parse(&chain(DEPTH, "+")).map_err(|e| e.to_string())?);

    let power = e.parse(&chain(DEPTH, "^")).map_err(|e| e.to_string())?;
    let top = power.as_node().ok_or("expected a node")?;
    assert_eq!(top.get("left"), Some(&Value::Int(1)));

    let folded = transform(sum, |node| {
        let lhs = node.get("left").and_then(Value::as_int);
        let rhs = node.get("right").and_then(Value::as_int);
        match (lhs, rhs) {
            (Some(a), Some(b)) => Value::Int(a + b),
            _ => Value::Node(node),
        }
    });
    assert_eq!(folded, Value::Int(DEPTH as i64 + 1));
    drop(power);
    Ok(())
}

#[test]
fn nested_classes() -> Result<(), String> {
    let e = engine("start = Group | Leaf\nclass Group {\n  omit open: \"[\"\n  body: start\n  omit close: \"]\"\n}\nLeaf = \"x\"")?;
    let mut text = "[".repeat(DEPTH);
    text.push('x');
    text.push_str(&"]".repeat(DEPTH));

    let tree = e.parse(&text).map_err(|e| e.to_string())?;
    assert_eq!(visit(&tree).len(), DEPTH);
    let steps = traverse(&tree);
    assert_eq!(steps.iter().filter(|s| s.is_finished).count(), DEPTH);
    let top = tree.as_node().ok_or("expected a node")?;
    let info = top.position_info().ok_or("missing position")?;
    assert_eq!(info.end.index, text.len() - 1);
    Ok(())
}
