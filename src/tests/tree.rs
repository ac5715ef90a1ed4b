use super::*;

grammar! {
    %module calc;
    %grammar r##"
        grammar Calc
        start = Expr
        Expr = Term with {
            prefix "-"
            right "^"
            left "*" | "/"
            left "+" | "-"
        }
        Term = Number | "(" >> Expr << ")"
        Number = /[0-9]+/ |> `int`
        ignore /[ \t]+/
    "##;
}

fn eval(text: &str) -> Result<i64, String> {
    let tree = calc::parse(text).map_err(|e| e.to_string())?;
    let value = transform(tree, |node| {
        let name = node.type_name().to_string();
        let int = |field| node.get(field).and_then(Value::as_int).unwrap_or(0);
        let op = node.get("operator").and_then(Value::as_str).unwrap_or("").to_string();
        match (name.as_str(), op.as_str()) {
            ("Infix", "+") => Value::Int(int("left") + int("right")),
            ("Infix", "-") => Value::Int(int("left") - int("right")),
            ("Infix", "*") => Value::Int(int("left") * int("right")),
            ("Infix", "/") => Value::Int(int("left") / int("right")),
            ("Infix", "^") => Value::Int(int("left").pow(int("right") as u32)),
            ("Prefix", "-") => Value::Int(-int("right")),
            _ => Value::Node(node),
        }
    });
    value.as_int().ok_or_else(|| format!("not a number: {}", value))
}

#[test]
fn tree_basic() -> Result<(), String> {
    let tree = calc::parse("1 - 2 - 3").map_err(|e| e.to_string())?;
    assert_eq!(tree.to_string(), r#"Infix(Infix(1, "-", 2), "-", 3)"#);
    Ok(())
}

#[test]
fn tree_precedence() -> Result<(), String> {
    assert_eq!(eval("1 + 2 * 3")?, 7);
    assert_eq!(eval("(1 + 2) * 3")?, 9);
    assert_eq!(eval("2 ^ 3 ^ 2")?, 512);
    assert_eq!(eval("10 - 4 - 3")?, 3);
    assert_eq!(eval("-2 ^ 2")?, 4);
    Ok(())
}

#[test]
fn tree_positions() -> Result<(), String> {
    let tree = calc::parse("1 + 2").map_err(|e| e.to_string())?;
    let info = tree.as_node().and_then(Node::position_info).ok_or("no position info")?;
    assert_eq!((info.start.line, info.start.column), (1, 1));
    assert_eq!((info.end.line, info.end.column), (1, 5));
    Ok(())
}

#[test]
fn tree_dangling_operator() {
    let err = calc::parse("1 +").unwrap_err();
    assert!(err.is_partial());
    assert_eq!(err.position().column, 3);
}

#[test]
fn tree_rule_entry_points() -> Result<(), String> {
    assert_eq!(calc::rules::parse_Number("42").map_err(|e| e.to_string())?, Value::Int(42));
    assert_eq!(calc::rules::parse_Term("(7)").map_err(|e| e.to_string())?, Value::Int(7));
    assert_eq!(calc::engine().name(), Some("Calc"));
    Ok(())
}
