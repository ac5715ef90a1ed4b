use sourcer::*;

const ARITHMETIC: &str = r#"
start = Int with {
    prefix "-"
    postfix "!"
    right "^"
    left "*" | "/"
    left "+" | "-"
    mixfix "(" >> start << ")"
}
Int = /[0-9]+/ |> `int`
ignore /\s+/
"#;

fn parse(engine: &Engine, text: &str) -> Result<Value, String> {
    engine.parse(text).map_err(|e| e.to_string())
}

fn infix(left: impl Into<Value>, op: &str, right: impl Into<Value>) -> Value {
    Value::Node(Node::infix(left.into(), Value::from(op), right.into()))
}

#[test]
fn precedence_overrides_order() -> Result<(), String> {
    let e = Generator::new().generate(ARITHMETIC).map_err(|e| e.to_string())?;
    assert_eq!(parse(&e, "2+3*4")?, infix(2, "+", infix(3, "*", 4)));
    assert_eq!(parse(&e, "2*3+4")?, infix(infix(2, "*", 3), "+", 4));
    Ok(())
}

#[test]
fn associativity() -> Result<(), String> {
    let e = Generator::new().generate(ARITHMETIC).map_err(|e| e.to_string())?;
    assert_eq!(parse(&e, "1 - 2 - 3")?, infix(infix(1, "-", 2), "-", 3));
    assert_eq!(parse(&e, "1 ^ 2 ^ 3")?, infix(1, "^", infix(2, "^", 3)));
    Ok(())
}

#[test]
fn unary_operators() -> Result<(), String> {
    let e = Generator::new().generate(ARITHMETIC).map_err(|e| e.to_string())?;
    let tree = parse(&e, "-3! * 2")?;
    let neg = Value::Node(Node::prefix(
        Value::from("-"),
        Value::Node(Node::postfix(Value::Int(3), Value::from("!"))),
    ));
    assert_eq!(tree, infix(neg, "*", 2));
    Ok(())
}

#[test]
fn mixfix_operands() -> Result<(), String> {
    let e = Generator::new().generate(ARITHMETIC).map_err(|e| e.to_string())?;
    assert_eq!(parse(&e, "(1 + 2) * 3")?, infix(infix(1, "+", 2), "*", 3));
    Ok(())
}

#[test]
fn non_associative_operators_do_not_chain() -> Result<(), String> {
    let e = Generator::new()
        .generate("start = Name with { infix \"==\" }\nName = /[a-z]+/")
        .map_err(|e| e.to_string())?;
    assert_eq!(parse(&e, "a==b")?, infix("a", "==", "b"));
    let err = e.parse("a==b==c").unwrap_err();
    assert!(err.is_partial(), "{}", err);
    assert_eq!(err.position().index, 4);
    Ok(())
}

#[test]
fn dangling_operator_rolls_back() -> Result<(), String> {
    let e = Generator::new().generate(ARITHMETIC).map_err(|e| e.to_string())?;
    let parsed = e
        .parse_with("1 + 2 *", ParseOptions::prefix_at(0))
        .map_err(|e| e.to_string())?;
    assert_eq!(parsed.value, infix(1, "+", 2));
    assert_eq!(parsed.end, 6);
    Ok(())
}

#[test]
fn operator_nodes_have_positions() -> Result<(), String> {
    let e = Generator::new().generate(ARITHMETIC).map_err(|e| e.to_string())?;
    let tree = parse(&e, "1 +\n  2")?;
    let node = tree.as_node().ok_or("not a node")?;
    let info = node.position_info().ok_or("no position info")?;
    assert_eq!((info.start.line, info.start.column), (1, 1));
    assert_eq!((info.end.line, info.end.column), (2, 3));
    Ok(())
}
