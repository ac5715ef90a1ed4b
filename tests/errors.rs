use sourcer::*;

const STATEMENTS: &str = r#"
start = Stmt{3}
Stmt = Name "=" Int ";"
Name = /[a-z]+/
Int = /[0-9]+/ |> `int`
ignore /\s+/
"#;

fn engine(text: &str) -> Result<Engine, String> {
    Generator::new().generate(text).map_err(|e| e.to_string())
}

#[test]
fn error_points_at_the_offending_character() -> Result<(), String> {
    let e = engine(STATEMENTS)?;
    let text = "a = 1;\nb = 2;\nc = x;\n";
    let err = match e.parse(text) {
        Err(InputError::Parse(err)) => err,
        other => return Err(format!("unexpected result: {:?}", other)),
    };
    assert_eq!(err.position, Position { index: 18, line: 3, column: 5 });
    assert_eq!(&text[err.position.index..err.position.index + 1], "x");
    assert!(err.message.starts_with("Error on line 3, column 5:\nc = x;\n    ^\n"), "{}", err.message);
    assert!(err.message.contains("Failed to parse the 'Int' rule"), "{}", err.message);
    Ok(())
}

#[test]
fn line_map_counts_characters() {
    let text = "ab\ncdé\nf";
    let map = LineMap::new(Input::from(text));
    let at = |index| {
        let p = map.position(index);
        (p.line, p.column)
    };
    assert_eq!(at(0), (1, 1));
    // A newline opens the next line at column 0.
    assert_eq!(at(2), (2, 0));
    assert_eq!(at(3), (2, 1));
    assert_eq!(at(5), (2, 3));
    // Both bytes of the `é` share its column.
    assert_eq!(at(6), (2, 3));
    assert_eq!(at(8), (3, 1));
    assert_eq!(at(9), (3, 2));
}

#[test]
fn incomplete_parse_keeps_the_prefix() -> Result<(), String> {
    let e = engine("start = /[a-z]+/\nignore /[ ]+/")?;
    let err = match e.parse("abc 123") {
        Err(InputError::Partial(err)) => err,
        other => return Err(format!("unexpected result: {:?}", other)),
    };
    assert_eq!(err.partial_result, Value::from("abc"));
    assert_eq!(err.last_position.column, 5);
    assert_eq!(
        err.to_string(),
        "Incomplete parse. Unexpected input on line 1, column 5:\nabc 123\n    ^"
    );
    Ok(())
}

#[test]
fn ignored_input_is_transparent() -> Result<(), String> {
    let e = engine("start = \"a\" \"b\"\nignore /\\s+/")?;
    let plain = e.parse("ab").map_err(|e| e.to_string())?;
    assert_eq!(e.parse("a   b").map_err(|e| e.to_string())?, plain);
    assert_eq!(e.parse("\n a \t b \n").map_err(|e| e.to_string())?, plain);
    Ok(())
}

#[test]
fn comments_and_whitespace_are_both_ignored() -> Result<(), String> {
    let e = engine("start = Word*\nWord = /[a-z]+/\nignore /\\s+/\nignore /#[^\\n]*/")?;
    assert_eq!(
        e.parse("one # first\n two # second").map_err(|e| e.to_string())?,
        Value::list(vec![Value::from("one"), Value::from("two")])
    );
    Ok(())
}

#[test]
fn full_and_prefix_parses_agree_on_valid_input() -> Result<(), String> {
    let e = engine(STATEMENTS)?;
    let text = "a = 1; b = 2; c = 3;";
    let full = e.parse(text).map_err(|e| e.to_string())?;
    let prefix = e
        .parse_with(text, ParseOptions::prefix_at(0))
        .map_err(|e| e.to_string())?;
    assert_eq!(full, prefix.value);
    assert_eq!(prefix.end, text.len());
    Ok(())
}

#[test]
fn parsing_from_an_offset() -> Result<(), String> {
    let e = engine("start = /[0-9]+/ |> `int`")?;
    let parsed = e
        .parse_with("abc123", ParseOptions::new().position(3))
        .map_err(|e| e.to_string())?;
    assert_eq!(parsed, Parsed { value: Value::Int(123), end: 6 });
    Ok(())
}

#[test]
fn grammar_errors() {
    let cases = [
        ("", "NoRules"),
        ("_a = \"x\"", "UnderscoreName"),
        ("Opt = \"x\"", "ReservedName"),
        ("a = \"x\"\na = \"y\"", "DuplicateRule"),
        ("ignore start = \" \"", "IgnoredStartRule"),
        ("start = Missing", "UndefinedRule"),
        ("start = /(/", "InvalidRegex"),
        ("start = \"x\" |> `nowhere`", "UnknownHost"),
        ("start = (\"x\"", "Syntax"),
    ];
    for (text, variant) in cases {
        let err = Generator::new().generate(text).unwrap_err();
        assert!(format!("{:?}", err).starts_with(variant), "{}: {:?}", text, err);
    }
}
