use sourcer::*;

const HEADER: &str = r#"
start = 0x7F "ELF" Class Data
Class = 0x01 |> `bits32` | 0x02 |> `bits64`
Data = b/[\x00-\xFF]{2}/
"#;

fn engine() -> Result<Engine, String> {
    Generator::new()
        .host("bits32", 32)
        .host("bits64", 64)
        .generate(HEADER)
        .map_err(|e| e.to_string())
}

#[test]
fn binary_input() -> Result<(), String> {
    let e = engine()?;
    let input: &[u8] = b"\x7fELF\x02\xff\x00";
    let parsed = e
        .parse_with(input, ParseOptions::default())
        .map_err(|e| e.to_string())?;
    assert_eq!(
        parsed.value,
        Value::list(vec![
            Value::Int(0x7F),
            Value::from(&b"ELF"[..]),
            Value::Int(64),
            Value::from(&b"\xff\x00"[..]),
        ])
    );
    assert_eq!(parsed.end, input.len());
    Ok(())
}

#[test]
fn binary_errors_have_offsets() -> Result<(), String> {
    let e = engine()?;
    let err = e
        .parse_with(b"\x7fELF\x03\x00\x00", ParseOptions::default())
        .unwrap_err();
    assert_eq!(err.position().index, 4);
    assert!(!err.is_partial());
    let message = err.to_string();
    assert!(message.contains("Failed to parse the 'Class' rule"), "{}", message);
    Ok(())
}

#[test]
fn text_rules_on_bytes() -> Result<(), String> {
    let e = Generator::new()
        .generate("start = /[a-z]+/ \"=\" /[0-9]+/")
        .map_err(|e| e.to_string())?;
    let value = e
        .parse_with(&b"key=42"[..], ParseOptions::default())
        .map_err(|e| e.to_string())?
        .value;
    assert_eq!(
        value,
        Value::list(vec![
            Value::from(&b"key"[..]),
            Value::from(&b"="[..]),
            Value::from(&b"42"[..]),
        ])
    );
    Ok(())
}
