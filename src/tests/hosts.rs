use super::*;

grammar! {
    %module words;
    %include {
        pub fn shout(v: Value) -> Value {
            let upper = v.as_str().map(str::to_uppercase);
            upper.map_or(v, Value::from)
        }
    }
    %host "is_short" = |v: Value| Value::Bool(v.as_str().map_or(false, |s| s.len() <= 3));
    %const pair = 2;
    %grammar r##"
        start = Word+
        Word = Short | Long
        Short = /[a-z]+/ where `is_short` |> `shout`
        Long = /[a-z]+/
        Pairs = "x"{pair}
        ```
        fn twice(v: Value) -> Value {
            Value::list(vec![v.clone(), v])
        }
        ```
        Twice = "ab" |> `twice`
        Pair(x) = x "," x
        Digits = Pair(/[0-9]+/)
        Assign = let d = /[0-9]/ in ("=" d)
        ignore /\s+/
    "##;
}

fn strs(items: &[&str]) -> Value {
    Value::list(items.iter().map(|&s| Value::from(s)))
}

#[test]
fn host_functions() -> Result<(), String> {
    let value = words::parse("abc hello xy").map_err(|e| e.to_string())?;
    assert_eq!(value, strs(&["ABC", "hello", "XY"]));
    Ok(())
}

#[test]
fn host_constants() -> Result<(), String> {
    let value = words::rules::parse_Pairs("xx").map_err(|e| e.to_string())?;
    assert_eq!(value, strs(&["x", "x"]));
    assert!(words::rules::parse_Pairs("xxx").unwrap_err().is_partial());
    Ok(())
}

#[test]
fn host_sections() -> Result<(), String> {
    let value = words::rules::parse_Twice("ab").map_err(|e| e.to_string())?;
    assert_eq!(value, strs(&["ab", "ab"]));
    Ok(())
}

#[test]
fn parameterized_rules() -> Result<(), String> {
    let value = words::rules::parse_Digits("12,3").map_err(|e| e.to_string())?;
    assert_eq!(value, strs(&["12", ",", "3"]));
    // Parameterized rules cannot be run on their own.
    assert!(words::engine().rule("Pair").is_none());
    Ok(())
}

#[test]
fn let_bindings() -> Result<(), String> {
    let value = words::rules::parse_Assign("5=").map_err(|e| e.to_string())?;
    assert_eq!(value, strs(&["=", "5"]));
    Ok(())
}
