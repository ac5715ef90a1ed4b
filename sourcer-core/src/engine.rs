//! Generated engines, and the generator that builds them.

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::analysis::{analyze, AnalysisOptions};
use crate::codegen::{generate, Program, RuleId};
use crate::config::ParseOptions;
use crate::error::{GrammarError, InputError, ParseError, PartialParseError};
use crate::frontend::parse_grammar;
use crate::host::HostFunctions;
use crate::runtime::vm::{self, Failure, FailureKind, Outcome};
use crate::runtime::{error_title, extract_excerpt, visit, Input, LineMap, PositionInfo, Value};

/// Builds engines from grammar descriptions.
///
/// ```
/// use sourcer_core::{Generator, Value};
///
/// let engine = Generator::new()
///     .generate("start = /[0-9]+/ |> `int`")
///     .unwrap();
/// assert_eq!(engine.parse("42").unwrap(), Value::Int(42));
/// ```
#[derive(Clone, Default)]
pub struct Generator {
    hosts: HostFunctions,
    parent: Option<Engine>,
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("hosts", &self.hosts.names().collect::<Vec<_>>())
            .field("parent", &self.parent.as_ref().and_then(Engine::name))
            .finish()
    }
}

impl Generator {
    /// A generator whose registry holds the built-in host values.
    pub fn new() -> Generator {
        Generator::default()
    }

    /// Registers a host value under the text of the snippet naming it.
    pub fn host(mut self, name: impl Into<String>, value: impl Into<Value>) -> Generator {
        self.hosts.insert(name, value.into());
        self
    }

    pub fn host_fn<F>(self, name: impl Into<String>, f: F) -> Generator
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.host(name, Value::func(f))
    }

    /// Adds every entry of `hosts`, replacing entries with the same name.
    pub fn hosts(mut self, hosts: &HostFunctions) -> Generator {
        for name in hosts.names() {
            if let Some(value) = hosts.get(name) {
                self.hosts.insert(name, value.clone());
            }
        }
        self
    }

    /// Generates engines for grammars extending `parent`.
    pub fn extends(mut self, parent: &Engine) -> Generator {
        self.parent = Some(parent.clone());
        self
    }

    pub fn generate(&self, text: &str) -> Result<Engine, GrammarError> {
        let grammar = parse_grammar(text)?;
        let mut hosts = self.hosts.clone();
        if let Some(parent) = &self.parent {
            hosts.inherit(&parent.program.hosts);
        }
        let analysis = analyze(
            &grammar,
            AnalysisOptions {
                parent: self.parent.as_ref().map(|p| &p.program.definition),
                hosts: Some(&hosts),
                allow_undefined: false,
            },
        )?;
        let program = generate(&analysis, &hosts)?;
        debug!(
            "generated engine {:?}{}",
            program.name().unwrap_or("<anonymous>"),
            match &grammar.extends {
                Some(parent) => format!(" extending {:?}", parent),
                None => String::new(),
            }
        );
        Ok(Engine {
            program: Arc::new(program),
        })
    }
}

/// A generated parser. Cheap to clone and shareable between threads.
#[derive(Clone)]
pub struct Engine {
    program: Arc<Program>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.program.name())
            .field("rules", &self.program.rule_names().collect::<Vec<_>>())
            .finish()
    }
}

/// A successful parse and the position it stopped at.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub value: Value,
    pub end: usize,
}

impl Engine {
    pub fn name(&self) -> Option<&str> {
        self.program.name()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.program.rule_names()
    }

    /// Parses the whole of `text` with the start rule.
    pub fn parse(&self, text: &str) -> Result<Value, InputError> {
        self.parse_with(text, ParseOptions::default()).map(|p| p.value)
    }

    pub fn parse_with<'a>(&self, input: impl Into<Input<'a>>, options: ParseOptions) -> Result<Parsed, InputError> {
        execute(&self.program, self.program.start, input.into(), options)
    }

    /// Entry point running a single rule. Unlike the start rule, it does not
    /// skip leading ignored input.
    pub fn rule(&self, name: &str) -> Option<RuleParser> {
        let rule = *self.program.rule_index.get(name)?;
        Some(RuleParser {
            program: self.program.clone(),
            rule,
        })
    }
}

#[derive(Clone)]
pub struct RuleParser {
    program: Arc<Program>,
    rule: RuleId,
}

impl fmt::Debug for RuleParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleParser({})", self.name())
    }
}

impl RuleParser {
    pub fn name(&self) -> &str {
        self.program.rule_name(self.rule)
    }

    pub fn parse(&self, text: &str) -> Result<Value, InputError> {
        self.parse_with(text, ParseOptions::default()).map(|p| p.value)
    }

    pub fn parse_with<'a>(&self, input: impl Into<Input<'a>>, options: ParseOptions) -> Result<Parsed, InputError> {
        execute(&self.program, self.rule, input.into(), options)
    }
}

fn execute(program: &Program, rule: RuleId, input: Input<'_>, options: ParseOptions) -> Result<Parsed, InputError> {
    let outcome = vm::run(program, input, rule, options.position);
    let map = LineMap::new(input);
    match outcome {
        Outcome::Success { value, pos } => {
            if options.full_parse && pos < input.len() {
                let last_position = map.position(pos);
                return Err(PartialParseError {
                    excerpt: extract_excerpt(input, pos, last_position.column),
                    partial_result: value,
                    last_position,
                }
                .into());
            }
            finalize(&value, &map);
            Ok(Parsed { value, end: pos })
        }
        Outcome::Failure(failure) => Err(ParseError {
            message: describe(program, input, &map, failure),
            position: map.position(failure.pos),
        }
        .into()),
    }
}

/// Attaches position info to every node of a finished parse.
fn finalize(value: &Value, map: &LineMap) {
    for node in visit(value) {
        if let Some((start, end)) = node.span() {
            // `end` of the info is the last consumed character.
            let last = if end > start { end - 1 } else { start };
            node.set_position_info(PositionInfo {
                start: map.position(start),
                end: map.position(last),
            });
        }
    }
}

fn describe(program: &Program, input: Input<'_>, map: &LineMap, failure: Failure) -> String {
    let title = error_title(input, map, failure.pos);
    match failure.kind {
        FailureKind::Expected(id) => match program.errors.get(&id) {
            Some(info) => format!(
                "{}Failed to parse the '{}' rule, at the expression:\n    {}\n\n{}",
                title, info.rule, info.expression, info.complain
            ),
            None => format!("{}Failed to parse the input.", title),
        },
        FailureKind::LeftRecursion(rule) => format!(
            "{}Left recursion in the '{}' rule: it calls itself again without consuming any input.",
            title,
            program.rule_name(rule)
        ),
        FailureKind::Rule(rule) => format!("{}Failed to parse the '{}' rule.", title, program.rule_name(rule)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(text: &str) -> Engine {
        Generator::new().generate(text).unwrap()
    }

    #[test]
    fn engines_are_send_and_sync() {
        fn check<T: Send + Sync + Clone>() {}
        check::<Engine>();
        check::<RuleParser>();
    }

    #[test]
    fn sequences_and_repetition() {
        let e = engine("start = \"a\" \"b\"+ \"c\"?");
        assert_eq!(
            e.parse("abb").unwrap(),
            Value::list(vec![
                Value::from("a"),
                Value::list(vec![Value::from("b"), Value::from("b")]),
                Value::None
            ])
        );
    }

    #[test]
    fn full_and_prefix_parses() {
        let e = engine("start = \"a\" | \"ab\"");
        assert!(e.parse("ab").unwrap_err().is_partial());
        let parsed = e.parse_with("ab", ParseOptions::prefix_at(0)).unwrap();
        assert_eq!(parsed, Parsed {
            value: Value::from("a"),
            end: 1
        });
    }

    #[test]
    fn error_message_names_rule_and_expression() {
        let e = engine("start = \"a\" Digit\nDigit = /[0-9]/");
        let err = e.parse("ax").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Error on line 1, column 2:\nax\n ^\n"), "{}", message);
        assert!(message.contains("Failed to parse the 'Digit' rule, at the expression:\n    /[0-9]/"));
        assert!(message.ends_with("Expected to match the regular expression /[0-9]/"));
        assert_eq!(err.position().column, 2);
    }

    #[test]
    fn end_of_input_title() {
        let e = engine("start = \"a\" \"b\"");
        let message = e.parse("a").unwrap_err().to_string();
        assert!(message.starts_with("Unexpected end of input.\n"), "{}", message);
    }

    #[test]
    fn left_recursion_is_reported() {
        let e = engine("start = start \"a\" | \"a\"");
        // The recursive arm fails, the second one matches.
        assert_eq!(e.parse("a").unwrap(), Value::from("a"));
        let e = engine("start = start \"a\"");
        let message = e.parse("a").unwrap_err().to_string();
        assert!(message.contains("Left recursion in the 'start' rule"), "{}", message);
    }

    #[test]
    fn rule_entry_points() {
        let e = engine("start = Word+\nWord = /[a-z]+/\nignore /\\s+/");
        assert_eq!(e.rule_names().collect::<Vec<_>>(), ["Word", "start"]);
        let word = e.rule("Word").unwrap();
        assert_eq!(word.parse("abc").unwrap(), Value::from("abc"));
        assert!(word.parse(" abc").is_err());
        assert!(e.rule("_ignored").is_none());
        assert_eq!(
            e.parse("  ab cd ").unwrap(),
            Value::list(vec![Value::from("ab"), Value::from("cd")])
        );
    }
}
