//! Tokenizer for grammar descriptions.

use crate::error::GrammarError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(String),
    Int(usize),
    Byte(u8),
    Str { value: String, ignore_case: bool },
    Regex { pattern: String, ignore_case: bool, binary: bool },
    Host(String),
    HostSection(String),
    Punct(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
    /// Whitespace (or a comment) separates this token from the previous one.
    pub space_before: bool,
}

// Longest first.
const PUNCTS: &[&str] = &[
    "|>", "<|", ">>", "<<", "//", "/?", "=", "|", "(", ")", "{", "}", "[", "]", ",", ":", ";", "?",
    "*", "+", ".",
];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    delims: Vec<char>,
    tokens: Vec<Token>,
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, GrammarError> {
    let mut lexer = Lexer {
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        delims: Vec::new(),
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c))
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> GrammarError {
        GrammarError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    fn newlines_significant(&self) -> bool {
        matches!(self.delims.last(), None | Some('{'))
    }

    /// Whether the last token can end an operand, which makes a following
    /// `/` an operator instead of the start of a regex.
    fn after_operand(&self) -> bool {
        match self.tokens.last().map(|t| &t.tok) {
            Some(Tok::Name(_)) | Some(Tok::Int(_)) | Some(Tok::Byte(_)) | Some(Tok::Str { .. })
            | Some(Tok::Regex { .. }) | Some(Tok::Host(_)) => true,
            Some(Tok::Punct(p)) => matches!(*p, ")" | "]" | "}" | "?" | "*" | "+"),
            _ => false,
        }
    }

    fn push(&mut self, tok: Tok, line: usize, column: usize, space_before: bool) {
        self.tokens.push(Token {
            tok,
            line,
            column,
            space_before,
        });
    }

    fn run(&mut self) -> Result<(), GrammarError> {
        let mut space = true;
        loop {
            let (line, column) = (self.line, self.column);
            let c = match self.peek(0) {
                Some(c) => c,
                None => {
                    self.push(Tok::Newline, line, column, true);
                    self.push(Tok::Eof, line, column, true);
                    return Ok(());
                }
            };

            if c == '\n' {
                self.bump();
                let last_is_newline = matches!(self.tokens.last().map(|t| &t.tok), None | Some(Tok::Newline));
                if self.newlines_significant() && !last_is_newline {
                    self.push(Tok::Newline, line, column, space);
                }
                space = true;
                continue;
            }
            if c.is_whitespace() {
                self.bump();
                space = true;
                continue;
            }
            if c == '#' {
                while matches!(self.peek(0), Some(c) if c != '\n') {
                    self.bump();
                }
                space = true;
                continue;
            }

            let tok = if self.starts_with("```") {
                self.host_section(line, column)?
            } else if c == '`' {
                self.host(line, column)?
            } else if c == '"' || c == '\'' {
                self.string(c, line, column)?
            } else if c == 'b' && self.peek(1) == Some('/') {
                self.bump();
                self.regex(true, line, column)?
            } else if c == '0' && matches!(self.peek(1), Some('x') | Some('X')) {
                self.byte(line, column)?
            } else if c.is_ascii_digit() {
                self.int(line, column)?
            } else if c.is_alphabetic() || c == '_' {
                self.name()
            } else if c == '/' && !(self.after_operand() && matches!(self.peek(1), Some('/') | Some('?'))) {
                self.regex(false, line, column)?
            } else {
                self.punct(line, column)?
            };

            if let Tok::Punct(p) = tok {
                match p {
                    "(" | "[" | "{" => self.delims.push(p.chars().next().unwrap_or('(')),
                    ")" | "]" | "}" => {
                        let open = match p {
                            ")" => '(',
                            "]" => '[',
                            _ => '{',
                        };
                        if self.delims.pop() != Some(open) {
                            return Err(self.error(line, column, format!("Unbalanced '{}'", p)));
                        }
                    }
                    _ => {}
                }
            }
            self.push(tok, line, column, space);
            space = false;
        }
    }

    fn name(&mut self) -> Tok {
        let mut s = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Tok::Name(s)
    }

    fn int(&mut self, line: usize, column: usize) -> Result<Tok, GrammarError> {
        let mut s = String::new();
        while let Some(c) = self.peek(0).filter(char::is_ascii_digit) {
            s.push(c);
            self.bump();
        }
        s.parse()
            .map(Tok::Int)
            .map_err(|_| self.error(line, column, format!("Integer out of range: {}", s)))
    }

    fn byte(&mut self, line: usize, column: usize) -> Result<Tok, GrammarError> {
        self.bump();
        self.bump();
        let mut s = String::new();
        while let Some(c) = self.peek(0).filter(char::is_ascii_hexdigit) {
            s.push(c);
            self.bump();
        }
        if s.len() != 2 {
            return Err(self.error(line, column, "A byte literal needs exactly two hex digits"));
        }
        u8::from_str_radix(&s, 16)
            .map(Tok::Byte)
            .map_err(|_| self.error(line, column, "Invalid byte literal"))
    }

    fn ignore_case_suffix(&mut self) -> bool {
        let next_is_ident = matches!(self.peek(1), Some(c) if c.is_alphanumeric() || c == '_');
        if self.peek(0) == Some('i') && !next_is_ident {
            self.bump();
            true
        } else {
            false
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<Tok, GrammarError> {
        self.bump();
        let mut value = String::new();
        loop {
            let c = self
                .bump()
                .filter(|&c| c != '\n')
                .ok_or_else(|| self.error(line, column, "Unterminated string literal"))?;
            if c == quote {
                break;
            }
            if c != '\\' {
                value.push(c);
                continue;
            }
            let (el, ec) = (self.line, self.column);
            let e = self
                .bump()
                .ok_or_else(|| self.error(line, column, "Unterminated string literal"))?;
            match e {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                '\\' | '"' | '\'' => value.push(e),
                'x' => {
                    let hex: String = (0..2).filter_map(|_| self.bump()).collect();
                    let ch = u8::from_str_radix(&hex, 16)
                        .ok()
                        .filter(u8::is_ascii)
                        .map(char::from)
                        .ok_or_else(|| self.error(el, ec, format!("Invalid escape \\x{}", hex)))?;
                    value.push(ch);
                }
                'u' => {
                    if self.bump() != Some('{') {
                        return Err(self.error(el, ec, "Expected '{' after \\u"));
                    }
                    let mut hex = String::new();
                    while let Some(h) = self.bump() {
                        if h == '}' {
                            break;
                        }
                        hex.push(h);
                    }
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.error(el, ec, format!("Invalid escape \\u{{{}}}", hex)))?;
                    value.push(ch);
                }
                other => return Err(self.error(el, ec, format!("Unknown escape \\{}", other))),
            }
        }
        let ignore_case = self.ignore_case_suffix();
        Ok(Tok::Str { value, ignore_case })
    }

    fn regex(&mut self, binary: bool, line: usize, column: usize) -> Result<Tok, GrammarError> {
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let c = self
                .bump()
                .filter(|&c| c != '\n')
                .ok_or_else(|| self.error(line, column, "Unterminated regular expression"))?;
            match c {
                '/' if !in_class => break,
                '\\' => {
                    let e = self
                        .bump()
                        .ok_or_else(|| self.error(line, column, "Unterminated regular expression"))?;
                    if e != '/' {
                        pattern.push('\\');
                    }
                    pattern.push(e);
                }
                '[' => {
                    in_class = true;
                    pattern.push(c);
                }
                ']' => {
                    in_class = false;
                    pattern.push(c);
                }
                _ => pattern.push(c),
            }
        }
        let ignore_case = self.ignore_case_suffix();
        Ok(Tok::Regex {
            pattern,
            ignore_case,
            binary,
        })
    }

    fn host(&mut self, line: usize, column: usize) -> Result<Tok, GrammarError> {
        self.bump();
        let mut code = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some(c) => code.push(c),
                None => return Err(self.error(line, column, "Unterminated host expression")),
            }
        }
        Ok(Tok::Host(code.trim().to_string()))
    }

    fn host_section(&mut self, line: usize, column: usize) -> Result<Tok, GrammarError> {
        for _ in 0..3 {
            self.bump();
        }
        let mut code = String::new();
        while !self.starts_with("```") {
            match self.bump() {
                Some(c) => code.push(c),
                None => return Err(self.error(line, column, "Unterminated host section")),
            }
        }
        for _ in 0..3 {
            self.bump();
        }
        Ok(Tok::HostSection(code))
    }

    fn punct(&mut self, line: usize, column: usize) -> Result<Tok, GrammarError> {
        for p in PUNCTS {
            if self.starts_with(p) {
                for _ in 0..p.len() {
                    self.bump();
                }
                return Ok(Tok::Punct(p));
            }
        }
        let c = self.peek(0).unwrap_or(' ');
        Err(self.error(line, column, format!("Unexpected character '{}'", c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(text: &str) -> Vec<Tok> {
        tokenize(text).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn regex_or_operator() {
        assert_eq!(
            toks("a // b"),
            [
                Tok::Name("a".into()),
                Tok::Punct("//"),
                Tok::Name("b".into()),
                Tok::Newline,
                Tok::Eof
            ]
        );
        assert_eq!(
            toks("= /[/]+\\//i"),
            [
                Tok::Punct("="),
                Tok::Regex {
                    pattern: "[/]+/".into(),
                    ignore_case: true,
                    binary: false
                },
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn newlines_inside_parens_are_dropped() {
        let t = toks("A = (\n  'x'\n)\n\nB = { }");
        let newlines = t.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn literals() {
        assert_eq!(
            toks("'a\\x41\\u{e9}'i 0x1F b/\\x00/ `int` 12"),
            [
                Tok::Str {
                    value: "aAé".into(),
                    ignore_case: true
                },
                Tok::Byte(0x1F),
                Tok::Regex {
                    pattern: "\\x00".into(),
                    ignore_case: false,
                    binary: true
                },
                Tok::Host("int".into()),
                Tok::Int(12),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn errors_carry_positions() {
        match tokenize("A = 'x\nB = 'y'") {
            Err(GrammarError::Syntax { line, column, .. }) => assert_eq!((line, column), (1, 5)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(tokenize("A = )"), Err(GrammarError::Syntax { .. })));
    }
}
