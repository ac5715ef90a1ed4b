/// Options of one parse.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Byte offset to start at.
    pub position: usize,
    /// Require the whole input to be consumed. When `false`, a parse that
    /// stops early returns what it got and where it stopped.
    pub full_parse: bool,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            position: 0,
            full_parse: true,
        }
    }
}

impl ParseOptions {
    pub fn new() -> ParseOptions {
        ParseOptions::default()
    }

    /// Parse a prefix of the input, starting at `position`.
    pub fn prefix_at(position: usize) -> ParseOptions {
        ParseOptions {
            position,
            full_parse: false,
        }
    }

    pub fn position(mut self, position: usize) -> ParseOptions {
        self.position = position;
        self
    }

    pub fn full_parse(mut self, full_parse: bool) -> ParseOptions {
        self.full_parse = full_parse;
        self
    }
}
