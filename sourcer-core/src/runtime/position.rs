//! Line/column mapping and error excerpts.

use std::fmt::Write;

use super::Input;

/// A location in the input. `index` is a byte offset, `line` and `column`
/// count from 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

/// Where a node was found. `end` is the last consumed character.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PositionInfo {
    pub start: Position,
    pub end: Position,
}

/// Line and column of every byte offset of an input, plus the offset one
/// past its end.
///
/// Built with a single forward scan so that lookups are O(1). A newline
/// starts the next line and sits at column 0 of it; continuation bytes of a
/// multi-byte character share the column of the character.
pub struct LineMap {
    lines: Vec<u32>,
    columns: Vec<u32>,
}

impl LineMap {
    pub fn new(input: Input<'_>) -> LineMap {
        let bytes = input.as_bytes();
        let mut lines = Vec::with_capacity(bytes.len() + 1);
        let mut columns = Vec::with_capacity(bytes.len() + 1);
        let is_text = matches!(input, Input::Text(_));

        let mut line = 1u32;
        let mut column = 0u32;

        for &b in bytes {
            if b == b'\n' {
                line += 1;
                column = 0;
            } else if !is_text || b & 0xC0 != 0x80 {
                // UTF-8 continuation bytes do not start a new column.
                column += 1;
            }
            lines.push(line);
            columns.push(column);
        }

        lines.push(line);
        columns.push(column + 1);

        LineMap { lines, columns }
    }

    pub fn position(&self, index: usize) -> Position {
        let i = index.min(self.lines.len() - 1);
        Position {
            index,
            line: self.lines[i] as usize,
            column: self.columns[i] as usize,
        }
    }
}

/// Renders the line containing `pos` with a caret under `column`.
///
/// Long lines are elided from whichever end is farther from the caret. Byte
/// input shows a small escaped window instead.
pub fn extract_excerpt(input: Input<'_>, pos: usize, column: usize) -> String {
    let text = match input {
        Input::Bytes(bytes) => return byte_window(bytes, pos),
        Input::Text(text) => text,
    };

    let bytes = text.as_bytes();
    let pos = pos.min(bytes.len());
    // A newline at `pos` opens the line that follows it.
    let line_start = bytes[..(pos + 1).min(bytes.len())]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let line_end = bytes[line_start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| line_start + i)
        .unwrap_or(bytes.len());

    let line: Vec<char> = String::from_utf8_lossy(&bytes[line_start..line_end])
        .chars()
        .collect();
    let caret = column.saturating_sub(1);
    let len = line.len();

    let slice = |from: usize, to: usize| -> String {
        line[from.min(len)..to.min(len)].iter().collect()
    };

    if len < 96 {
        slice(0, len) + &caret_at(caret)
    } else if column < 60 {
        slice(0, 90) + " ..." + &caret_at(caret)
    } else if len.saturating_sub(caret) < 40 {
        let from = len - 90;
        "... ".to_string() + &slice(from, len) + &caret_at(caret - from + 4)
    } else {
        "... ".to_string() + &slice(caret - 42, caret + 42) + " ..." + &caret_at(42 + 4)
    }
}

fn caret_at(index: usize) -> String {
    format!("\n{}^", " ".repeat(index))
}

fn byte_window(bytes: &[u8], pos: usize) -> String {
    let from = pos.saturating_sub(1).min(bytes.len());
    let to = (pos + 2).min(bytes.len());
    let mut out = String::from("b\"");
    for &b in &bytes[from..to] {
        for c in std::ascii::escape_default(b) {
            out.push(c as char);
        }
    }
    out.push('"');
    out
}

/// Formats a failure title the way every parse error starts.
pub(crate) fn error_title(input: Input<'_>, map: &LineMap, pos: usize) -> String {
    if pos >= input.len() {
        return "Unexpected end of input.\n".to_string();
    }
    let p = map.position(pos);
    let mut out = String::new();
    let _ = write!(
        out,
        "Error on line {}, column {}:\n{}\n",
        p.line,
        p.column,
        extract_excerpt(input, pos, p.column)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_and_column_table() {
        let text = "ab\ncd\n\nxyz";
        let map = LineMap::new(Input::Text(text));
        let expected = [
            (1, 1),
            (1, 2),
            (2, 0), // '\n' opens line 2
            (2, 1),
            (2, 2),
            (3, 0),
            (4, 0),
            (4, 1),
            (4, 2),
            (4, 3),
            (4, 4), // end of input
        ];
        for (index, &(line, column)) in expected.iter().enumerate() {
            let p = map.position(index);
            assert_eq!((p.line, p.column), (line, column), "index {}", index);
        }
    }

    #[test]
    fn multibyte_columns() {
        let text = "é=1";
        let map = LineMap::new(Input::Text(text));
        assert_eq!(map.position(0).column, 1);
        assert_eq!(map.position(1).column, 1);
        assert_eq!(map.position(2).column, 2);
        assert_eq!(map.position(3).column, 3);
    }

    #[test]
    fn short_line_excerpt() {
        let text = "first\nsecond line\n";
        let excerpt = extract_excerpt(Input::Text(text), 9, 4);
        assert_eq!(excerpt, "second line\n   ^");
    }

    #[test]
    fn long_line_is_chopped_at_the_end() {
        let text = "x".repeat(200);
        let excerpt = extract_excerpt(Input::Text(&text), 10, 11);
        let first = excerpt.lines().next().unwrap();
        assert!(first.ends_with(" ..."));
        assert_eq!(first.len(), 94);
        assert_eq!(excerpt.lines().nth(1).unwrap(), format!("{}^", " ".repeat(10)));
    }

    #[test]
    fn long_line_is_chopped_at_the_start() {
        let text = "y".repeat(200);
        let excerpt = extract_excerpt(Input::Text(&text), 190, 191);
        let first = excerpt.lines().next().unwrap();
        assert!(first.starts_with("... "));
        let caret = excerpt.lines().nth(1).unwrap();
        assert_eq!(caret.len() - 1, 190 - 110 + 4);
    }

    #[test]
    fn long_line_is_chopped_at_both_ends() {
        let text = "z".repeat(300);
        let excerpt = extract_excerpt(Input::Text(&text), 150, 151);
        let first = excerpt.lines().next().unwrap();
        assert!(first.starts_with("... ") && first.ends_with(" ..."));
        assert_eq!(excerpt.lines().nth(1).unwrap(), format!("{}^", " ".repeat(46)));
    }

    #[test]
    fn excerpt_at_a_newline_shows_the_next_line() {
        let text = "first\nsecond";
        let map = LineMap::new(Input::Text(text));
        let p = map.position(5);
        assert_eq!((p.line, p.column), (2, 0));
        assert_eq!(extract_excerpt(Input::Text(text), 5, p.column), "second\n^");

        let title = error_title(Input::Text(text), &map, 5);
        assert_eq!(title, "Error on line 2, column 0:\nsecond\n^\n");
    }

    #[test]
    fn trailing_newline_end_of_input() {
        let map = LineMap::new(Input::Text("a\n"));
        let end = map.position(2);
        assert_eq!((end.line, end.column), (2, 1));
    }

    #[test]
    fn byte_excerpt() {
        let data = [0u8, 1, 0xff, 7];
        assert_eq!(extract_excerpt(Input::Bytes(&data), 2, 3), "b\"\\x01\\xff\\x07\"");
    }
}
