//! Quote-aware splitting helpers.
//!
//! All delimiters are ASCII, so byte offsets found here are always valid
//! `str` boundaries.

/// Lexical position while scanning SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    SingleQuoted,
    DoubleQuoted,
}

/// Tracks quoting and parenthesis depth one byte at a time.
struct Scanner {
    mode: Mode,
    depth: usize,
}

impl Scanner {
    fn new() -> Self {
        Self {
            mode: Mode::Normal,
            depth: 0,
        }
    }

    /// Consumes `b` and reports whether it sits outside quotes and parentheses.
    /// Doubled quotes (`''`, `""`) toggle twice and so stay inside the literal.
    fn top_level(&mut self, b: u8) -> bool {
        match (self.mode, b) {
            (Mode::Normal, b'\'') => self.mode = Mode::SingleQuoted,
            (Mode::Normal, b'"') => self.mode = Mode::DoubleQuoted,
            (Mode::Normal, b'(') => self.depth += 1,
            (Mode::Normal, b')') => self.depth = self.depth.saturating_sub(1),
            (Mode::Normal, _) => return self.depth == 0,
            (Mode::SingleQuoted, b'\'') | (Mode::DoubleQuoted, b'"') => self.mode = Mode::Normal,
            _ => {}
        }
        false
    }
}

/// Removes `--` line comments and `/* */` block comments outside quotes.
/// Each comment is replaced by a single space so tokens stay separated.
pub fn strip_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut mode = Mode::Normal;
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match mode {
            Mode::Normal if b == b'-' && bytes.get(i + 1) == Some(&b'-') => {
                out.push_str(&sql[copied..i]);
                out.push(' ');
                i = bytes[i..]
                    .iter()
                    .position(|&c| c == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                copied = i;
                continue;
            }
            Mode::Normal if b == b'/' && bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(&sql[copied..i]);
                out.push(' ');
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                copied = i;
                continue;
            }
            Mode::Normal if b == b'\'' => mode = Mode::SingleQuoted,
            Mode::Normal if b == b'"' => mode = Mode::DoubleQuoted,
            Mode::SingleQuoted if b == b'\'' => mode = Mode::Normal,
            Mode::DoubleQuoted if b == b'"' => mode = Mode::Normal,
            _ => {}
        }
        i += 1;
    }
    out.push_str(&sql[copied..]);
    out
}

/// Splits a Query message into individual statements.
///
/// Comments are removed, then the text is cut at every `;` outside quotes.
/// Blank statements are dropped, so text holding only whitespace, comments
/// or semicolons yields an empty list.
pub fn split_statements(sql: &str) -> Vec<String> {
    let sql = strip_comments(sql);
    split_top_level(&sql, b';')
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits at `sep` outside quotes and parentheses, trimming each piece.
pub(crate) fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let mut scanner = Scanner::new();
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, &b) in s.as_bytes().iter().enumerate() {
        if scanner.top_level(b) && b == sep {
            parts.push(s[start..i].trim());
            start = i + 1;
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Splits a condition list at top-level `AND` keywords (case-insensitive).
pub(crate) fn split_conjunction(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut scanner = Scanner::new();
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if !scanner.top_level(b) {
            continue;
        }
        let is_and = bytes.len() >= i + 3
            && bytes[i..i + 3].eq_ignore_ascii_case(b"and")
            && i > 0
            && bytes[i - 1].is_ascii_whitespace()
            && bytes.get(i + 3).is_some_and(|c| c.is_ascii_whitespace());
        if is_and {
            parts.push(s[start..i].trim());
            start = i + 3;
        }
    }
    parts.push(s[start..].trim());
    parts
}
