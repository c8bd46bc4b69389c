// SQL text helpers: identifier checks, literal quoting, placeholder rebinding

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Placeholder convention of the target driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?` positional placeholders (MySQL)
    Question,
    /// `$1, $2, ...` numbered placeholders (PostgreSQL)
    Dollar,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex pattern"))
}

/// A bare SQL identifier
pub fn is_identifier(text: &str) -> bool {
    identifier_pattern().is_match(text)
}

/// `name` or `qualifier.name`
pub fn is_column_ref(text: &str) -> bool {
    match text.split_once('.') {
        Some((qualifier, name)) => is_identifier(qualifier) && is_identifier(name),
        None => is_identifier(text),
    }
}

/// Single-quoted SQL string literal
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Byte ranges of `sql` that are plain statement text: outside string
/// literals, quoted identifiers and comments.
///
/// Under [`Dialect::Question`] a backslash inside a quoted string escapes
/// the next character and `#` starts a line comment, as in MySQL.
pub fn code_spans(sql: &str, dialect: Dialect) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        let skipped_to = match bytes[i] {
            b'\'' | b'"' | b'`' => Some(skip_quoted(bytes, i, dialect)),
            b'-' if next == Some(b'-') => Some(skip_line(bytes, i)),
            b'#' if dialect == Dialect::Question => Some(skip_line(bytes, i)),
            b'/' if next == Some(b'*') => Some(skip_block(bytes, i)),
            _ => None,
        };

        match skipped_to {
            Some(end) => {
                if start < i {
                    spans.push(start..i);
                }
                i = end;
                start = end;
            }
            None => i += 1,
        }
    }
    if start < bytes.len() {
        spans.push(start..bytes.len());
    }

    spans
}

/// True when byte offset `pos` lies in one of `spans`
pub fn in_code(spans: &[Range<usize>], pos: usize) -> bool {
    spans.iter().any(|span| span.contains(&pos))
}

fn skip_quoted(bytes: &[u8], open: usize, dialect: Dialect) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if dialect == Dialect::Question && quote != b'`' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset)
}

fn skip_block(bytes: &[u8], from: usize) -> usize {
    bytes[from + 2..]
        .windows(2)
        .position(|pair| pair == b"*/")
        .map_or(bytes.len(), |offset| from + 2 + offset + 2)
}

/// Convert generic `?` placeholders to the dialect's convention.
///
/// Placeholders inside quoted strings, quoted identifiers or comments are
/// left untouched. Returns the rewritten statement and the placeholder count.
pub fn rebind(sql: &str, dialect: Dialect) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut count = 0;
    let mut last = 0;

    for span in code_spans(sql, dialect) {
        out.push_str(&sql[last..span.start]);
        for ch in sql[span.clone()].chars() {
            if ch != '?' {
                out.push(ch);
                continue;
            }
            count += 1;
            match dialect {
                Dialect::Question => out.push('?'),
                Dialect::Dollar => {
                    out.push('$');
                    out.push_str(&count.to_string());
                }
            }
        }
        last = span.end;
    }
    out.push_str(&sql[last..]);

    (out, count)
}
