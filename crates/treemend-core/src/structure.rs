//! Best-effort delimiter balance check.
//!
//! Counts `()`, `{}` and `[]` while skipping string literals and comments.
//! This is a heuristic for C-family sources: regex literals and template
//! literal interpolation are not understood. It only ever reports; nothing
//! in treemend appends closers to "fix" an imbalance.

use serde::{Deserialize, Serialize};

/// Result of a delimiter scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelimiterBalance {
    /// Openers never closed.
    pub unclosed: usize,

    /// Closers with no matching opener on top of the stack.
    pub unexpected: usize,

    /// 1-indexed line of the first unexpected closer.
    pub first_unexpected_line: Option<usize>,
}

impl DelimiterBalance {
    pub fn imbalance(&self) -> usize {
        self.unclosed + self.unexpected
    }

    pub fn is_balanced(&self) -> bool {
        self.imbalance() == 0
    }

    /// Warning text for reports, `None` when balanced.
    pub fn describe(&self) -> Option<String> {
        if self.is_balanced() {
            return None;
        }
        let mut msg = format!(
            "unbalanced delimiters: {} unclosed, {} unexpected",
            self.unclosed, self.unexpected
        );
        if let Some(line) = self.first_unexpected_line {
            msg.push_str(&format!(" (first unexpected closer on line {line})"));
        }
        Some(msg)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    LineComment,
    BlockComment,
    Quoted(char),
    Template,
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

pub fn delimiter_balance(content: &str) -> DelimiterBalance {
    let mut stack: Vec<char> = Vec::new();
    let mut result = DelimiterBalance::default();
    let mut mode = Mode::Code;
    let mut line = 1usize;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }
        match mode {
            Mode::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    mode = Mode::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    mode = Mode::BlockComment;
                }
                '\'' | '"' => mode = Mode::Quoted(c),
                '`' => mode = Mode::Template,
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    if stack.last().map(|open| closer_for(*open)) == Some(c) {
                        stack.pop();
                    } else {
                        result.unexpected += 1;
                        result.first_unexpected_line.get_or_insert(line);
                    }
                }
                _ => {}
            },
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                }
            }
            Mode::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    mode = Mode::Code;
                }
            }
            Mode::Quoted(quote) => match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        line += 1;
                    }
                }
                // Plain string literals cannot span lines; recover here so a
                // stray apostrophe does not swallow the rest of the file.
                '\n' => mode = Mode::Code,
                _ if c == quote => mode = Mode::Code,
                _ => {}
            },
            Mode::Template => match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        line += 1;
                    }
                }
                '`' => mode = Mode::Code,
                _ => {}
            },
        }
    }

    result.unclosed = stack.len();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_code() {
        let src = "function f(a: number[]) {\n  return { a };\n}\n";
        assert!(delimiter_balance(src).is_balanced());
    }

    #[test]
    fn test_unclosed_brace() {
        let b = delimiter_balance("export function GET() {\n  return 1;\n");
        assert_eq!(b.unclosed, 1);
        assert_eq!(b.unexpected, 0);
        assert!(b.describe().expect("warning").contains("1 unclosed"));
    }

    #[test]
    fn test_unexpected_closer_line() {
        let b = delimiter_balance("const a = 1;\n}\n");
        assert_eq!(b.unexpected, 1);
        assert_eq!(b.first_unexpected_line, Some(2));
    }

    #[test]
    fn test_mismatched_closer() {
        let b = delimiter_balance("call(a]");
        assert_eq!(b.unexpected, 1);
        assert_eq!(b.unclosed, 1);
        assert_eq!(b.imbalance(), 2);
    }

    #[test]
    fn test_delimiters_in_strings_and_comments_ignored() {
        let src = r#"
const a = '{(';
const b = "}]";
const c = `${x} )`;
// }}}
/* ((( */
"#;
        assert!(delimiter_balance(src).is_balanced());
    }

    #[test]
    fn test_stray_apostrophe_recovers_at_newline() {
        let src = "// fine\nconst msg = don't;\nfunction f() {\n}\n";
        assert!(delimiter_balance(src).is_balanced());
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let src = r#"const s = 'it\'s {'; f();"#;
        assert!(delimiter_balance(src).is_balanced());
    }
}
