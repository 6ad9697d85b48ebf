//! Glob pattern compilation for table and column names.
//!
//! Supported syntax:
//!
//! - `*` matches zero or more characters, never crossing the separator
//! - `?` matches exactly one character other than the separator
//! - `[abc]`, `[a-z]`, `[!abc]` character classes
//! - `{left,right}` alternatives
//! - `\x` escapes `x`
//!
//! Every other character is literal. Patterns are anchored on both ends and
//! always case-insensitive. A pattern that cannot be compiled is a
//! configuration error, reported at compile time.

use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};
use std::fmt;

/// Default separator between table and column names.
pub const DEFAULT_SEPARATOR: char = '.';

/// A compiled, immutable glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    glob: String,
    regex: Regex,
    literals: usize,
}

impl Pattern {
    /// Compile `glob`, with `*` and `?` never matching `separator`.
    ///
    /// # Example
    ///
    /// ```
    /// use relmodel::pattern::Pattern;
    ///
    /// let pattern = Pattern::compile("Foo*", '.').unwrap();
    /// assert!(pattern.matches("foobar"));
    /// assert!(!pattern.matches("foo.bar"));
    /// ```
    pub fn compile(glob: &str, separator: char) -> Result<Self, ConfigError> {
        let (source, literals) = glob_to_regex(glob, separator)?;
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: glob.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
            literals,
        })
    }

    /// Whether the whole of `candidate` matches.
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// The glob this pattern was compiled from.
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// The generated regular expression source.
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }

    /// Number of literal characters in the glob. Higher is more specific;
    /// `*` alone scores zero.
    pub fn specificity(&self) -> usize {
        self.literals
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}

fn invalid(glob: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidPattern {
        pattern: glob.to_string(),
        reason: reason.to_string(),
    }
}

/// Translate a glob into an anchored regex source, returning the source and
/// the count of literal characters.
fn glob_to_regex(glob: &str, separator: char) -> Result<(String, usize), ConfigError> {
    let sep = regex::escape(&separator.to_string());
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    let mut literals = 0;
    let mut braces = 0usize;
    let mut chars = glob.chars().peekable();

    out.push('^');
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                // Consecutive stars collapse.
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push_str(&format!("[^{}]*", sep));
            }
            '?' => out.push_str(&format!("[^{}]", sep)),
            '[' => {
                let mut class = String::from("[");
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                let mut closed = false;
                let mut first = true;
                while let Some(cc) = chars.next() {
                    if cc == ']' && !first {
                        closed = true;
                        break;
                    }
                    first = false;
                    match cc {
                        '\\' | '[' | '^' | '&' | '~' => {
                            class.push('\\');
                            class.push(cc);
                        }
                        _ => class.push(cc),
                    }
                }
                if !closed {
                    return Err(invalid(glob, "unterminated character class"));
                }
                class.push(']');
                out.push_str(&class);
                literals += 1;
            }
            '{' => {
                braces += 1;
                out.push_str("(?:");
            }
            ',' if braces > 0 => out.push('|'),
            '}' => {
                if braces == 0 {
                    return Err(invalid(glob, "unbalanced '}'"));
                }
                braces -= 1;
                out.push(')');
            }
            '\\' => match chars.next() {
                Some(escaped) => {
                    out.push_str(&regex::escape(&escaped.to_string()));
                    literals += 1;
                }
                None => return Err(invalid(glob, "dangling escape")),
            },
            _ => {
                out.push_str(&regex::escape(&c.to_string()));
                literals += 1;
            }
        }
    }
    if braces > 0 {
        return Err(invalid(glob, "unbalanced '{'"));
    }
    out.push('$');
    Ok((out, literals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        let p = Pattern::compile("*", '.').unwrap();
        assert!(p.matches(""));
        assert!(p.matches("anything_at_all"));
        assert!(!p.matches("with.separator"));
        assert_eq!(p.specificity(), 0);
    }

    #[test]
    fn test_case_insensitive() {
        let p = Pattern::compile("Foo*", '.').unwrap();
        assert!(p.matches("foobar"));
        assert!(p.matches("FOO"));
        assert!(!p.matches("barfoo"));
    }

    #[test]
    fn test_literal_regex_characters_are_escaped() {
        let p = Pattern::compile("a+b(c)", '.').unwrap();
        assert!(p.matches("A+B(C)"));
        assert!(!p.matches("aab(c)"));
    }

    #[test]
    fn test_underscore_is_literal_inside_pattern() {
        let p = Pattern::compile("*_id", '.').unwrap();
        assert!(p.matches("publisher_id"));
        assert!(!p.matches("publisherid"));
    }

    #[test]
    fn test_classes_and_alternatives() {
        let p = Pattern::compile("{book,author}_[!x]*", '.').unwrap();
        assert!(p.matches("book_title"));
        assert!(p.matches("AUTHOR_name"));
        assert!(!p.matches("author_xname"));
        assert!(!p.matches("publisher_name"));

        let q = Pattern::compile("t?", '.').unwrap();
        assert!(q.matches("t1"));
        assert!(!q.matches("t12"));
    }

    #[test]
    fn test_unparseable_patterns() {
        assert!(matches!(
            Pattern::compile("[abc", '.'),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(Pattern::compile("{a,b", '.').is_err());
        assert!(Pattern::compile("a}", '.').is_err());
        assert!(Pattern::compile("trailing\\", '.').is_err());
    }

    #[test]
    fn test_specificity_counts_literals() {
        assert_eq!(Pattern::compile("book*", '.').unwrap().specificity(), 4);
        assert_eq!(Pattern::compile("book", '.').unwrap().specificity(), 4);
        assert_eq!(Pattern::compile("b*k", '.').unwrap().specificity(), 2);
    }
}
