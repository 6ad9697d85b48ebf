//! Pluralization of entity names.

use crate::error::TransformError;

/// Turns a singular noun into its plural form.
pub trait Inflector: Send + Sync {
    fn plural(&self, word: &str) -> Result<String, TransformError>;
}

impl<F> Inflector for F
where
    F: Fn(&str) -> Result<String, TransformError> + Send + Sync,
{
    fn plural(&self, word: &str) -> Result<String, TransformError> {
        self(word)
    }
}

const UNINFLECTED: &[&str] = &[
    "data", "deer", "equipment", "fish", "information", "metadata", "money", "news", "rice",
    "series", "sheep", "species", "status",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("foot", "feet"),
    ("goose", "geese"),
    ("man", "men"),
    ("mouse", "mice"),
    ("ox", "oxen"),
    ("person", "people"),
    ("tooth", "teeth"),
    ("woman", "women"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
    ("criterion", "criteria"),
    ("phenomenon", "phenomena"),
    ("analysis", "analyses"),
    ("crisis", "crises"),
    ("thesis", "theses"),
];

// Checked in order, first match wins: (suffix, chars to drop, replacement).
const SUFFIX_RULES: &[(&str, usize, &str)] = &[
    ("quiz", 0, "zes"),
    ("ss", 0, "es"),
    ("sh", 0, "es"),
    ("ch", 0, "es"),
    ("x", 0, "es"),
    ("z", 0, "es"),
    ("s", 0, "es"),
    ("fe", 2, "ves"),
    ("lf", 1, "ves"),
    ("rf", 1, "ves"),
    ("ay", 0, "s"),
    ("ey", 0, "s"),
    ("iy", 0, "s"),
    ("oy", 0, "s"),
    ("uy", 0, "s"),
    ("y", 1, "ies"),
    ("o", 0, "es"),
];

const O_TAKES_S: &[&str] = &["photo", "piano", "halo", "memo", "logo", "video", "radio", "zoo", "auto", "demo"];

/// Rule-based English pluralizer.
///
/// The inflection is applied to the last word of snake_case or camelCase
/// names (`author_book` becomes `author_books`), and the case of the
/// result follows the case of the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishInflector;

impl EnglishInflector {
    pub fn new() -> Self {
        Self
    }

    fn plural_word(word: &str) -> String {
        let lower = word.to_lowercase();
        if lower.is_empty() || UNINFLECTED.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
            return match_case(word, plural);
        }
        if lower.ends_with('o') && O_TAKES_S.contains(&lower.as_str()) {
            return match_case(word, &format!("{}s", lower));
        }
        for (suffix, drop, replacement) in SUFFIX_RULES {
            if lower.ends_with(suffix) {
                let stem = &lower[..lower.len() - drop];
                return match_case(word, &format!("{}{}", stem, replacement));
            }
        }
        match_case(word, &format!("{}s", lower))
    }
}

/// Apply the case pattern of `original` to the lowercase `inflected`.
fn match_case(original: &str, inflected: &str) -> String {
    let has_lower = original.chars().any(char::is_lowercase);
    let has_upper = original.chars().any(char::is_uppercase);
    if has_upper && !has_lower {
        return inflected.to_uppercase();
    }
    let mut chars = inflected.chars();
    match (original.chars().next(), chars.next()) {
        (Some(first), Some(c)) if first.is_uppercase() => c.to_uppercase().chain(chars).collect(),
        _ => inflected.to_string(),
    }
}

/// Byte offset where the last word of a compound identifier starts.
fn last_word_start(name: &str) -> usize {
    if let Some(pos) = name.rfind('_') {
        return pos + 1;
    }
    name.char_indices()
        .skip(1)
        .filter(|(_, c)| c.is_uppercase())
        .map(|(i, _)| i)
        .last()
        .filter(|_| name.chars().any(char::is_lowercase))
        .unwrap_or(0)
}

impl Inflector for EnglishInflector {
    fn plural(&self, word: &str) -> Result<String, TransformError> {
        let start = last_word_start(word);
        let (head, last) = word.split_at(start);
        Ok(format!("{}{}", head, Self::plural_word(last)))
    }
}
