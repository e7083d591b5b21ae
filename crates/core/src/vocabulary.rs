//! Identifier and query tokenization.
//!
//! Splits code identifiers into lowercase word streams across all naming
//! conventions (camelCase, PascalCase, snake_case, kebab-case,
//! SCREAMING_SNAKE) and tokenizes free text for BM25.

use std::collections::HashSet;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Stop words
// ---------------------------------------------------------------------------

const NL_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "how",
    "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or",
    "our", "so", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "to", "was", "we", "were", "what", "when", "where", "which", "while", "who", "why",
    "will", "with", "you", "your",
];

/// Query verbs and generic code words dropped from query vocabulary in
/// addition to the natural-language stop words.
const QUERY_EXTRA_STOP_WORDS: &[&str] = &[
    "find", "show", "get", "list", "search", "locate", "give", "tell", "want", "need",
    "look", "looking", "all", "any", "some", "use", "used", "using", "does", "do", "can",
    "function", "functions", "class", "classes", "method", "methods", "file", "files",
    "code", "thing", "things", "stuff",
];

fn nl_stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| NL_STOP_WORDS.iter().copied().collect())
}

fn query_stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        NL_STOP_WORDS.iter().chain(QUERY_EXTRA_STOP_WORDS.iter()).copied().collect()
    })
}

// ---------------------------------------------------------------------------
// Identifier vocabulary
// ---------------------------------------------------------------------------

/// Split an identifier into a deduplicated, order-preserving list of
/// lowercase words of length >= 2.
///
/// Splits on `_` and `-` first, then on case boundaries within each part:
/// a lowercase (or digit) followed by an uppercase, and a run of uppercase
/// letters followed by an uppercase+lowercase pair. Digits stay with the
/// preceding letter run. `XMLParser` -> `["xml", "parser"]`,
/// `getHTTPClient` -> `["get", "http", "client"]`.
pub fn extract_vocabulary(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for part in identifier.split(['_', '-']) {
        if part.is_empty() {
            continue;
        }
        for word in split_case_boundaries(part) {
            let word = word.to_lowercase();
            if word.chars().count() < 2 {
                continue;
            }
            if word.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if seen.insert(word.clone()) {
                words.push(word);
            }
        }
    }

    words
}

/// Split one underscore-free part on camel/Pascal case boundaries.
fn split_case_boundaries(part: &str) -> Vec<String> {
    let chars: Vec<char> = part.chars().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let lower_to_upper = (prev.is_lowercase() || prev.is_ascii_digit()) && c.is_uppercase();
            let upper_run_end = prev.is_uppercase()
                && c.is_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if lower_to_upper || upper_run_end {
                pieces.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

// ---------------------------------------------------------------------------
// Query vocabulary
// ---------------------------------------------------------------------------

/// Extract the vocabulary of a natural-language query: lowercased words with
/// stop words and query verbs removed, and identifier-shaped tokens
/// decomposed into their word pieces.
pub fn extract_query_vocabulary(query: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |w: String, seen: &mut HashSet<String>| {
        if seen.insert(w.clone()) {
            words.push(w);
        }
    };

    for raw in query.split(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-') {
        if raw.is_empty() {
            continue;
        }
        let identifier_shaped =
            raw.chars().any(|c| c.is_uppercase()) || raw.contains('_') || raw.contains('-');
        if identifier_shaped {
            for w in extract_vocabulary(raw) {
                push(w, &mut seen);
            }
        } else {
            let lower = raw.to_lowercase();
            if lower.chars().count() <= 1 || query_stop_words().contains(lower.as_str()) {
                continue;
            }
            push(lower, &mut seen);
        }
    }

    words
}

// ---------------------------------------------------------------------------
// BM25 tokenization
// ---------------------------------------------------------------------------

/// Tokenize free text for BM25: lowercase, split on non-alphanumeric runs,
/// drop tokens shorter than 2 characters and natural-language stop words.
/// Used for both document and query tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !nl_stop_words().contains(t))
        .map(|t| t.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Naming conventions
// ---------------------------------------------------------------------------

macro_rules! casing_regex {
    ($name:ident, $pattern:literal) => {
        pub fn $name(token: &str) -> bool {
            static RE: OnceLock<regex::Regex> = OnceLock::new();
            RE.get_or_init(|| regex::Regex::new($pattern).unwrap()).is_match(token)
        }
    };
}

casing_regex!(is_screaming_snake, r"^[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+$");
casing_regex!(is_camel_case, r"^[a-z][a-z0-9]*(?:[A-Z][a-zA-Z0-9]*)+$");
casing_regex!(is_pascal_case, r"^[A-Z][a-z]+(?:[A-Z][a-z0-9]*)+$");
casing_regex!(is_snake_case, r"^[a-z][a-z0-9]*(?:_[a-z0-9]+)+$");
casing_regex!(is_kebab_case, r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)+$");

/// True when a token matches any of the recognized identifier conventions.
pub fn matches_identifier_convention(token: &str) -> bool {
    is_screaming_snake(token)
        || is_camel_case(token)
        || is_pascal_case(token)
        || is_snake_case(token)
        || is_kebab_case(token)
}

/// Best-effort literal type inference from casing alone.
pub fn infer_literal_type(token: &str) -> crate::types::LiteralType {
    use crate::types::LiteralType;
    if is_screaming_snake(token) {
        LiteralType::VariableName
    } else if is_pascal_case(token) {
        LiteralType::ClassName
    } else if is_camel_case(token) || is_snake_case(token) {
        LiteralType::FunctionName
    } else if is_kebab_case(token) {
        LiteralType::PackageName
    } else {
        LiteralType::Identifier
    }
}
