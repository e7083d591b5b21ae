//! Query analysis: literal detection, intent classification, and the
//! identifier-query check that enables the exact-search track.
//!
//! Literals are detected either explicitly (backtick or double-quote spans)
//! or implicitly (standalone tokens matching a code naming convention).

use crate::types::{
    Confidence, DetectedLiteral, DetectionMethod, ParsedQuery, QueryIntent,
};
use crate::vocabulary::{infer_literal_type, matches_identifier_convention};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Intent terms
// ---------------------------------------------------------------------------

const DOCUMENTATION_TERMS: &[&str] = &[
    "documentation", "docs", "doc", "readme", "guide", "guides", "tutorial", "comment",
    "comments", "explain", "explained", "usage", "example", "examples", "reference", "manual",
];

const IMPLEMENTATION_TERMS: &[&str] = &[
    "implementation", "implement", "implements", "implemented", "impl", "code", "source",
    "logic", "algorithm", "internals", "definition", "define", "defined",
];

fn documentation_terms() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| DOCUMENTATION_TERMS.iter().copied().collect())
}

fn implementation_terms() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| IMPLEMENTATION_TERMS.iter().copied().collect())
}

// ---------------------------------------------------------------------------
// Explicit quoting
// ---------------------------------------------------------------------------

fn backtick_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+)`").unwrap())
}

fn quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).unwrap())
}

struct ExplicitSpan {
    start: usize,
    end: usize,
    value: String,
    raw: String,
    method: DetectionMethod,
}

fn explicit_spans(query: &str) -> Vec<ExplicitSpan> {
    let mut spans: Vec<ExplicitSpan> = Vec::new();

    for (re, method) in [
        (backtick_re(), DetectionMethod::ExplicitBacktick),
        (quote_re(), DetectionMethod::ExplicitQuote),
    ] {
        for cap in re.captures_iter(query) {
            let whole = cap.get(0).unwrap();
            let overlaps =
                spans.iter().any(|s| whole.start() < s.end && s.start < whole.end());
            if overlaps {
                continue;
            }
            spans.push(ExplicitSpan {
                start: whole.start(),
                end: whole.end(),
                value: cap[1].trim().to_string(),
                raw: whole.as_str().to_string(),
                method,
            });
        }
    }

    spans.sort_by_key(|s| s.start);
    spans
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Analyze a query: detect literals, classify intent, and compute the query
/// remainder used for keyword scoring.
pub fn parse_query(query: &str) -> ParsedQuery {
    let trimmed = query.trim();
    let mut detected = Vec::new();
    let mut remaining = trimmed.to_string();

    let spans = explicit_spans(trimmed);
    if !spans.is_empty() {
        // Strip the spans out of the remainder, rightmost first so earlier
        // byte offsets stay valid.
        let mut remainder = trimmed.to_string();
        for span in spans.iter().rev() {
            remainder.replace_range(span.start..span.end, " ");
        }
        remaining = remainder.split_whitespace().collect::<Vec<_>>().join(" ");

        for span in spans {
            if span.value.is_empty() {
                continue;
            }
            detected.push(DetectedLiteral {
                inferred_type: Some(infer_literal_type(&span.value)),
                value: span.value,
                raw_value: span.raw,
                confidence: Confidence::High,
                detection_method: span.method,
            });
        }
    } else {
        // Implicit casing on standalone whitespace-delimited tokens. The
        // remainder keeps the full query; convention-shaped tokens still
        // carry keyword signal.
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let single_token = tokens.len() == 1;
        for token in tokens {
            let token = token.trim_matches(|c: char| {
                !(c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });
            if token.is_empty() || !matches_identifier_convention(token) {
                continue;
            }
            detected.push(DetectedLiteral {
                value: token.to_string(),
                raw_value: token.to_string(),
                confidence: if single_token { Confidence::High } else { Confidence::Medium },
                detection_method: DetectionMethod::ImplicitCasing,
                inferred_type: Some(infer_literal_type(token)),
            });
        }
    }

    let intent_tokens: Vec<String> = trimmed
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect();

    ParsedQuery {
        detected_literals: detected,
        remaining_query: remaining,
        intent: detect_query_intent(&intent_tokens),
    }
}

/// Classify intent from lowercased query tokens. Documentation wins ties.
pub fn detect_query_intent<S: AsRef<str>>(tokens: &[S]) -> QueryIntent {
    if tokens.iter().any(|t| documentation_terms().contains(t.as_ref())) {
        QueryIntent::Documentation
    } else if tokens.iter().any(|t| implementation_terms().contains(t.as_ref())) {
        QueryIntent::Implementation
    } else {
        QueryIntent::Neutral
    }
}

/// True when the query contains at least one detectable literal, which
/// enables the grep-style exact-search track.
pub fn is_identifier_query(query: &str) -> bool {
    !parse_query(query).detected_literals.is_empty()
}

/// Extract the primary literal of a query, if one is detected.
pub fn extract_search_literal(query: &str) -> Option<String> {
    parse_query(query).detected_literals.into_iter().next().map(|l| l.value)
}
