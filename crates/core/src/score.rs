//! Score fusion: BM25, symbol matching, literal and vocabulary multipliers,
//! and file-type boosts combined into one final chunk score.
//!
//! Every tunable constant lives in [`ScoringConfig`] so the tables can be
//! swapped without touching the fusion logic.

use crate::bm25::{normalize_score, Bm25Params};
use crate::types::{
    ChunkType, Confidence, LiteralMatchType, QueryIntent, ScoreContributions, SearchResult,
    is_doc_extension, is_source_extension,
};

// ---------------------------------------------------------------------------
// Scoring configuration
// ---------------------------------------------------------------------------

/// All scoring knobs in one place.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub bm25: Bm25Params,
    /// `raw / (raw + c)` normalization constant.
    pub normalization_c: f64,
    pub bm25_weight: f64,
    pub symbol_weight: f64,
    /// Indexed `[match_type][confidence]`, rows definition/reference/import,
    /// columns high/medium/low.
    pub literal_multipliers: [[f64; 3]; 3],
    pub vocab_base: f64,
    pub vocab_step: f64,
    pub vocab_extra_cap: f64,
    pub vocab_min_words: usize,
    pub source_file_boost: f64,
    pub doc_file_boost: f64,
    /// Base used when a chunk is known only to the literal index.
    pub literal_fallback_base: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            bm25: Bm25Params::default(),
            normalization_c: 2.0,
            bm25_weight: 0.6,
            symbol_weight: 0.4,
            literal_multipliers: [
                [2.5, 2.0, 1.5], // definition
                [2.0, 1.5, 1.3], // reference
                [1.5, 1.3, 1.1], // import
            ],
            vocab_base: 1.3,
            vocab_step: 0.1,
            vocab_extra_cap: 0.5,
            vocab_min_words: 2,
            source_file_boost: 0.06,
            doc_file_boost: 0.08,
            literal_fallback_base: 0.5,
        }
    }
}

impl ScoringConfig {
    pub fn literal_multiplier(&self, match_type: LiteralMatchType, confidence: Confidence) -> f64 {
        let row = match match_type {
            LiteralMatchType::Definition => 0,
            LiteralMatchType::Reference => 1,
            LiteralMatchType::Import => 2,
        };
        let col = match confidence {
            Confidence::High => 0,
            Confidence::Medium => 1,
            Confidence::Low => 2,
        };
        self.literal_multipliers[row][col]
    }

    /// Multiplier for `m` matched vocabulary words: 1.0 below the
    /// significance threshold, then `1.3 + min((m-2)*0.1, 0.5)`.
    pub fn vocab_multiplier(&self, matched_words: usize) -> f64 {
        if matched_words < self.vocab_min_words {
            1.0
        } else {
            self.vocab_base
                + ((matched_words - self.vocab_min_words) as f64 * self.vocab_step)
                    .min(self.vocab_extra_cap)
        }
    }

    /// Intent-conditional boost by file extension.
    pub fn file_type_boost(&self, intent: QueryIntent, ext: &str) -> f64 {
        match intent {
            QueryIntent::Implementation if is_source_extension(ext) => self.source_file_boost,
            QueryIntent::Documentation if is_doc_extension(ext) => self.doc_file_boost,
            _ => 0.0,
        }
    }

    /// Combine a base score with the best literal multiplier. A chunk with
    /// no base signal but a literal hit falls back to a fixed base so exact
    /// matches always surface.
    pub fn apply_literal_boost(&self, base: f64, multiplier: f64) -> f64 {
        if base == 0.0 && multiplier > 1.0 {
            self.literal_fallback_base * multiplier
        } else {
            base * multiplier
        }
    }
}

// ---------------------------------------------------------------------------
// Symbol scoring
// ---------------------------------------------------------------------------

/// Score query tokens against a chunk's symbol name and its vocabulary.
/// Exact name equality scores highest (more when exported), substring
/// containment next, per-word vocabulary equality least. The sum is averaged
/// over the query tokens and clamped to 1.
pub fn symbol_score(
    query_tokens: &[String],
    name: Option<&str>,
    name_vocabulary: &[String],
    is_exported: bool,
) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let name_lower = name.map(|n| n.to_lowercase());
    let mut sum = 0.0;

    for token in query_tokens {
        if let Some(ref nl) = name_lower {
            if token == nl {
                sum += if is_exported { 1.0 } else { 0.8 };
                continue;
            }
            if nl.contains(token.as_str()) || token.contains(nl.as_str()) {
                sum += if is_exported { 0.5 } else { 0.4 };
                continue;
            }
        }
        if name_vocabulary.iter().any(|w| w == token) {
            sum += if is_exported { 0.3 } else { 0.2 };
        }
    }

    (sum / query_tokens.len() as f64).min(1.0)
}

// ---------------------------------------------------------------------------
// Vocabulary matching
// ---------------------------------------------------------------------------

/// Result of matching query vocabulary against one identifier's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyMatchResult {
    pub matched_words: Vec<String>,
    pub matched_word_count: usize,
    pub is_significant: bool,
    pub multiplier: f64,
}

/// Intersect query words with an identifier's vocabulary, preserving query
/// order.
pub fn calculate_vocabulary_match(
    query_words: &[String],
    identifier_words: &[String],
    cfg: &ScoringConfig,
) -> VocabularyMatchResult {
    let matched: Vec<String> = query_words
        .iter()
        .filter(|w| identifier_words.contains(w))
        .cloned()
        .collect();
    let count = matched.len();
    VocabularyMatchResult {
        matched_words: matched,
        matched_word_count: count,
        is_significant: count >= cfg.vocab_min_words,
        multiplier: cfg.vocab_multiplier(count),
    }
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// A chunk entering fusion, with the per-track signals already resolved.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub filepath: String,
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_type: ChunkType,
    pub name: Option<String>,
    pub snippet: String,
    /// Raw (unnormalized) BM25 score of the containing file.
    pub bm25_raw: f64,
    /// Symbol contribution in [0, 1].
    pub symbol: f64,
    /// Score from an external semantic module, when one is registered.
    pub semantic: Option<f64>,
    /// Best literal hit for this chunk.
    pub literal: Option<(LiteralMatchType, Confidence)>,
    /// Number of query vocabulary words matching this chunk's identifiers.
    pub vocab_matched: usize,
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Fuse candidates (the union of the keyword results and the literal-index
/// results) into the final ranked list. Results below `min_score` are
/// dropped; ordering is final score descending, then filepath, then start
/// line; at most `top_k` results are returned.
pub fn merge_with_literal_boost(
    candidates: Vec<ChunkCandidate>,
    intent: QueryIntent,
    cfg: &ScoringConfig,
    min_score: f64,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .map(|c| {
            let bm25 = normalize_score(c.bm25_raw, cfg.normalization_c);
            let base = cfg.bm25_weight * bm25 + cfg.symbol_weight * c.symbol;
            let literal_multiplier = c
                .literal
                .map(|(mt, conf)| cfg.literal_multiplier(mt, conf))
                .unwrap_or(1.0);
            let vocab_multiplier = cfg.vocab_multiplier(c.vocab_matched);
            let ext = crate::types::file_extension(&c.filepath);
            let file_type_boost = cfg.file_type_boost(intent, ext);

            let score = if base == 0.0 && literal_multiplier > 1.0 {
                clamp01(cfg.apply_literal_boost(0.0, literal_multiplier) + file_type_boost)
            } else {
                clamp01(base * literal_multiplier * vocab_multiplier + file_type_boost)
            };

            SearchResult {
                chunk_id: c.chunk_id,
                filepath: c.filepath,
                start_line: c.start_line,
                end_line: c.end_line,
                chunk_type: c.chunk_type,
                name: c.name,
                snippet: c.snippet,
                score,
                contributions: ScoreContributions {
                    bm25,
                    symbol: c.symbol,
                    semantic: c.semantic,
                    literal_multiplier,
                    vocab_multiplier,
                    file_type_boost,
                },
            }
        })
        .filter(|r| r.score >= min_score)
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.filepath.cmp(&b.filepath))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });
    results.truncate(top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(chunk_id: &str, filepath: &str) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: chunk_id.to_string(),
            filepath: filepath.to_string(),
            start_line: 1,
            end_line: 50,
            chunk_type: ChunkType::Block,
            name: None,
            snippet: String::new(),
            bm25_raw: 0.0,
            symbol: 0.0,
            semantic: None,
            literal: None,
            vocab_matched: 0,
        }
    }

    #[test]
    fn test_literal_multiplier_table() {
        let cfg = ScoringConfig::default();
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Definition, Confidence::High), 2.5);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Definition, Confidence::Medium), 2.0);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Definition, Confidence::Low), 1.5);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Reference, Confidence::High), 2.0);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Reference, Confidence::Medium), 1.5);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Reference, Confidence::Low), 1.3);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Import, Confidence::High), 1.5);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Import, Confidence::Medium), 1.3);
        assert_eq!(cfg.literal_multiplier(LiteralMatchType::Import, Confidence::Low), 1.1);
    }

    #[test]
    fn test_vocab_multiplier_thresholds() {
        let cfg = ScoringConfig::default();
        assert_eq!(cfg.vocab_multiplier(0), 1.0);
        assert_eq!(cfg.vocab_multiplier(1), 1.0);
        assert_eq!(cfg.vocab_multiplier(2), 1.3);
        assert!((cfg.vocab_multiplier(3) - 1.4).abs() < 1e-12);
        assert!((cfg.vocab_multiplier(7) - 1.8).abs() < 1e-12);
        // Capped at +0.5 over the base.
        assert!((cfg.vocab_multiplier(20) - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_symbol_score_exact_exported() {
        let tokens = vec!["hashpassword".to_string()];
        assert_eq!(symbol_score(&tokens, Some("hashPassword"), &[], true), 1.0);
        assert_eq!(symbol_score(&tokens, Some("hashPassword"), &[], false), 0.8);
    }

    #[test]
    fn test_symbol_score_substring_and_vocab() {
        let tokens = vec!["hash".to_string(), "password".to_string()];
        // Both tokens are substrings of the name.
        let s = symbol_score(&tokens, Some("hashPassword"), &[], true);
        assert!((s - 0.5).abs() < 1e-12);
        // Vocabulary-only matches.
        let vocab = vec!["hash".to_string(), "password".to_string()];
        let s = symbol_score(&tokens, None, &vocab, false);
        assert!((s - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_symbol_score_subset_of_vocab_at_least_point_two() {
        let vocab = vec!["get".to_string(), "user".to_string(), "by".to_string(), "id".to_string()];
        for tokens in [vec!["user".to_string()], vec!["get".to_string(), "id".to_string()]] {
            assert!(symbol_score(&tokens, None, &vocab, false) >= 0.2);
        }
    }

    #[test]
    fn test_symbol_score_clamped() {
        let tokens = vec!["exact".to_string()];
        assert!(symbol_score(&tokens, Some("exact"), &[], true) <= 1.0);
        assert_eq!(symbol_score(&[], Some("exact"), &[], true), 0.0);
    }

    #[test]
    fn test_calculate_vocabulary_match_scenario() {
        let cfg = ScoringConfig::default();
        let q: Vec<String> = ["get", "user", "by", "id"].iter().map(|s| s.to_string()).collect();
        let ident: Vec<String> = ["get", "user", "data"].iter().map(|s| s.to_string()).collect();
        let m = calculate_vocabulary_match(&q, &ident, &cfg);
        assert_eq!(m.matched_word_count, 2);
        assert!(m.is_significant);
        assert!((m.multiplier - 1.3).abs() < 1e-12);
        assert_eq!(m.matched_words, vec!["get", "user"]);
    }

    #[test]
    fn test_apply_literal_boost_fallback() {
        let cfg = ScoringConfig::default();
        // Definition/high with no base signal: 0.5 * 2.5 = 1.25 pre-clamp.
        let boosted = cfg.apply_literal_boost(0.0, 2.5);
        assert!((boosted - 1.25).abs() < 1e-12);
        // With base signal the multiplier applies directly.
        assert!((cfg.apply_literal_boost(0.4, 2.0) - 0.8).abs() < 1e-12);
        // No literal hit leaves the base untouched.
        assert_eq!(cfg.apply_literal_boost(0.4, 1.0), 0.4);
    }

    #[test]
    fn test_merge_clamps_fallback_to_one() {
        let cfg = ScoringConfig::default();
        let mut c = candidate("a.ts:1-50", "a.ts");
        c.literal = Some((LiteralMatchType::Definition, Confidence::High));
        let results = merge_with_literal_boost(vec![c], QueryIntent::Neutral, &cfg, 0.0, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].contributions.literal_multiplier, 2.5);
    }

    #[test]
    fn test_merge_boost_never_lowers_score() {
        let cfg = ScoringConfig::default();
        let mut plain = candidate("a.ts:1-50", "a.ts");
        plain.bm25_raw = 3.0;
        plain.symbol = 0.5;
        let base_only =
            merge_with_literal_boost(vec![plain.clone()], QueryIntent::Neutral, &cfg, 0.0, 10);

        plain.literal = Some((LiteralMatchType::Reference, Confidence::Medium));
        plain.vocab_matched = 3;
        let boosted = merge_with_literal_boost(vec![plain], QueryIntent::Neutral, &cfg, 0.0, 10);
        assert!(boosted[0].score >= base_only[0].score);
    }

    #[test]
    fn test_merge_ordering_deterministic() {
        let cfg = ScoringConfig::default();
        let mut a = candidate("b.ts:1-50", "b.ts");
        a.bm25_raw = 2.0;
        let mut b = candidate("a.ts:1-50", "a.ts");
        b.bm25_raw = 2.0;
        let mut b2 = candidate("a.ts:41-90", "a.ts");
        b2.bm25_raw = 2.0;
        b2.start_line = 41;
        b2.end_line = 90;

        let results =
            merge_with_literal_boost(vec![a, b2, b], QueryIntent::Neutral, &cfg, 0.0, 10);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a.ts:1-50", "a.ts:41-90", "b.ts:1-50"]);
    }

    #[test]
    fn test_min_score_filter_and_top_k() {
        let cfg = ScoringConfig::default();
        let mut strong = candidate("a.ts:1-50", "a.ts");
        strong.bm25_raw = 10.0;
        let weak = candidate("b.ts:1-50", "b.ts");
        let results =
            merge_with_literal_boost(vec![strong, weak], QueryIntent::Neutral, &cfg, 0.1, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filepath, "a.ts");
    }

    #[test]
    fn test_file_type_boost_by_intent() {
        let cfg = ScoringConfig::default();
        assert_eq!(cfg.file_type_boost(QueryIntent::Implementation, "ts"), 0.06);
        assert_eq!(cfg.file_type_boost(QueryIntent::Implementation, "md"), 0.0);
        assert_eq!(cfg.file_type_boost(QueryIntent::Documentation, "md"), 0.08);
        assert_eq!(cfg.file_type_boost(QueryIntent::Documentation, "ts"), 0.0);
        assert_eq!(cfg.file_type_boost(QueryIntent::Neutral, "ts"), 0.0);
    }
}
