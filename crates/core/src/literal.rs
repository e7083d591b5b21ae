//! Exact-match literal index.
//!
//! Two maps over one set of entries: the primary map keys lowercased literal
//! values to their indexed occurrences (at most one entry per chunk and
//! value, kept at the highest-priority match type), and the secondary map
//! keys vocabulary words to the value keys that contain them. The entry list
//! is the single owner; the vocabulary map stores keys only.

use crate::types::{
    DetectedLiteral, ExtractedLiteral, LiteralIndexEntry, LiteralMatch, VocabularyMatch,
    LITERAL_INDEX_VERSION,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Persisted shape of the literal index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralIndexData {
    pub version: String,
    pub entries: BTreeMap<String, Vec<LiteralIndexEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct LiteralIndex {
    /// lowercase(value) -> entries, at most one per (chunkId, value).
    entries: BTreeMap<String, Vec<LiteralIndexEntry>>,
    /// lowercase(word) -> lowercase(value) keys containing that word.
    vocabulary: BTreeMap<String, BTreeSet<String>>,
}

impl LiteralIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upsert the literals of one chunk. An existing (chunk, value) entry is
    /// replaced only by a higher-priority match type.
    pub fn add_literals(&mut self, chunk_id: &str, filepath: &str, literals: &[ExtractedLiteral]) {
        for lit in literals {
            let key = lit.value.to_lowercase();
            let list = self.entries.entry(key.clone()).or_default();

            match list.iter_mut().find(|e| e.chunk_id == chunk_id) {
                Some(existing) => {
                    if lit.match_type.priority() > existing.match_type.priority() {
                        existing.original_casing = lit.value.clone();
                        existing.literal_type = lit.literal_type;
                        existing.match_type = lit.match_type;
                        existing.vocabulary = lit.vocabulary.clone();
                    }
                }
                None => list.push(LiteralIndexEntry {
                    chunk_id: chunk_id.to_string(),
                    filepath: filepath.to_string(),
                    original_casing: lit.value.clone(),
                    literal_type: lit.literal_type,
                    match_type: lit.match_type,
                    vocabulary: lit.vocabulary.clone(),
                }),
            }

            for word in &lit.vocabulary {
                self.vocabulary.entry(word.clone()).or_default().insert(key.clone());
            }
        }
    }

    /// Remove every entry belonging to a chunk.
    pub fn remove_chunk(&mut self, chunk_id: &str) {
        self.remove_where(|e| e.chunk_id == chunk_id);
    }

    /// Remove every entry belonging to a file.
    pub fn remove_file(&mut self, filepath: &str) {
        self.remove_where(|e| e.filepath == filepath);
    }

    fn remove_where(&mut self, predicate: impl Fn(&LiteralIndexEntry) -> bool) {
        let mut dead_keys = Vec::new();
        for (key, list) in self.entries.iter_mut() {
            list.retain(|e| !predicate(e));
            if list.is_empty() {
                dead_keys.push(key.clone());
            }
        }
        for key in &dead_keys {
            self.entries.remove(key);
        }
        if !dead_keys.is_empty() {
            // Lazy vocabulary upkeep: drop dead value keys, then words whose
            // sets became empty.
            self.vocabulary.retain(|_, keys| {
                for key in &dead_keys {
                    keys.remove(key);
                }
                !keys.is_empty()
            });
        }
    }

    /// Exact lookups for each detected query literal.
    pub fn find_matches(&self, query_literals: &[DetectedLiteral]) -> Vec<LiteralMatch> {
        let mut matches = Vec::new();
        for lit in query_literals {
            let Some(entries) = self.entries.get(&lit.value.to_lowercase()) else { continue };
            for entry in entries {
                matches.push(LiteralMatch {
                    query_literal: lit.clone(),
                    exact_match: entry.original_casing == lit.value,
                    entry: entry.clone(),
                });
            }
        }
        matches
    }

    /// Partial-match lookup: which of the given words appear in the
    /// vocabulary of which indexed identifiers, grouped per
    /// (chunk, identifier) with word order preserved.
    pub fn find_by_vocabulary_words(&self, words: &[String]) -> Vec<VocabularyMatch> {
        // (chunk_id, original_casing) -> matched words
        let mut grouped: BTreeMap<(String, String), (String, Vec<String>)> = BTreeMap::new();

        for word in words {
            let Some(keys) = self.vocabulary.get(&word.to_lowercase()) else { continue };
            for key in keys {
                let Some(entries) = self.entries.get(key) else { continue };
                for entry in entries {
                    if !entry.vocabulary.contains(word) {
                        continue;
                    }
                    let slot = grouped
                        .entry((entry.chunk_id.clone(), entry.original_casing.clone()))
                        .or_insert_with(|| (entry.filepath.clone(), Vec::new()));
                    if !slot.1.contains(word) {
                        slot.1.push(word.clone());
                    }
                }
            }
        }

        grouped
            .into_iter()
            .map(|((chunk_id, original_casing), (filepath, matched_words))| VocabularyMatch {
                chunk_id,
                filepath,
                original_casing,
                matched_words,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn to_data(&self) -> LiteralIndexData {
        LiteralIndexData {
            version: LITERAL_INDEX_VERSION.to_string(),
            entries: self.entries.clone(),
        }
    }

    /// Rebuild from persisted data. The vocabulary map is derived from the
    /// entries; a version mismatch is tolerated with a warning as long as the
    /// entries deserialize.
    pub fn from_data(data: LiteralIndexData) -> Self {
        if data.version != LITERAL_INDEX_VERSION {
            warn!(
                found = data.version.as_str(),
                expected = LITERAL_INDEX_VERSION,
                "literal index version mismatch, attempting load"
            );
        }
        let mut vocabulary: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, entries) in &data.entries {
            for entry in entries {
                for word in &entry.vocabulary {
                    vocabulary.entry(word.clone()).or_default().insert(key.clone());
                }
            }
        }
        LiteralIndex { entries: data.entries, vocabulary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, DetectionMethod, LiteralMatchType, LiteralType};
    use crate::vocabulary::extract_vocabulary;

    fn lit(value: &str, match_type: LiteralMatchType) -> ExtractedLiteral {
        ExtractedLiteral {
            value: value.to_string(),
            literal_type: LiteralType::Identifier,
            match_type,
            vocabulary: extract_vocabulary(value),
        }
    }

    fn query_lit(value: &str) -> DetectedLiteral {
        DetectedLiteral {
            value: value.to_string(),
            raw_value: value.to_string(),
            confidence: Confidence::High,
            detection_method: DetectionMethod::ExplicitBacktick,
            inferred_type: None,
        }
    }

    #[test]
    fn test_add_and_find_exact_casing() {
        let mut index = LiteralIndex::new();
        index.add_literals("src/a.ts:1-50", "src/a.ts", &[lit("getUserById", LiteralMatchType::Definition)]);

        let matches = index.find_matches(&[query_lit("getUserById")]);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].exact_match);

        let matches = index.find_matches(&[query_lit("getuserbyid")]);
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].exact_match);
    }

    #[test]
    fn test_upsert_keeps_highest_priority() {
        let mut index = LiteralIndex::new();
        index.add_literals("c1", "src/a.ts", &[lit("AuthClient", LiteralMatchType::Import)]);
        index.add_literals("c1", "src/a.ts", &[lit("AuthClient", LiteralMatchType::Definition)]);
        index.add_literals("c1", "src/a.ts", &[lit("AuthClient", LiteralMatchType::Reference)]);

        let matches = index.find_matches(&[query_lit("AuthClient")]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry.match_type, LiteralMatchType::Definition);
    }

    #[test]
    fn test_one_entry_per_chunk() {
        let mut index = LiteralIndex::new();
        index.add_literals("c1", "src/a.ts", &[lit("foo_bar", LiteralMatchType::Reference)]);
        index.add_literals("c2", "src/a.ts", &[lit("foo_bar", LiteralMatchType::Reference)]);
        assert_eq!(index.find_matches(&[query_lit("foo_bar")]).len(), 2);
    }

    #[test]
    fn test_remove_file_scrubs_vocabulary() {
        let mut index = LiteralIndex::new();
        index.add_literals("c1", "src/a.ts", &[lit("parseConfig", LiteralMatchType::Definition)]);
        index.add_literals("c2", "src/b.ts", &[lit("parseQuery", LiteralMatchType::Definition)]);

        index.remove_file("src/a.ts");
        assert!(index.find_matches(&[query_lit("parseConfig")]).is_empty());

        // "parse" still maps to parseQuery, "config" is gone entirely.
        let vocab = index.find_by_vocabulary_words(&["parse".into(), "config".into()]);
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab[0].original_casing, "parseQuery");
        assert_eq!(vocab[0].matched_words, vec!["parse"]);
        assert!(!index.vocabulary.contains_key("config"));
    }

    #[test]
    fn test_remove_chunk_keeps_other_chunks() {
        let mut index = LiteralIndex::new();
        index.add_literals("c1", "src/a.ts", &[lit("loadState", LiteralMatchType::Definition)]);
        index.add_literals("c2", "src/a.ts", &[lit("loadState", LiteralMatchType::Reference)]);
        index.remove_chunk("c1");
        let matches = index.find_matches(&[query_lit("loadState")]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry.chunk_id, "c2");
    }

    #[test]
    fn test_find_by_vocabulary_words_groups_per_identifier() {
        let mut index = LiteralIndex::new();
        index.add_literals("c1", "src/a.ts", &[lit("getUserData", LiteralMatchType::Definition)]);
        let matches =
            index.find_by_vocabulary_words(&["get".into(), "user".into(), "by".into(), "id".into()]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_words, vec!["get", "user"]);
    }

    #[test]
    fn test_round_trip_preserves_entries_and_vocabulary() {
        let mut index = LiteralIndex::new();
        index.add_literals("c1", "src/a.ts", &[lit("fetchRemoteConfig", LiteralMatchType::Definition)]);
        let json = serde_json::to_string(&index.to_data()).unwrap();
        let data: LiteralIndexData = serde_json::from_str(&json).unwrap();
        assert_eq!(data.version, LITERAL_INDEX_VERSION);
        let restored = LiteralIndex::from_data(data);
        assert_eq!(restored.find_matches(&[query_lit("fetchRemoteConfig")]).len(), 1);
        assert_eq!(restored.find_by_vocabulary_words(&["remote".into()]).len(), 1);
    }
}
