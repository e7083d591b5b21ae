//! Okapi BM25 inverted index over file-level documents.
//!
//! Documents are added and removed incrementally during indexing; search is
//! read-only. The persisted shape keeps term frequencies and document
//! lengths; average document length is always recomputed on load, never
//! trusted from the file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Term frequency saturation (k1) and length normalization (b).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

/// One posting: a document and the term's frequency within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: String,
    pub tf: u32,
}

/// In-memory BM25 state for one module.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    /// term -> postings, in document insertion order.
    postings: BTreeMap<String, Vec<Posting>>,
    /// doc -> token count.
    doc_lengths: BTreeMap<String, u32>,
    /// Sum of all document lengths.
    total_length: u64,
}

/// Stable serialized shape of the index statistics. Per-document term
/// frequencies live in the per-file summaries; this carries the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25Meta {
    pub version: String,
    pub params: Bm25Params,
    pub doc_count: usize,
    pub avg_doc_length: f64,
    /// term -> document frequency.
    pub dfs: BTreeMap<String, usize>,
    pub doc_lengths: BTreeMap<String, u32>,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Bm25Index { params, ..Default::default() }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn avg_doc_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.doc_lengths.len() as f64
        }
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.doc_lengths.contains_key(doc_id)
    }

    /// Add a document's terms. An existing document with the same ID is
    /// replaced.
    pub fn add_document(&mut self, doc_id: &str, terms: &[String]) {
        if self.contains(doc_id) {
            self.remove_document(doc_id);
        }

        let mut freqs: BTreeMap<&str, u32> = BTreeMap::new();
        for term in terms {
            *freqs.entry(term.as_str()).or_insert(0) += 1;
        }
        for (term, tf) in freqs {
            self.postings
                .entry(term.to_string())
                .or_default()
                .push(Posting { doc_id: doc_id.to_string(), tf });
        }

        self.doc_lengths.insert(doc_id.to_string(), terms.len() as u32);
        self.total_length += terms.len() as u64;
    }

    /// Remove a document. Postings that become empty are pruned, and the
    /// aggregate statistics return to their pre-add values.
    pub fn remove_document(&mut self, doc_id: &str) {
        let Some(len) = self.doc_lengths.remove(doc_id) else { return };
        self.total_length -= len as u64;
        self.postings.retain(|_, list| {
            list.retain(|p| p.doc_id != doc_id);
            !list.is_empty()
        });
    }

    /// IDF with the BM25+1 variant: `ln((N - df + 0.5) / (df + 0.5) + 1)`.
    fn idf(&self, df: usize) -> f64 {
        let n = self.doc_count() as f64;
        let df = df as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score all documents containing any query term; ranked descending,
    /// ties broken by document ID for deterministic output.
    pub fn search(&self, query_terms: &[String], k: usize) -> Vec<(String, f64)> {
        if self.doc_lengths.is_empty() {
            return Vec::new();
        }
        let avgdl = self.avg_doc_length();
        let Bm25Params { k1, b } = self.params;

        let mut scores: HashMap<&str, f64> = HashMap::new();
        // Query-local idf cache; repeated terms hit the cache.
        let mut idf_cache: HashMap<&str, f64> = HashMap::new();

        for term in query_terms {
            let Some(postings) = self.postings.get(term.as_str()) else { continue };
            let idf = *idf_cache
                .entry(term.as_str())
                .or_insert_with(|| self.idf(postings.len()));
            for posting in postings {
                let dl = self.doc_lengths[&posting.doc_id] as f64;
                let tf = posting.tf as f64;
                let norm = tf + k1 * (1.0 - b + b * dl / avgdl.max(f64::MIN_POSITIVE));
                *scores.entry(posting.doc_id.as_str()).or_insert(0.0) +=
                    idf * (tf * (k1 + 1.0)) / norm;
            }
        }

        let mut ranked: Vec<(String, f64)> =
            scores.into_iter().map(|(d, s)| (d.to_string(), s)).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Statistics for `symbolic/_meta.json`.
    pub fn to_meta(&self) -> Bm25Meta {
        Bm25Meta {
            version: crate::types::INDEX_FORMAT_VERSION.to_string(),
            params: self.params,
            doc_count: self.doc_count(),
            avg_doc_length: self.avg_doc_length(),
            dfs: self.postings.iter().map(|(t, l)| (t.clone(), l.len())).collect(),
            doc_lengths: self.doc_lengths.clone(),
        }
    }

    /// Rebuild the index from persisted statistics and the per-document term
    /// frequencies of the file summaries. Stored averages are discarded and
    /// recomputed from the lengths actually present.
    pub fn from_parts<'a>(
        meta: &Bm25Meta,
        docs: impl Iterator<Item = (&'a str, &'a BTreeMap<String, u32>)>,
    ) -> Self {
        let mut index = Bm25Index::new(meta.params);
        for (doc_id, freqs) in docs {
            for (term, &tf) in freqs {
                index
                    .postings
                    .entry(term.clone())
                    .or_default()
                    .push(Posting { doc_id: doc_id.to_string(), tf });
            }
            let len: u32 = freqs.values().sum();
            index.doc_lengths.insert(doc_id.to_string(), len);
            index.total_length += len as u64;
        }
        index
    }
}

/// Map a raw non-negative BM25 score into [0, 1) via `raw / (raw + c)`.
pub fn normalize_score(raw: f64, c: f64) -> f64 {
    if raw <= 0.0 {
        0.0
    } else {
        raw / (raw + c)
    }
}
