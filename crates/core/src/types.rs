//! Core types shared across the RAGgrep engine: chunks, symbols, literals,
//! query analysis records, per-file indexes, manifests, search results, and
//! batch reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum file size (in bytes) that will be read into memory for indexing
/// or literal search.
pub const MAX_FILE_READ: u64 = 1024 * 1024;

/// Extensions that are never searchable (binary content).
pub const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "pdf", "zip", "tar", "gz", "rar", "exe", "dll",
    "so", "dylib", "woff", "woff2", "ttf", "eot", "mp3", "mp4", "wav", "avi",
];

/// Extensions treated as source code for intent-based boosting.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "rs", "go", "py", "java", "kt", "c", "h", "cpp",
    "hpp", "cc", "cs", "rb", "swift", "scala",
];

/// Extensions treated as documentation for intent-based boosting.
pub const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "rst", "txt", "adoc"];

/// On-disk format version for the literal index (vocabulary-aware).
pub const LITERAL_INDEX_VERSION: &str = "1.1.0";

/// On-disk format version for manifests and summaries.
pub const INDEX_FORMAT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// The granularity of a chunk: either the whole file, a tiled block, or a
/// block named after the symbol definition it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    File,
    Block,
    Function,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
}

/// A contiguous line range of a source file — the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub chunk_id: String,
    pub filepath: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// Inclusive.
    pub end_line: usize,
    pub content: String,
    pub chunk_type: ChunkType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_exported: Option<bool>,
}

/// Normalize a repository-relative path for use in chunk IDs and index keys.
pub fn sanitize_path(filepath: &str) -> String {
    let p = filepath.replace('\\', "/");
    p.strip_prefix("./").unwrap_or(&p).to_string()
}

/// Build the canonical chunk ID `<sanitized-path>:<startLine>-<endLine>`.
pub fn chunk_id(filepath: &str, start_line: usize, end_line: usize) -> String {
    format!("{}:{}-{}", sanitize_path(filepath), start_line, end_line)
}

/// Chunking parameters (lines per chunk, overlap between consecutive chunks).
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    /// Defaults for source code.
    pub const CODE: ChunkParams = ChunkParams { chunk_size: 50, overlap: 10 };
    /// Defaults for generic text (markdown, plain docs).
    pub const TEXT: ChunkParams = ChunkParams { chunk_size: 30, overlap: 5 };
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
}

impl SymbolKind {
    /// Chunk type a block covering this symbol is labelled with.
    pub fn chunk_type(self) -> ChunkType {
        match self {
            SymbolKind::Function | SymbolKind::Method => ChunkType::Function,
            SymbolKind::Class => ChunkType::Class,
            SymbolKind::Interface => ChunkType::Interface,
            SymbolKind::Type => ChunkType::Type,
            SymbolKind::Enum => ChunkType::Enum,
            SymbolKind::Variable => ChunkType::Variable,
        }
    }

    /// Literal type used when this symbol's definition is indexed.
    pub fn literal_type(self) -> LiteralType {
        match self {
            SymbolKind::Function | SymbolKind::Method => LiteralType::FunctionName,
            SymbolKind::Class => LiteralType::ClassName,
            SymbolKind::Interface => LiteralType::InterfaceName,
            SymbolKind::Type => LiteralType::TypeName,
            SymbolKind::Enum => LiteralType::EnumName,
            SymbolKind::Variable => LiteralType::VariableName,
        }
    }
}

/// A definition found by the regex extractor, with its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line: usize,
    pub is_exported: bool,
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiteralType {
    ClassName,
    FunctionName,
    VariableName,
    InterfaceName,
    TypeName,
    EnumName,
    PackageName,
    Identifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralMatchType {
    Definition,
    Reference,
    Import,
}

impl LiteralMatchType {
    /// Upsert priority: definitions beat references beat imports.
    pub fn priority(self) -> u8 {
        match self {
            LiteralMatchType::Definition => 3,
            LiteralMatchType::Reference => 2,
            LiteralMatchType::Import => 1,
        }
    }
}

/// An identifier-like token extracted from code for exact matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLiteral {
    /// Original casing.
    pub value: String,
    #[serde(rename = "type")]
    pub literal_type: LiteralType,
    pub match_type: LiteralMatchType,
    /// Ordered lowercase word pieces of `value`.
    pub vocabulary: Vec<String>,
}

/// One indexed occurrence of a literal inside a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralIndexEntry {
    pub chunk_id: String,
    pub filepath: String,
    pub original_casing: String,
    #[serde(rename = "type")]
    pub literal_type: LiteralType,
    pub match_type: LiteralMatchType,
    pub vocabulary: Vec<String>,
}

// ---------------------------------------------------------------------------
// Query-side detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    ExplicitBacktick,
    ExplicitQuote,
    ImplicitCasing,
}

/// A literal detected in a user query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLiteral {
    /// The literal value with quoting stripped.
    pub value: String,
    /// The raw span as it appeared in the query.
    pub raw_value: String,
    pub confidence: Confidence,
    pub detection_method: DetectionMethod,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inferred_type: Option<LiteralType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Implementation,
    Documentation,
    Neutral,
}

/// The analyzed form of a user query.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub detected_literals: Vec<DetectedLiteral>,
    pub remaining_query: String,
    pub intent: QueryIntent,
}

// ---------------------------------------------------------------------------
// Match records produced by the literal index
// ---------------------------------------------------------------------------

/// A hit of a query literal against the literal index.
#[derive(Debug, Clone)]
pub struct LiteralMatch {
    pub query_literal: DetectedLiteral,
    pub entry: LiteralIndexEntry,
    /// True when the indexed casing equals the query casing exactly.
    pub exact_match: bool,
}

/// Vocabulary words of a query that matched an indexed identifier, grouped
/// per (chunk, identifier).
#[derive(Debug, Clone)]
pub struct VocabularyMatch {
    pub chunk_id: String,
    pub filepath: String,
    pub original_casing: String,
    pub matched_words: Vec<String>,
}

// ---------------------------------------------------------------------------
// Persisted per-file records
// ---------------------------------------------------------------------------

/// Per-file index: the chunks of one file plus an opaque per-module bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndex {
    pub filepath: String,
    pub last_modified: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub module_data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub references: Option<Vec<String>>,
}

/// Per-file BM25 sidecar: the term frequencies that make up one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub filepath: String,
    pub last_modified: DateTime<Utc>,
    pub doc_length: u32,
    pub term_freqs: BTreeMap<String, u32>,
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub last_modified: DateTime<Utc>,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
}

/// The persisted record of which files a module has indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub module_id: String,
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl ModuleManifest {
    pub fn new(module_id: &str) -> Self {
        ModuleManifest {
            module_id: module_id.to_string(),
            version: INDEX_FORMAT_VERSION.to_string(),
            last_updated: Utc::now(),
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalManifest {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub last_index_started: DateTime<Utc>,
    pub modules: Vec<String>,
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// Per-source score breakdown emitted alongside each result.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreContributions {
    pub bm25: f64,
    pub symbol: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,
    pub literal_multiplier: f64,
    pub vocab_multiplier: f64,
    pub file_type_boost: f64,
}

/// One ranked result: a chunk plus its fused score and the breakdown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_id: String,
    pub filepath: String,
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_type: ChunkType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub snippet: String,
    pub score: f64,
    pub contributions: ScoreContributions,
}

/// Options accepted by [`crate::engine::Engine::search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_score: f64,
    /// Glob or prefix filters; empty means no filtering.
    pub path_filters: Vec<String>,
    pub ensure_fresh: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions { top_k: 10, min_score: 0.05, path_filters: Vec::new(), ensure_fresh: true }
    }
}

// ---------------------------------------------------------------------------
// Batch reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexStats {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub modules: BTreeMap<String, IndexStats>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanupStats {
    pub removed: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub modules: BTreeMap<String, CleanupStats>,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal, checked between files during indexing and
/// before fusion during search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Lowercase extension of a path, without the dot.
pub fn file_extension(filepath: &str) -> &str {
    filepath.rsplit('/').next().unwrap_or(filepath).rsplit_once('.').map(|(_, e)| e).unwrap_or("")
}

pub fn is_source_extension(ext: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&ext)
}

pub fn is_doc_extension(ext: &str) -> bool {
    DOC_EXTENSIONS.contains(&ext)
}

pub fn is_binary_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    BINARY_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_shape() {
        assert_eq!(chunk_id("src/auth/login.ts", 1, 50), "src/auth/login.ts:1-50");
        assert_eq!(chunk_id("./src\\a.rs", 3, 9), "src/a.rs:3-9");
    }

    #[test]
    fn test_match_type_priority_ordering() {
        assert!(LiteralMatchType::Definition.priority() > LiteralMatchType::Reference.priority());
        assert!(LiteralMatchType::Reference.priority() > LiteralMatchType::Import.priority());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("src/a/b.test.ts"), "ts");
        assert_eq!(file_extension("Makefile"), "");
        assert!(is_source_extension("rs"));
        assert!(is_doc_extension("md"));
        assert!(is_binary_extension("PNG"));
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }
}
