//! Retrieval module registry.
//!
//! An [`IndexModule`] owns one on-disk index under `index/<moduleId>/` and
//! answers searches from an in-memory snapshot. The engine ships two
//! variants built on the same machinery: `core` (source code, 50/10 chunks,
//! symbol and literal extraction) and `docs/markdown` (generic text, 30/5
//! chunks, BM25 only). Embedding-backed modules are external collaborators;
//! the registry accepts any implementation whose search yields scores per
//! chunk.

use crate::bm25::{Bm25Index, Bm25Params};
use crate::chunker::chunk_file;
use crate::error::Result;
use crate::literal::LiteralIndex;
use crate::score::ScoringConfig;
use crate::storage::IndexStorage;
use crate::symbols::{extract_literals, extract_symbols};
use crate::types::{
    is_doc_extension, sanitize_path, ChunkParams, FileIndex, FileSummary, LiteralMatch,
    ManifestEntry, ModuleManifest, ParsedQuery, VocabularyMatch,
};
use crate::vocabulary::{extract_query_vocabulary, tokenize};
use crate::config::{Config, EXTERNAL_MODULE_IDS};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Cap on BM25 file results a module returns per search.
const BM25_RESULT_CAP: usize = 100;

// ---------------------------------------------------------------------------
// Module capability
// ---------------------------------------------------------------------------

/// Per-file records produced by indexing, persisted by the caller.
pub struct IndexedFile {
    pub file_index: FileIndex,
    pub summary: FileSummary,
}

/// The track outputs of one module for one query.
#[derive(Default)]
pub struct ModuleSearch {
    /// Raw BM25 scores per file.
    pub bm25_files: Vec<(String, f64)>,
    pub literal_matches: Vec<LiteralMatch>,
    pub vocabulary_matches: Vec<VocabularyMatch>,
    /// (chunkId, score) pairs from embedding-backed modules.
    pub semantic: Vec<(String, f64)>,
}

pub trait IndexModule: Send + Sync {
    fn id(&self) -> &str;

    /// Whether this module indexes the given file.
    fn handles(&self, filepath: &str) -> bool;

    /// Analyze one file and fold it into the in-memory index. Returns the
    /// per-file records for the caller to persist.
    fn index_file(
        &self,
        filepath: &str,
        content: &str,
        mtime: DateTime<Utc>,
        content_hash: Option<String>,
    ) -> Result<IndexedFile>;

    /// Drop a file from the in-memory index and manifest.
    fn remove_file(&self, filepath: &str);

    /// Persist the module-level indexes (BM25 statistics, literal index,
    /// module manifest). Per-file records are persisted as files are indexed.
    fn finalize(&self, storage: &IndexStorage) -> Result<()>;

    /// Load persisted state into memory; false when no index is present.
    fn load(&self, storage: &IndexStorage) -> Result<bool>;

    /// Run this module's retrieval tracks against the in-memory snapshot.
    fn search(&self, parsed: &ParsedQuery, raw_query: &str) -> ModuleSearch;

    /// Snapshot of the files currently recorded in the module manifest.
    fn manifest_files(&self) -> BTreeMap<String, ManifestEntry>;

    fn manifest_entry(&self, filepath: &str) -> Option<ManifestEntry>;

    /// Release resources held by the module. The standard modules hold only
    /// memory; embedding-backed modules may hold model handles.
    fn dispose(&self) {}
}

// ---------------------------------------------------------------------------
// Standard module (BM25 + optional symbols/literals)
// ---------------------------------------------------------------------------

struct ModuleState {
    bm25: Bm25Index,
    literals: LiteralIndex,
    manifest: ModuleManifest,
}

pub struct StandardModule {
    id: String,
    extensions: HashSet<String>,
    chunk_params: ChunkParams,
    symbols_enabled: bool,
    state: RwLock<ModuleState>,
}

impl StandardModule {
    pub fn new(
        id: &str,
        extensions: HashSet<String>,
        chunk_params: ChunkParams,
        symbols_enabled: bool,
        bm25: Bm25Params,
    ) -> Self {
        StandardModule {
            id: id.to_string(),
            extensions,
            chunk_params,
            symbols_enabled,
            state: RwLock::new(ModuleState {
                bm25: Bm25Index::new(bm25),
                literals: LiteralIndex::new(),
                manifest: ModuleManifest::new(id),
            }),
        }
    }
}

impl IndexModule for StandardModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn handles(&self, filepath: &str) -> bool {
        self.extensions.contains(crate::types::file_extension(filepath))
    }

    fn index_file(
        &self,
        filepath: &str,
        content: &str,
        mtime: DateTime<Utc>,
        content_hash: Option<String>,
    ) -> Result<IndexedFile> {
        let filepath = sanitize_path(filepath);
        let symbols =
            if self.symbols_enabled { extract_symbols(&filepath, content) } else { Vec::new() };
        let chunks = chunk_file(&filepath, content, &symbols, self.chunk_params);
        let terms = tokenize(content);

        let mut term_freqs: BTreeMap<String, u32> = BTreeMap::new();
        for term in &terms {
            *term_freqs.entry(term.clone()).or_insert(0) += 1;
        }

        // Lock poisoning only occurs if another indexing thread panicked;
        // there is a single writer by construction.
        let mut state = self.state.write().expect("module state lock poisoned");
        state.bm25.add_document(&filepath, &terms);
        state.literals.remove_file(&filepath);
        if self.symbols_enabled {
            for chunk in &chunks {
                let literals = extract_literals(chunk, &symbols);
                state.literals.add_literals(&chunk.chunk_id, &filepath, &literals);
            }
        }
        state.manifest.files.insert(
            filepath.clone(),
            ManifestEntry { last_modified: mtime, chunk_count: chunks.len(), content_hash },
        );
        state.manifest.last_updated = Utc::now();

        Ok(IndexedFile {
            file_index: FileIndex {
                filepath: filepath.clone(),
                last_modified: mtime,
                chunks,
                module_data: serde_json::Value::Null,
                references: None,
            },
            summary: FileSummary {
                filepath,
                last_modified: mtime,
                doc_length: terms.len() as u32,
                term_freqs,
            },
        })
    }

    fn remove_file(&self, filepath: &str) {
        let filepath = sanitize_path(filepath);
        let mut state = self.state.write().expect("module state lock poisoned");
        state.bm25.remove_document(&filepath);
        state.literals.remove_file(&filepath);
        state.manifest.files.remove(&filepath);
        state.manifest.last_updated = Utc::now();
    }

    fn finalize(&self, storage: &IndexStorage) -> Result<()> {
        let state = self.state.read().expect("module state lock poisoned");
        storage.write_bm25_meta(&self.id, &state.bm25.to_meta())?;
        storage.write_literal_index(&self.id, &state.literals.to_data())?;
        storage.write_module_manifest(&state.manifest)?;
        Ok(())
    }

    fn load(&self, storage: &IndexStorage) -> Result<bool> {
        let Some(manifest) = storage.read_module_manifest(&self.id) else {
            return Ok(false);
        };
        let Some(meta) = storage.read_bm25_meta(&self.id) else {
            return Ok(false);
        };
        // The manifest gates visibility: a summary on disk without a
        // manifest entry never made it through a commit.
        let summaries: Vec<_> = storage
            .read_file_summaries(&self.id)
            .into_iter()
            .filter(|s| manifest.files.contains_key(&s.filepath))
            .collect();
        let bm25 =
            Bm25Index::from_parts(&meta, summaries.iter().map(|s| (s.filepath.as_str(), &s.term_freqs)));
        let literals = storage
            .read_literal_index(&self.id)
            .map(LiteralIndex::from_data)
            .unwrap_or_default();

        let mut state = self.state.write().expect("module state lock poisoned");
        state.bm25 = bm25;
        state.literals = literals;
        state.manifest = manifest;
        debug!(module = self.id.as_str(), docs = state.bm25.doc_count(), "module index loaded");
        Ok(true)
    }

    fn search(&self, parsed: &ParsedQuery, raw_query: &str) -> ModuleSearch {
        let state = self.state.read().expect("module state lock poisoned");
        let query_terms = tokenize(raw_query);
        ModuleSearch {
            bm25_files: state.bm25.search(&query_terms, BM25_RESULT_CAP),
            literal_matches: state.literals.find_matches(&parsed.detected_literals),
            vocabulary_matches: state
                .literals
                .find_by_vocabulary_words(&extract_query_vocabulary(raw_query)),
            semantic: Vec::new(),
        }
    }

    fn manifest_files(&self) -> BTreeMap<String, ManifestEntry> {
        self.state.read().expect("module state lock poisoned").manifest.files.clone()
    }

    fn manifest_entry(&self, filepath: &str) -> Option<ManifestEntry> {
        self.state
            .read()
            .expect("module state lock poisoned")
            .manifest
            .files
            .get(&sanitize_path(filepath))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct ModuleRegistry {
    modules: Vec<Box<dyn IndexModule>>,
}

impl ModuleRegistry {
    /// Build the registry from configuration. Unknown or external module IDs
    /// are skipped (embedding-backed variants are not part of this build);
    /// duplicate IDs are rejected during config validation.
    pub fn from_config(config: &Config, scoring: &ScoringConfig) -> Result<Self> {
        config.ensure_valid()?;

        let all_exts = config.extension_set();
        let code_exts: HashSet<String> =
            all_exts.iter().filter(|e| !is_doc_extension(e)).cloned().collect();
        let doc_exts: HashSet<String> =
            all_exts.iter().filter(|e| is_doc_extension(e)).cloned().collect();

        let mut modules: Vec<Box<dyn IndexModule>> = Vec::new();
        for module_config in config.modules.iter().filter(|m| m.enabled) {
            match module_config.id.as_str() {
                "core" => modules.push(Box::new(StandardModule::new(
                    "core",
                    code_exts.clone(),
                    ChunkParams::CODE,
                    true,
                    scoring.bm25,
                ))),
                "docs/markdown" => modules.push(Box::new(StandardModule::new(
                    "docs/markdown",
                    doc_exts.clone(),
                    ChunkParams::TEXT,
                    false,
                    scoring.bm25,
                ))),
                id if EXTERNAL_MODULE_IDS.contains(&id) => {
                    debug!(module = id, "embedding-backed module not part of this build, skipping")
                }
                id => warn!(module = id, "unrecognized module id, skipping"),
            }
        }
        Ok(ModuleRegistry { modules })
    }

    /// Build a registry from explicit module instances, bypassing the
    /// config mapping. This is how external (embedding-backed) modules are
    /// plugged in.
    pub fn with_modules(modules: Vec<Box<dyn IndexModule>>) -> Self {
        ModuleRegistry { modules }
    }

    pub fn modules(&self) -> &[Box<dyn IndexModule>] {
        &self.modules
    }

    pub fn get(&self, id: &str) -> Option<&dyn IndexModule> {
        self.modules.iter().find(|m| m.id() == id).map(|m| m.as_ref())
    }

    pub fn dispose_all(&self) {
        for module in &self.modules {
            module.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;
    use crate::types::LiteralMatchType;

    fn core_module() -> StandardModule {
        StandardModule::new(
            "core",
            ["ts", "rs"].iter().map(|s| s.to_string()).collect(),
            ChunkParams::CODE,
            true,
            Bm25Params::default(),
        )
    }

    #[test]
    fn test_handles_by_extension() {
        let module = core_module();
        assert!(module.handles("src/auth/login.ts"));
        assert!(!module.handles("docs/guide.md"));
    }

    #[test]
    fn test_index_file_populates_tracks() {
        let module = core_module();
        let src = "export function hashPassword(pw: string) {\n  return pw;\n}\n";
        let indexed = module
            .index_file("src/auth/login.ts", src, Utc::now(), Some("hash".into()))
            .unwrap();
        assert_eq!(indexed.file_index.chunks.len(), 1);
        assert!(indexed.summary.term_freqs.contains_key("hashpassword"));

        let parsed = parse_query("hashPassword");
        let search = module.search(&parsed, "hashPassword");
        assert_eq!(search.bm25_files.len(), 1);
        assert_eq!(search.bm25_files[0].0, "src/auth/login.ts");
        assert!(search
            .literal_matches
            .iter()
            .any(|m| m.entry.match_type == LiteralMatchType::Definition));
    }

    #[test]
    fn test_remove_file_clears_tracks() {
        let module = core_module();
        let src = "export function hashPassword() {}\n";
        module.index_file("src/a.ts", src, Utc::now(), None).unwrap();
        module.remove_file("src/a.ts");

        let parsed = parse_query("hashPassword");
        let search = module.search(&parsed, "hashPassword");
        assert!(search.bm25_files.is_empty());
        assert!(search.literal_matches.is_empty());
        assert!(module.manifest_files().is_empty());
    }

    #[test]
    fn test_finalize_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = IndexStorage::new(dir.path(), &Config::default());
        let module = core_module();
        let src = "export function hashPassword() {}\nconst AUTH_SERVICE_URL = 1;\n";
        let indexed = module.index_file("src/a.ts", src, Utc::now(), None).unwrap();
        storage.write_file_index("core", &indexed.file_index).unwrap();
        storage.write_file_summary("core", &indexed.summary).unwrap();
        module.finalize(&storage).unwrap();

        let fresh = core_module();
        assert!(fresh.load(&storage).unwrap());
        let parsed = parse_query("`AUTH_SERVICE_URL`");
        let search = fresh.search(&parsed, "AUTH_SERVICE_URL");
        assert!(!search.literal_matches.is_empty());
        assert_eq!(fresh.manifest_entry("src/a.ts").unwrap().chunk_count, 1);
    }

    #[test]
    fn test_load_ignores_summaries_missing_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = IndexStorage::new(dir.path(), &Config::default());
        let module = core_module();
        let indexed = module
            .index_file("src/a.ts", "export function loadState() {}\n", Utc::now(), None)
            .unwrap();
        storage.write_file_index("core", &indexed.file_index).unwrap();
        storage.write_file_summary("core", &indexed.summary).unwrap();
        module.finalize(&storage).unwrap();

        // A summary that never went through a commit: on disk, but absent
        // from the manifest.
        let stray = crate::types::FileSummary {
            filepath: "src/stray.ts".to_string(),
            last_modified: Utc::now(),
            doc_length: 1,
            term_freqs: std::collections::BTreeMap::from([("phantomterm".to_string(), 1u32)]),
        };
        storage.write_file_summary("core", &stray).unwrap();

        let fresh = core_module();
        assert!(fresh.load(&storage).unwrap());
        let parsed = parse_query("phantomterm");
        assert!(fresh.search(&parsed, "phantomterm").bm25_files.is_empty());
        let parsed = parse_query("loadState");
        assert_eq!(fresh.search(&parsed, "loadState").bm25_files.len(), 1);
    }

    #[test]
    fn test_load_absent_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let storage = IndexStorage::new(dir.path(), &Config::default());
        assert!(!core_module().load(&storage).unwrap());
    }

    #[test]
    fn test_registry_from_config_skips_external() {
        let mut config = Config::default();
        config.modules.push(crate::config::ModuleConfig::new("language/typescript"));
        let registry = ModuleRegistry::from_config(&config, &ScoringConfig::default()).unwrap();
        let ids: Vec<&str> = registry.modules().iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["core", "docs/markdown"]);
    }

    #[test]
    fn test_registry_disabled_module_skipped() {
        let mut config = Config::default();
        config.modules[1].enabled = false;
        let registry = ModuleRegistry::from_config(&config, &ScoringConfig::default()).unwrap();
        assert!(registry.get("docs/markdown").is_none());
        assert!(registry.get("core").is_some());
    }
}
