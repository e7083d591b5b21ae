//! The retrieval orchestrator.
//!
//! `Engine` owns the configuration, the module registry, and the storage
//! handles. Searching runs the query analyzer, then the keyword, literal,
//! vocabulary, and (for identifier queries) exact-grep tracks against each
//! module's in-memory snapshot, and fuses the union of their candidates into
//! one ranked list. Indexing and the sweeps delegate to [`crate::indexer`].

use crate::config::Config;
use crate::error::Result;
use crate::grep::{search_files, SimpleSearchOptions};
use crate::indexer;
use crate::module::{IndexModule, ModuleRegistry, ModuleSearch};
use crate::pathfilter::PathFilter;
use crate::query::parse_query;
use crate::score::{merge_with_literal_boost, symbol_score, ChunkCandidate, ScoringConfig};
use crate::storage::IndexStorage;
use crate::types::{
    CancelToken, Chunk, CleanupReport, FileIndex, IndexReport, LiteralMatchType, SearchOptions,
    SearchResult,
};
use crate::vocabulary::{extract_vocabulary, tokenize};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    root: PathBuf,
    config: Config,
    scoring: ScoringConfig,
    storage: IndexStorage,
    registry: ModuleRegistry,
    /// (moduleId, filepath) -> loaded per-file chunk index.
    file_cache: DashMap<(String, String), Arc<FileIndex>>,
}

impl Engine {
    /// Open an engine over a project root, loading `raggrep.json` (or
    /// defaults) and any persisted module indexes.
    pub fn open(root: impl Into<PathBuf>) -> Result<Engine> {
        let root = root.into();
        let config = Config::load(&root)?;
        Engine::with_config(root, config, ScoringConfig::default())
    }

    pub fn with_config(root: PathBuf, config: Config, scoring: ScoringConfig) -> Result<Engine> {
        let registry = ModuleRegistry::from_config(&config, &scoring)?;
        let storage = IndexStorage::new(&root, &config);
        for module in registry.modules() {
            let _ = module.load(&storage)?;
        }
        Ok(Engine { root, config, scoring, storage, registry, file_cache: DashMap::new() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index the whole tree. Clears the read-side cache afterwards.
    pub fn index(&self, cancel: &CancelToken) -> Result<IndexReport> {
        let report =
            indexer::index_tree(&self.root, &self.config, &self.registry, &self.storage, cancel)?;
        self.file_cache.clear();
        Ok(report)
    }

    /// Sweep stale manifest entries for deleted files.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let report = indexer::cleanup(&self.root, &self.registry, &self.storage)?;
        self.file_cache.clear();
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    pub fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if opts.ensure_fresh
            && indexer::freshness_sweep(&self.root, &self.registry, &self.storage)?
        {
            self.file_cache.clear();
        }

        let parsed = parse_query(query);
        let query_tokens = tokenize(query);
        let path_filter = PathFilter::new(&opts.path_filters)?;
        debug!(
            literals = parsed.detected_literals.len(),
            intent = ?parsed.intent,
            "query parsed"
        );

        let mut candidates: BTreeMap<String, ChunkCandidate> = BTreeMap::new();
        for module in self.registry.modules() {
            let tracks = module.search(&parsed, query);
            self.collect_module_candidates(
                module.as_ref(),
                tracks,
                &query_tokens,
                &path_filter,
                &mut candidates,
            );
        }

        // Exact-grep track for identifier queries: hits land in chunks that
        // the literal index may not know about (strings, comments, config).
        if let Some(primary) = primary_literal(&parsed.detected_literals) {
            self.collect_grep_candidates(&primary, &path_filter, &query_tokens, &mut candidates);
        }

        if cancel.is_cancelled() {
            info!("search cancelled before fusion");
            return Ok(Vec::new());
        }

        let results = merge_with_literal_boost(
            candidates.into_values().collect(),
            parsed.intent,
            &self.scoring,
            opts.min_score,
            opts.top_k,
        );
        debug!(results = results.len(), "search fused");
        Ok(results)
    }

    fn collect_module_candidates(
        &self,
        module: &dyn IndexModule,
        tracks: ModuleSearch,
        query_tokens: &[String],
        path_filter: &PathFilter,
        candidates: &mut BTreeMap<String, ChunkCandidate>,
    ) {
        let module_id = module.id();

        let bm25_by_file: BTreeMap<String, f64> = tracks
            .bm25_files
            .into_iter()
            .filter(|(path, _)| path_filter.matches(path))
            .collect();

        // Keyword track: the best chunk of each scored file represents it.
        for (filepath, raw) in &bm25_by_file {
            let Some(index) = self.load_file_index(module_id, filepath) else { continue };
            let Some(chunk) = best_chunk(&index, query_tokens) else { continue };
            let entry = candidates
                .entry(chunk.chunk_id.clone())
                .or_insert_with(|| self.candidate_from_chunk(chunk, query_tokens));
            entry.bm25_raw = *raw;
        }

        // Literal track: each matched chunk joins, keeping the strongest hit.
        for m in tracks.literal_matches {
            if !path_filter.matches(&m.entry.filepath) {
                continue;
            }
            let Some(chunk) =
                self.resolve_chunk(module_id, &m.entry.filepath, &m.entry.chunk_id)
            else {
                continue;
            };
            let entry = candidates
                .entry(chunk.chunk_id.clone())
                .or_insert_with(|| self.candidate_from_chunk(&chunk, query_tokens));
            entry.bm25_raw = entry.bm25_raw.max(
                bm25_by_file.get(m.entry.filepath.as_str()).copied().unwrap_or(0.0),
            );
            let incoming = (m.entry.match_type, m.query_literal.confidence);
            entry.literal = Some(match entry.literal {
                Some(existing)
                    if self.scoring.literal_multiplier(existing.0, existing.1)
                        >= self.scoring.literal_multiplier(incoming.0, incoming.1) =>
                {
                    existing
                }
                _ => incoming,
            });
        }

        // Vocabulary track: count distinct matched words per chunk.
        let mut vocab_words: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
        for m in tracks.vocabulary_matches {
            if !path_filter.matches(&m.filepath) {
                continue;
            }
            let slot = vocab_words
                .entry(m.chunk_id.clone())
                .or_insert_with(|| (m.filepath.clone(), Vec::new()));
            for word in m.matched_words {
                if !slot.1.contains(&word) {
                    slot.1.push(word);
                }
            }
        }
        for (chunk_id, (filepath, words)) in vocab_words {
            let Some(chunk) = self.resolve_chunk(module_id, &filepath, &chunk_id) else {
                continue;
            };
            let entry = candidates
                .entry(chunk_id)
                .or_insert_with(|| self.candidate_from_chunk(&chunk, query_tokens));
            entry.bm25_raw =
                entry.bm25_raw.max(bm25_by_file.get(filepath.as_str()).copied().unwrap_or(0.0));
            entry.vocab_matched = entry.vocab_matched.max(words.len());
        }

        // Semantic track (external modules): scores attach to chunks by ID.
        for (chunk_id, score) in tracks.semantic {
            let Some((filepath, _)) = chunk_id.rsplit_once(':') else { continue };
            if !path_filter.matches(filepath) {
                continue;
            }
            let Some(chunk) = self.resolve_chunk(module_id, filepath, &chunk_id) else {
                continue;
            };
            let entry = candidates
                .entry(chunk_id)
                .or_insert_with(|| self.candidate_from_chunk(&chunk, query_tokens));
            entry.semantic = Some(entry.semantic.unwrap_or(0.0).max(score));
        }
    }

    fn collect_grep_candidates(
        &self,
        literal: &crate::types::DetectedLiteral,
        path_filter: &PathFilter,
        query_tokens: &[String],
        candidates: &mut BTreeMap<String, ChunkCandidate>,
    ) {
        let mut files: Vec<(String, String)> = Vec::new();
        for module in self.registry.modules() {
            for filepath in module.manifest_files().keys() {
                if !path_filter.matches(filepath) {
                    continue;
                }
                if let Ok(content) = std::fs::read_to_string(self.root.join(filepath)) {
                    files.push((filepath.clone(), content));
                }
            }
        }

        let result = search_files(&files, &literal.value, &SimpleSearchOptions::default());
        for file in result.files {
            let Some(module) = self.registry.modules().iter().find(|m| m.handles(&file.filepath))
            else {
                continue;
            };
            let Some(index) = self.load_file_index(module.id(), &file.filepath) else { continue };
            for occurrence in &file.occurrences {
                let Some(chunk) = index
                    .chunks
                    .iter()
                    .filter(|c| {
                        c.start_line <= occurrence.line_number
                            && occurrence.line_number <= c.end_line
                    })
                    .min_by_key(|c| c.start_line)
                else {
                    continue;
                };
                let entry = candidates
                    .entry(chunk.chunk_id.clone())
                    .or_insert_with(|| self.candidate_from_chunk(chunk, query_tokens));
                if entry.literal.is_none() {
                    entry.literal = Some((LiteralMatchType::Reference, literal.confidence));
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Chunk resolution
    // -----------------------------------------------------------------------

    fn load_file_index(&self, module_id: &str, filepath: &str) -> Option<Arc<FileIndex>> {
        let key = (module_id.to_string(), filepath.to_string());
        if let Some(hit) = self.file_cache.get(&key) {
            return Some(Arc::clone(&hit));
        }
        let loaded = Arc::new(self.storage.read_file_index(module_id, filepath)?);
        self.file_cache.insert(key, Arc::clone(&loaded));
        Some(loaded)
    }

    fn resolve_chunk(&self, module_id: &str, filepath: &str, chunk_id: &str) -> Option<Chunk> {
        let index = self.load_file_index(module_id, filepath)?;
        index.chunks.iter().find(|c| c.chunk_id == chunk_id).cloned()
    }

    fn candidate_from_chunk(&self, chunk: &Chunk, query_tokens: &[String]) -> ChunkCandidate {
        let name_vocabulary =
            chunk.name.as_deref().map(extract_vocabulary).unwrap_or_default();
        ChunkCandidate {
            chunk_id: chunk.chunk_id.clone(),
            filepath: chunk.filepath.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            chunk_type: chunk.chunk_type,
            name: chunk.name.clone(),
            snippet: snippet_of(&chunk.content),
            bm25_raw: 0.0,
            symbol: symbol_score(
                query_tokens,
                chunk.name.as_deref(),
                &name_vocabulary,
                chunk.is_exported.unwrap_or(false),
            ),
            semantic: None,
            literal: None,
            vocab_matched: 0,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.registry.dispose_all();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The highest-confidence detected literal, earliest on ties.
fn primary_literal(
    literals: &[crate::types::DetectedLiteral],
) -> Option<crate::types::DetectedLiteral> {
    let mut best: Option<&crate::types::DetectedLiteral> = None;
    for lit in literals {
        if best.map_or(true, |b| lit.confidence > b.confidence) {
            best = Some(lit);
        }
    }
    best.cloned()
}

/// Pick the chunk that best represents a BM25-scored file: highest symbol
/// score, then earliest start line.
fn best_chunk<'a>(index: &'a FileIndex, query_tokens: &[String]) -> Option<&'a Chunk> {
    index
        .chunks
        .iter()
        .map(|c| {
            let vocab = c.name.as_deref().map(extract_vocabulary).unwrap_or_default();
            let score = symbol_score(
                query_tokens,
                c.name.as_deref(),
                &vocab,
                c.is_exported.unwrap_or(false),
            );
            (c, score)
        })
        .max_by(|(a, sa), (b, sb)| {
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.start_line.cmp(&a.start_line))
        })
        .map(|(c, _)| c)
}

fn snippet_of(content: &str) -> String {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(2)
        .map(|l| {
            if l.len() > 160 {
                let cut = l.char_indices().take_while(|(i, _)| *i < 160).last().map(|(i, c)| i + c.len_utf8()).unwrap_or(l.len());
                &l[..cut]
            } else {
                l
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
