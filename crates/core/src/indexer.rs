//! Batch indexing, the staleness sweep, and the cleanup pass.
//!
//! Files are discovered in walk order and processed through each module that
//! handles them. Per-file failures never abort the batch; the module and
//! global manifest writes at the end are the commit point, so readers see
//! either the previous index state or the new one.

use crate::config::Config;
use crate::error::Result;
use crate::module::ModuleRegistry;
use crate::storage::IndexStorage;
use crate::types::{
    file_extension, is_binary_extension, CancelToken, CleanupReport, CleanupStats, GlobalManifest,
    IndexReport, IndexStats, ManifestEntry, INDEX_FORMAT_VERSION, MAX_FILE_READ,
};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Walk the tree under `root`, honoring the configured extension list and
/// skipping ignored directory segments. Entries are visited in sorted order
/// so a batch is deterministic for a given tree.
pub fn discover_files(root: &Path, config: &Config) -> Vec<DiscoveredFile> {
    let extensions = config.extension_set();
    let skip_dirs: HashSet<&str> = config.ignore_paths.iter().map(|s| s.as_str()).collect();

    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(std::ffi::OsStr::cmp)
        .filter_entry({
            let skip: HashSet<String> = skip_dirs.iter().map(|s| s.to_string()).collect();
            move |entry| {
                if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    let name = entry.file_name().to_string_lossy();
                    return !skip.contains(name.as_ref());
                }
                true
            }
        })
        .build();

    for entry in walker {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let abs_path = entry.path().to_path_buf();
        let rel_path = abs_path
            .strip_prefix(root)
            .unwrap_or(&abs_path)
            .to_string_lossy()
            .replace('\\', "/");
        if !extensions.contains(&file_extension(&rel_path).to_ascii_lowercase()) {
            continue;
        }
        files.push(DiscoveredFile { rel_path, abs_path });
    }

    files
}

// ---------------------------------------------------------------------------
// File reading
// ---------------------------------------------------------------------------

pub(crate) fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn mtime_of(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok().map(DateTime::<Utc>::from)
}

enum ReadOutcome {
    Text { content: String, mtime: DateTime<Utc>, hash: String },
    /// Binary, oversized, or NUL-containing content.
    Unindexable,
    Failed(String),
}

fn read_for_indexing(file: &DiscoveredFile) -> ReadOutcome {
    if is_binary_extension(file_extension(&file.rel_path)) {
        return ReadOutcome::Unindexable;
    }
    let meta = match std::fs::metadata(&file.abs_path) {
        Ok(m) => m,
        Err(e) => return ReadOutcome::Failed(e.to_string()),
    };
    if meta.len() > MAX_FILE_READ {
        return ReadOutcome::Unindexable;
    }
    let bytes = match std::fs::read(&file.abs_path) {
        Ok(b) => b,
        Err(e) => return ReadOutcome::Failed(e.to_string()),
    };
    if bytes.contains(&0) {
        return ReadOutcome::Unindexable;
    }
    let mtime = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
    ReadOutcome::Text {
        hash: hash_content(&bytes),
        content: String::from_utf8_lossy(&bytes).into_owned(),
        mtime,
    }
}

// ---------------------------------------------------------------------------
// Per-file state machine
// ---------------------------------------------------------------------------

/// Progression of one file through a batch. Errors capture the message but
/// never abort the batch.
#[derive(Debug)]
enum FileState {
    Scanning,
    Indexed,
    Persisted,
    Failed(String),
}

// ---------------------------------------------------------------------------
// Batch indexing
// ---------------------------------------------------------------------------

/// Index the tree under `root` through every registered module.
pub fn index_tree(
    root: &Path,
    config: &Config,
    registry: &ModuleRegistry,
    storage: &IndexStorage,
    cancel: &CancelToken,
) -> Result<IndexReport> {
    let started = Utc::now();
    let t0 = Instant::now();
    let mut report = IndexReport::default();
    for module in registry.modules() {
        report.modules.insert(module.id().to_string(), IndexStats::default());
        let _ = module.load(storage);
        // Leftover staging from a previously aborted batch is stale.
        storage.discard_staged(module.id());
    }

    storage.write_config(config)?;

    let discovered = discover_files(root, config);
    info!(files = discovered.len(), root = %root.display(), "indexing");

    // CPU/IO-heavy reads and hashing run in parallel; module state mutation
    // and writes stay on the driver, in discovery order.
    let records: Vec<(usize, ReadOutcome)> = discovered
        .par_iter()
        .enumerate()
        .map(|(i, file)| (i, read_for_indexing(file)))
        .collect();
    let mut outcomes: Vec<Option<ReadOutcome>> = Vec::with_capacity(records.len());
    outcomes.resize_with(records.len(), || None);
    for (i, outcome) in records {
        outcomes[i] = Some(outcome);
    }

    let mut seen: HashSet<String> = HashSet::new();
    for (file, outcome) in discovered.iter().zip(outcomes.into_iter()) {
        if cancel.is_cancelled() {
            info!("indexing cancelled, discarding staged state");
            for module in registry.modules() {
                storage.discard_staged(module.id());
            }
            report.elapsed_ms = t0.elapsed().as_millis() as u64;
            return Ok(report);
        }
        seen.insert(file.rel_path.clone());
        let mut state = FileState::Scanning;
        debug!(file = file.rel_path.as_str(), state = ?state, "scan");

        let outcome = outcome.unwrap_or(ReadOutcome::Failed("missing read outcome".into()));
        for module in registry.modules() {
            if !module.handles(&file.rel_path) {
                continue;
            }
            let stats = report.modules.get_mut(module.id()).expect("module stats present");
            match &outcome {
                ReadOutcome::Unindexable => {
                    stats.skipped += 1;
                }
                ReadOutcome::Failed(e) => {
                    state = FileState::Failed(e.clone());
                    warn!(file = file.rel_path.as_str(), error = e.as_str(), "read failed");
                    stats.errors += 1;
                }
                ReadOutcome::Text { content, mtime, hash } => {
                    let unchanged = module
                        .manifest_entry(&file.rel_path)
                        .is_some_and(|entry| entry_is_current(&entry, hash));
                    if unchanged {
                        stats.skipped += 1;
                        continue;
                    }
                    let staged = module
                        .index_file(&file.rel_path, content, *mtime, Some(hash.clone()))
                        .map(|indexed| {
                            state = FileState::Indexed;
                            indexed
                        })
                        .and_then(|indexed| {
                            storage.stage_file_index(module.id(), &indexed.file_index)?;
                            storage.stage_file_summary(module.id(), &indexed.summary)
                        });
                    match staged {
                        Ok(()) => {
                            state = FileState::Persisted;
                            stats.indexed += 1;
                        }
                        Err(e) => {
                            state = FileState::Failed(e.to_string());
                            warn!(
                                file = file.rel_path.as_str(),
                                module = module.id(),
                                error = %e,
                                "indexing failed"
                            );
                            stats.errors += 1;
                        }
                    }
                }
            }
        }
        debug!(file = file.rel_path.as_str(), state = ?state, "done");
    }

    // Drop manifest entries for files that vanished from the tree.
    for module in registry.modules() {
        for filepath in module.manifest_files().keys() {
            if !seen.contains(filepath) {
                module.remove_file(filepath);
                storage.remove_file_artifacts(module.id(), filepath);
                debug!(file = filepath.as_str(), module = module.id(), "stale entry removed");
            }
        }
    }

    // Commit: promote staged per-file records, persist module indexes, then
    // write the global manifest last.
    for module in registry.modules() {
        storage.promote_staged(module.id())?;
        module.finalize(storage)?;
    }
    storage.write_global_manifest(&GlobalManifest {
        version: INDEX_FORMAT_VERSION.to_string(),
        last_updated: Utc::now(),
        last_index_started: started,
        modules: registry.modules().iter().map(|m| m.id().to_string()).collect(),
    })?;

    report.elapsed_ms = t0.elapsed().as_millis() as u64;
    for (id, stats) in &report.modules {
        info!(
            module = id.as_str(),
            indexed = stats.indexed,
            skipped = stats.skipped,
            errors = stats.errors,
            "module indexed"
        );
    }
    Ok(report)
}

/// Re-index one file, staging its records for the caller to promote.
fn index_one(
    module: &dyn crate::module::IndexModule,
    storage: &IndexStorage,
    rel_path: &str,
    content: &str,
    mtime: DateTime<Utc>,
    hash: &str,
) -> Result<()> {
    let indexed = module.index_file(rel_path, content, mtime, Some(hash.to_string()))?;
    storage.stage_file_index(module.id(), &indexed.file_index)?;
    storage.stage_file_summary(module.id(), &indexed.summary)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Cleanup sweep
// ---------------------------------------------------------------------------

/// Remove manifest entries (and their artifacts) for files that no longer
/// exist on disk.
pub fn cleanup(root: &Path, registry: &ModuleRegistry, storage: &IndexStorage) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    for module in registry.modules() {
        let _ = module.load(storage);
        let mut stats = CleanupStats::default();
        for filepath in module.manifest_files().keys() {
            if root.join(filepath).is_file() {
                stats.kept += 1;
            } else {
                module.remove_file(filepath);
                storage.remove_file_artifacts(module.id(), filepath);
                stats.removed += 1;
            }
        }
        if stats.removed > 0 {
            module.finalize(storage)?;
        }
        info!(module = module.id(), removed = stats.removed, kept = stats.kept, "cleanup");
        report.modules.insert(module.id().to_string(), stats);
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Freshness sweep
// ---------------------------------------------------------------------------

/// Re-index modified files and drop missing ones, per the module manifests.
/// Returns true when anything changed (the manifests are then re-persisted).
pub fn freshness_sweep(
    root: &Path,
    registry: &ModuleRegistry,
    storage: &IndexStorage,
) -> Result<bool> {
    let mut changed = false;

    for module in registry.modules() {
        let mut module_changed = false;
        storage.discard_staged(module.id());
        for (filepath, entry) in module.manifest_files() {
            let abs = root.join(&filepath);
            let Some(mtime) = mtime_of(&abs) else {
                module.remove_file(&filepath);
                storage.remove_file_artifacts(module.id(), &filepath);
                debug!(file = filepath.as_str(), "removed missing file");
                module_changed = true;
                continue;
            };
            if mtime == entry.last_modified {
                continue;
            }
            let file =
                DiscoveredFile { rel_path: filepath.clone(), abs_path: abs };
            match read_for_indexing(&file) {
                ReadOutcome::Text { content, mtime, hash } => {
                    if entry.content_hash.as_deref() == Some(hash.as_str()) {
                        // Touched but content-identical; nothing to rebuild.
                        debug!(file = filepath.as_str(), "mtime changed, content identical");
                        continue;
                    }
                    match index_one(module.as_ref(), storage, &filepath, &content, mtime, &hash) {
                        Ok(()) => {
                            debug!(file = filepath.as_str(), "re-indexed modified file");
                            module_changed = true;
                        }
                        Err(e) => {
                            warn!(file = filepath.as_str(), error = %e, "re-index failed")
                        }
                    }
                }
                ReadOutcome::Unindexable => {
                    module.remove_file(&filepath);
                    storage.remove_file_artifacts(module.id(), &filepath);
                    module_changed = true;
                }
                ReadOutcome::Failed(e) => {
                    warn!(file = filepath.as_str(), error = e.as_str(), "stat/read failed")
                }
            }
        }
        if module_changed {
            storage.promote_staged(module.id())?;
            module.finalize(storage)?;
            changed = true;
        } else {
            // A re-index may have staged records and then failed part-way.
            storage.discard_staged(module.id());
        }
    }

    if changed {
        if let Some(mut manifest) = storage.read_global_manifest() {
            manifest.last_updated = Utc::now();
            storage.write_global_manifest(&manifest)?;
        }
    }
    Ok(changed)
}

/// Entry check used by tests and the skip logic: a stored manifest entry is
/// current when the hash matches.
pub(crate) fn entry_is_current(entry: &ManifestEntry, hash: &str) -> bool {
    entry.content_hash.as_deref() == Some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_stable_hex() {
        let h = hash_content(b"hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_content(b"hello"));
        assert_ne!(h, hash_content(b"hello2"));
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_discover_files_respects_extensions_and_ignores() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "let a = 1;").unwrap();
        std::fs::write(dir.path().join("src/b.xyz"), "skip me").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/c.ts"), "ignored").unwrap();

        let files = discover_files(dir.path(), &Config::default());
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts"]);
    }

    #[test]
    fn test_entry_is_current() {
        let entry = ManifestEntry {
            last_modified: Utc::now(),
            chunk_count: 1,
            content_hash: Some("abc".into()),
        };
        assert!(entry_is_current(&entry, "abc"));
        assert!(!entry_is_current(&entry, "def"));
        let no_hash = ManifestEntry { content_hash: None, ..entry };
        assert!(!entry_is_current(&no_hash, "abc"));
    }
}
