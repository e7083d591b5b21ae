//! Persisted index layout.
//!
//! ```text
//! <indexDir>/
//!   config.json
//!   manifest.json                        global manifest
//!   index/<moduleId>/
//!     manifest.json                      module manifest
//!     symbolic/_meta.json                BM25 statistics
//!     symbolic/<filepath>.json           per-file summary
//!     literals/_index.json               literal index
//!     <filepath>.json                    per-file chunk index
//! ```
//!
//! Writes are whole-file replacements (write to a temp sibling, then
//! rename), so readers observe either the previous file or the new one.
//! Readers fail closed: a missing or unparsable file reads as not-present.
//!
//! Per-file records produced during a batch are staged under
//! `index/<moduleId>/.staging/` and only promoted into the live layout at
//! commit time, so a cancelled or failed batch leaves no new bytes under
//! the paths readers look at.

use crate::bm25::Bm25Meta;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::literal::LiteralIndexData;
use crate::types::{sanitize_path, FileIndex, FileSummary, GlobalManifest, ModuleManifest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct IndexStorage {
    index_dir: PathBuf,
}

impl IndexStorage {
    pub fn new(root: &Path, config: &Config) -> Self {
        IndexStorage { index_dir: root.join(&config.index_dir) }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    fn module_dir(&self, module_id: &str) -> PathBuf {
        self.index_dir.join("index").join(module_id)
    }

    fn staging_dir(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join(".staging")
    }

    fn file_json_path(&self, base: &Path, filepath: &str) -> PathBuf {
        base.join(format!("{}.json", sanitize_path(filepath)))
    }

    // -----------------------------------------------------------------------
    // JSON primitives
    // -----------------------------------------------------------------------

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.index_dir);
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent.display().to_string(), e))?;

        let json = serde_json::to_vec(value)
            .map_err(|e| Error::Internal(format!("serialize {}: {e}", path.display())))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::io(tmp.display().to_string(), e))?;
        std::fs::rename(&tmp, path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unparsable index file, treating as missing");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Top-level records
    // -----------------------------------------------------------------------

    pub fn write_config(&self, config: &Config) -> Result<()> {
        self.write_json(&self.index_dir.join("config.json"), config)
    }

    pub fn write_global_manifest(&self, manifest: &GlobalManifest) -> Result<()> {
        self.write_json(&self.index_dir.join("manifest.json"), manifest)
    }

    pub fn read_global_manifest(&self) -> Option<GlobalManifest> {
        self.read_json(&self.index_dir.join("manifest.json"))
    }

    // -----------------------------------------------------------------------
    // Module records
    // -----------------------------------------------------------------------

    pub fn write_module_manifest(&self, manifest: &ModuleManifest) -> Result<()> {
        self.write_json(&self.module_dir(&manifest.module_id).join("manifest.json"), manifest)
    }

    pub fn read_module_manifest(&self, module_id: &str) -> Option<ModuleManifest> {
        self.read_json(&self.module_dir(module_id).join("manifest.json"))
    }

    pub fn write_bm25_meta(&self, module_id: &str, meta: &Bm25Meta) -> Result<()> {
        self.write_json(&self.module_dir(module_id).join("symbolic").join("_meta.json"), meta)
    }

    pub fn read_bm25_meta(&self, module_id: &str) -> Option<Bm25Meta> {
        self.read_json(&self.module_dir(module_id).join("symbolic").join("_meta.json"))
    }

    pub fn write_file_summary(&self, module_id: &str, summary: &FileSummary) -> Result<()> {
        let base = self.module_dir(module_id).join("symbolic");
        self.write_json(&self.file_json_path(&base, &summary.filepath), summary)
    }

    /// Collect every per-file summary of a module. Unparsable entries are
    /// skipped (and warned about) rather than failing the load.
    pub fn read_file_summaries(&self, module_id: &str) -> Vec<FileSummary> {
        let base = self.module_dir(module_id).join("symbolic");
        let mut summaries = Vec::new();
        collect_json_files(&base, &mut |path| {
            if path.file_name().is_some_and(|n| n == "_meta.json") {
                return;
            }
            if let Some(summary) = self.read_json::<FileSummary>(path) {
                summaries.push(summary);
            }
        });
        summaries
    }

    pub fn write_literal_index(&self, module_id: &str, data: &LiteralIndexData) -> Result<()> {
        self.write_json(&self.module_dir(module_id).join("literals").join("_index.json"), data)
    }

    pub fn read_literal_index(&self, module_id: &str) -> Option<LiteralIndexData> {
        self.read_json(&self.module_dir(module_id).join("literals").join("_index.json"))
    }

    pub fn write_file_index(&self, module_id: &str, index: &FileIndex) -> Result<()> {
        let base = self.module_dir(module_id);
        self.write_json(&self.file_json_path(&base, &index.filepath), index)
    }

    pub fn read_file_index(&self, module_id: &str, filepath: &str) -> Option<FileIndex> {
        let base = self.module_dir(module_id);
        self.read_json(&self.file_json_path(&base, filepath))
    }

    /// Delete the per-file records of one file. Absence is not an error.
    pub fn remove_file_artifacts(&self, module_id: &str, filepath: &str) {
        let base = self.module_dir(module_id);
        let _ = std::fs::remove_file(self.file_json_path(&base, filepath));
        let _ = std::fs::remove_file(self.file_json_path(&base.join("symbolic"), filepath));
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Write a per-file chunk index into the module's staging area. Invisible
    /// to readers until [`IndexStorage::promote_staged`].
    pub fn stage_file_index(&self, module_id: &str, index: &FileIndex) -> Result<()> {
        let base = self.staging_dir(module_id);
        self.write_json(&self.file_json_path(&base, &index.filepath), index)
    }

    /// Write a per-file summary into the module's staging area.
    pub fn stage_file_summary(&self, module_id: &str, summary: &FileSummary) -> Result<()> {
        let base = self.staging_dir(module_id).join("symbolic");
        self.write_json(&self.file_json_path(&base, &summary.filepath), summary)
    }

    /// Move every staged record into the live layout, replacing existing
    /// files. Called from the commit section of a batch, right before the
    /// manifest write.
    pub fn promote_staged(&self, module_id: &str) -> Result<()> {
        let staging = self.staging_dir(module_id);
        if !staging.exists() {
            return Ok(());
        }
        promote_tree(&staging, &self.module_dir(module_id))?;
        let _ = std::fs::remove_dir_all(&staging);
        Ok(())
    }

    /// Drop the staging area. Used when a batch is cancelled or aborted, and
    /// at batch start to clear leftovers from a previously aborted run.
    pub fn discard_staged(&self, module_id: &str) {
        let _ = std::fs::remove_dir_all(self.staging_dir(module_id));
    }
}

fn promote_tree(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| Error::io(dst.display().to_string(), e))?;
    let entries =
        std::fs::read_dir(src).map_err(|e| Error::io(src.display().to_string(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(src.display().to_string(), e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            promote_tree(&from, &to)?;
        } else {
            std::fs::rename(&from, &to).map_err(|e| Error::io(to.display().to_string(), e))?;
        }
    }
    Ok(())
}

fn collect_json_files(dir: &Path, visit: &mut impl FnMut(&Path)) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(&path, visit);
        } else if path.extension().is_some_and(|e| e == "json") {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{chunk_id, Chunk, ChunkType, INDEX_FORMAT_VERSION};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn storage() -> (tempfile::TempDir, IndexStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = IndexStorage::new(dir.path(), &Config::default());
        (dir, storage)
    }

    fn sample_file_index(filepath: &str) -> FileIndex {
        FileIndex {
            filepath: filepath.to_string(),
            last_modified: Utc::now(),
            chunks: vec![Chunk {
                chunk_id: chunk_id(filepath, 1, 3),
                filepath: filepath.to_string(),
                start_line: 1,
                end_line: 3,
                content: "let x = 1;".to_string(),
                chunk_type: ChunkType::File,
                name: None,
                is_exported: None,
            }],
            module_data: serde_json::Value::Null,
            references: None,
        }
    }

    #[test]
    fn test_file_index_round_trip() {
        let (_dir, storage) = storage();
        let index = sample_file_index("src/nested/deep/file.ts");
        storage.write_file_index("core", &index).unwrap();
        let back = storage.read_file_index("core", "src/nested/deep/file.ts").unwrap();
        assert_eq!(back.chunks.len(), 1);
        assert_eq!(back.chunks[0].chunk_id, "src/nested/deep/file.ts:1-3");
    }

    #[test]
    fn test_missing_reads_as_none() {
        let (_dir, storage) = storage();
        assert!(storage.read_file_index("core", "nope.ts").is_none());
        assert!(storage.read_global_manifest().is_none());
        assert!(storage.read_bm25_meta("core").is_none());
        assert!(storage.read_literal_index("core").is_none());
    }

    #[test]
    fn test_corrupt_file_reads_as_none() {
        let (_dir, storage) = storage();
        let index = sample_file_index("a.ts");
        storage.write_file_index("core", &index).unwrap();
        let path = storage.module_dir("core").join("a.ts.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(storage.read_file_index("core", "a.ts").is_none());
    }

    #[test]
    fn test_summaries_walk_skips_meta() {
        let (_dir, storage) = storage();
        for path in ["src/a.ts", "src/sub/b.ts"] {
            let summary = FileSummary {
                filepath: path.to_string(),
                last_modified: Utc::now(),
                doc_length: 2,
                term_freqs: BTreeMap::from([("word".to_string(), 2u32)]),
            };
            storage.write_file_summary("core", &summary).unwrap();
        }
        let meta = crate::bm25::Bm25Index::default().to_meta();
        storage.write_bm25_meta("core", &meta).unwrap();

        let summaries = storage.read_file_summaries("core");
        assert_eq!(summaries.len(), 2);
        let mut paths: Vec<&str> = summaries.iter().map(|s| s.filepath.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["src/a.ts", "src/sub/b.ts"]);
    }

    #[test]
    fn test_remove_file_artifacts() {
        let (_dir, storage) = storage();
        let index = sample_file_index("src/a.ts");
        storage.write_file_index("core", &index).unwrap();
        let summary = FileSummary {
            filepath: "src/a.ts".to_string(),
            last_modified: Utc::now(),
            doc_length: 0,
            term_freqs: BTreeMap::new(),
        };
        storage.write_file_summary("core", &summary).unwrap();

        storage.remove_file_artifacts("core", "src/a.ts");
        assert!(storage.read_file_index("core", "src/a.ts").is_none());
        assert!(storage.read_file_summaries("core").is_empty());
    }

    #[test]
    fn test_staged_records_invisible_until_promoted() {
        let (_dir, storage) = storage();
        let index = sample_file_index("src/a.ts");
        let summary = FileSummary {
            filepath: "src/a.ts".to_string(),
            last_modified: Utc::now(),
            doc_length: 1,
            term_freqs: BTreeMap::from([("word".to_string(), 1u32)]),
        };
        storage.stage_file_index("core", &index).unwrap();
        storage.stage_file_summary("core", &summary).unwrap();

        assert!(storage.read_file_index("core", "src/a.ts").is_none());
        assert!(storage.read_file_summaries("core").is_empty());

        storage.promote_staged("core").unwrap();
        assert!(storage.read_file_index("core", "src/a.ts").is_some());
        assert_eq!(storage.read_file_summaries("core").len(), 1);
        // Staging area is gone after promotion.
        assert!(!storage.module_dir("core").join(".staging").exists());
    }

    #[test]
    fn test_discard_staged_leaves_live_layout_untouched() {
        let (_dir, storage) = storage();
        let live = sample_file_index("src/a.ts");
        storage.write_file_index("core", &live).unwrap();

        let mut staged = sample_file_index("src/a.ts");
        staged.chunks.clear();
        storage.stage_file_index("core", &staged).unwrap();
        let other = sample_file_index("src/b.ts");
        storage.stage_file_index("core", &other).unwrap();

        storage.discard_staged("core");
        let back = storage.read_file_index("core", "src/a.ts").unwrap();
        assert_eq!(back.chunks.len(), 1);
        assert!(storage.read_file_index("core", "src/b.ts").is_none());
    }

    #[test]
    fn test_promote_replaces_existing_records() {
        let (_dir, storage) = storage();
        let live = sample_file_index("src/a.ts");
        storage.write_file_index("core", &live).unwrap();

        let mut staged = sample_file_index("src/a.ts");
        staged.chunks.clear();
        storage.stage_file_index("core", &staged).unwrap();
        storage.promote_staged("core").unwrap();

        let back = storage.read_file_index("core", "src/a.ts").unwrap();
        assert!(back.chunks.is_empty());
    }

    #[test]
    fn test_promote_with_no_staging_is_noop() {
        let (_dir, storage) = storage();
        storage.promote_staged("core").unwrap();
        storage.discard_staged("core");
    }

    #[test]
    fn test_module_manifest_round_trip() {
        let (_dir, storage) = storage();
        let manifest = ModuleManifest::new("docs/markdown");
        storage.write_module_manifest(&manifest).unwrap();
        let back = storage.read_module_manifest("docs/markdown").unwrap();
        assert_eq!(back.module_id, "docs/markdown");
        assert_eq!(back.version, INDEX_FORMAT_VERSION);
    }
}
