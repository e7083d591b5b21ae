//! Engine configuration: loading, defaults, environment overrides, and
//! validation with severity-ranked issues.
//!
//! Configuration lives in `raggrep.json` at the project root; a copy is
//! persisted into the index directory at index time. `RAGGREP_INDEX_DIR`
//! overrides the index directory.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Env var overriding `indexDir`.
pub const ENV_INDEX_DIR: &str = "RAGGREP_INDEX_DIR";
/// Env var selecting the log level (debug, info, warn, error).
pub const ENV_LOG_LEVEL: &str = "RAGGREP_LOG_LEVEL";
/// Env var selecting the log format (json, pretty).
pub const ENV_LOG_FORMAT: &str = "RAGGREP_LOG_FORMAT";

/// Config file name at the project root.
pub const CONFIG_FILE: &str = "raggrep.json";

/// Module IDs the engine ships; other recognized IDs belong to external
/// (embedding-backed) modules.
pub const BUILTIN_MODULE_IDS: &[&str] = &["core", "docs/markdown"];
pub const EXTERNAL_MODULE_IDS: &[&str] = &["language/typescript", "data/json"];

const KNOWN_EMBEDDING_MODELS: &[&str] = &["minilm", "codebert", "starencoder"];
const VOCABULARY_EXPANSION_LEVELS: &[&str] = &["conservative", "moderate", "aggressive", "none"];

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    pub id: String,
    pub enabled: bool,
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        ModuleConfig { id: String::new(), enabled: true, options: BTreeMap::new() }
    }
}

impl ModuleConfig {
    pub fn new(id: &str) -> Self {
        ModuleConfig { id: id.to_string(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub version: String,
    /// Relative to the project root.
    pub index_dir: String,
    /// Indexed extensions, each starting with a dot.
    pub extensions: Vec<String>,
    /// Directory segments skipped during the tree walk.
    pub ignore_paths: Vec<String>,
    pub modules: Vec<ModuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: "1.0.0".to_string(),
            index_dir: ".raggrep".to_string(),
            extensions: [
                ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".rs", ".go", ".py", ".md",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignore_paths: [
                ".git",
                "node_modules",
                "target",
                "dist",
                "build",
                "__pycache__",
                ".raggrep",
                "vendor",
                ".next",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            modules: vec![ModuleConfig::new("core"), ModuleConfig::new("docs/markdown")],
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from `raggrep.json` at the project root, falling
    /// back to defaults when the file is absent. A malformed file is a
    /// validation error; the env override is applied afterwards either way.
    pub fn load(root: &Path) -> Result<Config> {
        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::io(path.display().to_string(), e))?;
            serde_json::from_str(&content).map_err(|e| {
                Error::Validation(format!("malformed {}: {e}", path.display()))
            })?
        } else {
            Config::default()
        };

        if let Ok(dir) = std::env::var(ENV_INDEX_DIR) {
            if !dir.trim().is_empty() {
                config.index_dir = dir;
            }
        }
        Ok(config)
    }

    /// Extensions without their leading dot, lowercased.
    pub fn extension_set(&self) -> HashSet<String> {
        self.extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub message: String,
}

impl ConfigIssue {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        ConfigIssue { severity, message: message.into() }
    }
}

fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

impl Config {
    /// Validate the configuration, returning every issue found. A duplicate
    /// module ID is the one condition treated as a [`Error::Conflict`] by
    /// [`Config::ensure_valid`].
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if !is_semver(&self.version) {
            issues.push(ConfigIssue::new(
                Severity::Error,
                format!("version '{}' is not a semver string", self.version),
            ));
        }

        if self.index_dir.trim().is_empty() {
            issues.push(ConfigIssue::new(Severity::Error, "indexDir must not be empty"));
        } else if Path::new(&self.index_dir).is_absolute() {
            issues.push(ConfigIssue::new(
                Severity::Warning,
                format!("indexDir '{}' is absolute; a relative path is expected", self.index_dir),
            ));
        }

        for ext in &self.extensions {
            if !ext.starts_with('.') {
                issues.push(ConfigIssue::new(
                    Severity::Error,
                    format!("extension '{ext}' must start with a dot"),
                ));
            }
        }

        for seg in &self.ignore_paths {
            if seg.contains('/') {
                issues.push(ConfigIssue::new(
                    Severity::Warning,
                    format!("ignorePaths entry '{seg}' contains '/'; entries are directory names"),
                ));
            }
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for module in &self.modules {
            if module.id.is_empty() {
                issues.push(ConfigIssue::new(Severity::Error, "module with empty id"));
                continue;
            }
            if !seen_ids.insert(module.id.as_str()) {
                issues.push(ConfigIssue::new(
                    Severity::Error,
                    format!("duplicate module id '{}'", module.id),
                ));
            }
            if !BUILTIN_MODULE_IDS.contains(&module.id.as_str())
                && !EXTERNAL_MODULE_IDS.contains(&module.id.as_str())
            {
                issues.push(ConfigIssue::new(
                    Severity::Warning,
                    format!("unrecognized module id '{}'", module.id),
                ));
            }
            issues.extend(validate_module_options(module));
        }

        issues
    }

    /// Surface validation errors as typed failures: duplicate module IDs as
    /// a conflict, anything else as a validation error.
    pub fn ensure_valid(&self) -> Result<()> {
        let issues = self.validate();
        for issue in &issues {
            if issue.severity == Severity::Error {
                if issue.message.starts_with("duplicate module id") {
                    return Err(Error::Conflict(issue.message.clone()));
                }
                return Err(Error::Validation(issue.message.clone()));
            }
        }
        Ok(())
    }
}

fn validate_module_options(module: &ModuleConfig) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    for (key, value) in &module.options {
        match key.as_str() {
            "embeddingModel" => match value.as_str() {
                Some(model) if KNOWN_EMBEDDING_MODELS.contains(&model) => {}
                Some(model) => issues.push(ConfigIssue::new(
                    Severity::Info,
                    format!("module '{}': unknown embedding model '{model}' (accepted)", module.id),
                )),
                None => issues.push(ConfigIssue::new(
                    Severity::Error,
                    format!("module '{}': embeddingModel must be a string", module.id),
                )),
            },
            "vocabularyExpansion" => match value.as_str() {
                Some(level) if VOCABULARY_EXPANSION_LEVELS.contains(&level) => {}
                _ => issues.push(ConfigIssue::new(
                    Severity::Error,
                    format!(
                        "module '{}': vocabularyExpansion must be one of {:?}",
                        module.id, VOCABULARY_EXPANSION_LEVELS
                    ),
                )),
            },
            "showProgress" => {
                if !value.is_boolean() {
                    issues.push(ConfigIssue::new(
                        Severity::Error,
                        format!("module '{}': showProgress must be a boolean", module.id),
                    ));
                }
            }
            other => issues.push(ConfigIssue::new(
                Severity::Warning,
                format!("module '{}': unrecognized option '{other}'", module.id),
            )),
        }
    }
    issues
}
