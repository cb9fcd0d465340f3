//! Configuration loading
//!
//! The matching thresholds, source priority table and batch budget are an
//! explicit immutable value passed into every matcher and orchestrator call.
//! Nothing in the engine reads shared mutable configuration state.
//!
//! Resolution priority:
//! 1. Explicit path argument
//! 2. `RESOLVER_CONFIG` environment variable
//! 3. Compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the trigger surface
    pub bind: String,
    /// Database file path
    pub database_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5810".to_string(),
            database_path: "resolver.db".to_string(),
        }
    }
}

/// Matching thresholds and caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Matches at or above this confidence are accepted without review
    pub auto_merge_threshold: u8,
    /// Matches at or above this confidence are accepted as review-grade
    pub review_threshold: u8,
    /// Minimum trigram similarity for fuzzy candidates
    pub min_title_similarity: f64,
    /// Maximum fuzzy candidates evaluated per record
    pub max_fuzzy_candidates: usize,
    /// Window size for the normalized-code fallback scan over recent
    /// records. Bounded for performance; very old unmatched records may
    /// never be found by that path, which is an accepted recall trade-off.
    pub recent_code_window: i64,
    /// Sources known to reuse identical titles for unrelated videos.
    /// Title-only matching against these is worse than no match.
    pub fuzzy_excluded_sources: Vec<String>,
    /// Jaro-Winkler threshold for performer fuzzy dedup
    pub performer_similarity_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_merge_threshold: 80,
            review_threshold: 60,
            min_title_similarity: 0.6,
            max_fuzzy_candidates: 20,
            recent_code_window: 500,
            fuzzy_excluded_sources: vec!["tokyohot".to_string(), "heyzo".to_string()],
            performer_similarity_threshold: 0.85,
        }
    }
}

/// Batch pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Wall-clock budget per run, in seconds
    pub time_budget_secs: u64,
    /// Maximum lookup-table queries per run
    pub max_lookups_per_run: usize,
    /// Consecutive per-record errors before a phase aborts early
    pub consecutive_error_cap: usize,
    /// Default record limit for a single run when the request omits one
    pub default_limit: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: 240,
            max_lookups_per_run: 2000,
            consecutive_error_cap: 25,
            default_limit: 5000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
    pub batch: BatchConfig,
    /// Source priority for master selection. Unknown sources score
    /// [`Config::DEFAULT_SOURCE_PRIORITY`].
    pub source_priority: HashMap<String, i64>,
}

impl Config {
    /// Priority assigned to sources missing from the table
    pub const DEFAULT_SOURCE_PRIORITY: i64 = 10;

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Resolve configuration: explicit path, then `RESOLVER_CONFIG`,
    /// then compiled defaults with the built-in priority table.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        if let Ok(env_path) = std::env::var("RESOLVER_CONFIG") {
            return Self::load(Path::new(&env_path));
        }
        Ok(Self::with_default_priorities())
    }

    /// Compiled defaults, including the built-in source priority table
    pub fn with_default_priorities() -> Self {
        let mut config = Config::default();
        for (source, priority) in [
            ("dmm", 100),
            ("mgstage", 80),
            ("duga", 60),
            ("sokmil", 50),
            ("fc2", 30),
            ("b10f", 20),
        ] {
            config.source_priority.insert(source.to_string(), priority);
        }
        config
    }

    /// Priority of a source for master selection
    pub fn source_priority(&self, source: &str) -> i64 {
        self.source_priority
            .get(source)
            .copied()
            .unwrap_or(Self::DEFAULT_SOURCE_PRIORITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::with_default_priorities();
        assert_eq!(config.matching.auto_merge_threshold, 80);
        assert_eq!(config.matching.review_threshold, 60);
        assert!(config.matching.auto_merge_threshold > config.matching.review_threshold);
        assert_eq!(config.source_priority("dmm"), 100);
        assert_eq!(config.source_priority("never-heard-of-it"), 10);
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[matching]
auto_merge_threshold = 85
review_threshold = 60
min_title_similarity = 0.6
max_fuzzy_candidates = 20
recent_code_window = 500
fuzzy_excluded_sources = []
performer_similarity_threshold = 0.85

[source_priority]
dmm = 90
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.matching.auto_merge_threshold, 85);
        assert_eq!(config.source_priority("dmm"), 90);
        // Sections absent from the file fall back to defaults
        assert_eq!(config.batch.time_budget_secs, 240);
        assert_eq!(config.server.bind, "127.0.0.1:5810");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/nonexistent/resolver.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
