//! Run configuration loading and validation.
//!
//! A generation run is driven by a single YAML file plus a small set of
//! environment variables (`DATABASE_URL` and the oracle API key). The
//! configuration is loaded once per run and treated as immutable.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schema::TableSelection;

/// Immutable configuration for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Module name; drives package naming and the default prefix filter.
    pub module_name: String,

    /// Root Java package for generated code (e.g. "com.xhn").
    #[serde(default = "default_base_package")]
    pub base_package: String,

    /// Root of the target project tree that files are written under.
    pub project_root: PathBuf,

    /// Explicit table allow-list. When non-empty, only exact matches are
    /// generated and `table_prefixes` must be left empty.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Literal name-prefix filters (plain string prefix, not glob or regex).
    /// When both this and `tables` are empty the module name is used as the
    /// single prefix.
    #[serde(default)]
    pub table_prefixes: Vec<String>,

    /// Synthesis oracle endpoint and retry settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Prompt template settings.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Worker-pool size for concurrent tasks. Bounded independent of table
    /// count because the oracle enforces request-rate limits.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_tasks: usize,

    /// Schema source connection string; falls back to the DATABASE_URL
    /// environment variable when absent.
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Synthesis oracle endpoint and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible chat-completions endpoint.
    pub endpoint: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Attempt ceiling for retryable failures (unavailable / rate-limited).
    pub max_attempts: u32,

    /// Per-attempt timeout in seconds; exceeding it counts as unavailable.
    pub request_timeout_secs: u64,

    /// Base delay for exponential backoff between attempts, in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "ORACLE_API_KEY".to_string(),
            max_attempts: 3,
            request_timeout_secs: 120,
            backoff_base_ms: 500,
        }
    }
}

impl OracleConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Prompt template settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptConfig {
    /// Author tag stamped into generated-code comments.
    pub author: Option<String>,

    /// Fixed `@date` string stamped into generated-code comments. Left
    /// unset, no date is requested: a wall-clock date would make every rerun
    /// render a different request and break byte-identical regeneration.
    pub date_stamp: Option<String>,

    /// Extra project-specific instructions appended to every system prompt.
    pub extra_instructions: Option<String>,
}

impl PromptConfig {
    pub fn author(&self) -> &str {
        self.author.as_deref().unwrap_or("forgemill")
    }
}

impl GenerationConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        let config: GenerationConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.module_name.trim().is_empty() {
            return Err("module_name must not be empty".to_string());
        }
        if self.base_package.trim().is_empty() {
            return Err("base_package must not be empty".to_string());
        }
        if self.project_root.as_os_str().is_empty() {
            return Err("project_root must not be empty".to_string());
        }
        if !self.tables.is_empty() && !self.table_prefixes.is_empty() {
            return Err(
                "configure either an explicit table allow-list or prefix filters, not both"
                    .to_string(),
            );
        }
        if self.max_concurrent_tasks == 0 {
            return Err("max_concurrent_tasks must be at least 1".to_string());
        }
        if self.oracle.max_attempts == 0 {
            return Err("oracle.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Table-selection policy for this run.
    ///
    /// An explicit allow-list wins; otherwise configured prefixes apply, with
    /// the module name as the default prefix when none are configured.
    pub fn selection(&self) -> TableSelection {
        if !self.tables.is_empty() {
            TableSelection::AllowList(self.tables.clone())
        } else if !self.table_prefixes.is_empty() {
            TableSelection::Prefixes(self.table_prefixes.clone())
        } else {
            TableSelection::Prefixes(vec![self.module_name.clone()])
        }
    }

    /// Resolve the schema-source connection string.
    pub fn database_url(&self) -> Result<String, String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        std::env::var("DATABASE_URL")
            .map_err(|_| "database_url not configured and DATABASE_URL not set".to_string())
    }
}

fn default_base_package() -> String {
    "com.xhn".to_string()
}

fn default_concurrency() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        "module_name: admin\nproject_root: /tmp/target\n"
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: GenerationConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.base_package, "com.xhn");
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.oracle.max_attempts, 3);
        assert_eq!(config.oracle.model, "deepseek-chat");
        // module name becomes the default prefix filter
        match config.selection() {
            TableSelection::Prefixes(prefixes) => assert_eq!(prefixes, vec!["admin"]),
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_allow_list_wins() {
        let yaml = "module_name: admin\nproject_root: /tmp/target\ntables:\n  - sys_menu\n";
        let config: GenerationConfig = serde_yaml::from_str(yaml).unwrap();
        match config.selection() {
            TableSelection::AllowList(tables) => assert_eq!(tables, vec!["sys_menu"]),
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_selection_rejected() {
        let yaml = "module_name: admin\nproject_root: /tmp/target\n\
                    tables:\n  - sys_menu\ntable_prefixes:\n  - sys_\n";
        let config: GenerationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let yaml = "module_name: admin\nproject_root: /tmp/target\nmax_concurrent_tasks: 0\n";
        let config: GenerationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
