//! Configuration loading and resolution for the audit engine.
//!
//! Supports a 4-level configuration resolution order:
//! 1. `flatfile.audit.toml` (`[audit]` section)
//! 2. `[tool.flatfile.audit]` section in `pyproject.toml`
//! 3. `audit:` section in `flatfile.yaml` / `flatfile.yml`
//! 4. Built-in defaults

use std::path::Path;

#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::UnknownTypePolicy;

// ---------------------------------------------------------------------------
// Cache config
// ---------------------------------------------------------------------------

/// Configuration for the content-addressed audit cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Cache file path, relative to the audited file's directory.
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: ".flatfile/audit_cache.json".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Database config
// ---------------------------------------------------------------------------

/// Target of the load step that follows a clean audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "database.db".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Main config
// ---------------------------------------------------------------------------

/// Complete audit engine configuration.
#[cfg_attr(feature = "python", pyclass)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Worker threads for check tasks (0 = rayon's global pool).
    pub threads: usize,

    /// How declared types other than TEXT/INTEGER/DECIMAL are handled.
    pub unknown_type_policy: UnknownTypePolicy,

    /// File the report sink writes findings to, if any.
    pub log_file: Option<String>,

    /// Cache configuration.
    pub cache: CacheConfig,

    /// Whether to bypass the cache for this run.
    pub no_cache: bool,

    /// Load-step database.
    pub database: DatabaseConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            unknown_type_policy: UnknownTypePolicy::default(),
            log_file: None,
            cache: CacheConfig::default(),
            no_cache: false,
            database: DatabaseConfig::default(),
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl AuditConfig {
    /// Create a new `AuditConfig` with built-in defaults.
    #[new]
    fn py_new() -> Self {
        Self::default()
    }

    /// Load configuration from a directory.
    #[staticmethod]
    fn load(dir: &str) -> PyResult<Self> {
        Self::load_from_dir(Path::new(dir))
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    #[getter]
    fn get_threads(&self) -> usize {
        self.threads
    }

    #[setter]
    fn set_threads(&mut self, value: usize) {
        self.threads = value;
    }

    /// Whether unknown declared types are checked as DECIMAL.
    #[getter]
    fn get_unknown_types_as_decimal(&self) -> bool {
        self.unknown_type_policy == UnknownTypePolicy::Decimal
    }

    #[setter]
    fn set_unknown_types_as_decimal(&mut self, value: bool) {
        self.unknown_type_policy = if value {
            UnknownTypePolicy::Decimal
        } else {
            UnknownTypePolicy::Reject
        };
    }

    #[getter]
    fn get_log_file(&self) -> Option<String> {
        self.log_file.clone()
    }

    #[setter]
    fn set_log_file(&mut self, value: Option<String>) {
        self.log_file = value;
    }

    #[getter]
    fn get_cache_enabled(&self) -> bool {
        self.cache.enabled
    }

    #[setter]
    fn set_cache_enabled(&mut self, value: bool) {
        self.cache.enabled = value;
    }

    #[getter]
    fn get_no_cache(&self) -> bool {
        self.no_cache
    }

    #[setter]
    fn set_no_cache(&mut self, value: bool) {
        self.no_cache = value;
    }

    #[getter]
    fn get_database_path(&self) -> String {
        self.database.path.clone()
    }

    #[setter]
    fn set_database_path(&mut self, value: String) {
        self.database.path = value;
    }

    fn __repr__(&self) -> String {
        format!(
            "AuditConfig(threads={}, unknown_type_policy={:?}, cache={})",
            self.threads, self.unknown_type_policy, self.cache.enabled,
        )
    }
}

// ---------------------------------------------------------------------------
// TOML / YAML deserialization helpers
// ---------------------------------------------------------------------------

/// Raw TOML structure for `flatfile.audit.toml`.
#[derive(Debug, Deserialize)]
struct TomlAuditFile {
    audit: Option<AuditSection>,
}

/// The `[audit]` section, shared by all three file formats.
#[derive(Debug, Deserialize)]
struct AuditSection {
    threads: Option<usize>,
    unknown_type_policy: Option<String>,
    log_file: Option<String>,
    cache: Option<CacheSection>,
    database: Option<DatabaseSection>,
}

#[derive(Debug, Deserialize)]
struct CacheSection {
    enabled: Option<bool>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

/// Raw TOML structure for `pyproject.toml` with `[tool.flatfile.audit]`.
#[derive(Debug, Deserialize)]
struct PyprojectToml {
    tool: Option<PyprojectTool>,
}

#[derive(Debug, Deserialize)]
struct PyprojectTool {
    flatfile: Option<PyprojectFlatfile>,
}

#[derive(Debug, Deserialize)]
struct PyprojectFlatfile {
    audit: Option<AuditSection>,
}

/// Raw YAML structure for `flatfile.yaml` with an `audit:` section.
#[derive(Debug, Deserialize)]
struct FlatfileYaml {
    audit: Option<AuditSection>,
}

/// Parse an unknown-type policy name.
fn parse_unknown_type_policy(s: &str) -> Option<UnknownTypePolicy> {
    match s.to_lowercase().as_str() {
        "reject" | "error" => Some(UnknownTypePolicy::Reject),
        "decimal" | "numeric" => Some(UnknownTypePolicy::Decimal),
        _ => None,
    }
}

/// Apply an [`AuditSection`] onto an [`AuditConfig`], overriding any set values.
fn apply_section(config: &mut AuditConfig, section: &AuditSection) {
    if let Some(v) = section.threads {
        config.threads = v;
    }
    if let Some(ref v) = section.unknown_type_policy {
        match parse_unknown_type_policy(v) {
            Some(p) => config.unknown_type_policy = p,
            None => log::warn!("Ignoring unknown_type_policy '{v}' (expected reject or decimal)"),
        }
    }
    if let Some(ref v) = section.log_file {
        config.log_file = Some(v.clone());
    }
    if let Some(ref cache) = section.cache {
        if let Some(v) = cache.enabled {
            config.cache.enabled = v;
        }
        if let Some(ref v) = cache.path {
            config.cache.path = v.clone();
        }
    }
    if let Some(ref db) = section.database {
        if let Some(ref v) = db.path {
            config.database.path = v.clone();
        }
    }
}

impl AuditConfig {
    /// Load configuration from `dir` using the 4-level resolution order.
    ///
    /// First file found wins; later files are not consulted.
    ///
    /// # Errors
    ///
    /// Returns an error if a found config file cannot be read, or if
    /// `flatfile.audit.toml` cannot be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // 1. flatfile.audit.toml
        let audit_toml = dir.join("flatfile.audit.toml");
        if audit_toml.is_file() {
            let content = read_config(&audit_toml)?;
            let parsed: TomlAuditFile = toml::from_str(&content).map_err(|e| {
                ConfigError::ParseError(audit_toml.display().to_string(), e.to_string())
            })?;
            if let Some(ref section) = parsed.audit {
                apply_section(&mut config, section);
            }
            return Ok(config);
        }

        // 2. pyproject.toml [tool.flatfile.audit]
        let pyproject = dir.join("pyproject.toml");
        if pyproject.is_file() {
            let content = read_config(&pyproject)?;
            if let Ok(parsed) = toml::from_str::<PyprojectToml>(&content) {
                let section = parsed
                    .tool
                    .and_then(|t| t.flatfile)
                    .and_then(|f| f.audit);
                if let Some(ref section) = section {
                    apply_section(&mut config, section);
                    return Ok(config);
                }
            }
        }

        // 3. flatfile.yaml / flatfile.yml
        for name in &["flatfile.yaml", "flatfile.yml"] {
            let yaml_path = dir.join(name);
            if yaml_path.is_file() {
                let content = read_config(&yaml_path)?;
                if let Ok(parsed) = serde_yaml::from_str::<FlatfileYaml>(&content) {
                    if let Some(ref section) = parsed.audit {
                        apply_section(&mut config, section);
                        return Ok(config);
                    }
                }
            }
        }

        // 4. Built-in defaults
        Ok(config)
    }

    /// Whether the cache should be consulted and written for this run.
    #[must_use]
    pub fn cache_active(&self) -> bool {
        self.cache.enabled && !self.no_cache
    }

    /// Compute a SHA-256 hash of the settings that affect audit results.
    ///
    /// Only `unknown_type_policy` changes findings; every other setting is
    /// left out so that tuning threads or logging keeps the cache warm.
    #[must_use]
    pub fn config_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let policy = serde_json::to_string(&self.unknown_type_policy).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(b"unknown_type_policy=");
        hasher.update(policy.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.display().to_string(), e.to_string()))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{0}': {1}")]
    ReadError(String, String),

    /// Failed to parse a configuration file.
    #[error("Failed to parse config file '{0}': {1}")]
    ParseError(String, String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert_eq!(config.threads, 0);
        assert_eq!(config.unknown_type_policy, UnknownTypePolicy::Reject);
        assert!(config.log_file.is_none());
        assert!(!config.cache.enabled);
        assert!(!config.cache_active());
        assert_eq!(config.database.path, "database.db");
    }

    #[test]
    fn test_cache_active() {
        let mut config = AuditConfig::default();
        config.cache.enabled = true;
        assert!(config.cache_active());
        config.no_cache = true;
        assert!(!config.cache_active());
    }

    #[test]
    fn test_parse_unknown_type_policy() {
        assert_eq!(
            parse_unknown_type_policy("reject"),
            Some(UnknownTypePolicy::Reject)
        );
        assert_eq!(
            parse_unknown_type_policy("DECIMAL"),
            Some(UnknownTypePolicy::Decimal)
        );
        assert_eq!(parse_unknown_type_policy("text"), None);
    }

    #[test]
    fn test_config_hash_deterministic() {
        let config = AuditConfig::default();
        assert_eq!(config.config_hash(), config.config_hash());
        assert_eq!(config.config_hash().len(), 64);
    }

    #[test]
    fn test_config_hash_tracks_result_settings_only() {
        let base = AuditConfig::default();

        let mut threads = AuditConfig::default();
        threads.threads = 8;
        assert_eq!(base.config_hash(), threads.config_hash());

        let mut policy = AuditConfig::default();
        policy.unknown_type_policy = UnknownTypePolicy::Decimal;
        assert_ne!(base.config_hash(), policy.config_hash());
    }

    #[test]
    fn test_load_nonexistent_dir() {
        let config = AuditConfig::load_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert_eq!(config, AuditConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[audit]
threads = 4
unknown_type_policy = "decimal"
log_file = "audit.log"

[audit.cache]
enabled = true
path = "cache/audit.json"

[audit.database]
path = "products.db"
"#;
        std::fs::write(dir.path().join("flatfile.audit.toml"), toml_content).unwrap();
        let config = AuditConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.threads, 4);
        assert_eq!(config.unknown_type_policy, UnknownTypePolicy::Decimal);
        assert_eq!(config.log_file.as_deref(), Some("audit.log"));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.path, "cache/audit.json");
        assert_eq!(config.database.path, "products.db");
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flatfile.audit.toml"), "[audit\nthreads = ").unwrap();
        let err = AuditConfig::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }

    #[test]
    fn test_load_from_pyproject_toml() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"
[project]
name = "loader"

[tool.flatfile.audit]
threads = 2
"#;
        std::fs::write(dir.path().join("pyproject.toml"), content).unwrap();
        let config = AuditConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.threads, 2);
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let content = "audit:\n  unknown_type_policy: decimal\n  cache:\n    enabled: true\n";
        std::fs::write(dir.path().join("flatfile.yml"), content).unwrap();
        let config = AuditConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.unknown_type_policy, UnknownTypePolicy::Decimal);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_toml_wins_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flatfile.audit.toml"), "[audit]\nthreads = 3\n").unwrap();
        std::fs::write(dir.path().join("flatfile.yaml"), "audit:\n  threads: 9\n").unwrap();
        let config = AuditConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.threads, 3);
    }
}
