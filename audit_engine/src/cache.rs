//! Content-addressed audit cache.
//!
//! Caches audit reports by data-file content hash + schema hash + config hash
//! + engine version. A cache hit means the same bytes were already audited
//! against the same schema, so the stored report can be returned without
//! re-reading the file once per check.
//!
//! Writes are atomic (temp file + rename). Last writer wins; no locking.
//! A corrupt cache is logged, deleted, and rebuilt. Cache failures never
//! fail an audit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AuditConfig;
use crate::types::AuditReport;

/// Current engine version, used for cache invalidation.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cache format version.
const CACHE_VERSION: &str = "1";

/// A single cache entry for one data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `sha256:<hex>` of the data file content.
    pub content_hash: String,
    /// Fingerprint of the schema the file was audited against.
    pub schema_hash: String,
    /// When the file was last audited.
    pub last_audited: DateTime<Utc>,
    /// The report produced by that audit.
    pub report: AuditReport,
}

/// The on-disk cache file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: String,
    pub engine_version: String,
    pub config_hash: String,
    /// Data file path → cache entry.
    pub entries: HashMap<String, CacheEntry>,
}

/// The audit cache for one directory of data files.
pub struct AuditCache {
    entries: HashMap<String, CacheEntry>,
    config_hash: String,
    cache_path: Option<PathBuf>,
    enabled: bool,
    invalidated: bool,
}

impl AuditCache {
    /// Open the cache that sits alongside files in `dir`.
    ///
    /// A disabled cache never hits and never writes.
    pub fn new(dir: &Path, config: &AuditConfig) -> Self {
        let config_hash = config.config_hash();

        if !config.cache_active() {
            return Self {
                entries: HashMap::new(),
                config_hash,
                cache_path: None,
                enabled: false,
                invalidated: false,
            };
        }

        let cache_path = dir.join(&config.cache.path);
        let (entries, invalidated) = load_cache_file(&cache_path, &config_hash);

        Self {
            entries,
            config_hash,
            cache_path: Some(cache_path),
            enabled: true,
            invalidated,
        }
    }

    /// Stored report for `data_file`, if its content and schema still match.
    #[must_use]
    pub fn lookup(
        &self,
        data_file: &str,
        content_hash: &str,
        schema_hash: &str,
    ) -> Option<&AuditReport> {
        if !self.enabled || self.invalidated {
            return None;
        }
        self.entries
            .get(data_file)
            .filter(|e| e.content_hash == content_hash && e.schema_hash == schema_hash)
            .map(|e| &e.report)
    }

    /// Record the report of a completed audit.
    pub fn update(&mut self, data_file: &str, schema_hash: &str, report: &AuditReport) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            data_file.to_owned(),
            CacheEntry {
                content_hash: report.data_file_hash.clone(),
                schema_hash: schema_hash.to_owned(),
                last_audited: Utc::now(),
                report: report.clone(),
            },
        );
        self.invalidated = false;
    }

    /// Write the cache to disk atomically.
    ///
    /// Errors are logged but never propagated.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }

        let cache_path = match &self.cache_path {
            Some(p) => p,
            None => return,
        };

        let cache_file = CacheFile {
            version: CACHE_VERSION.to_owned(),
            engine_version: ENGINE_VERSION.to_owned(),
            config_hash: self.config_hash.clone(),
            entries: self.entries.clone(),
        };

        let json = match serde_json::to_string_pretty(&cache_file) {
            Ok(j) => j,
            Err(e) => {
                log::warn!("Failed to serialize audit cache: {}", e);
                return;
            }
        };

        if let Some(parent) = cache_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create audit cache directory: {}", e);
                return;
            }
        }

        let pid = std::process::id();
        let tmp_path = cache_path.with_extension(format!("json.tmp.{pid}"));

        if let Err(e) = std::fs::write(&tmp_path, &json) {
            log::warn!("Failed to write audit cache temp file: {}", e);
            return;
        }

        if let Err(e) = std::fs::rename(&tmp_path, cache_path) {
            log::warn!("Failed to rename audit cache file: {}", e);
            let _ = std::fs::remove_file(&tmp_path);
        }
    }
}

/// Load the cache file, validating versions and config hash.
///
/// Returns `(entries, invalidated)`. A missing or corrupt file yields an
/// empty, valid cache; a version or config mismatch yields an invalidated one.
fn load_cache_file(cache_path: &Path, config_hash: &str) -> (HashMap<String, CacheEntry>, bool) {
    if !cache_path.is_file() {
        return (HashMap::new(), false);
    }

    let content = match std::fs::read_to_string(cache_path) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Failed to read audit cache file: {}", e);
            return (HashMap::new(), false);
        }
    };

    let cache_file: CacheFile = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Corrupt audit cache file ({}). Deleting and rebuilding.", e);
            let _ = std::fs::remove_file(cache_path);
            return (HashMap::new(), false);
        }
    };

    if cache_file.engine_version != ENGINE_VERSION {
        log::info!(
            "Audit cache engine version mismatch ({} != {}). Invalidating.",
            cache_file.engine_version,
            ENGINE_VERSION
        );
        return (HashMap::new(), true);
    }

    if cache_file.config_hash != config_hash {
        log::info!("Audit cache config hash mismatch. Invalidating entire cache.");
        return (HashMap::new(), true);
    }

    if cache_file.version != CACHE_VERSION {
        log::info!(
            "Audit cache format version mismatch ({} != {}). Invalidating.",
            cache_file.version,
            CACHE_VERSION
        );
        return (HashMap::new(), true);
    }

    (cache_file.entries, false)
}
