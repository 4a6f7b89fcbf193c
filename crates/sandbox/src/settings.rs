//! `sift.toml`: paths, ingestion, execution limits and the policy.
//!
//! ```toml
//! [paths]
//! drop_dir = "data-in"
//! archive_dir = "data-archive"
//! store = "data/sift.db"
//!
//! [ingest]
//! default_table = "records"
//!
//! [execution]
//! timeout_secs = 45
//! max_result_rows = 1000
//!
//! [policy]
//! allowed_imports = ["db", "frame"]
//! ```
//!
//! Every key is optional. Relative paths resolve against the directory
//! holding the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sift_core::Policy;
use sift_storage::IngestConfig;

use crate::error::SandboxError;

pub const DEFAULT_FILE: &str = "sift.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathSettings,
    pub ingest: IngestSettings,
    pub execution: ExecutionSettings,
    pub policy: PolicySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub drop_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub store: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            drop_dir: PathBuf::from("data-in"),
            archive_dir: PathBuf::from("data-archive"),
            store: PathBuf::from("data/sift.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    pub default_table: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        IngestSettings {
            default_table: "records".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionSettings {
    pub timeout_secs: u64,
    pub max_result_rows: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            timeout_secs: 45,
            max_result_rows: 1000,
        }
    }
}

/// Optional narrowing of the default allow-list. Absent means "everything
/// the host provides".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySettings {
    pub allowed_imports: Option<Vec<String>>,
    pub allowed_functions: Option<Vec<String>>,
    pub allowed_methods: Option<Vec<String>>,
}

impl Settings {
    /// Load `path`. A missing file yields the defaults, still resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Settings, SandboxError> {
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        // The worker gets the store path verbatim; keep it independent of cwd.
        let base = match std::env::current_dir() {
            Ok(cwd) if base.is_relative() => cwd.join(base),
            _ => base.to_path_buf(),
        };
        let settings = match std::fs::read_to_string(path) {
            Ok(text) => Settings::parse(&text, path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file; using defaults");
                Settings::default()
            }
            Err(e) => {
                return Err(SandboxError::SettingsIo {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Ok(settings.resolved(&base))
    }

    /// Parse TOML text. `origin` names the file in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Settings, SandboxError> {
        let invalid = |reason: String| SandboxError::Settings {
            path: origin.to_path_buf(),
            reason,
        };
        let settings: Settings = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        if settings.execution.timeout_secs == 0 {
            return Err(invalid("execution.timeout_secs must be at least 1".into()));
        }
        if settings.execution.max_result_rows == 0 {
            return Err(invalid("execution.max_result_rows must be at least 1".into()));
        }
        if settings.ingest.default_table.trim().is_empty() {
            return Err(invalid("ingest.default_table must not be empty".into()));
        }
        settings.policy().map_err(|e| invalid(e.to_string()))?;
        Ok(settings)
    }

    /// Make relative paths absolute against `base`.
    pub fn resolved(mut self, base: &Path) -> Settings {
        for path in [
            &mut self.paths.drop_dir,
            &mut self.paths.archive_dir,
            &mut self.paths.store,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    pub fn policy(&self) -> Result<Policy, sift_core::PolicyError> {
        Policy::narrowed(
            self.policy.allowed_imports.as_deref(),
            self.policy.allowed_functions.as_deref(),
            self.policy.allowed_methods.as_deref(),
        )
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            drop_dir: self.paths.drop_dir.clone(),
            archive_dir: self.paths.archive_dir.clone(),
            default_table: self.ingest.default_table.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Settings, SandboxError> {
        Settings::parse(text, Path::new("sift.toml"))
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let s = parse("").expect("parse");
        assert_eq!(s, Settings::default());
        assert_eq!(s.timeout(), Duration::from_secs(45));
        assert_eq!(s.execution.max_result_rows, 1000);
        assert_eq!(s.policy().expect("policy"), Policy::default());
    }

    #[test]
    fn policy_may_only_narrow() {
        let s = parse("[policy]\nallowed_imports = [\"db\"]\nallowed_methods = [\"rows\", \"sum\"]\n")
            .expect("parse");
        let policy = s.policy().expect("policy");
        assert!(policy.allows_import("db"));
        assert!(!policy.allows_import("frame"));
        assert!(!policy.allows_method("head"));

        let err = parse("[policy]\nallowed_imports = [\"os\"]\n").unwrap_err();
        assert!(matches!(err, SandboxError::Settings { .. }), "{err}");
    }

    #[test]
    fn rejects_unknown_keys_and_zero_limits() {
        assert!(parse("[execution]\ntimeout = 5\n").is_err());
        assert!(parse("[execution]\ntimeout_secs = 0\n").is_err());
        assert!(parse("[execution]\nmax_result_rows = 0\n").is_err());
    }

    #[test]
    fn relative_paths_resolve_against_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("sift.toml");
        std::fs::write(&file, "[paths]\nstore = \"db/s.db\"\ndrop_dir = \"/abs/in\"\n").expect("write");
        let s = Settings::load(&file).expect("load");
        assert_eq!(s.paths.store, dir.path().join("db/s.db"));
        assert_eq!(s.paths.drop_dir, PathBuf::from("/abs/in"));
        assert_eq!(s.paths.archive_dir, dir.path().join("data-archive"));
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = Settings::load(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(s.ingest.default_table, "records");
        assert_eq!(s.paths.store, dir.path().join("data/sift.db"));
    }
}
