mod file_config;

pub use file_config::{BatchAnalysisConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub analysis_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_sec: u64,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub analysis_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_sec: u64,
    /// Zero disables the metrics listener.
    pub metrics_port: u16,

    pub batch_analysis: BatchAnalysisSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let analysis_url = file.analysis_url.or_else(|| cli.analysis_url.clone());
        let api_key = file
            .api_key
            .or_else(|| cli.api_key.clone())
            .filter(|key| !key.is_empty());
        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let defaults = BatchAnalysisSettings::default();
        let ba_file = file.batch_analysis.unwrap_or_default();
        let batch_analysis = BatchAnalysisSettings {
            backoff_secs: ba_file.backoff_secs.unwrap_or(defaults.backoff_secs),
            max_attempts: ba_file.max_attempts.unwrap_or(defaults.max_attempts),
            concurrency: ba_file.concurrency.unwrap_or(defaults.concurrency).max(1),
            rescan_interval_secs: ba_file
                .rescan_interval_secs
                .unwrap_or(defaults.rescan_interval_secs),
            lease_secs: ba_file.lease_secs.unwrap_or(defaults.lease_secs).max(1),
            content_language: ba_file
                .content_language
                .unwrap_or(defaults.content_language),
            scope: ba_file.scope.unwrap_or(defaults.scope),
            analyzable_types: ba_file
                .analyzable_types
                .unwrap_or(defaults.analyzable_types),
        };

        Ok(Self {
            db_dir,
            analysis_url,
            api_key,
            request_timeout_sec,
            metrics_port,
            batch_analysis,
        })
    }

    pub fn content_db_path(&self) -> PathBuf {
        self.db_dir.join("content.db")
    }

    pub fn audit_db_path(&self) -> PathBuf {
        self.db_dir.join("analysis_audit.db")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAnalysisSettings {
    /// Delay before the follow-up tick while work remains.
    pub backoff_secs: u64,
    /// Zero means unbounded.
    pub max_attempts: u32,
    /// Items processed at once within a tick phase.
    pub concurrency: usize,
    pub rescan_interval_secs: u64,
    /// How long a tick may hold the shared processing lease without renewing it.
    /// Must exceed the request timeout, since the lease is renewed once per
    /// remote call.
    pub lease_secs: u64,
    pub content_language: String,
    pub scope: String,
    pub analyzable_types: Vec<String>,
}

impl Default for BatchAnalysisSettings {
    fn default() -> Self {
        Self {
            backoff_secs: 60,
            max_attempts: 10,
            concurrency: 4,
            rescan_interval_secs: 60,
            lease_secs: 300,
            content_language: "en".to_string(),
            scope: "local".to_string(),
            analyzable_types: vec!["post".to_string(), "page".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            analysis_url: Some("http://analysis:8080".to_string()),
            api_key: Some("key".to_string()),
            request_timeout_sec: 30,
            metrics_port: 9092,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.analysis_url.as_deref(), Some("http://analysis:8080"));
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.request_timeout_sec, 30);
        assert_eq!(config.metrics_port, 9092);
        assert_eq!(config.batch_analysis, BatchAnalysisSettings::default());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            analysis_url: Some("http://cli:8080".to_string()),
            request_timeout_sec: 30,
            metrics_port: 9092,
            ..Default::default()
        };

        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            analysis_url: Some("http://toml:8080".to_string()),
            batch_analysis: Some(BatchAnalysisConfig {
                backoff_secs: Some(5),
                content_language: Some("it".to_string()),
                lease_secs: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.analysis_url.as_deref(), Some("http://toml:8080"));
        assert_eq!(config.batch_analysis.backoff_secs, 5);
        assert_eq!(config.batch_analysis.content_language, "it");
        // CLI value used when TOML doesn't specify
        assert_eq!(config.request_timeout_sec, 30);
        assert_eq!(config.metrics_port, 9092);
        assert_eq!(config.batch_analysis.max_attempts, 10);
        assert_eq!(config.batch_analysis.lease_secs, 1);
    }

    #[test]
    fn test_resolve_empty_api_key_is_none() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            api_key: Some(String::new()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_resolve_zero_concurrency_is_clamped() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            batch_analysis: Some(BatchAnalysisConfig {
                concurrency: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();
        assert_eq!(config.batch_analysis.concurrency, 1);
    }

    #[test]
    fn test_resolve_rejects_unusable_db_dir() {
        let not_a_dir = tempfile::NamedTempFile::new().unwrap();
        let cases = [
            (None, "db_dir must be specified"),
            (Some(PathBuf::from("/no/such/analysis/dir")), "does not exist"),
            (Some(not_a_dir.path().to_path_buf()), "not a directory"),
        ];

        for (db_dir, expected) in cases {
            let cli = CliConfig {
                db_dir,
                ..Default::default()
            };
            let err = AppConfig::resolve(&cli, None).unwrap_err().to_string();
            assert!(err.contains(expected), "{:?} should mention {:?}", err, expected);
        }
    }

    #[test]
    fn test_db_path_helpers() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.content_db_path(), temp_dir.path().join("content.db"));
        assert_eq!(
            config.audit_db_path(),
            temp_dir.path().join("analysis_audit.db")
        );
    }
}
