//! Run configuration: a JSON file plus command-line overrides.
//!
//! The file keeps the `proxies.json` shape (`{"proxyApiUrls": [...]}`) and
//! accepts every tunable in camelCase next to it.

use crate::error::ConfigError;
use crate::proxy::probe::DEFAULT_TEST_TARGET;
use crate::proxy::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::proxy::{ParseOptions, ProxyScheme, RetryPolicy, StatusRule, SuccessPredicate};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(6000);

/// Default number of probes in flight
pub const DEFAULT_CAPACITY: usize = 200;

/// Default progress refresh interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "proxies.json";

/// Default output file name
pub const DEFAULT_OUTPUT_FILE: &str = "working_proxies.txt";

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub proxy_api_urls: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub capacity: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub test_targets: Option<Vec<String>>,
    pub accepted_status: Option<StatusRule>,
    pub required_country: Option<String>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub rewrite_socks_to: Option<ProxyScheme>,
    pub default_scheme: Option<ProxyScheme>,
    pub output: Option<PathBuf>,
    pub failed_output: Option<PathBuf>,
    pub mmdb_path: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

/// Values given on the command line; `Some` wins over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sources: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub capacity: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub test_targets: Vec<String>,
    pub accepted_status: Option<StatusRule>,
    pub required_country: Option<String>,
    pub rewrite_socks_to: Option<ProxyScheme>,
    pub default_scheme: Option<ProxyScheme>,
    pub output: Option<PathBuf>,
    pub failed_output: Option<PathBuf>,
    pub mmdb_path: Option<PathBuf>,
}

/// Resolved configuration for one run
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub sources: Vec<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Number of probes in flight at most
    pub capacity: usize,
    /// Progress refresh interval
    pub poll_interval: Duration,
    pub test_targets: Vec<String>,
    pub predicate: SuccessPredicate,
    pub retry: RetryPolicy,
    pub parse: ParseOptions,
    pub output: PathBuf,
    pub failed_output: Option<PathBuf>,
    pub mmdb_path: Option<PathBuf>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            test_targets: vec![DEFAULT_TEST_TARGET.to_string()],
            predicate: SuccessPredicate::default(),
            retry: RetryPolicy::default(),
            parse: ParseOptions::default(),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            failed_output: None,
            mmdb_path: None,
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_test_targets(mut self, targets: Vec<String>) -> Self {
        self.test_targets = targets;
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Merge file values and overrides over the defaults, then validate
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sources = if overrides.sources.is_empty() {
            file.proxy_api_urls
        } else {
            overrides.sources
        };
        let test_targets = if !overrides.test_targets.is_empty() {
            overrides.test_targets
        } else {
            file.test_targets.unwrap_or(defaults.test_targets)
        };

        let timeout_ms = overrides.timeout_ms.or(file.timeout_ms);
        let poll_ms = overrides.poll_interval_ms.or(file.poll_interval_ms);
        let max_attempts = overrides
            .max_attempts
            .or(file.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let base_delay = file
            .retry_base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BASE_DELAY);
        let max_delay = file
            .retry_max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MAX_DELAY);

        let config = Self {
            sources,
            timeout: timeout_ms.map(Duration::from_millis).unwrap_or(defaults.timeout),
            capacity: overrides.capacity.or(file.capacity).unwrap_or(defaults.capacity),
            poll_interval: poll_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            test_targets,
            predicate: SuccessPredicate::default()
                .with_status(
                    overrides
                        .accepted_status
                        .or(file.accepted_status)
                        .unwrap_or_default(),
                )
                .with_required_country(
                    overrides
                        .required_country
                        .or(file.required_country)
                        .filter(|c| !c.trim().is_empty()),
                ),
            retry: RetryPolicy::new(max_attempts)
                .with_base_delay(base_delay)
                .with_max_delay(max_delay),
            parse: ParseOptions::new()
                .with_socks_rewrite(overrides.rewrite_socks_to.or(file.rewrite_socks_to))
                .with_default_scheme(overrides.default_scheme.or(file.default_scheme)),
            output: overrides.output.or(file.output).unwrap_or(defaults.output),
            failed_output: overrides.failed_output.or(file.failed_output),
            mmdb_path: overrides.mmdb_path.or(file.mmdb_path),
        };

        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maxAttempts",
                message: "must be at least 1".to_string(),
            });
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.test_targets.is_empty() {
            return Err(ConfigError::NoTestTargets);
        }
        if let Some(bad) = self
            .test_targets
            .iter()
            .find(|t| reqwest::Url::parse(t).is_err())
        {
            return Err(ConfigError::InvalidValue {
                field: "testTargets",
                message: format!("not a URL: {bad}"),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeoutMs",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "pollIntervalMs",
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.test_targets, vec![DEFAULT_TEST_TARGET.to_string()]);
        assert_eq!(config.retry.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT_FILE));
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_capacity(20)
            .with_test_targets(vec!["http://example.com".to_string()]);

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.capacity, 20);
        assert_eq!(config.test_targets, vec!["http://example.com".to_string()]);
    }

    #[test]
    fn test_url_list_only_file() {
        let file = FileConfig::from_json(
            r#"{"proxyApiUrls": ["https://example.com/http.txt", "https://example.com/socks.txt"]}"#,
        )
        .unwrap();
        let config = CheckerConfig::resolve(file, ConfigOverrides::default()).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_file_tunables() {
        let file = FileConfig::from_json(
            r#"{
                "proxyApiUrls": ["list.txt"],
                "timeoutMs": 2500,
                "maxAttempts": 4,
                "capacity": 50,
                "pollIntervalMs": 250,
                "testTargets": ["http://a.test/", "https://ipinfo.io/json"],
                "acceptedStatus": "2xx",
                "requiredCountry": "US",
                "retryBaseDelayMs": 100,
                "retryMaxDelayMs": 1000,
                "rewriteSocksTo": "http",
                "defaultScheme": "socks5",
                "output": "out/good.txt"
            }"#,
        )
        .unwrap();
        let config = CheckerConfig::resolve(file, ConfigOverrides::default()).unwrap();

        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.retry.max_attempts(), 4);
        assert_eq!(config.retry.backoff(0), Duration::from_millis(100));
        assert_eq!(config.retry.backoff(10), Duration::from_millis(1000));
        assert_eq!(config.capacity, 50);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.test_targets.len(), 2);
        assert_eq!(config.predicate.status, StatusRule::AnySuccess);
        assert_eq!(config.predicate.required_country.as_deref(), Some("US"));
        assert_eq!(config.parse.rewrite_socks_to, Some(ProxyScheme::Http));
        assert_eq!(config.parse.default_scheme, Some(ProxyScheme::Socks5));
        assert_eq!(config.output, PathBuf::from("out/good.txt"));
    }

    #[test]
    fn test_overrides_win() {
        let file = FileConfig::from_json(
            r#"{"proxyApiUrls": ["a.txt"], "capacity": 50, "timeoutMs": 1000}"#,
        )
        .unwrap();
        let overrides = ConfigOverrides {
            sources: vec!["b.txt".to_string()],
            capacity: Some(5),
            ..Default::default()
        };
        let config = CheckerConfig::resolve(file, overrides).unwrap();
        assert_eq!(config.sources, vec!["b.txt".to_string()]);
        assert_eq!(config.capacity, 5);
        assert_eq!(config.timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_invalid_configs() {
        let no_sources = CheckerConfig::resolve(FileConfig::default(), ConfigOverrides::default());
        assert!(matches!(no_sources, Err(ConfigError::NoSources)));

        let file = FileConfig::from_json(r#"{"proxyApiUrls": ["a"], "capacity": 0}"#).unwrap();
        assert!(matches!(
            CheckerConfig::resolve(file, ConfigOverrides::default()),
            Err(ConfigError::InvalidValue { field: "capacity", .. })
        ));

        let file = FileConfig::from_json(r#"{"proxyApiUrls": ["a"], "maxAttempts": 0}"#).unwrap();
        assert!(matches!(
            CheckerConfig::resolve(file, ConfigOverrides::default()),
            Err(ConfigError::InvalidValue { field: "maxAttempts", .. })
        ));

        let file =
            FileConfig::from_json(r#"{"proxyApiUrls": ["a"], "testTargets": ["not a url"]}"#)
                .unwrap();
        assert!(matches!(
            CheckerConfig::resolve(file, ConfigOverrides::default()),
            Err(ConfigError::InvalidValue { field: "testTargets", .. })
        ));

        assert!(FileConfig::from_json(r#"{"acceptedStatus": "abc"}"#).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FileConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("proxies.json"));

        let err = FileConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
