//! Proxy list ingestion
//!
//! This module provides functionality for:
//! - Fetching proxy lists from HTTP(S) sources or local files
//! - Normalizing list lines into backlog addresses
//! - Concatenating all sources into one deduplicated backlog

use crate::error::IngestError;
use crate::proxy::models::ProxyAddress;
use crate::proxy::parser::{ParseOptions, ProxyParser};
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Where a proxy list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySource {
    Url(String),
    File(PathBuf),
}

impl ProxySource {
    /// `http(s)://` locators are fetched, anything else is read from disk
    pub fn parse(locator: &str) -> Self {
        let locator = locator.trim();
        let lower = locator.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ProxySource::Url(locator.to_string())
        } else {
            ProxySource::File(PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator)))
        }
    }
}

impl std::fmt::Display for ProxySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxySource::Url(url) => write!(f, "{url}"),
            ProxySource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Configuration for list fetching
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
    pub parse: ParseOptions,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            parse: ParseOptions::default(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parse_options(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }
}

/// Fetches proxy lists and builds the backlog
pub struct SourceFetcher {
    config: FetcherConfig,
    client: Client,
}

impl SourceFetcher {
    pub fn with_config(config: FetcherConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(IngestError::Client)?;

        Ok(Self { config, client })
    }

    /// Fetch one source and parse it into addresses, in list order
    pub async fn fetch_source(&self, source: &ProxySource) -> Result<Vec<ProxyAddress>, IngestError> {
        let body = match source {
            ProxySource::Url(url) => self.fetch_url(url).await?,
            ProxySource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|error| IngestError::File {
                        path: path.clone(),
                        error,
                    })?
            }
        };
        Ok(ProxyParser::parse_body(&body, &self.config.parse))
    }

    async fn fetch_url(&self, url: &str) -> Result<String, IngestError> {
        let fetch_error = |error| IngestError::Fetch {
            source_url: url.to_string(),
            error,
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                source_url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(fetch_error)
    }

    /// Fetch every source in order and concatenate them into one backlog.
    ///
    /// Repeated addresses keep their first position. The first failing
    /// source aborts ingestion.
    pub async fn fetch_backlog(&self, locators: &[String]) -> Result<Vec<ProxyAddress>, IngestError> {
        let mut seen = HashSet::new();
        let mut backlog = Vec::new();

        for locator in locators {
            let source = ProxySource::parse(locator);
            let proxies = self.fetch_source(&source).await?;
            info!(source = %source, count = proxies.len(), "loaded proxy list");

            let before = backlog.len();
            backlog.extend(proxies.into_iter().filter(|p| seen.insert(p.clone())));
            debug!(source = %source, new = backlog.len() - before, "appended to backlog");
        }

        Ok(backlog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyScheme;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(parse: ParseOptions) -> SourceFetcher {
        SourceFetcher::with_config(
            FetcherConfig::new()
                .with_timeout(Duration::from_secs(5))
                .with_parse_options(parse),
        )
        .unwrap()
    }

    #[test]
    fn test_fetcher_config_default() {
        let config = FetcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.parse, ParseOptions::default());
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            ProxySource::parse("https://example.com/http.txt"),
            ProxySource::Url("https://example.com/http.txt".to_string())
        );
        assert_eq!(
            ProxySource::parse("lists/http.txt"),
            ProxySource::File(PathBuf::from("lists/http.txt"))
        );
        assert_eq!(
            ProxySource::parse("file:///tmp/list.txt"),
            ProxySource::File(PathBuf::from("/tmp/list.txt"))
        );
    }

    #[tokio::test]
    async fn test_fetch_backlog_concatenates_in_order_and_dedups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/one.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "1.1.1.1:80\nsocks5://2.2.2.2:1080\n\n# comment\nnot-a-proxy\n",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("3.3.3.3:3128\n1.1.1.1:80\n"))
            .mount(&server)
            .await;

        let options = ParseOptions::new().with_socks_rewrite(Some(ProxyScheme::Http));
        let backlog = fetcher(options)
            .fetch_backlog(&[
                format!("{}/one.txt", server.uri()),
                format!("{}/two.txt", server.uri()),
            ])
            .await
            .unwrap();

        assert_eq!(
            backlog,
            vec![
                ProxyAddress::from("1.1.1.1:80"),
                ProxyAddress::from("http://2.2.2.2:1080"),
                ProxyAddress::from("3.3.3.3:3128"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_source_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher(ParseOptions::new())
            .fetch_backlog(&[format!("{}/list.txt", server.uri())])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("list.txt");
        std::fs::write(&file, "4.4.4.4:8080\n5.5.5.5:8080:u:p\n").unwrap();

        let options = ParseOptions::new().with_default_scheme(Some(ProxyScheme::Http));
        let backlog = fetcher(options)
            .fetch_backlog(&[file.display().to_string()])
            .await
            .unwrap();
        assert_eq!(
            backlog,
            vec![
                ProxyAddress::from("http://4.4.4.4:8080"),
                ProxyAddress::from("http://u:p@5.5.5.5:8080"),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(ParseOptions::new())
            .fetch_backlog(&[dir.path().join("nope.txt").display().to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::File { .. }));
    }
}
