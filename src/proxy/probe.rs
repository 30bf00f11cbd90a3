//! One validation attempt of one proxy.

use crate::error::ConfigError;
use crate::proxy::dialer::{ProxyDialer, Transport};
use crate::proxy::geo::GeoLocator;
use crate::proxy::models::{FailureKind, ProbeMetadata, ProbeOutcome, ProxyAddress};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default URL to test proxies against
pub const DEFAULT_TEST_TARGET: &str = "https://ipinfo.io/json";

/// Which response statuses count as a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusRule {
    Exact(u16),
    /// Any 2xx
    AnySuccess,
}

impl Default for StatusRule {
    fn default() -> Self {
        StatusRule::Exact(200)
    }
}

impl StatusRule {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            StatusRule::Exact(code) => status == code,
            StatusRule::AnySuccess => (200..300).contains(&status),
        }
    }
}

impl FromStr for StatusRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("2xx") || s.eq_ignore_ascii_case("success") {
            return Ok(StatusRule::AnySuccess);
        }
        match s.parse::<u16>() {
            Ok(code) if (100..600).contains(&code) => Ok(StatusRule::Exact(code)),
            _ => Err(ConfigError::InvalidStatusRule(s.to_string())),
        }
    }
}

impl TryFrom<String> for StatusRule {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StatusRule> for String {
    fn from(rule: StatusRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for StatusRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusRule::Exact(code) => write!(f, "{code}"),
            StatusRule::AnySuccess => write!(f, "2xx"),
        }
    }
}

/// What a probe must see to call a proxy working
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessPredicate {
    pub status: StatusRule,
    /// ISO country code the proxy must report, compared case-insensitively
    pub required_country: Option<String>,
}

impl SuccessPredicate {
    pub fn with_required_country(mut self, country: Option<String>) -> Self {
        self.required_country = country;
        self
    }

    pub fn with_status(mut self, status: StatusRule) -> Self {
        self.status = status;
        self
    }

    fn check_metadata(&self, metadata: Option<&ProbeMetadata>) -> Result<(), String> {
        let Some(required) = &self.required_country else {
            return Ok(());
        };
        match metadata.and_then(|m| m.country.as_deref()) {
            Some(country) if country.eq_ignore_ascii_case(required) => Ok(()),
            Some(country) => Err(format!("country {country}, expected {required}")),
            None => Err(format!("no country reported, expected {required}")),
        }
    }
}

/// Anything that can run one attempt against a proxy
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, address: &ProxyAddress) -> ProbeOutcome;
}

/// Probe that dials the proxy and requests every test target through it
pub struct ProbeExecutor<D> {
    dialer: D,
    targets: Vec<String>,
    timeout: Duration,
    predicate: SuccessPredicate,
    geo_locator: Option<GeoLocator>,
}

impl<D: ProxyDialer> ProbeExecutor<D> {
    pub fn new(dialer: D, targets: Vec<String>, timeout: Duration) -> Self {
        Self {
            dialer,
            targets,
            timeout,
            predicate: SuccessPredicate::default(),
            geo_locator: None,
        }
    }

    pub fn with_predicate(mut self, predicate: SuccessPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_geo_locator(mut self, geo_locator: Option<GeoLocator>) -> Self {
        self.geo_locator = geo_locator;
        self
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    fn locate(&self, address: &ProxyAddress, metadata: Option<ProbeMetadata>) -> Option<ProbeMetadata> {
        if metadata.as_ref().is_some_and(|m| m.country.is_some()) {
            return metadata;
        }
        let Some(geo) = &self.geo_locator else {
            return metadata;
        };
        let found = address.host().and_then(|host| geo.lookup(host).ok());
        match (metadata, found) {
            (Some(mut meta), Some(found)) => {
                meta.merge_missing(found);
                Some(meta)
            }
            (meta, found) => meta.or(found).filter(|m| !m.is_empty()),
        }
    }
}

#[async_trait]
impl<D: ProxyDialer> Probe for ProbeExecutor<D> {
    async fn probe(&self, address: &ProxyAddress) -> ProbeOutcome {
        if self.targets.is_empty() {
            return ProbeOutcome::failure(FailureKind::Unknown, "no test targets configured");
        }

        let mut last_body = None;
        for target in &self.targets {
            let transport = match self.dialer.dial(address) {
                Ok(transport) => transport,
                Err(e) => return ProbeOutcome::failure(FailureKind::Dial, e.to_string()),
            };

            // Dropping the request future on expiry closes its connection.
            let response = match tokio::time::timeout(self.timeout, transport.get(target)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    return ProbeOutcome::failure(e.kind, format!("{target}: {}", e.message));
                }
                Err(_) => {
                    return ProbeOutcome::failure(
                        FailureKind::Timeout,
                        format!("{target}: no response within {}ms", self.timeout.as_millis()),
                    );
                }
            };

            if !self.predicate.status.accepts(response.status) {
                return ProbeOutcome::failure(
                    FailureKind::NonSuccessStatus(response.status),
                    format!("{target} answered HTTP {}", response.status),
                );
            }
            debug!(proxy = %address, target = %target, status = response.status, "target reached");
            last_body = Some(response.body);
        }

        let metadata = last_body
            .as_deref()
            .and_then(|body| serde_json::from_str::<ProbeMetadata>(body).ok())
            .filter(|m| !m.is_empty());
        let metadata = self.locate(address, metadata);

        match self.predicate.check_metadata(metadata.as_ref()) {
            Ok(()) => ProbeOutcome::success(metadata),
            Err(reason) => ProbeOutcome::failure(FailureKind::Rejected, reason),
        }
    }
}
