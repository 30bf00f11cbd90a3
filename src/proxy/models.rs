//! Proxy data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Proxy scheme enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyScheme {
    /// Detect the scheme from the prefix of an address
    pub fn detect(address: &str) -> Option<Self> {
        let (scheme, _) = address.split_once("://")?;
        scheme.parse().ok()
    }

    pub fn is_socks(self) -> bool {
        matches!(self, ProxyScheme::Socks4 | ProxyScheme::Socks5)
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyScheme::Http => write!(f, "http"),
            ProxyScheme::Https => write!(f, "https"),
            ProxyScheme::Socks4 => write!(f, "socks4"),
            ProxyScheme::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks4" => Ok(ProxyScheme::Socks4),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(format!(
                "invalid proxy scheme: {other}. Use: http, https, socks4, socks5"
            )),
        }
    }
}

/// Opaque proxy endpoint, usually `scheme://host:port`.
///
/// Equality is exact-string. Nothing downstream of ingestion rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyAddress(String);

impl ProxyAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> Option<ProxyScheme> {
        ProxyScheme::detect(&self.0)
    }

    /// Host part of the address, without scheme, credentials or port
    pub fn host(&self) -> Option<&str> {
        let rest = self.0.split_once("://").map_or(self.0.as_str(), |(_, r)| r);
        let rest = rest.rsplit_once('@').map_or(rest, |(_, r)| r);
        let rest = rest.split('/').next().unwrap_or(rest);
        let host = match rest.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => rest,
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        (!host.is_empty()).then_some(host)
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProxyAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProxyAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Geolocation and network details reported for a working proxy.
///
/// Field names follow the ipinfo.io JSON body so a test target's response
/// can be deserialized straight into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProbeMetadata {
    pub ip: Option<String>,
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "DE")
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub org: Option<String>,
}

impl ProbeMetadata {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none()
            && self.country.is_none()
            && self.region.is_none()
            && self.city.is_none()
            && self.org.is_none()
    }

    /// Fill fields missing here from `other`
    pub fn merge_missing(&mut self, other: ProbeMetadata) {
        self.ip = self.ip.take().or(other.ip);
        self.country = self.country.take().or(other.country);
        self.region = self.region.take().or(other.region);
        self.city = self.city.take().or(other.city);
        self.org = self.org.take().or(other.org);
    }
}

impl fmt::Display for ProbeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();

        if parts.is_empty() {
            write!(f, "Unknown")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Why a probe attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    ConnectionRefused,
    NonSuccessStatus(u16),
    TransportError,
    /// The proxy transport could not be constructed
    Dial,
    /// The response was fine but the success predicate rejected it
    Rejected,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ConnectionRefused => write!(f, "connection refused"),
            FailureKind::NonSuccessStatus(code) => write!(f, "HTTP {code}"),
            FailureKind::TransportError => write!(f, "transport error"),
            FailureKind::Dial => write!(f, "dial error"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Success {
        metadata: Option<ProbeMetadata>,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl ProbeOutcome {
    pub fn success(metadata: Option<ProbeMetadata>) -> Self {
        ProbeOutcome::Success { metadata }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ProbeOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::failure(FailureKind::Timeout, "request timed out")
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

/// Last failure recorded for a proxy that exhausted its attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A proxy that passed its probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingProxy {
    pub address: ProxyAddress,
    pub metadata: Option<ProbeMetadata>,
}
