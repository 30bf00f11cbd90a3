//! Offline geolocation of proxy hosts using an MMDB file

use crate::proxy::models::ProbeMetadata;
use crate::Result;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// GeoLocator for looking up IP addresses in MMDB databases
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Create a new GeoLocator from an MMDB file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up an IP address string. Hostnames are not resolved.
    pub fn lookup(&self, ip_str: &str) -> Result<ProbeMetadata> {
        let ip: IpAddr = ip_str.parse()?;
        self.lookup_ip(ip)
    }

    pub fn lookup_ip(&self, ip: IpAddr) -> Result<ProbeMetadata> {
        let lookup_result = self.reader.lookup(ip)?;
        let city: Option<geoip2::City> = lookup_result.decode()?;

        let Some(city) = city else {
            return Ok(ProbeMetadata {
                ip: Some(ip.to_string()),
                ..Default::default()
            });
        };

        Ok(ProbeMetadata {
            ip: Some(ip.to_string()),
            country: city.country.iso_code.map(String::from),
            region: None,
            city: city.city.names.english.map(String::from),
            org: None,
        })
    }
}

impl std::fmt::Debug for GeoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoLocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GeoLocator::from_path(dir.path().join("missing.mmdb")).is_err());
    }

    #[test]
    fn test_garbage_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mmdb");
        std::fs::write(&path, b"not a maxmind database").unwrap();
        assert!(GeoLocator::from_path(&path).is_err());
    }
}
