//! Geography capability backed by MaxMind GeoLite2/GeoIP2 City databases
//!
//! The database is memory-mapped once at startup and shared by reference;
//! lookups are lock-free reads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use super::normalize::UNKNOWN;

/// Country and state resolved for an IP address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub country: String,
    pub state: String,
}

impl Location {
    pub fn new(country: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            state: state.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }
}

/// Resolves an IP address to a location
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<Location>;
}

pub struct MaxMindGeoLookup {
    reader: Arc<Reader<Mmap>>,
}

impl MaxMindGeoLookup {
    /// Open a City database at `path`
    pub fn open(path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    fn locate(&self, ip: IpAddr) -> Result<Location> {
        let result = self
            .reader
            .lookup(ip)
            .with_context(|| format!("GeoIP lookup failed for {}", ip))?;

        let Some(city) = result.decode::<geoip2::City>()? else {
            return Ok(Location::unknown());
        };

        let country = city.country.names.english.unwrap_or(UNKNOWN);
        let state = city
            .subdivisions
            .first()
            .and_then(|subdivision| subdivision.names.english)
            .unwrap_or(UNKNOWN);

        Ok(Location::new(country, state))
    }
}

impl Clone for MaxMindGeoLookup {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}

#[async_trait]
impl GeoLookup for MaxMindGeoLookup {
    async fn lookup(&self, ip: &str) -> Result<Location> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .with_context(|| format!("invalid IP address '{}'", ip))?;
        self.locate(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_invalid_path() {
        let result = MaxMindGeoLookup::open("/nonexistent/path.mmdb");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_location() {
        assert_eq!(Location::unknown(), Location::new("unknown", "unknown"));
    }
}
