//! Event enrichment
//!
//! Turns a producer-supplied [`RawEvent`] into a [`NormalizedEvent`] by
//! resolving geography from the IP address and browser/OS/device from the
//! user-agent string. Lookups never fail the event: an absent, slow or broken
//! capability degrades the affected fields to `unknown` and the degradation is
//! reported alongside the value.

pub mod geo;
pub mod normalize;
pub mod useragent;

pub use geo::{GeoLookup, Location, MaxMindGeoLookup};
pub use normalize::{normalize_category, normalize_device, normalize_referer, INTERNAL, UNKNOWN};
pub use useragent::{CachedUserAgentLookup, HttpUserAgentLookup, UserAgentInfo, UserAgentLookup};

use anyhow::Result;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LookupConfig;
use crate::models::{NormalizedEvent, RawEvent};

/// Which lookups fell back to sentinels because the capability failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Degradation {
    pub geo: bool,
    pub user_agent: bool,
}

impl Degradation {
    pub fn any(&self) -> bool {
        self.geo || self.user_agent
    }
}

/// Enrichment output: the value plus whether any part of it is a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enriched<T> {
    pub value: T,
    pub degradation: Degradation,
}

impl<T> Enriched<T> {
    pub fn is_degraded(&self) -> bool {
        self.degradation.any()
    }
}

pub struct Enricher {
    geo: Option<Arc<dyn GeoLookup>>,
    user_agent: Option<Arc<dyn UserAgentLookup>>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(
        geo: Option<Arc<dyn GeoLookup>>,
        user_agent: Option<Arc<dyn UserAgentLookup>>,
        timeout: Duration,
    ) -> Self {
        Self {
            geo,
            user_agent,
            timeout,
        }
    }

    /// Build the capabilities named in the lookup configuration.
    ///
    /// A capability that cannot be constructed is logged and left absent so
    /// the pipeline still runs with degraded enrichment.
    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let geo: Option<Arc<dyn GeoLookup>> = match config.geoip_city_db_path.as_deref() {
            Some(path) => match MaxMindGeoLookup::open(path) {
                Ok(lookup) => {
                    info!("GeoIP database loaded from {}", path);
                    Some(Arc::new(lookup))
                }
                Err(e) => {
                    warn!("GeoIP initialization failed (continuing without it): {:#}", e);
                    None
                }
            },
            None => {
                info!("No GeoIP database configured, locations will be unknown");
                None
            }
        };

        let user_agent: Option<Arc<dyn UserAgentLookup>> =
            match config.user_agent_service_url.as_deref() {
                Some(url) => {
                    let client = HttpUserAgentLookup::new(url, timeout)?;
                    info!("Using user-agent service at {}", url);
                    Some(Arc::new(CachedUserAgentLookup::new(
                        Arc::new(client),
                        config.user_agent_cache_entries,
                    )))
                }
                None => {
                    info!("No user-agent service configured, devices will be unknown");
                    None
                }
            };

        Ok(Self::new(geo, user_agent, timeout))
    }

    pub async fn enrich(&self, raw: RawEvent) -> Enriched<NormalizedEvent> {
        let ip = raw.ip.as_deref().unwrap_or_default();
        let user_agent = raw.user_agent.as_deref().unwrap_or_default();

        let (location, geo_degraded) = self.locate(ip).await;
        let (agent, agent_degraded) = self.classify(user_agent).await;

        let value = NormalizedEvent {
            code: raw.code.trim().to_string(),
            browser: normalize_category(&agent.browser),
            os: normalize_category(&agent.os),
            device: normalize_device(&agent.device),
            country: normalize_category(&location.country),
            state: normalize_category(&location.state),
            referer: normalize_referer(raw.referer.as_deref().unwrap_or_default()),
        };

        Enriched {
            value,
            degradation: Degradation {
                geo: geo_degraded,
                user_agent: agent_degraded,
            },
        }
    }

    async fn locate(&self, ip: &str) -> (Location, bool) {
        let ip = ip.trim();
        if is_internal(ip) {
            return (Location::new(INTERNAL, INTERNAL), false);
        }

        let Some(geo) = &self.geo else {
            return (Location::unknown(), true);
        };

        match tokio::time::timeout(self.timeout, geo.lookup(ip)).await {
            Ok(Ok(location)) => (location, false),
            Ok(Err(e)) => {
                debug!(ip = %ip, error = %e, "Failed to lookup IP");
                (Location::unknown(), true)
            }
            Err(_) => {
                debug!(ip = %ip, "IP lookup timed out");
                (Location::unknown(), true)
            }
        }
    }

    async fn classify(&self, user_agent: &str) -> (UserAgentInfo, bool) {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return (UserAgentInfo::unknown(), false);
        }

        let Some(lookup) = &self.user_agent else {
            return (UserAgentInfo::unknown(), true);
        };

        match tokio::time::timeout(self.timeout, lookup.parse(user_agent)).await {
            Ok(Ok(info)) => (info, false),
            Ok(Err(e)) => {
                debug!(user_agent = %user_agent, error = %e, "Failed to parse user agent");
                (UserAgentInfo::unknown(), true)
            }
            Err(_) => {
                debug!(user_agent = %user_agent, "User agent lookup timed out");
                (UserAgentInfo::unknown(), true)
            }
        }
    }
}

/// Empty, `localhost` and loopback literals never leave the building
fn is_internal(ip: &str) -> bool {
    if ip.is_empty() || ip.eq_ignore_ascii_case("localhost") {
        return true;
    }
    ip.parse::<IpAddr>()
        .map(|addr| addr.is_loopback())
        .unwrap_or(false)
}
