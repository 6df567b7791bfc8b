use serde::{Deserialize, Serialize};

/// Click event as published by the redirect service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Short code that was accessed. A missing code decodes as empty and is
    /// rejected by validation.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
}

impl RawEvent {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Closed binary device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Desktop,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Desktop => "desktop",
        }
    }
}

/// Fully enriched click, the only shape ever persisted.
///
/// Every categorical field is non-empty lowercase text; `referer` is either
/// empty or `https://<host>/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub code: String,
    pub browser: String,
    pub os: String,
    pub device: DeviceClass,
    pub country: String,
    pub state: String,
    pub referer: String,
}

/// Events awaiting a single atomic write, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    events: Vec<NormalizedEvent>,
}

impl Batch {
    pub fn new(events: Vec<NormalizedEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[NormalizedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<NormalizedEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_decodes_camel_case() {
        let raw = RawEvent::from_slice(
            br#"{"code":"abc","ip":"8.8.8.8","userAgent":"Mozilla/5.0","referer":null}"#,
        )
        .unwrap();

        assert_eq!(raw.code, "abc");
        assert_eq!(raw.ip.as_deref(), Some("8.8.8.8"));
        assert_eq!(raw.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(raw.referer.is_none());
    }

    #[test]
    fn test_raw_event_missing_code_decodes_empty() {
        let raw = RawEvent::from_slice(br#"{"ip":"1.1.1.1"}"#).unwrap();
        assert!(raw.code.is_empty());
    }

    #[test]
    fn test_raw_event_rejects_malformed_json() {
        assert!(RawEvent::from_slice(b"{not json").is_err());
        assert!(RawEvent::from_slice(br#"{"code": 42}"#).is_err());
    }
}
