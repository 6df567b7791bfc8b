//! Canonicalization of categorical fields before they reach the store

use reqwest::Url;

use crate::models::DeviceClass;

/// Sentinel for categorical values that are missing or could not be resolved
pub const UNKNOWN: &str = "unknown";

/// Sentinel for clicks originating from loopback addresses
pub const INTERNAL: &str = "internal";

const MOBILE_INDICATORS: [&str; 6] = ["mobile", "iphone", "android", "ipad", "tablet", "phone"];

const EMPTY_REFERERS: [&str; 4] = ["null", "-", "(null)", "about:blank"];

/// Lowercase and trim, substituting `unknown` for empty values
pub fn normalize_category(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Collapse a device vocabulary into the mobile/desktop buckets
pub fn normalize_device(value: &str) -> DeviceClass {
    let lowered = value.trim().to_lowercase();
    if MOBILE_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
    {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}

/// Reduce a referer to `https://<host>/`, or empty when no host can be found.
///
/// Lossy on purpose: path, query, port, scheme and userinfo are dropped so the
/// referer column stays low-cardinality.
pub fn normalize_referer(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lowered = trimmed.to_lowercase();
    if EMPTY_REFERERS.contains(&lowered.as_str()) {
        return String::new();
    }

    let absolute = if trimmed.starts_with("//") {
        format!("https:{trimmed}")
    } else if !trimmed.contains("://") {
        format!("https://{trimmed}")
    } else {
        trimmed.to_string()
    };

    let Ok(parsed) = Url::parse(&absolute) else {
        return String::new();
    };

    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return String::new(),
    };

    // Hosts of non-special schemes are opaque; re-parse so the https form is final
    match Url::parse(&format!("https://{host}/")) {
        Ok(canonical) => match canonical.host_str() {
            Some(host) if !host.is_empty() => format!("https://{host}/"),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// Host portion of a stored canonical referer
pub fn referer_host(canonical: &str) -> &str {
    canonical
        .strip_prefix("https://")
        .unwrap_or(canonical)
        .trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_two_buckets() {
        let cases = [
            ("iPhone", DeviceClass::Mobile),
            ("mobile", DeviceClass::Mobile),
            ("iPad", DeviceClass::Mobile),
            ("Android Tablet", DeviceClass::Mobile),
            ("Samsung SM-G991B Phone", DeviceClass::Mobile),
            ("Mac", DeviceClass::Desktop),
            ("Windows", DeviceClass::Desktop),
            ("unknown", DeviceClass::Desktop),
            ("Other", DeviceClass::Desktop),
            ("", DeviceClass::Desktop),
        ];

        for (device, expected) in cases {
            assert_eq!(normalize_device(device), expected, "device={device:?}");
        }
    }

    #[test]
    fn test_category_lowercases_and_defaults() {
        assert_eq!(normalize_category("  Chrome "), "chrome");
        assert_eq!(normalize_category("Mac OS X"), "mac os x");
        assert_eq!(normalize_category("   "), UNKNOWN);
        assert_eq!(normalize_category(""), UNKNOWN);
    }

    #[test]
    fn test_referer_cleanup() {
        let cases = [
            ("", ""),
            ("null", ""),
            ("NULL", ""),
            ("-", ""),
            ("(null)", ""),
            ("about:blank", ""),
            ("https://Example.COM/path?q=1", "https://example.com/"),
            ("example.com/some/path", "https://example.com/"),
            ("//cdn.example.com/x.js", "https://cdn.example.com/"),
            ("http://news.ycombinator.com:8080/item?id=1", "https://news.ycombinator.com/"),
            ("https://", ""),
            ("https://exa mple.com/", ""),
            ("android-app://com.google.android.gm/", "https://com.google.android.gm/"),
            ("foo://a%20b/", ""),
            ("foo://1.2.3.256/", ""),
            ("foo://0x7f.1/", "https://127.0.0.1/"),
        ];

        for (referer, expected) in cases {
            assert_eq!(normalize_referer(referer), expected, "referer={referer:?}");
        }
    }

    #[test]
    fn test_referer_normalization_is_idempotent() {
        let inputs = [
            "https://Example.COM/path?q=1",
            "example.com",
            "//t.co/abc",
            "http://user:pw@Host.example.org:81/x",
            "https://[2001:db8::1]/page",
            "null",
            "about:blank",
            "garbage value",
            "android-app://com.google.android.gm/",
            "foo://a%20b/",
            "foo://xn--a/",
            "foo://1.2.3.256/",
            "foo://0x7f.1/",
        ];

        for input in inputs {
            let once = normalize_referer(input);
            assert_eq!(normalize_referer(&once), once, "input={input:?}");
        }
    }

    #[test]
    fn test_referer_host() {
        assert_eq!(referer_host("https://example.com/"), "example.com");
        assert_eq!(referer_host("https://[2001:db8::1]/"), "[2001:db8::1]");
    }
}
