//! Best-effort user agent parsing.
//!
//! Recognises the common browsers and operating systems by token. Anything
//! unrecognised leaves the corresponding field empty; parsing never fails.

use crate::domain::{Device, DeviceType, NameVersion, UserAgent};

const BOT_MARKERS: [&str; 5] = ["bot", "crawler", "spider", "slurp", "facebookexternalhit"];

/// Ordered so that more specific tokens win (Edge and Opera also claim Chrome)
const BROWSERS: [(&str, &str); 8] = [
    ("Edg/", "Edge"),
    ("OPR/", "Opera"),
    ("SamsungBrowser/", "Samsung Internet"),
    ("Firefox/", "Firefox"),
    ("FxiOS/", "Firefox"),
    ("CriOS/", "Chrome"),
    ("Chrome/", "Chrome"),
    ("MSIE ", "IE"),
];

pub fn parse_user_agent(ua: Option<&str>) -> UserAgent {
    let Some(ua) = ua.map(str::trim).filter(|s| !s.is_empty()) else {
        return UserAgent::default();
    };

    let lower = ua.to_ascii_lowercase();
    let bot = BOT_MARKERS.iter().any(|m| lower.contains(m));
    let browser = parse_browser(ua);
    let os = parse_os(ua);
    let device = Device {
        device_type: device_type(ua, &os),
    };

    UserAgent {
        browser,
        os,
        device,
        bot,
    }
}

fn parse_browser(ua: &str) -> NameVersion {
    for (token, name) in BROWSERS {
        if ua.contains(token) {
            return named(name, version_after(ua, token));
        }
    }

    if ua.contains("Safari/") {
        return named("Safari", version_after(ua, "Version/"));
    }
    if ua.contains("Trident/") {
        return named("IE", version_after(ua, "rv:"));
    }
    NameVersion::default()
}

fn parse_os(ua: &str) -> NameVersion {
    if let Some(nt) = version_after(ua, "Windows NT ") {
        let version = match nt.as_str() {
            "10.0" => "10",
            "6.3" => "8.1",
            "6.2" => "8",
            "6.1" => "7",
            other => other,
        };
        return named("Windows", Some(version.to_string()));
    }
    if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        let version = version_after(ua, "OS ").map(|v| v.replace('_', "."));
        return named("iOS", version);
    }
    if let Some(version) = version_after(ua, "Android ") {
        return named("Android", Some(version));
    }
    if ua.contains("Android") {
        return named("Android", None);
    }
    if ua.contains("Mac OS X") {
        let version = version_after(ua, "Mac OS X ").map(|v| v.replace('_', "."));
        return named("macOS", version);
    }
    if ua.contains("CrOS") {
        return named("Chrome OS", None);
    }
    if ua.contains("Linux") {
        return named("Linux", None);
    }
    NameVersion::default()
}

fn device_type(ua: &str, os: &NameVersion) -> Option<DeviceType> {
    if ua.contains("iPad") || ua.contains("Tablet") {
        return Some(DeviceType::Tablet);
    }
    if ua.contains("Android") && !ua.contains("Mobile") {
        return Some(DeviceType::Tablet);
    }
    if ua.contains("Mobi") || ua.contains("iPhone") || ua.contains("iPod") {
        return Some(DeviceType::Mobile);
    }
    match os.name.as_deref() {
        Some("Windows" | "macOS" | "Linux" | "Chrome OS") => Some(DeviceType::Desktop),
        _ => None,
    }
}

fn named(name: &str, version: Option<String>) -> NameVersion {
    NameVersion {
        name: Some(name.to_string()),
        version,
    }
}

/// Text following `marker` up to the next delimiter
fn version_after(ua: &str, marker: &str) -> Option<String> {
    let start = ua.find(marker)? + marker.len();
    let version: String = ua[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
        .collect();
    (!version.is_empty()).then_some(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51";
    const FIREFOX_ANDROID: &str = "Mozilla/5.0 (Android 14; Mobile; rv:125.0) Gecko/125.0 Firefox/125.0";
    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_chrome_on_mac() {
        let ua = parse_user_agent(Some(CHROME_MAC));
        assert_eq!(ua.browser.name.as_deref(), Some("Chrome"));
        assert_eq!(ua.browser.version.as_deref(), Some("124.0.0.0"));
        assert_eq!(ua.os.name.as_deref(), Some("macOS"));
        assert_eq!(ua.os.version.as_deref(), Some("10.15.7"));
        assert_eq!(ua.device.device_type, Some(DeviceType::Desktop));
        assert!(!ua.bot);
    }

    #[test]
    fn test_safari_on_iphone() {
        let ua = parse_user_agent(Some(SAFARI_IPHONE));
        assert_eq!(ua.browser.name.as_deref(), Some("Safari"));
        assert_eq!(ua.browser.version.as_deref(), Some("17.4"));
        assert_eq!(ua.os.name.as_deref(), Some("iOS"));
        assert_eq!(ua.os.version.as_deref(), Some("17.4"));
        assert_eq!(ua.device.device_type, Some(DeviceType::Mobile));
    }

    #[test]
    fn test_edge_wins_over_chrome() {
        let ua = parse_user_agent(Some(EDGE_WINDOWS));
        assert_eq!(ua.browser.name.as_deref(), Some("Edge"));
        assert_eq!(ua.os.name.as_deref(), Some("Windows"));
        assert_eq!(ua.os.version.as_deref(), Some("10"));
    }

    #[test]
    fn test_firefox_on_android_phone() {
        let ua = parse_user_agent(Some(FIREFOX_ANDROID));
        assert_eq!(ua.browser.name.as_deref(), Some("Firefox"));
        assert_eq!(ua.os.name.as_deref(), Some("Android"));
        assert_eq!(ua.os.version.as_deref(), Some("14"));
        assert_eq!(ua.device.device_type, Some(DeviceType::Mobile));
    }

    #[test]
    fn test_bot_detection() {
        assert!(parse_user_agent(Some(GOOGLEBOT)).bot);
    }

    #[test]
    fn test_garbage_and_absent() {
        assert_eq!(parse_user_agent(None), UserAgent::default());
        assert_eq!(parse_user_agent(Some("   ")), UserAgent::default());

        let ua = parse_user_agent(Some("???"));
        assert!(ua.browser.name.is_none());
        assert!(ua.os.name.is_none());
        assert!(ua.device.device_type.is_none());
    }
}
