use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Deserialize;
use uuid::Uuid;

use courtside_shared::errors::AppResult;

use crate::models::NewLoginSession;
use crate::schema::login_sessions;

pub fn detect_os(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac OS") || user_agent.contains("Macintosh") {
        "macOS"
    } else if user_agent.contains("Android") {
        "Android"
    } else if ["iPhone", "iPad", "iOS"].iter().any(|p| user_agent.contains(p)) {
        "iOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        "Unknown Device"
    }
}

pub fn detect_browser(user_agent: &str) -> &'static str {
    if user_agent.contains("Edg/") {
        "Edge"
    } else if user_agent.contains("OPR/") || user_agent.contains("Opera") {
        "Opera"
    } else if user_agent.contains("Chrome/") {
        "Chrome"
    } else if user_agent.contains("Safari/") {
        "Safari"
    } else if user_agent.contains("Firefox/") {
        "Firefox"
    } else {
        "Browser"
    }
}

/// First `x-forwarded-for` hop, then `cf-connecting-ip`, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(cf) = header("cf-connecting-ip") {
        return cf.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_locatable(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(addr) => !addr.is_loopback() && !addr.is_unspecified(),
        Err(_) => false,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GeoLocation {
    pub city: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "country_name")]
    pub country: Option<String>,
}

/// Best-effort lookup. Any failure yields an empty location.
pub async fn lookup_geo(http: &reqwest::Client, ip: &str) -> GeoLocation {
    if !is_locatable(ip) {
        return GeoLocation::default();
    }

    let result = http
        .get(format!("https://ipapi.co/{ip}/json/"))
        .timeout(Duration::from_secs(3))
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => resp.json().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "geo lookup response unreadable");
            GeoLocation::default()
        }),
        Ok(resp) => {
            tracing::debug!(status = %resp.status(), "geo lookup rejected");
            GeoLocation::default()
        }
        Err(e) => {
            tracing::debug!(error = %e, "geo lookup failed");
            GeoLocation::default()
        }
    }
}

pub struct SessionContext {
    pub user_agent: String,
    pub ip: String,
    pub geo: GeoLocation,
}

pub fn record_session(conn: &mut PgConnection, user_id: Uuid, ctx: SessionContext) -> AppResult<()> {
    let os = detect_os(&ctx.user_agent);
    let browser = detect_browser(&ctx.user_agent);

    diesel::insert_into(login_sessions::table)
        .values(&NewLoginSession {
            user_id,
            device: format!("{os} - {browser}"),
            os: os.to_string(),
            browser: browser.to_string(),
            ip_address: ctx.ip,
            city: ctx.geo.city,
            region: ctx.geo.region,
            country: ctx.geo.country,
            is_active: true,
            last_active: Utc::now(),
        })
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const OPERA_ANDROID: &str = "Mozilla/5.0 (Linux; Android 13) AppleWebKit/537.36 Chrome/120.0 Mobile Safari/537.36 OPR/79.0";

    #[test]
    fn os_detection_follows_precedence() {
        assert_eq!(detect_os(CHROME_WIN), "Windows");
        // "like Mac OS X" wins over iPhone
        assert_eq!(detect_os(SAFARI_IPHONE), "macOS");
        assert_eq!(detect_os(EDGE_MAC), "macOS");
        assert_eq!(detect_os(FIREFOX_LINUX), "Linux");
        assert_eq!(detect_os(OPERA_ANDROID), "Android");
        assert_eq!(detect_os("curl/8.0"), "Unknown Device");
    }

    #[test]
    fn browser_detection_follows_precedence() {
        assert_eq!(detect_browser(CHROME_WIN), "Chrome");
        assert_eq!(detect_browser(SAFARI_IPHONE), "Safari");
        assert_eq!(detect_browser(EDGE_MAC), "Edge");
        assert_eq!(detect_browser(FIREFOX_LINUX), "Firefox");
        assert_eq!(detect_browser(OPERA_ANDROID), "Opera");
        assert_eq!(detect_browser("curl/8.0"), "Browser");
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 198.51.100.1, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.1");
    }

    #[test]
    fn loopback_and_unknown_are_not_located() {
        assert!(!is_locatable("127.0.0.1"));
        assert!(!is_locatable("::1"));
        assert!(!is_locatable("unknown"));
        assert!(is_locatable("198.51.100.1"));
    }
}
