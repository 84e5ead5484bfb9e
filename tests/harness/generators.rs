// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test data generators for traffic simulation.

use std::net::{IpAddr, Ipv4Addr};

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const FIREFOX_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
pub const PYTHON_UA: &str = "python-requests/2.31.0";
pub const CURL_UA: &str = "curl/8.5.0";
pub const DECLARED_SCRAPER_UA: &str = "Mozilla/5.0 (compatible; ScraperBot/1.0)";
pub const SQLMAP_UA: &str = "sqlmap/1.8#stable (https://sqlmap.org)";

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate a pool of endpoint paths for testing.
pub fn generate_endpoints(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("/section-{}/article/{}", i / 10, i % 10))
        .collect()
}

/// Limiter key for a client IP, as the check service derives it.
pub fn key_for(ip: &IpAddr) -> String {
    format!("ip:{ip}")
}

/// Browser user agents that must never be treated as automation.
pub fn browser_user_agents() -> Vec<&'static str> {
    vec![
        CHROME_UA,
        FIREFOX_UA,
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
    ]
}

/// Automation user agents paired with whether they also look suspicious.
pub fn automation_user_agents() -> Vec<(&'static str, bool)> {
    vec![
        (PYTHON_UA, true),
        (CURL_UA, true),
        ("Wget/1.21.4", true),
        (DECLARED_SCRAPER_UA, false),
        ("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)", false),
        ("Mozilla/5.0 HeadlessChrome/126.0.0.0", false),
    ]
}

/// User agents that carry no automation token but are still suspicious.
pub fn suspicious_user_agents() -> Vec<&'static str> {
    vec![
        "",
        "x",
        SQLMAP_UA,
        "Mozilla/5.0 <script>alert(1)</script>",
        "Mozilla/5.0 ../../etc/passwd",
        "Java/17.0.2",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(300);
        assert_eq!(ips.len(), 300);
        assert_eq!(ips[0].to_string(), "10.0.0.0");
        assert_eq!(ips[256].to_string(), "10.0.1.0");
    }

    #[test]
    fn test_generate_endpoints_are_unique() {
        let endpoints = generate_endpoints(25);
        let unique: std::collections::HashSet<_> = endpoints.iter().collect();
        assert_eq!(unique.len(), 25);
    }

    #[test]
    fn test_key_for() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        assert_eq!(key_for(&ip), "ip:10.0.0.7");
    }
}
