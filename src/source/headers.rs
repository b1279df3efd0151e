//! Randomized browser-like request headers.

use http::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, DNT, UPGRADE_INSECURE_REQUESTS, USER_AGENT};
use rand::seq::IndexedRandom;
use rand::Rng;

const BROWSERS: &[&str] = &["chrome", "firefox", "safari"];

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Windows NT 6.1; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "Macintosh; Intel Mac OS X 13_4",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

const ACCEPTS: &[&str] = &[
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    "*/*",
];

const LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "zh-CN,zh;q=0.9,en;q=0.8",
    "de-DE,de;q=0.9,en;q=0.7",
    "fr-FR,fr;q=0.9,en;q=0.6",
];

/// Generate a plausible, randomly varied set of browser headers.
pub fn random_headers() -> HeaderMap {
    let mut rng = rand::rng();
    let mut headers = HeaderMap::new();

    let browser = BROWSERS.choose(&mut rng).copied().unwrap_or("chrome");
    let platform = PLATFORMS.choose(&mut rng).copied().unwrap_or(PLATFORMS[0]);
    let user_agent = match browser {
        "firefox" => {
            let version = rng.random_range(100..=130);
            format!("Mozilla/5.0 ({platform}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0")
        }
        "safari" => {
            let major = rng.random_range(14..=17);
            let minor = rng.random_range(0..=6);
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{major}.{minor} Safari/605.1.15"
            )
        }
        _ => {
            let major = rng.random_range(100..=128);
            let build = rng.random_range(4000..=6600);
            let patch = rng.random_range(0..=200);
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.{build}.{patch} Safari/537.36"
            )
        }
    };

    if let Ok(value) = HeaderValue::from_str(&user_agent) {
        headers.insert(USER_AGENT, value);
    }
    if let Some(accept) = ACCEPTS.choose(&mut rng).copied() {
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
    }
    if let Some(language) = LANGUAGES.choose(&mut rng).copied() {
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
    }
    if rng.random_bool(0.5) {
        headers.insert(DNT, HeaderValue::from_static("1"));
    }
    if rng.random_bool(0.5) {
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn always_sets_core_headers() {
        for _ in 0..50 {
            let headers = random_headers();
            assert!(headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ua| ua.starts_with("Mozilla/5.0")));
            assert!(headers.contains_key(ACCEPT));
            assert!(headers.contains_key(ACCEPT_LANGUAGE));
        }
    }

    #[test]
    fn user_agents_vary() {
        let agents: HashSet<String> = (0..50)
            .filter_map(|_| {
                random_headers()
                    .get(USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .collect();
        assert!(agents.len() > 1);
    }
}
