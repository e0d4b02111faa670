use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use perch_core::SearchSettings;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{info, warn};

use super::cache::TimedCache;

static GENERATOR_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://perchance\.org/([a-z0-9\-]+)").expect("valid generator URL regex")
});

/// Headers of a desktop Chrome session, so engines serve normal result pages.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.41 Safari/537.36",
    ),
    ("accept", "*/*"),
    ("accept-language", "en-AU,en-GB;q=0.9,en-US;q=0.8,en;q=0.7,pt;q=0.6"),
    ("sec-ch-dpr", "2"),
    (
        "sec-ch-ua",
        "\" Not A;Brand\";v=\"99\", \"Chromium\";v=\"101\", \"Google Chrome\";v=\"101\"",
    ),
    ("sec-ch-ua-arch", "\"x86\""),
    ("sec-ch-ua-bitness", "\"64\""),
    ("sec-ch-ua-full-version", "\"101.0.4951.41\""),
    (
        "sec-ch-ua-full-version-list",
        "\" Not A;Brand\";v=\"99.0.0.0\", \"Chromium\";v=\"101.0.4951.41\", \"Google Chrome\";v=\"101.0.4951.41\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-model", ""),
    ("sec-ch-ua-platform", "\"Linux\""),
    ("sec-ch-ua-platform-version", "\"5.16.19\""),
    ("sec-ch-ua-wow64", "?0"),
    ("sec-ch-viewport-width", "714"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("referer", "https://www.google.com/"),
    ("referrer-policy", "origin"),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("Failed to get search result. Error codes: {}", .0.join(", "))]
    AllEnginesFailed(Vec<String>),

    #[error("Failed to get search result.")]
    NoMatch,

    #[error("search client setup failed: {0}")]
    Client(String),
}

/// Finds a generator name from free-text search.
#[async_trait]
pub trait GeneratorFinder: Send + Sync {
    async fn find_generator(&self, query: &str) -> Result<String, SearchError>;
}

/// First `perchance.org/<name>` link in a results page.
pub fn extract_generator_name(page: &str) -> Option<String> {
    GENERATOR_URL_RE
        .captures(page)
        .map(|caps| caps[1].to_string())
}

fn browser_headers() -> HeaderMap {
    BROWSER_HEADERS
        .iter()
        .map(|&(name, value)| {
            (
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect()
}

/// Fill an engine template with the `+`-joined, percent-encoded query.
fn engine_url(template: &str, query: &str) -> String {
    let terms = query
        .split_whitespace()
        .map(|term| utf8_percent_encode(term, NON_ALPHANUMERIC).to_string())
        .collect::<Vec<_>>()
        .join("+");
    template.replace("{query}", &terms)
}

/// Scrapes search-engine result pages, trying engines in order.
pub struct GeneratorSearch {
    client: reqwest::Client,
    engines: Vec<String>,
    cache: TimedCache<String, String>,
}

impl GeneratorSearch {
    pub fn new(settings: &SearchSettings) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| SearchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            engines: settings.engines.clone(),
            cache: TimedCache::new(Duration::from_secs(settings.cache_ttl_minutes * 60)),
        })
    }

    /// Body of the first engine answering with success, or every failure code.
    async fn first_results_page(&self, query: &str) -> Result<String, SearchError> {
        let mut codes = Vec::new();
        for template in &self.engines {
            let url = engine_url(template, query);
            let code = match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => match response.text().await {
                    Ok(body) => return Ok(body),
                    Err(err) => err.to_string(),
                },
                Ok(response) => response.status().as_u16().to_string(),
                Err(err) if err.is_timeout() => "timeout".to_string(),
                Err(err) => err.to_string(),
            };
            warn!(engine = %template, code = %code, "Search engine request failed");
            codes.push(code);
        }
        Err(SearchError::AllEnginesFailed(codes))
    }
}

#[async_trait]
impl GeneratorFinder for GeneratorSearch {
    async fn find_generator(&self, query: &str) -> Result<String, SearchError> {
        let key = query.trim().to_lowercase();
        if let Some(name) = self.cache.get(&key).await {
            return Ok(name);
        }

        let page = self.first_results_page(query).await?;
        let name = extract_generator_name(&page).ok_or(SearchError::NoMatch)?;
        info!(query, generator = %name, "Search found generator");

        self.cache.set(key, name.clone()).await;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_generator_link() {
        let page = r#"<a href="https://perchance.org/dnd-item?x=1">DnD</a> <a href="https://perchance.org/animal">"#;
        assert_eq!(extract_generator_name(page).as_deref(), Some("dnd-item"));
        assert_eq!(extract_generator_name("no links here"), None);
    }

    #[test]
    fn builds_engine_urls() {
        assert_eq!(
            engine_url(
                "https://www.bing.com/search?q={query}+site%3Aperchance.org",
                "cool  dnd items"
            ),
            "https://www.bing.com/search?q=cool+dnd+items+site%3Aperchance.org"
        );
        assert_eq!(
            engine_url("https://e.x/?q={query}", "a&b"),
            "https://e.x/?q=a%26b"
        );
    }

    #[test]
    fn every_header_is_valid() {
        assert_eq!(browser_headers().len(), BROWSER_HEADERS.len());
    }

    #[test]
    fn error_messages_list_codes() {
        let err = SearchError::AllEnginesFailed(vec!["429".into(), "503".into(), "timeout".into()]);
        assert_eq!(
            err.to_string(),
            "Failed to get search result. Error codes: 429, 503, timeout"
        );
        assert_eq!(SearchError::NoMatch.to_string(), "Failed to get search result.");
    }
}
