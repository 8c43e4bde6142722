//! Web capabilities: web_search and web_fetch

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use cortex_config::Config;

use super::{Capability, CapabilityError, CapabilityOutput, CapabilityRegistry};

pub const GROUP: &str = "websearch";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const TRUNCATION_MARKER: &str = "... [content truncated]";

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub summary: String,
}

/// Web search through the Brave Search API
pub struct WebSearch {
    api_key: String,
    max_results: u32,
    endpoint: String,
}

impl WebSearch {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self {
            api_key: api_key.unwrap_or_default(),
            max_results,
            endpoint: BRAVE_ENDPOINT.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.search_api_key(),
            config.capabilities.web.search.max_results,
        )
    }

    /// Point at a different search endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
    max_results: Option<u32>,
}

#[async_trait]
impl Capability for WebSearch {
    fn id(&self) -> &str {
        "web_search"
    }

    fn group(&self) -> &str {
        GROUP
    }

    fn usage(&self) -> &str {
        "Search the web. Returns a numbered list of titles, URLs and summaries under \"result\". Usage: {\"query\": \"latest AI developments\", \"max_results\": 5}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "max_results": { "type": "integer", "description": "Number of results (1-10)" }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        if self.api_key.is_empty() {
            return Err(CapabilityError::Provider(
                "search api key not configured".to_string(),
            ));
        }
        let args: WebSearchArgs = serde_json::from_value(args)
            .map_err(|e| CapabilityError::InvalidArgs(e.to_string()))?;
        let count = args.max_results.unwrap_or(self.max_results).clamp(1, 10);
        debug!("Web search: {}", args.query);

        let count_param = count.to_string();
        let client = reqwest::Client::new();
        let response = client
            .get(&self.endpoint)
            .query(&[("q", args.query.as_str()), ("count", count_param.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| CapabilityError::Provider(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Provider(format!(
                "search api returned {}",
                status
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| CapabilityError::Provider(format!("search response unreadable: {}", e)))?;

        let hits = parse_hits(&data, count as usize);
        Ok(CapabilityOutput::from_json(
            json!({ "result": format_hits(&hits) }),
        ))
    }
}

/// Hits from a Brave `web.results` payload
pub fn parse_hits(data: &Value, limit: usize) -> Vec<SearchHit> {
    let Some(results) = data
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
    else {
        return Vec::new();
    };

    results
        .iter()
        .take(limit)
        .map(|item| {
            let field = |name: &str| {
                item.get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            SearchHit {
                title: field("title"),
                url: field("url"),
                summary: field("description"),
            }
        })
        .collect()
}

/// Numbered plain-text listing of search hits
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results were found for your search query. Please try rephrasing your search."
            .to_string();
    }

    let mut lines = vec![format!("Found {} search results:\n", hits.len())];
    for (i, hit) in hits.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, hit.title));
        lines.push(format!("   URL: {}", hit.url));
        lines.push(format!("   Summary: {}", hit.summary));
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Download a page and reduce it to readable text
pub struct WebFetch {
    max_chars: usize,
}

impl WebFetch {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for WebFetch {
    fn default() -> Self {
        Self::new(8000)
    }
}

#[derive(Deserialize)]
struct WebFetchArgs {
    url: String,
}

#[async_trait]
impl Capability for WebFetch {
    fn id(&self) -> &str {
        "web_fetch"
    }

    fn group(&self) -> &str {
        GROUP
    }

    fn usage(&self) -> &str {
        "Fetch a web page and return its readable text. Usage: {\"url\": \"https://example.com\"}"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let args: WebFetchArgs = serde_json::from_value(args)
            .map_err(|e| CapabilityError::InvalidArgs(e.to_string()))?;
        if !(args.url.starts_with("http://") || args.url.starts_with("https://")) {
            return Err(CapabilityError::InvalidArgs(format!(
                "unsupported url: {}",
                args.url
            )));
        }
        debug!("Fetching URL: {}", args.url);

        let client = reqwest::Client::new();
        let response = client
            .get(&args.url)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| CapabilityError::Provider(format!("could not access the webpage: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Provider(format!(
                "webpage returned {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Provider(format!("webpage unreadable: {}", e)))?;

        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else {
            collapse_whitespace(&body)
        };

        Ok(CapabilityOutput::from_text(truncate(&text, self.max_chars)))
    }
}

/// Readable text from an HTML document
pub fn html_to_text(html: &str) -> String {
    let rendered = html2text::from_read(html.as_bytes(), 10_000);
    collapse_whitespace(&rendered)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to `max_chars` characters, appending a marker when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

pub fn register(registry: &mut CapabilityRegistry, config: &Config) {
    registry.register_group(GROUP, "Web search and page retrieval");
    registry.register(WebSearch::from_config(config));
    registry.register(WebFetch::new(config.capabilities.web.fetch.max_chars));
}
