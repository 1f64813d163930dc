//! Web search client.
//!
//! Every failure is converted into a [`SearchFailure`] whose display form is
//! the sentinel string handed back to the model, so nothing raised here ever
//! crosses into the orchestrator as a panic or a propagated error.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::metrics::record_search;
use crate::SecretValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchFailure {
    #[error("Error: SERPAPI_API_KEY is not set.")]
    MissingCredential,
    #[error("Error: Unable to perform web search. {0}")]
    Transport(String),
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchFailure>;

    /// Report configuration problems without touching the network.
    fn ensure_ready(&self) -> Result<(), SearchFailure> {
        Ok(())
    }
}

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SerpOrganic>,
}

#[derive(Deserialize)]
struct SerpOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

/// SerpAPI-compatible search client with optional page-content enrichment.
pub struct SerpApiClient {
    endpoint: String,
    api_key: Option<SecretValue>,
    num_results: u32,
    fetch_full_content: bool,
    http_client: reqwest::Client,
    page_timeout: Duration,
}

impl SerpApiClient {
    pub fn new(config: &SearchConfig, api_key: Option<SecretValue>) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key,
            num_results: config.num_results,
            fetch_full_content: config.fetch_full_content,
            http_client: reqwest::Client::new(),
            page_timeout: config.page_timeout(),
        }
    }

    async fn query_api(
        &self,
        api_key: &SecretValue,
        query: &str,
    ) -> Result<Vec<SerpOrganic>, reqwest::Error> {
        let num = self.num_results.to_string();
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("api_key", api_key.expose()),
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        info!(status = %response.status(), "search API responded");

        let payload: SerpResponse = response.error_for_status()?.json().await?;
        Ok(payload.organic_results)
    }

    async fn fetch_page_text(&self, link: &str) -> Result<String, reqwest::Error> {
        let body = self
            .http_client
            .get(link)
            .timeout(self.page_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(extract_visible_text(&body))
    }
}

#[async_trait]
impl WebSearch for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchFailure> {
        info!(%query, "performing web search");

        let api_key = match self.api_key.as_ref() {
            Some(key) => key,
            None => {
                warn!("search credential is not configured");
                record_search("missing_credential", 0);
                return Err(SearchFailure::MissingCredential);
            }
        };

        let organic = match self.query_api(api_key, query).await {
            Ok(organic) => organic,
            Err(err) => {
                let failure = SearchFailure::Transport(err.to_string());
                warn!(error = %failure, "web search failed");
                record_search("transport_error", 0);
                return Err(failure);
            }
        };

        if organic.is_empty() {
            warn!(%query, "search returned no organic results");
        }

        let mut results = Vec::with_capacity(organic.len());
        for item in organic {
            let full_content = if self.fetch_full_content && !item.link.is_empty() {
                match self.fetch_page_text(&item.link).await {
                    Ok(text) => Some(text),
                    Err(err) => {
                        warn!(link = %item.link, error = %err, "failed to fetch full content");
                        None
                    }
                }
            } else {
                None
            };

            results.push(SearchResult {
                title: item.title,
                snippet: item.snippet,
                link: item.link,
                full_content,
            });
        }

        record_search("ok", results.len());
        Ok(results)
    }

    fn ensure_ready(&self) -> Result<(), SearchFailure> {
        if self.api_key.is_some() {
            Ok(())
        } else {
            Err(SearchFailure::MissingCredential)
        }
    }
}

static INVISIBLE_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?is)<script\b.*?</script\s*>").expect("invalid script regex"),
        Regex::new(r"(?is)<style\b.*?</style\s*>").expect("invalid style regex"),
        Regex::new(r"(?s)<!--.*?-->").expect("invalid comment regex"),
    ]
});

static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|ul|ol|tr|td|th|h[1-6]|section|article|header|footer|nav|title|table|blockquote|pre)\b[^>]*>")
        .expect("invalid block tag regex")
});

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("invalid tag regex"));

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Reduce an HTML document to its visible text: one phrase per line, no blank
/// lines, script and style bodies removed.
pub fn extract_visible_text(html: &str) -> String {
    let mut text = html.to_string();
    for pattern in INVISIBLE_BLOCKS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render hits the way the model sees them as a tool observation.
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| {
            format!(
                "Title: {}\nSnippet: {}\nSource: {}",
                result.title, result.snippet, result.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_blank_lines() {
        let html = r#"
            <html><head><title>Page</title>
            <style>body { color: red; }</style>
            <script type="text/javascript">var secret = 1;</script>
            </head>
            <body>
              <h1>Headline</h1>
              <p>First  paragraph &amp; more</p>
              <!-- hidden -->
              <div>   </div>
            </body></html>
        "#;

        let text = extract_visible_text(html);
        assert_eq!(text, "Page\nHeadline\nFirst\nparagraph & more");
        assert!(!text.contains("secret"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn formats_results_with_blank_line_between_items() {
        let results = vec![
            SearchResult {
                title: "A".into(),
                snippet: "first".into(),
                link: "https://a.example".into(),
                full_content: None,
            },
            SearchResult {
                title: "B".into(),
                snippet: "second".into(),
                link: "https://b.example".into(),
                full_content: Some("ignored".into()),
            },
        ];

        assert_eq!(
            format_results(&results),
            "Title: A\nSnippet: first\nSource: https://a.example\n\nTitle: B\nSnippet: second\nSource: https://b.example"
        );
        assert_eq!(format_results(&[]), "");
    }

    #[test]
    fn failure_display_is_the_sentinel() {
        assert_eq!(
            SearchFailure::MissingCredential.to_string(),
            "Error: SERPAPI_API_KEY is not set."
        );
        assert!(
            SearchFailure::Transport("boom".into())
                .to_string()
                .starts_with("Error: Unable to perform web search.")
        );
    }
}
