//! Web search tool.
//!
//! The real backend is DuckDuckGo's instant answer API, which needs no API
//! key. When the API yields nothing (or the tool is configured as
//! [`SearchEngine::Simulated`]) deterministic simulated results are returned
//! instead, so tool-use environments stay exercisable offline.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tool::{ArgumentSchema, Tool, ToolSchema};

const DUCKDUCKGO_API: &str = "https://api.duckduckgo.com";
const DEFAULT_MAX_RESULTS: i64 = 5;

/// Which backend answers queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    DuckDuckGo,
    Simulated,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Searches the web via the `query` argument, honoring `max_results`.
#[derive(Debug, Clone)]
pub struct SearchTool {
    schema: ToolSchema,
    engine: SearchEngine,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(default, rename = "Abstract")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default, rename = "AbstractSource")]
    abstract_source: String,
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedTopic {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
}

impl SearchTool {
    pub fn new(engine: SearchEngine) -> Self {
        let mut schema = ToolSchema {
            name: "search".to_string(),
            description: "Search the web for information".to_string(),
            args: Default::default(),
            returns: "Search results containing titles, URLs, and snippets".to_string(),
            examples: vec![
                r#"{"name": "search", "args": {"query": "Go programming language concurrency"}}"#
                    .to_string(),
                r#"{"name": "search", "args": {"query": "latest AI research papers", "max_results": 10}}"#
                    .to_string(),
            ],
        };
        schema.args.insert(
            "query".to_string(),
            ArgumentSchema {
                kind: "string".to_string(),
                description: "Search query".to_string(),
                default: None,
                required: true,
            },
        );
        schema.args.insert(
            "max_results".to_string(),
            ArgumentSchema {
                kind: "integer".to_string(),
                description: "Maximum number of results to return".to_string(),
                default: Some(json!(DEFAULT_MAX_RESULTS)),
                required: false,
            },
        );
        Self {
            schema,
            engine,
            api_base: DUCKDUCKGO_API.to_string(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
        }
    }

    /// Point the DuckDuckGo backend at a different base URL.
    pub fn with_api_base(mut self, base_url: &str) -> Self {
        self.api_base = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn perform_search(&self, query: &str, max_results: i64) -> Result<Vec<SearchResult>> {
        match self.engine {
            SearchEngine::DuckDuckGo => self.search_duckduckgo(query, max_results).await,
            SearchEngine::Simulated => Ok(self.simulate_search(query, max_results)),
        }
    }

    async fn search_duckduckgo(&self, query: &str, max_results: i64) -> Result<Vec<SearchResult>> {
        let response = self
            .http
            .get(format!("{}/", self.api_base))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;
        let answer: InstantAnswer = response
            .json()
            .await
            .context("failed to decode search response")?;

        let mut results = Vec::new();
        if !answer.abstract_text.is_empty() {
            results.push(SearchResult {
                title: format!("{} (from {})", query, answer.abstract_source),
                url: answer.abstract_url,
                snippet: answer.abstract_text,
            });
        }
        for (i, topic) in answer.related_topics.into_iter().enumerate() {
            if i as i64 >= max_results || results.len() as i64 >= max_results {
                break;
            }
            if !topic.text.is_empty() {
                results.push(SearchResult {
                    title: extract_title(&topic.text),
                    url: topic.first_url,
                    snippet: topic.text,
                });
            }
        }

        if results.is_empty() {
            return Ok(self.simulate_search(query, max_results));
        }
        Ok(results)
    }

    /// Deterministic stand-in results: keyword hits first, then generic
    /// fillers up to `max_results` (capped at five).
    fn simulate_search(&self, query: &str, max_results: i64) -> Vec<SearchResult> {
        let mut results = Vec::new();
        let query_lower = query.to_lowercase();

        if query_lower.contains("go") || query_lower.contains("golang") {
            results.push(SearchResult {
                title: "The Go Programming Language".to_string(),
                url: "https://golang.org".to_string(),
                snippet: "Go is an open source programming language that makes it easy to build simple, reliable, and efficient software.".to_string(),
            });
        }
        if query_lower.contains("concurrency") {
            results.push(SearchResult {
                title: "Concurrency in Go".to_string(),
                url: "https://golang.org/doc/effective_go#concurrency".to_string(),
                snippet: "Go provides goroutines and channels for managing concurrent operations. Goroutines are lightweight threads managed by the Go runtime.".to_string(),
            });
        }
        if query_lower.contains("ai") || query_lower.contains("artificial intelligence") {
            results.push(SearchResult {
                title: "Recent Advances in Artificial Intelligence".to_string(),
                url: "https://arxiv.org/list/cs.AI/recent".to_string(),
                snippet: "Latest research papers and developments in artificial intelligence, machine learning, and deep learning.".to_string(),
            });
        }

        let mut i = results.len() as i64;
        while i < max_results && i < 5 {
            results.push(SearchResult {
                title: format!("Result {} for: {}", i + 1, query),
                url: format!(
                    "https://example.com/search?q={}&p={}",
                    query.replace(' ', "+"),
                    i + 1
                ),
                snippet: format!(
                    "This is a search result snippet for your query '{query}'. It contains relevant information about the topic."
                ),
            });
            i += 1;
        }

        results
    }

    fn format_results(&self, results: &[SearchResult]) -> String {
        if results.is_empty() {
            return "No results found.".to_string();
        }
        results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                format!(
                    "{}. {}\n   URL: {}\n   {}",
                    i + 1,
                    result.title,
                    result.url,
                    result.snippet
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Tool for SearchTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let Some(raw) = args.get("query") else {
            anyhow::bail!("missing required argument 'query'");
        };
        let Some(query) = raw.as_str() else {
            anyhow::bail!("query must be a string");
        };

        let mut max_results = DEFAULT_MAX_RESULTS;
        if let Some(value) = args.get("max_results") {
            if let Some(n) = value.as_i64() {
                max_results = n;
            } else if let Some(f) = value.as_f64() {
                max_results = f as i64;
            }
        }

        let results = self
            .perform_search(query, max_results)
            .await
            .map_err(|err| anyhow::anyhow!("search failed: {err}"))?;
        Ok(Value::from(self.format_results(&results)))
    }
}

/// Title from a DuckDuckGo topic text: the first sentence when it ends
/// within 50 characters, otherwise a truncated prefix.
fn extract_title(text: &str) -> String {
    if let Some(idx) = text.find('.') {
        if idx > 0 && idx < 50 {
            return text[..idx].to_string();
        }
    }
    if text.len() > 50 {
        let mut cut = 47;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        return format!("{}...", &text[..cut]);
    }
    text.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
