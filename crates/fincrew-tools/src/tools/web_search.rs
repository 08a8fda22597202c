//! Web search tool - Serper API

use crate::registry::{Tool, ToolResult};
use fincrew_core::config::SearchConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    results: usize,
}

impl WebSearchTool {
    pub fn new(config: &SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            results: config.results.max(1),
        }
    }

    async fn search(&self, api_key: &str, query: &str) -> Result<String, String> {
        let response = self.client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&json!({ "q": query, "num": self.results }))
            .send()
            .await
            .map_err(|e| format!("search request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("search service returned {}: {}", status, body));
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable search response: {}", e))?;
        Ok(render_results(query, &body, self.results))
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current market news and context about a company or sector. \
         Pass a short plain-text query."
    }

    async fn invoke(&self, input: &str) -> ToolResult {
        let query = input.trim();
        if query.is_empty() {
            return ToolResult::error("empty search query");
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return ToolResult::error("web search unavailable: SERPER_API_KEY is not configured");
        };

        debug!(query, "web search");
        match self.search(api_key, query).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                warn!(error = %e, "web search failed");
                ToolResult::error(e)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SerperResponse {
    #[serde(default)]
    pub organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
pub struct SerperResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    pub date: Option<String>,
}

/// Render organic results as a numbered plain-text list.
pub fn render_results(query: &str, response: &SerperResponse, limit: usize) -> String {
    if response.organic.is_empty() {
        return format!("No web results found for '{}'.", query);
    }
    response
        .organic
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, r)| {
            let date = r.date.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default();
            format!("{}. {}{}\n   {}\n   {}", i + 1, r.title, date, r.snippet, r.link)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
