//! Document search tool - keyword passage search over the job's document

use super::document::{truncate, JobDocument};
use crate::registry::{Tool, ToolResult};
use std::collections::HashSet;
use std::sync::Arc;

const MAX_PASSAGES: usize = 6;
const MAX_OUTPUT_CHARS: usize = 4000;
const OVERVIEW_LINES: usize = 15;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "what", "which", "are", "was",
    "were", "has", "have", "its", "into", "about", "document", "find", "show", "please",
];

pub struct DocumentSearchTool {
    document: Arc<JobDocument>,
}

impl DocumentSearchTool {
    pub fn new(document: Arc<JobDocument>) -> Self {
        Self { document }
    }
}

#[async_trait::async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        "document_search"
    }

    fn description(&self) -> &str {
        "Search the uploaded financial document for passages relevant to a plain-text query \
         such as 'Total Revenue 2023' or 'company name'."
    }

    fn prompt(&self) -> &str {
        "document_search takes a plain text string, never a JSON object."
    }

    async fn invoke(&self, input: &str) -> ToolResult {
        let text = match self.document.text().await {
            Ok(t) => t,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let terms = query_terms(input);
        if terms.is_empty() {
            let overview: Vec<&str> = text.lines().take(OVERVIEW_LINES).collect();
            return ToolResult::text(truncate(&overview.join("\n"), MAX_OUTPUT_CHARS));
        }

        let passages = search_passages(&text, &terms, MAX_PASSAGES);
        if passages.is_empty() {
            return ToolResult::text(format!(
                "No passages matching '{}' were found in the document.",
                input.trim()
            ));
        }
        ToolResult::text(truncate(&passages.join("\n"), MAX_OUTPUT_CHARS))
    }
}

/// Lowercased search terms: words of three or more chars, numbers of any
/// length, stopwords dropped.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|c: char| !c.is_alphanumeric() && c != '$' && c != '%')
        .map(|w| w.trim_matches(|c| c == '$' || c == '%').to_lowercase())
        .filter(|w| !w.is_empty())
        .filter(|w| w.len() >= 3 || w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Best-scoring lines (by distinct term hits), returned in document order.
pub fn search_passages<'a>(text: &'a str, terms: &[String], limit: usize) -> Vec<&'a str> {
    let mut scored: Vec<(usize, usize, &str)> = text
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let lower = line.to_lowercase();
            let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count();
            (hits > 0).then_some((hits, idx, line))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(limit);
    scored.sort_by_key(|(_, idx, _)| *idx);
    scored.into_iter().map(|(_, _, line)| line).collect()
}
