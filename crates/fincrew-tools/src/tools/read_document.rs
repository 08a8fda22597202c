//! Read document tool - returns the job's full normalized document text

use super::document::{truncate, JobDocument};
use crate::registry::{Tool, ToolResult};
use std::sync::Arc;

const MAX_OUTPUT_CHARS: usize = 20_000;

pub struct ReadDocumentTool {
    document: Arc<JobDocument>,
}

impl ReadDocumentTool {
    pub fn new(document: Arc<JobDocument>) -> Self {
        Self { document }
    }
}

#[async_trait::async_trait]
impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read the full text of the uploaded financial document. The input is ignored; \
         pass an empty string."
    }

    async fn invoke(&self, _input: &str) -> ToolResult {
        match self.document.text().await {
            Ok(text) => ToolResult::text(truncate(&text, MAX_OUTPUT_CHARS)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
