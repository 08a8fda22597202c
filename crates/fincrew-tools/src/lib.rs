//! Fincrew Tools - the capability registry
//!
//! Each tool is a self-contained file in src/tools/. Stateless tools live in
//! one shared registry; document tools are built per job around that job's
//! upload so no job can reach another's document.

pub mod registry;
pub mod tools;

pub use registry::{coerce_input, Tool, ToolRegistry, ToolResult, ERROR_MARKER};
pub use tools::document::{DocumentError, JobDocument};

use fincrew_core::config::SearchConfig;
use std::path::Path;
use std::sync::Arc;

/// Stateless tools shared by every job.
pub fn create_shared_registry(search: &SearchConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tools::investment::InvestmentAnalyzerTool);
    registry.register(tools::risk::RiskAssessmentTool);
    registry.register(tools::web_search::WebSearchTool::new(search));
    registry
}

/// Document tools bound to one job's uploaded file.
pub fn create_document_registry(document_path: impl AsRef<Path>) -> ToolRegistry {
    document_registry(Arc::new(JobDocument::new(document_path)))
}

/// Document tools over an already-loaded document.
pub fn document_registry(document: Arc<JobDocument>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tools::document_search::DocumentSearchTool::new(Arc::clone(&document)));
    registry.register(tools::read_document::ReadDocumentTool::new(document));
    registry
}

/// Everything a job may bind: the shared tools plus its own document tools.
pub fn create_job_catalog(shared: &ToolRegistry, document_path: impl AsRef<Path>) -> ToolRegistry {
    let mut catalog = create_document_registry(document_path);
    catalog.extend(shared);
    catalog
}
