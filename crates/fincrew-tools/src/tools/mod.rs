//! Individual tool implementations.
//!
//! Document tools are bound to one job's upload; the others hold no
//! per-job state and are shared across jobs.

pub mod document;
pub mod document_search;
pub mod investment;
pub mod read_document;
pub mod risk;
pub mod web_search;
