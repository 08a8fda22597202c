//! Fincrew Pipeline - task graph, orchestrator, and job manager

pub mod crew;
pub mod graph;
pub mod jobs;
pub mod orchestrator;
pub mod store;

pub use crew::{financial_graph, financial_roles, provider_from_config, FinancialPipeline};
pub use graph::{realize, ExecutionMode, GraphError, RealizedTask, TaskGraph, TaskNode};
pub use jobs::{JobContext, JobCounts, JobManager, JobPipeline, Submission, UploadedDocument};
pub use orchestrator::{
    NodeError, NodeRunner, Orchestrator, PipelineError, PipelineOutput, StageFailure, StageObserver,
};
pub use store::{DocumentStore, FsDocumentStore};
