//! The financial analysis crew: four roles, four stages
//!
//! verification -> analyze_financial_document -> risk_assessment -> investment_analysis,
//! with the final stage reading all three earlier results.

use crate::graph::{RealizedTask, TaskGraph, TaskNode};
use crate::jobs::{JobContext, JobPipeline};
use crate::orchestrator::{NodeError, NodeRunner, Orchestrator, PipelineError};
use fincrew_agent::{BoundRole, Persona, RoleRuntime, RoleSpec, RuntimeConfig, TemplateVars};
use fincrew_core::config::{FincrewConfig, LlmConfig};
use fincrew_core::{Error, SchedulingPolicy};
use fincrew_llm::{LlmProvider, OllamaProvider};
use fincrew_tools::{create_job_catalog, create_shared_registry, ToolRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const VERIFIER: &str = "verifier";
pub const FINANCIAL_ANALYST: &str = "financial_analyst";
pub const RISK_ASSESSOR: &str = "risk_assessor";
pub const INVESTMENT_ADVISOR: &str = "investment_advisor";

pub const VERIFICATION: &str = "verification";
pub const ANALYZE_DOCUMENT: &str = "analyze_financial_document";
pub const RISK_ASSESSMENT: &str = "risk_assessment";
pub const INVESTMENT_ANALYSIS: &str = "investment_analysis";

const NO_FABRICATION: &str = "Never invent a number. If a figure is not in the document, write 'Not provided'.";

/// Role definitions with the given loop limits.
pub fn financial_roles(max_iterations: usize, max_calls_per_minute: u32) -> Vec<RoleSpec> {
    vec![
        RoleSpec::new(
            VERIFIER,
            Persona::new(
                "Financial Document Verifier",
                "Confirm the uploaded document is a genuine financial report and identify the company and document type.",
                format!(
                    "You are a compliance specialist. You read the document through your search tool, \
                     report the company name and document type, and nothing else. {}",
                    NO_FABRICATION
                ),
            ),
        )
        .with_capabilities(&["document_search"])
        .with_limits(max_iterations, max_calls_per_minute),
        RoleSpec::new(
            FINANCIAL_ANALYST,
            Persona::new(
                "Senior Financial Analyst",
                "Extract accurate financial metrics from the document that answer the request: {query}",
                format!(
                    "You have years of experience reading financial statements. You report only figures \
                     that appear in the text and state any assumption you make. {}",
                    NO_FABRICATION
                ),
            ),
        )
        .with_capabilities(&["document_search", "investment_analyzer"])
        .with_limits(max_iterations, max_calls_per_minute),
        RoleSpec::new(
            RISK_ASSESSOR,
            Persona::new(
                "Risk Assessment Specialist",
                "Assess the risks explicitly present in the financial data and rate them Low, Medium, or High.",
                format!(
                    "You are a risk management professional. You judge risk from the data in front of you, \
                     not from speculation, and you explain each risk plainly. {}",
                    NO_FABRICATION
                ),
            ),
        )
        .with_capabilities(&["document_search", "risk_assessment"])
        .with_limits(max_iterations, max_calls_per_minute),
        RoleSpec::new(
            INVESTMENT_ADVISOR,
            Persona::new(
                "Investment Advisor",
                "Give an evidence-based Buy, Hold, or Sell recommendation that answers: {query}",
                format!(
                    "You are a registered investment advisor. You ground every recommendation in the \
                     verified document, the extracted metrics, and the risk assessment, you are open about \
                     uncertainty, and you always include a disclaimer. {}",
                    NO_FABRICATION
                ),
            ),
        )
        .with_capabilities(&["web_search"])
        .with_limits(max_iterations, max_calls_per_minute),
    ]
}

/// The four-stage analysis graph.
pub fn financial_graph() -> Result<TaskGraph, PipelineError> {
    let graph = TaskGraph::new()
        .with_node(TaskNode::new(
            VERIFICATION,
            VERIFIER,
            "Search the document for the company name and the document title. Use a plain text \
             search query. Confirm whether it is a 10-K, a quarterly update, or a balance sheet.",
            "One short line with the company name and the document type.",
        ))?
        .with_node(
            TaskNode::new(
                ANALYZE_DOCUMENT,
                FINANCIAL_ANALYST,
                "Using the verified document, extract the key financial metrics reported in it: \
                 revenue, net income, margins, cash flow. Report only numbers found in the text; \
                 write 'Not provided' for any metric that is missing. Address the request: {query}",
                "A bulleted list of metrics taken directly from the document, without speculation.",
            )
            .after(&[VERIFICATION]),
        )?
        .with_node(
            TaskNode::new(
                RISK_ASSESSMENT,
                RISK_ASSESSOR,
                "Review the extracted metrics. Use your risk tool to find risks stated in the text, \
                 such as debt, liabilities, or market headwinds, and give a risk level \
                 (Low/Medium/High) based only on that data.",
                "A sober risk report listing only risks found in the financial data.",
            )
            .after(&[ANALYZE_DOCUMENT]),
        )?
        .with_node(
            TaskNode::new(
                INVESTMENT_ANALYSIS,
                INVESTMENT_ADVISOR,
                "Review the verified document, the extracted metrics, and the risk assessment. Use \
                 your search tool for two or three recent headlines about the company if available. \
                 Write a professional investment recommendation (Buy/Hold/Sell) that answers: {query}. \
                 State clearly that this is AI-generated analysis and not financial advice.",
                "A three-paragraph investment memo with a clear recommendation and a disclaimer.",
            )
            .after(&[VERIFICATION, ANALYZE_DOCUMENT, RISK_ASSESSMENT]),
        )?;
    Ok(graph)
}

/// Build the reasoning engine named in the configuration.
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, Error> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(&config.base_url))),
        other => Err(Error::ConfigError(format!("unsupported llm provider '{}'", other))),
    }
}

/// Runs each node by driving its job-bound role.
struct RoleNodeRunner<'a> {
    runtime: &'a RoleRuntime,
    roles: HashMap<String, BoundRole>,
}

#[async_trait::async_trait]
impl<'a> NodeRunner for RoleNodeRunner<'a> {
    async fn run_node(&self, task: RealizedTask) -> Result<String, NodeError> {
        let role = self
            .roles
            .get(&task.role)
            .ok_or_else(|| NodeError::UnboundRole(task.role.clone()))?;
        let outcome = self.runtime.run(role, &task.instruction, &task.context).await?;
        debug!(
            node_id = %task.node_id,
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls,
            exhausted = outcome.exhausted,
            "stage output ready"
        );
        Ok(outcome.text)
    }
}

/// The production pipeline: shared role definitions, per-job bindings.
pub struct FinancialPipeline {
    runtime: RoleRuntime,
    roles: Vec<RoleSpec>,
    graph: TaskGraph,
    shared_tools: ToolRegistry,
    orchestrator: Orchestrator,
}

impl FinancialPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        runtime_config: RuntimeConfig,
        roles: Vec<RoleSpec>,
        graph: TaskGraph,
        shared_tools: ToolRegistry,
        policy: SchedulingPolicy,
    ) -> Result<Self, PipelineError> {
        graph.validate(|name| roles.iter().any(|r| r.name == name))?;
        Ok(Self {
            runtime: RoleRuntime::new(provider, runtime_config),
            roles,
            graph,
            shared_tools,
            orchestrator: Orchestrator::new(policy),
        })
    }

    /// The standard crew wired from configuration.
    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &FincrewConfig) -> Result<Self, PipelineError> {
        let runtime_config = RuntimeConfig {
            default_model: config.llm.model.clone(),
            temperature: Some(config.llm.temperature),
            max_tokens: config.llm.max_tokens,
        };
        Self::new(
            provider,
            runtime_config,
            financial_roles(config.pipeline.max_iterations, config.pipeline.max_calls_per_minute),
            financial_graph()?,
            create_shared_registry(&config.search),
            config.pipeline.scheduling,
        )
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }
}

#[async_trait::async_trait]
impl JobPipeline for FinancialPipeline {
    async fn run(&self, job: JobContext) -> Result<String, PipelineError> {
        let catalog = create_job_catalog(&self.shared_tools, &job.document_path);

        let mut vars = TemplateVars::new();
        vars.insert("query".into(), job.query.clone());

        let mut roles = HashMap::with_capacity(self.roles.len());
        for spec in &self.roles {
            let bound = spec.bind(&catalog, &vars).map_err(PipelineError::Binding)?;
            roles.insert(spec.name.clone(), bound);
        }
        info!(job_id = %job.job_id, roles = roles.len(), "roles bound");

        let runner = RoleNodeRunner { runtime: &self.runtime, roles };
        let output = self
            .orchestrator
            .execute(&self.graph, &vars, &runner, job.progress.as_ref())
            .await?;
        Ok(output.final_text)
    }
}
