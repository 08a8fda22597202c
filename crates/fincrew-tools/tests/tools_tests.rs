//! Tests for fincrew-tools: registry contract, coercion, the financial tools

use fincrew_core::config::SearchConfig;
use fincrew_tools::tools::document_search::{query_terms, search_passages};
use fincrew_tools::tools::investment::{extract_metrics, NOT_PROVIDED};
use fincrew_tools::tools::risk::{assess, RiskLevel};
use fincrew_tools::tools::web_search::{render_results, SerperResponse, SerperResult};
use fincrew_tools::*;
use serde_json::json;
use std::sync::Arc;

struct PanickingTool;

#[async_trait::async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str { "explode" }
    fn description(&self) -> &str { "always panics" }
    async fn invoke(&self, _input: &str) -> ToolResult {
        panic!("boom")
    }
}

struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str { "echo" }
    fn description(&self) -> &str { "echoes input" }
    async fn invoke(&self, input: &str) -> ToolResult {
        ToolResult::text(format!("echo:{}", input))
    }
}

const REPORT: &str = "ACME Corp\nAnnual Report (Form 10-K) fiscal 2023\n\n   Revenue    $10M for the year\nNet income of $1.2M\nTotal debt stands at $3M\n";

// ===========================================================================
// ToolResult / registry
// ===========================================================================

#[test]
fn error_result_carries_marker() {
    let r = ToolResult::error("disk on fire");
    assert!(r.is_error());
    assert_eq!(r.to_content_string(), "Error: disk on fire");
    assert!(!ToolResult::text("ok").is_error());
}

#[tokio::test]
async fn unknown_tool_is_error_text() {
    let registry = ToolRegistry::new();
    let result = registry.invoke("nope", "x").await;
    assert!(result.to_content_string().starts_with(ERROR_MARKER));
    assert!(result.to_content_string().contains("Tool not found"));
}

#[tokio::test]
async fn panicking_tool_is_contained() {
    let mut registry = ToolRegistry::new();
    registry.register(PanickingTool);
    let result = registry.invoke("explode", "anything").await;
    assert!(result.is_error());
    let text = result.to_content_string();
    assert!(text.starts_with(ERROR_MARKER));
    assert!(text.contains("boom"));
}

#[test]
fn register_replaces_same_name_and_keeps_order() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    registry.register(PanickingTool);
    registry.register(EchoTool);
    assert_eq!(registry.list(), vec!["echo", "explode"]);
    assert!(registry.remove("explode"));
    assert!(!registry.remove("explode"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn subset_reports_missing_names() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let ok = registry.subset(&["echo".to_string()]).unwrap();
    assert_eq!(ok.list(), vec!["echo"]);
    let missing = registry.subset(&["echo".to_string(), "ghost".to_string()]).err().unwrap();
    assert_eq!(missing, vec!["ghost".to_string()]);
}

#[test]
fn definitions_expose_single_string_parameter() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let defs = registry.get_definitions();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].parameters["properties"]["query"]["type"], "string");
    assert_eq!(defs[0].parameters["required"][0], "query");
}

// ===========================================================================
// Argument coercion
// ===========================================================================

#[test]
fn coerce_plain_and_wrapped_inputs() {
    assert_eq!(coerce_input(&json!("Total Revenue"), "query"), "Total Revenue");
    assert_eq!(coerce_input(&json!({"query": "Total Revenue"}), "query"), "Total Revenue");
    assert_eq!(coerce_input(&json!({"text": "abc"}), "text"), "abc");
    assert_eq!(coerce_input(&json!({"search_term": "net income"}), "query"), "net income");
    assert_eq!(coerce_input(&json!(null), "query"), "");
}

#[test]
fn coerce_schema_echo_uses_description() {
    let args = json!({"query": {"description": "company name", "type": "string"}});
    assert_eq!(coerce_input(&args, "query"), "company name");
}

#[tokio::test]
async fn invoke_with_arguments_coerces_before_calling() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let result = registry.invoke_with_arguments("echo", &json!({"query": "hi"})).await;
    assert_eq!(result.to_content_string(), "echo:hi");
}

// ===========================================================================
// Document tools
// ===========================================================================

#[tokio::test]
async fn document_search_finds_revenue_passage() {
    let registry = document_registry(Arc::new(JobDocument::from_text(REPORT)));
    let result = registry.invoke("document_search", "Total Revenue").await;
    let text = result.to_content_string();
    assert!(text.contains("Revenue $10M"), "got: {}", text);
}

#[tokio::test]
async fn document_search_without_hits_says_so() {
    let registry = document_registry(Arc::new(JobDocument::from_text(REPORT)));
    let result = registry.invoke("document_search", "cryptocurrency holdings").await;
    assert!(!result.is_error());
    assert!(result.to_content_string().contains("No passages matching"));
}

#[tokio::test]
async fn document_tools_read_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("financial_document_test.pdf");
    std::fs::write(&path, REPORT).unwrap();

    let registry = create_document_registry(&path);
    let full = registry.invoke("read_document", "").await.to_content_string();
    assert!(full.starts_with("ACME Corp"));
    assert!(full.contains("Revenue $10M for the year"));
}

#[tokio::test]
async fn missing_document_is_error_text() {
    let registry = create_document_registry("/nonexistent/financial_document_x.pdf");
    let result = registry.invoke("document_search", "revenue").await;
    assert!(result.is_error());
    assert!(result.to_content_string().starts_with(ERROR_MARKER));
}

#[tokio::test]
async fn empty_document_is_error_text() {
    let registry = document_registry(Arc::new(JobDocument::from_text("  \n\t \n")));
    let result = registry.invoke("read_document", "").await;
    assert!(result.to_content_string().contains("no extractable text"));
}

#[test]
fn query_terms_drop_stopwords_and_short_words() {
    assert_eq!(query_terms("What is the Total Revenue for 2023?"), vec!["total", "revenue", "2023"]);
}

#[test]
fn search_passages_keep_document_order() {
    let text = "net income 1\nrevenue and net income\nrevenue only";
    let terms = vec!["revenue".to_string(), "income".to_string()];
    let hits = search_passages(text, &terms, 2);
    assert_eq!(hits, vec!["net income 1", "revenue and net income"]);
}

// ===========================================================================
// Investment analyzer / risk assessment
// ===========================================================================

#[tokio::test]
async fn investment_analyzer_reports_revenue() {
    let mut registry = ToolRegistry::new();
    registry.register(tools::investment::InvestmentAnalyzerTool);
    let text = registry.invoke("investment_analyzer", REPORT).await.to_content_string();
    assert!(text.starts_with("Analysis Complete: Found revenue mentions."));
    assert!(text.contains("- Revenue: $10M"));
    assert!(text.contains("- Net Income: $1.2M"));
    assert!(text.contains(&format!("- EPS: {}", NOT_PROVIDED)));
}

#[tokio::test]
async fn investment_analyzer_without_markers() {
    let mut registry = ToolRegistry::new();
    registry.register(tools::investment::InvestmentAnalyzerTool);
    let text = registry
        .invoke("investment_analyzer", "Minutes of the annual picnic committee.")
        .await
        .to_content_string();
    assert!(text.starts_with("Analysis Complete: No standard investment markers found"));
    assert!(text.contains(&format!("- Revenue: {}", NOT_PROVIDED)));
}

#[test]
fn extract_metrics_skips_years_before_amount() {
    let metrics = extract_metrics("Revenue 2023: $4.5 billion");
    assert_eq!(metrics[0], ("Revenue", "$4.5 billion".to_string()));
}

#[test]
fn risk_levels_follow_markers() {
    assert_eq!(assess("We carry long-term debt.").0, RiskLevel::Medium);
    assert_eq!(assess("Substantial doubt about going concern").0, RiskLevel::High);
    assert_eq!(assess("Strong quarter, record sales").0, RiskLevel::Low);
}

#[tokio::test]
async fn risk_tool_output_format() {
    let mut registry = ToolRegistry::new();
    registry.register(tools::risk::RiskAssessmentTool);
    let medium = registry.invoke("risk_assessment", "Total liabilities rose").await.to_content_string();
    assert!(medium.starts_with("Risk Assessment: MEDIUM. Document mentions liabilities that require further audit."));
    let low = registry.invoke("risk_assessment", "all good").await.to_content_string();
    assert_eq!(low, "Risk Assessment: LOW. No immediate red flags detected in the provided text.");
}

// ===========================================================================
// Web search
// ===========================================================================

#[tokio::test]
async fn web_search_without_key_is_error_text() {
    let registry = create_shared_registry(&SearchConfig::default());
    let result = registry.invoke("web_search", "ACME Corp outlook").await;
    assert!(result.is_error());
    assert!(result.to_content_string().contains("SERPER_API_KEY"));
}

#[test]
fn serper_results_render_numbered() {
    let response = SerperResponse {
        organic: vec![
            SerperResult {
                title: "ACME beats estimates".into(),
                link: "https://news.example/acme".into(),
                snippet: "Shares rose 4%".into(),
                date: Some("2 days ago".into()),
            },
            SerperResult { title: "Second".into(), link: "l".into(), snippet: "s".into(), date: None },
        ],
    };
    let text = render_results("ACME", &response, 1);
    assert!(text.starts_with("1. ACME beats estimates (2 days ago)"));
    assert!(!text.contains("Second"));
    assert!(render_results("ACME", &SerperResponse::default(), 3).contains("No web results"));
}

#[test]
fn job_catalog_merges_document_and_shared_tools() {
    let shared = create_shared_registry(&SearchConfig::default());
    let catalog = create_job_catalog(&shared, "/tmp/financial_document_a.pdf");
    assert_eq!(
        catalog.list(),
        vec!["document_search", "read_document", "investment_analyzer", "risk_assessment", "web_search"]
    );
}
