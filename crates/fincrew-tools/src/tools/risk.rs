//! Risk assessment tool - marker-based risk level

use crate::registry::{Tool, ToolResult};

const HIGH_MARKERS: &[&str] = &["going concern", "event of default", "in default", "bankruptcy", "insolvency"];
const MEDIUM_MARKERS: &[&str] = &["debt", "liability", "liabilities"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

pub fn assess(text: &str) -> (RiskLevel, Vec<&'static str>) {
    let lower = text.to_lowercase();
    let high: Vec<&str> = HIGH_MARKERS.iter().copied().filter(|m| lower.contains(m)).collect();
    if !high.is_empty() {
        return (RiskLevel::High, high);
    }
    let medium: Vec<&str> = MEDIUM_MARKERS.iter().copied().filter(|m| lower.contains(m)).collect();
    if !medium.is_empty() {
        return (RiskLevel::Medium, medium);
    }
    (RiskLevel::Low, Vec::new())
}

pub fn render(level: RiskLevel, markers: &[&str]) -> String {
    let body = match level {
        RiskLevel::High => "Document contains going-concern or default language that needs immediate review.",
        RiskLevel::Medium => "Document mentions liabilities that require further audit.",
        RiskLevel::Low => "No immediate red flags detected in the provided text.",
    };
    let mut out = format!("Risk Assessment: {}. {}", level.as_str(), body);
    if !markers.is_empty() {
        out.push_str(&format!(" Markers found: {}.", markers.join(", ")));
    }
    out
}

pub struct RiskAssessmentTool;

#[async_trait::async_trait]
impl Tool for RiskAssessmentTool {
    fn name(&self) -> &str {
        "risk_assessment"
    }

    fn description(&self) -> &str {
        "Rate the risk level (LOW, MEDIUM, HIGH) of financial text from debt, liability, \
         and default markers. Pass the text to assess as a plain string."
    }

    fn input_name(&self) -> &str {
        "text"
    }

    async fn invoke(&self, input: &str) -> ToolResult {
        if input.trim().is_empty() {
            return ToolResult::error("no text supplied to assess");
        }
        let (level, markers) = assess(input);
        ToolResult::text(render(level, &markers))
    }
}
