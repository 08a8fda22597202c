//! Role definitions and per-job bindings

use crate::runtime::RoleError;
use crate::throttle::CallThrottle;
use fincrew_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Job-scoped template variables (`{query}` and friends).
pub type TemplateVars = BTreeMap<String, String>;

/// Replace every `{name}` with its value. Unknown placeholders stay as written.
pub fn render_template(template: &str, vars: &TemplateVars) -> String {
    let mut s = template.to_string();
    for (k, v) in vars {
        s = s.replace(&format!("{{{}}}", k), v);
    }
    s
}

/// Who the role is and how it behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl Persona {
    pub fn new(role: impl Into<String>, goal: impl Into<String>, backstory: impl Into<String>) -> Self {
        Self { role: role.into(), goal: goal.into(), backstory: backstory.into() }
    }

    pub fn render(&self, vars: &TemplateVars) -> Persona {
        Persona {
            role: render_template(&self.role, vars),
            goal: render_template(&self.goal, vars),
            backstory: render_template(&self.backstory, vars),
        }
    }

    /// The preamble placed ahead of every instruction this role receives.
    pub fn preamble(&self) -> String {
        format!("You are {}.\nYour goal: {}\n{}", self.role, self.goal, self.backstory)
    }
}

/// Immutable role definition, shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub persona: Persona,
    /// Names of the capabilities this role may call, in prompt order.
    pub capabilities: Vec<String>,
    pub max_iterations: usize,
    /// Capability invocations per minute. 0 means unthrottled.
    pub max_calls_per_minute: u32,
    /// Delegation to other roles is not supported; binding rejects `true`.
    #[serde(default)]
    pub allow_delegation: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, persona: Persona) -> Self {
        Self {
            name: name.into(),
            persona,
            capabilities: Vec::new(),
            max_iterations: 5,
            max_calls_per_minute: 30,
            allow_delegation: false,
            model: None,
            temperature: None,
        }
    }

    pub fn with_capabilities(mut self, names: &[&str]) -> Self {
        self.capabilities = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_limits(mut self, max_iterations: usize, max_calls_per_minute: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self.max_calls_per_minute = max_calls_per_minute;
        self
    }

    /// Build this role's job-scoped copy: persona rendered with the job's
    /// variables, capabilities taken from the job's own catalog.
    pub fn bind(&self, catalog: &ToolRegistry, vars: &TemplateVars) -> Result<BoundRole, RoleError> {
        if self.allow_delegation {
            return Err(RoleError::DelegationUnsupported { role: self.name.clone() });
        }
        let tools = catalog.subset(&self.capabilities).map_err(|missing| {
            RoleError::UnknownCapability { role: self.name.clone(), missing }
        })?;
        Ok(BoundRole {
            name: self.name.clone(),
            persona: self.persona.render(vars),
            tools: Arc::new(tools),
            max_iterations: self.max_iterations.max(1),
            model: self.model.clone(),
            temperature: self.temperature,
            throttle: Arc::new(CallThrottle::per_minute(self.max_calls_per_minute)),
        })
    }
}

/// A role bound to one job. Never shared across jobs.
#[derive(Clone)]
pub struct BoundRole {
    pub name: String,
    pub persona: Persona,
    pub tools: Arc<ToolRegistry>,
    pub max_iterations: usize,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub throttle: Arc<CallThrottle>,
}

impl std::fmt::Debug for BoundRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRole")
            .field("name", &self.name)
            .field("tools", &self.tools.list())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
