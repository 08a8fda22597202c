//! Task graph: nodes, validation, and stable topological resolution

use fincrew_agent::{render_template, TemplateVars};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// How a node runs relative to the pipeline. Only synchronous execution is
/// supported: a node's result is awaited before dependents start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Synchronous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    /// Instruction template; may reference job variables such as `{query}`.
    pub description: String,
    pub expected_output: String,
    pub role: String,
    /// Upstream nodes, in the order their results are presented as context.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub human_input: bool,
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl TaskNode {
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            role: role.into(),
            depends_on: Vec::new(),
            human_input: false,
            mode: ExecutionMode::Synchronous,
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("task graph is empty")]
    Empty,

    #[error("duplicate task '{0}'")]
    DuplicateNode(String),

    #[error("task '{node}' depends on unknown task '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("task graph has a cycle through: {}", remaining.join(", "))]
    Cyclic { remaining: Vec<String> },

    #[error("task '{0}' requires human input, which this service cannot collect")]
    HumanInputUnsupported(String),

    #[error("task '{node}' is bound to unknown role '{role}'")]
    UnknownRole { node: String, role: String },

    #[error("designated terminal task '{0}' is not in the graph")]
    UnknownTerminal(String),

    #[error("task '{node}' was realized before dependency '{dependency}' produced a result")]
    DependencyNotReady { node: String, dependency: String },
}

/// The instruction and context a role receives for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedTask {
    pub node_id: String,
    pub role: String,
    pub instruction: String,
    pub context: String,
}

/// Nodes in declaration order, plus an optional designated terminal node.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    terminal: Option<String>,
}

impl TaskGraph {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, node: TaskNode) -> Result<(), GraphError> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn with_node(mut self, node: TaskNode) -> Result<Self, GraphError> {
        self.add(node)?;
        Ok(self)
    }

    /// Designate the node whose result is the pipeline output.
    pub fn with_terminal(mut self, id: impl Into<String>) -> Self {
        self.terminal = Some(id.into());
        self
    }

    pub fn nodes(&self) -> &[TaskNode] { &self.nodes }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Ids of nodes that declare `id` as a dependency.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.iter().any(|d| d == id))
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Stable topological order: among ready nodes, declaration order wins.
    pub fn resolve(&self) -> Result<Vec<String>, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            let mut seen = HashSet::new();
            for dep in &node.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(GraphError::UnknownDependency {
                        node: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                if seen.insert(dep.as_str()) {
                    *indegree.entry(node.id.as_str()).or_default() += 1;
                }
            }
        }

        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());
        let mut emitted: HashSet<&str> = HashSet::new();
        while order.len() < self.nodes.len() {
            let next = self.nodes.iter().find(|n| {
                !emitted.contains(n.id.as_str())
                    && indegree.get(n.id.as_str()).copied().unwrap_or(0) == 0
            });
            let Some(next) = next else {
                let remaining = self
                    .nodes
                    .iter()
                    .filter(|n| !emitted.contains(n.id.as_str()))
                    .map(|n| n.id.clone())
                    .collect();
                return Err(GraphError::Cyclic { remaining });
            };

            emitted.insert(next.id.as_str());
            order.push(next.id.clone());
            for dependent in self.dependents(&next.id) {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        Ok(order)
    }

    /// Full validation against the set of known roles. Returns the resolved order.
    pub fn validate(&self, has_role: impl Fn(&str) -> bool) -> Result<Vec<String>, GraphError> {
        for node in &self.nodes {
            if node.human_input {
                return Err(GraphError::HumanInputUnsupported(node.id.clone()));
            }
            if !has_role(&node.role) {
                return Err(GraphError::UnknownRole { node: node.id.clone(), role: node.role.clone() });
            }
        }
        let order = self.resolve()?;
        self.terminal(&order)?;
        Ok(order)
    }

    /// The node whose result is the pipeline output: the designated one, or
    /// else the last node in `order` that nothing depends on.
    pub fn terminal(&self, order: &[String]) -> Result<String, GraphError> {
        if let Some(id) = &self.terminal {
            return match self.node(id) {
                Some(_) => Ok(id.clone()),
                None => Err(GraphError::UnknownTerminal(id.clone())),
            };
        }
        order
            .iter()
            .rev()
            .find(|id| self.dependents(id).is_empty())
            .cloned()
            .ok_or(GraphError::Empty)
    }
}

/// Build the instruction and context for `node` from job variables and the
/// results of its dependencies, in the node's declared dependency order.
pub fn realize(
    node: &TaskNode,
    vars: &TemplateVars,
    results: &BTreeMap<String, String>,
) -> Result<RealizedTask, GraphError> {
    let mut instruction = render_template(&node.description, vars);
    let expected = render_template(&node.expected_output, vars);
    if !expected.trim().is_empty() {
        instruction.push_str("\n\nExpected output: ");
        instruction.push_str(&expected);
    }

    let mut blocks = Vec::with_capacity(node.depends_on.len());
    for dep in &node.depends_on {
        let result = results.get(dep).ok_or_else(|| GraphError::DependencyNotReady {
            node: node.id.clone(),
            dependency: dep.clone(),
        })?;
        blocks.push(format!("[{}]\n{}", dep, result));
    }

    Ok(RealizedTask {
        node_id: node.id.clone(),
        role: node.role.clone(),
        instruction,
        context: blocks.join("\n\n"),
    })
}
