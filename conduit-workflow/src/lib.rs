#![deny(missing_docs)]
//! Deterministic executor for a workflow: a DAG of tool-call and
//! conditional nodes.
//!
//! Planning computes a topological order over the node graph up front and
//! fails fast with [`WorkflowError::InvalidWorkflow`] if it isn't a DAG.
//! Execution then walks that order once, in a single pass: each node
//! checks cancellation, then checks its direct dependencies — an errored
//! dependency always skips the node, a skipped dependency only skips it
//! if every other dependency is also skipped (no independent path to run
//! through) — resolves its parameter template, and either evaluates a
//! predicate or dispatches a tool call through the Tool Client. A node
//! that isn't skipped outright but references a skipped ancestor's
//! output by name still fails at parameter-resolution time. There is no
//! parallel-level batching
//! here — nodes with no dependency relationship still run one after
//! another, in topological order, matching the sequential walk this
//! engine is specified to perform.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_event_bus::{EventBus, ExecutionEvent};
use conduit_tool_catalog::ToolCatalog;
use conduit_tool_client::{ToolClient, ToolClientError};
use layer0::id::{ExecutionId, ProviderName, WorkflowId};
use layer0::ErrorKind;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long a single tool-call node is allowed to run before timing out.
const NODE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Identifier for a node, unique within the workflow definition it belongs
/// to (unlike the process-wide typed ids in `layer0::id`).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, serde::Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Build a node id from anything that converts to `String`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parameter value: a literal, an environment-variable reference, a
/// caller-supplied request parameter, or a dotted-path reference into an
/// ancestor node's JSON output.
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// A literal JSON value, used as-is.
    Literal(serde_json::Value),
    /// An environment variable, with an optional default if unset.
    ///
    /// Reads process-wide state set at deploy time (API keys, hostnames) —
    /// not a channel for per-request input. Use [`ParamValue::Param`] for
    /// values the caller supplies with each run.
    EnvVar {
        /// Variable name.
        name: String,
        /// Value used when the variable is unset.
        default: Option<serde_json::Value>,
    },
    /// A value from the caller's per-request parameter map, with an
    /// optional default if the map doesn't contain it.
    Param {
        /// Key into the request's parameter map.
        name: String,
        /// Value used when the key is absent.
        default: Option<serde_json::Value>,
    },
    /// A dotted path into an ancestor node's output (`""` means the whole value).
    NodeRef {
        /// The ancestor node's id.
        node: NodeId,
        /// Dotted path into that node's JSON result.
        path: String,
    },
}

/// A comparison operator for a [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than (numeric operands only).
    Gt,
    /// Greater than or equal (numeric operands only).
    Gte,
    /// Less than (numeric operands only).
    Lt,
    /// Less than or equal (numeric operands only).
    Lte,
}

/// A predicate a conditional node evaluates against already-finalized
/// ancestor results.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Compare two resolved values.
    Compare {
        /// Left-hand operand.
        left: ParamValue,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand operand.
        right: ParamValue,
    },
    /// Whether a value resolves to something other than JSON null.
    Exists {
        /// The value whose presence is being checked.
        value: ParamValue,
    },
}

/// What a node does once its dependencies are satisfied.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Dispatch a tool call through the Tool Client.
    ToolCall {
        /// Provider name resolved against the Tool Catalog.
        provider: ProviderName,
        /// Tool name within that provider.
        tool: String,
        /// Parameter template resolved at dispatch time.
        params: HashMap<String, ParamValue>,
    },
    /// Gate downstream nodes on a predicate over ancestor results.
    Conditional {
        /// The predicate to evaluate.
        predicate: Predicate,
    },
}

/// One node in a workflow definition.
#[derive(Debug, Clone)]
pub struct NodeDefinition {
    /// This node's id, unique within the workflow.
    pub id: NodeId,
    /// What this node does.
    pub kind: NodeKind,
    /// Node ids this node depends on.
    pub depends_on: Vec<NodeId>,
}

/// A workflow: a named DAG of nodes.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    /// Unique identifier for this workflow definition.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Nodes, in declaration order (not necessarily topological order).
    pub nodes: Vec<NodeDefinition>,
}

/// Errors from planning or executing a workflow.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The node graph contains a cycle, or a node depends on an id that
    /// does not exist in the definition.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
}

impl WorkflowError {
    /// Widen to the shared error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidWorkflow(_) => ErrorKind::InvalidWorkflow,
        }
    }
}

/// Terminal status of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node ran (or its predicate evaluated true) without error.
    Completed,
    /// Skipped because a direct dependency errored, because every direct
    /// dependency was itself skipped, or because this node is itself a
    /// conditional whose predicate evaluated false.
    Skipped,
    /// The node's tool call failed, or its parameter template did not resolve.
    Error,
}

/// Outcome of a single node.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeResult {
    /// The node's terminal status.
    pub status: NodeStatus,
    /// The node's JSON-shaped output. `null` for skipped nodes; `true` for
    /// a conditional node whose predicate held.
    pub output: serde_json::Value,
    /// Error message, set only when `status` is [`NodeStatus::Error`].
    pub error: Option<String>,
}

impl NodeResult {
    fn completed(output: serde_json::Value) -> Self {
        Self {
            status: NodeStatus::Completed,
            output,
            error: None,
        }
    }

    fn skipped() -> Self {
        Self {
            status: NodeStatus::Skipped,
            output: serde_json::Value::Null,
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Error,
            output: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Outcome of a whole workflow run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowRunOutput {
    /// Boundary status string: `completed`, `completed-with-errors`, or `cancelled`.
    pub status: String,
    /// Per-node results keyed by node id.
    pub node_outputs: HashMap<NodeId, NodeResult>,
}

/// Executes [`WorkflowDefinition`]s against a shared Tool Catalog, Tool
/// Client, and Event Bus.
pub struct WorkflowEngine {
    catalog: Arc<ToolCatalog>,
    tool_client: Arc<ToolClient>,
    events: Arc<EventBus>,
}

impl WorkflowEngine {
    /// Build an engine over a shared catalog, tool client, and event bus.
    pub fn new(catalog: Arc<ToolCatalog>, tool_client: Arc<ToolClient>, events: Arc<EventBus>) -> Self {
        Self {
            catalog,
            tool_client,
            events,
        }
    }

    /// Plan and execute `workflow` under `execution_id`, publishing
    /// progress to the event bus and honoring `cancel`.
    ///
    /// `request_params` is the caller-supplied parameter map a run-workflow
    /// request carries; [`ParamValue::Param`] references resolve against it.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        execution_id: ExecutionId,
        cancel: CancellationToken,
        request_params: &HashMap<String, serde_json::Value>,
    ) -> Result<WorkflowRunOutput, WorkflowError> {
        let order = plan(workflow)?;
        let node_map: HashMap<&NodeId, &NodeDefinition> =
            workflow.nodes.iter().map(|n| (&n.id, n)).collect();

        let mut results: HashMap<NodeId, NodeResult> = HashMap::new();
        let mut any_error = false;
        let mut cancelled = false;

        for node_id in &order {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let node = node_map[node_id];
            if depends_on_skipped(node, &results) {
                results.insert(node_id.clone(), NodeResult::skipped());
                continue;
            }

            let result = match &node.kind {
                NodeKind::Conditional { predicate } => {
                    if evaluate_predicate(predicate, &results, request_params) {
                        NodeResult::completed(serde_json::Value::Bool(true))
                    } else {
                        NodeResult::skipped()
                    }
                }
                NodeKind::ToolCall { provider, tool, params } => {
                    self.dispatch_tool_call(provider, tool, params, &results, request_params, &execution_id, &cancel)
                        .await
                }
            };

            if result.status == NodeStatus::Error {
                any_error = true;
            }
            results.insert(node_id.clone(), result);
        }

        let status = if cancelled {
            "cancelled"
        } else if any_error {
            "completed-with-errors"
        } else {
            "completed"
        };

        Ok(WorkflowRunOutput {
            status: status.to_string(),
            node_outputs: results,
        })
    }

    async fn dispatch_tool_call(
        &self,
        provider: &ProviderName,
        tool: &str,
        params: &HashMap<String, ParamValue>,
        results: &HashMap<NodeId, NodeResult>,
        request_params: &HashMap<String, serde_json::Value>,
        execution_id: &ExecutionId,
        cancel: &CancellationToken,
    ) -> NodeResult {
        let mut resolved = serde_json::Map::new();
        for (key, value) in params {
            match resolve_param(value, results, request_params) {
                Ok(v) => {
                    resolved.insert(key.clone(), v);
                }
                Err(e) => return NodeResult::error(e),
            }
        }

        let entry = match self.catalog.resolve(provider) {
            Ok(entry) => entry,
            Err(e) => return NodeResult::error(e.to_string()),
        };

        let qualified_name = format!("{provider}__{tool}");
        let arguments = serde_json::Value::Object(resolved);
        self.events.publish(
            execution_id,
            ExecutionEvent::ToolExecution {
                tool_name: qualified_name.clone(),
                input: arguments.clone(),
                iteration: 0,
            },
        );

        let deadline = tokio::time::Instant::now() + NODE_TIMEOUT;
        match self.tool_client.call(&entry.endpoint, tool, arguments, deadline, cancel).await {
            Ok(output) => {
                self.events.publish(
                    execution_id,
                    ExecutionEvent::ToolResult {
                        tool_name: qualified_name,
                        result: output.to_string(),
                        success: true,
                        iteration: 0,
                    },
                );
                NodeResult::completed(output)
            }
            Err(e) => {
                self.events.publish(
                    execution_id,
                    ExecutionEvent::ToolResult {
                        tool_name: qualified_name,
                        result: e.to_string(),
                        success: false,
                        iteration: 0,
                    },
                );
                NodeResult::error(error_message(&e))
            }
        }
    }
}

fn error_message(e: &ToolClientError) -> String {
    e.to_string()
}

/// Whether `node` should be skipped outright, without attempting it.
///
/// An errored dependency always propagates: a failure skips every
/// descendant reachable through it. A *skipped* dependency (a false
/// conditional) only propagates to descendants that are exclusively
/// reachable through it — a node with an independent completed
/// dependency still runs, and only errors if it actually references the
/// skipped branch's output (see [`resolve_param`]'s non-completed-node
/// check). Since results are computed in topological order, a direct
/// dependency's status already reflects any transitive skip/error, so
/// checking direct dependencies alone is sufficient.
fn depends_on_skipped(node: &NodeDefinition, results: &HashMap<NodeId, NodeResult>) -> bool {
    if node.depends_on.is_empty() {
        return false;
    }
    let statuses: Vec<Option<NodeStatus>> = node.depends_on.iter().map(|dep| results.get(dep).map(|r| r.status)).collect();
    let any_errored = statuses.iter().any(|s| *s == Some(NodeStatus::Error));
    let all_skipped = statuses.iter().all(|s| *s == Some(NodeStatus::Skipped));
    any_errored || all_skipped
}

/// Compute a topological order over the workflow's nodes, failing fast if
/// the graph is not a DAG or references an unknown node id.
fn plan(workflow: &WorkflowDefinition) -> Result<Vec<NodeId>, WorkflowError> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::new();

    for node in &workflow.nodes {
        let idx = graph.add_node(node.id.clone());
        index_of.insert(node.id.clone(), idx);
    }

    for node in &workflow.nodes {
        let to_idx = index_of[&node.id];
        for dep in &node.depends_on {
            let from_idx = index_of.get(dep).ok_or_else(|| {
                WorkflowError::InvalidWorkflow(format!("node {} depends on unknown node {}", node.id, dep))
            })?;
            graph.add_edge(*from_idx, to_idx, ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let offender = &graph[cycle.node_id()];
        WorkflowError::InvalidWorkflow(format!("cycle through node {offender}"))
    })?;

    Ok(order.into_iter().map(|idx| graph[idx].clone()).collect())
}

/// Resolve a parameter for a tool-call node. A reference to an ancestor
/// that is missing, skipped, or errored is an error here — tool-call
/// parameters must resolve fully or the node fails.
fn resolve_param(
    value: &ParamValue,
    results: &HashMap<NodeId, NodeResult>,
    request_params: &HashMap<String, serde_json::Value>,
) -> Result<serde_json::Value, String> {
    match value {
        ParamValue::Literal(v) => Ok(v.clone()),
        ParamValue::EnvVar { name, default } => match std::env::var(name) {
            Ok(v) => Ok(serde_json::Value::String(v)),
            Err(_) => default
                .clone()
                .ok_or_else(|| format!("environment variable {name} is unset and has no default")),
        },
        ParamValue::Param { name, default } => match request_params.get(name) {
            Some(v) => Ok(v.clone()),
            None => default
                .clone()
                .ok_or_else(|| format!("request parameter {name} was not supplied and has no default")),
        },
        ParamValue::NodeRef { node, path } => {
            let result = results
                .get(node)
                .ok_or_else(|| format!("reference to unresolved node {node}"))?;
            if result.status != NodeStatus::Completed {
                return Err(format!("reference to non-completed node {node}"));
            }
            navigate(&result.output, path).ok_or_else(|| format!("path {path} not found in node {node}'s output"))
        }
    }
}

/// Resolve a parameter for a conditional predicate. A reference to a
/// skipped, errored, or missing ancestor resolves to `null` instead of
/// erroring — a predicate touching a skipped branch should evaluate to
/// false, not fail the workflow.
fn resolve_param_lenient(
    value: &ParamValue,
    results: &HashMap<NodeId, NodeResult>,
    request_params: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
    resolve_param(value, results, request_params).unwrap_or(serde_json::Value::Null)
}

fn navigate(value: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn evaluate_predicate(
    predicate: &Predicate,
    results: &HashMap<NodeId, NodeResult>,
    request_params: &HashMap<String, serde_json::Value>,
) -> bool {
    match predicate {
        Predicate::Exists { value } => !resolve_param_lenient(value, results, request_params).is_null(),
        Predicate::Compare { left, op, right } => {
            let l = resolve_param_lenient(left, results, request_params);
            let r = resolve_param_lenient(right, results, request_params);
            compare(&l, *op, &r)
        }
    }
}

fn compare(l: &serde_json::Value, op: CompareOp, r: &serde_json::Value) -> bool {
    match op {
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
            let (Some(lf), Some(rf)) = (l.as_f64(), r.as_f64()) else {
                return false;
            };
            match op {
                CompareOp::Gt => lf > rf,
                CompareOp::Gte => lf >= rf,
                CompareOp::Lt => lf < rf,
                CompareOp::Lte => lf <= rf,
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            }
        }
    }
}
