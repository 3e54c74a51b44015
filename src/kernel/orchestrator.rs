//! Task orchestration - capability-indexed dispatch with async handles.
//!
//! The Orchestrator:
//!   - Selects a module for each submitted task (direct target or best
//!     Active module advertising the capability)
//!   - Resolves the handler from a capability-indexed registry
//!   - Spawns execution and hands the caller a `TaskHandle`
//!   - Records completions in the module's bounded history
//!
//! Execution failures surface as `TaskExecutionFailed` and never touch
//! module health; only the health monitor changes module state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;

use super::registry::ModuleRegistry;
use super::types::{ModuleType, TaskRecord};
use crate::types::{Error, ModuleId, OrchestratorConfig, Result, TaskId};

// =============================================================================
// Task Types
// =============================================================================

/// Where a task should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTarget {
    /// Any Active module advertising the required capability.
    AnyCapable,
    /// A specific module.
    Module(ModuleId),
}

/// A unit of work for a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub capability: String,
    pub payload: serde_json::Value,
    pub target: TaskTarget,
}

impl Task {
    /// Task for any capable module.
    pub fn new(capability: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            capability: capability.into(),
            payload,
            target: TaskTarget::AnyCapable,
        }
    }

    /// Task routed to a specific module.
    pub fn for_module(
        module_id: ModuleId,
        capability: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: TaskId::new(),
            capability: capability.into(),
            payload,
            target: TaskTarget::Module(module_id),
        }
    }
}

/// Result of a completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub module_id: ModuleId,
    pub result: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// Execution context handed to handlers.
///
/// Cancellation after dispatch is cooperative: handlers observe the token,
/// nothing preempts them.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub module_id: ModuleId,
    pub module_type: ModuleType,
    pub cancellation: CancellationToken,
}

/// Handle returned by `submit`. The caller awaits the outcome or cancels.
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub module_id: ModuleId,
    cancellation: CancellationToken,
    rx: oneshot::Receiver<Result<TaskOutcome>>,
}

impl TaskHandle {
    /// Request cancellation. Before dispatch this aborts the task; after
    /// dispatch the handler must observe the token.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await the task outcome.
    pub async fn outcome(self) -> Result<TaskOutcome> {
        self.rx
            .await
            .map_err(|_| Error::internal("task worker dropped without reporting"))?
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// A capability implementation. Modules execute tasks through handlers
/// registered per capability; per-type defaults cover the rest.
#[async_trait]
pub trait TaskHandler: Send + Sync + std::fmt::Debug {
    async fn execute(&self, task: &Task, ctx: &TaskContext) -> Result<serde_json::Value>;
}

/// Built-in handler: acknowledges the capability invocation with the
/// module-type action tag.
#[derive(Debug)]
struct BuiltinHandler {
    action: &'static str,
}

#[async_trait]
impl TaskHandler for BuiltinHandler {
    async fn execute(&self, task: &Task, ctx: &TaskContext) -> Result<serde_json::Value> {
        if ctx.cancellation.is_cancelled() {
            return Err(Error::cancelled(format!("task {} cancelled", task.id)));
        }
        Ok(serde_json::json!({
            "action": self.action,
            "capability": task.capability,
            "module_id": ctx.module_id.as_str(),
        }))
    }
}

/// Action tag for a module type's built-in handler.
fn default_action(module_type: ModuleType) -> &'static str {
    match module_type {
        ModuleType::ProcessManager => "process_operation",
        ModuleType::MemoryManager => "memory_operation",
        ModuleType::FileSystem => "storage_operation",
        ModuleType::NetworkManager => "network_operation",
        ModuleType::SecuritySystem => "security_operation",
        ModuleType::UiFramework => "interface_operation",
        ModuleType::DatabaseEngine => "query_operation",
        ModuleType::AiManager => "inference_operation",
    }
}

// =============================================================================
// Workflow Types
// =============================================================================

/// One module's contribution to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub module_id: ModuleId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combined result of running a task across every capable module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub capability: String,
    pub entries: Vec<WorkflowEntry>,
    /// min(1.0, success_rate * boost); placeholder scoring policy.
    pub confidence: f64,
    pub completed_at: DateTime<Utc>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Task orchestrator - dispatches tasks to modules by capability.
#[derive(Debug)]
pub struct TaskOrchestrator {
    registry: Arc<RwLock<ModuleRegistry>>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
    config: OrchestratorConfig,
}

impl TaskOrchestrator {
    pub fn new(registry: Arc<RwLock<ModuleRegistry>>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a handler for a capability, replacing any previous one.
    pub async fn register_handler(&self, capability: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let capability = capability.into();
        tracing::debug!(%capability, "task handler registered");
        self.handlers.write().await.insert(capability, handler);
    }

    /// Submit a task. Returns a handle immediately; execution is spawned.
    pub async fn submit(&self, task: Task) -> Result<TaskHandle> {
        let (module_id, module_type) = self.select_module(&task).await?;

        let handler = {
            let handlers = self.handlers.read().await;
            handlers
                .get(&task.capability)
                .cloned()
                .unwrap_or_else(|| {
                    Arc::new(BuiltinHandler {
                        action: default_action(module_type),
                    }) as Arc<dyn TaskHandler>
                })
        };

        let cancellation = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let ctx = TaskContext {
            module_id: module_id.clone(),
            module_type,
            cancellation: cancellation.clone(),
        };

        tracing::debug!(task_id = %task.id, module_id = %module_id, capability = %task.capability, "task dispatched");

        let registry = self.registry.clone();
        let handle_id = task.id.clone();
        tokio::spawn(async move {
            // Cancellation before dispatch aborts without touching the module.
            if ctx.cancellation.is_cancelled() {
                let _ = tx.send(Err(Error::cancelled(format!(
                    "task {} cancelled before dispatch",
                    task.id
                ))));
                return;
            }

            let executed = handler.execute(&task, &ctx).await;
            let success = executed.is_ok();
            let completed_at = Utc::now();

            {
                let mut registry = registry.write().await;
                let _ = registry.record_execution(
                    &ctx.module_id,
                    TaskRecord {
                        task_id: task.id.clone(),
                        capability: task.capability.clone(),
                        success,
                        completed_at,
                    },
                );
            }

            let outcome = match executed {
                Ok(result) => Ok(TaskOutcome {
                    task_id: task.id.clone(),
                    module_id: ctx.module_id.clone(),
                    result,
                    completed_at,
                }),
                Err(err) => Err(Error::task_execution_failed(
                    ctx.module_id.clone(),
                    err.to_string(),
                )),
            };
            let _ = tx.send(outcome);
        });

        Ok(TaskHandle {
            task_id: handle_id,
            module_id,
            cancellation,
            rx,
        })
    }

    /// Run a task on every Active module advertising the capability and
    /// combine the outcomes.
    pub async fn submit_workflow(
        &self,
        capability: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<WorkflowOutcome> {
        let capability = capability.into();
        let candidates: Vec<ModuleId> = {
            let registry = self.registry.read().await;
            registry
                .active_with_capability(&capability)
                .iter()
                .map(|m| m.id.clone())
                .collect()
        };

        if candidates.is_empty() {
            return Err(Error::no_capable_module(format!(
                "no active module advertises capability '{capability}'"
            )));
        }

        let mut handles = Vec::with_capacity(candidates.len());
        for module_id in candidates {
            let task = Task::for_module(module_id, capability.clone(), payload.clone());
            handles.push(self.submit(task).await?);
        }

        let outcomes = futures::future::join_all(handles.into_iter().map(|handle| async move {
            let module_id = handle.module_id.clone();
            (module_id, handle.outcome().await)
        }))
        .await;

        let mut entries = Vec::with_capacity(outcomes.len());
        for (module_id, outcome) in outcomes {
            match outcome {
                Ok(outcome) => entries.push(WorkflowEntry {
                    module_id,
                    success: true,
                    result: Some(outcome.result),
                    error: None,
                }),
                Err(err) => entries.push(WorkflowEntry {
                    module_id,
                    success: false,
                    result: None,
                    error: Some(err.to_string()),
                }),
            }
        }

        let success_rate =
            entries.iter().filter(|e| e.success).count() as f64 / entries.len() as f64;
        let confidence = (success_rate * self.config.workflow_confidence_boost).min(1.0);

        Ok(WorkflowOutcome {
            capability,
            entries,
            confidence,
            completed_at: Utc::now(),
        })
    }

    /// Pick the executing module for a task.
    ///
    /// Direct target: `NotFound` if absent or Failed, `CapacityRejected` if
    /// the module cannot accept new dispatch. Capability target: Active
    /// modules only, highest health score first, then earliest registration.
    async fn select_module(&self, task: &Task) -> Result<(ModuleId, ModuleType)> {
        let registry = self.registry.read().await;

        match &task.target {
            TaskTarget::Module(module_id) => {
                let module = registry.get(module_id)?;
                if module.state.is_terminal() {
                    return Err(Error::not_found(format!(
                        "module {} is failed",
                        module_id
                    )));
                }
                if !module.state.can_dispatch() {
                    return Err(Error::capacity_rejected(format!(
                        "module {} cannot accept dispatch in state {:?}",
                        module_id, module.state
                    )));
                }
                if !module.has_capability(&task.capability) {
                    return Err(Error::no_capable_module(format!(
                        "module {} does not advertise capability '{}'",
                        module_id, task.capability
                    )));
                }
                Ok((module.id.clone(), module.module_type))
            }
            TaskTarget::AnyCapable => {
                // Candidates come back in registration order; strict
                // comparison keeps the earliest on score ties.
                let mut best: Option<(&ModuleId, ModuleType, u32)> = None;
                for module in registry.active_with_capability(&task.capability) {
                    match best {
                        Some((_, _, score)) if module.health_score <= score => {}
                        _ => best = Some((&module.id, module.module_type, module.health_score)),
                    }
                }
                best.map(|(id, ty, _)| (id.clone(), ty)).ok_or_else(|| {
                    Error::no_capable_module(format!(
                        "no active module advertises capability '{}'",
                        task.capability
                    ))
                })
            }
        }
    }
}
