//! Kernel - the supervisory orchestration facade.
//!
//! The Kernel owns all mutable state and exposes the collaborator-facing
//! API. Subsystems (ledger, registry, orchestrator, monitor) are plain
//! structs owned by the Kernel, not separate actors; the monitor and the
//! pattern engine run as background loops the Kernel starts and stops.

pub mod decision;
pub mod ledger;
pub mod monitor;
pub mod orchestrator;
pub mod registry;
pub mod types;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::events::{EventHub, KernelEvent};
use crate::fabric::{Fabric, Message};
use crate::patterns::{
    AdaptationSuggestion, InteractionEvent, PatternCategory, PatternEngine, PatternReport,
};
use crate::types::{Config, ModuleId, Result};

use ledger::ResourceLedger;
use monitor::{BackupHook, MetricsProvider, MonitorService, NominalMetrics, NoopBackup};
use orchestrator::{Task, TaskHandle, TaskHandler, TaskOrchestrator, WorkflowOutcome};
use registry::{ModuleRegistry, RegistryPolicy};
use types::{HealthReport, Module, ModuleType, ResourceUtilization};

/// Snapshot returned by `system_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    pub version: String,
    pub module_count: usize,
    pub channel_count: usize,
}

/// The orchestration kernel.
#[derive(Debug)]
pub struct Kernel {
    registry: Arc<RwLock<ModuleRegistry>>,
    fabric: Arc<Fabric>,
    orchestrator: TaskOrchestrator,
    events: Arc<EventHub>,
    monitor: MonitorService,
    patterns: PatternEngine,
    running: bool,
}

impl Kernel {
    /// Build a kernel with the default metrics provider and backup hook.
    pub fn new(config: Config) -> Self {
        Self::with_providers(config, Arc::new(NominalMetrics), Arc::new(NoopBackup))
    }

    /// Build a kernel with injected metrics and backup collaborators.
    pub fn with_providers(
        config: Config,
        metrics: Arc<dyn MetricsProvider>,
        backup: Arc<dyn BackupHook>,
    ) -> Self {
        let ledger = ResourceLedger::new(config.pool.clone());
        let registry = Arc::new(RwLock::new(ModuleRegistry::new(
            ledger,
            RegistryPolicy {
                recovery_baseline: config.monitor.recovery_baseline,
                max_recovery_attempts: config.monitor.max_recovery_attempts,
                history_capacity: config.orchestrator.history_capacity,
            },
        )));
        let fabric = Arc::new(Fabric::new(config.fabric.channel_capacity));
        let events = Arc::new(EventHub::new());
        let orchestrator = TaskOrchestrator::new(registry.clone(), config.orchestrator.clone());
        let monitor = MonitorService::new(
            registry.clone(),
            events.clone(),
            metrics,
            backup,
            config.monitor.clone(),
        );
        let patterns = PatternEngine::new(config.patterns.clone());

        Self {
            registry,
            fabric,
            orchestrator,
            events,
            monitor,
            patterns,
            running: false,
        }
    }

    /// Start the monitor sweep and the pattern analysis loops.
    pub fn start(&mut self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = vec![self.monitor.start()];
        handles.extend(self.patterns.start());
        self.running = true;
        tracing::info!("kernel started");
        handles
    }

    /// Stop all background loops.
    pub fn shutdown(&mut self) {
        self.monitor.stop();
        self.patterns.stop();
        self.running = false;
        tracing::info!("kernel stopped");
    }

    // =========================================================================
    // Inbound API
    // =========================================================================

    /// Register a module and attach its fabric endpoint.
    pub async fn register_module(
        &self,
        module_type: ModuleType,
        capabilities: Vec<String>,
    ) -> Result<ModuleId> {
        let id = self
            .registry
            .write()
            .await
            .register(module_type, capabilities)?;
        self.fabric.attach(id.clone()).await;
        Ok(id)
    }

    /// Unregister a module: release resources, drop its channels.
    pub async fn unregister_module(&self, module_id: &ModuleId) -> Result<()> {
        self.registry.write().await.unregister(module_id)?;
        self.fabric.detach(module_id).await;
        Ok(())
    }

    /// Recover a module (collaborator-initiated).
    pub async fn recover_module(&self, module_id: &ModuleId) -> Result<()> {
        self.registry.write().await.recover(module_id)
    }

    /// Snapshot of a module.
    pub async fn module(&self, module_id: &ModuleId) -> Result<Module> {
        self.registry.read().await.snapshot(module_id)
    }

    /// Submit a task for execution; returns a handle immediately.
    pub async fn submit_task(&self, task: Task) -> Result<TaskHandle> {
        self.orchestrator.submit(task).await
    }

    /// Run a task across every capable module and combine the outcomes.
    pub async fn submit_workflow(
        &self,
        capability: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<WorkflowOutcome> {
        self.orchestrator.submit_workflow(capability, payload).await
    }

    /// Install a handler for a capability.
    pub async fn register_handler(
        &self,
        capability: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) {
        self.orchestrator.register_handler(capability, handler).await;
    }

    /// Send a message between modules over the fabric.
    pub async fn send(&self, from: &ModuleId, to: &ModuleId, message: Message) -> Result<()> {
        self.fabric.send(from, to, message).await
    }

    /// Drain pending messages for a module.
    pub async fn drain(&self, to: &ModuleId) -> Result<Vec<Message>> {
        self.fabric.drain(to).await
    }

    /// Append an interaction event to the pattern engine's log.
    pub async fn record_interaction(&self, event: InteractionEvent) {
        self.patterns.record(event).await;
    }

    /// Kernel-level status summary.
    pub async fn system_status(&self) -> SystemStatus {
        SystemStatus {
            status: if self.running { "active" } else { "initializing" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            module_count: self.registry.read().await.count(),
            channel_count: self.fabric.channel_count().await,
        }
    }

    // =========================================================================
    // Outbound API
    // =========================================================================

    /// Subscribe to kernel events (degradations, unrecoverable modules,
    /// backup requests).
    pub async fn subscribe_events(&self) -> tokio::sync::mpsc::UnboundedReceiver<KernelEvent> {
        self.events.subscribe().await
    }

    /// Latest health report for a module.
    pub async fn health_report(&self, module_id: &ModuleId) -> Option<HealthReport> {
        self.monitor.latest_report(module_id).await
    }

    /// Latest pattern report for a category.
    pub async fn pattern_report(&self, category: PatternCategory) -> Option<PatternReport> {
        self.patterns.latest(category).await
    }

    /// Latest adaptation suggestions.
    pub async fn adaptation_suggestions(&self) -> Vec<AdaptationSuggestion> {
        self.patterns.adaptation_suggestions().await
    }

    /// Pool-level resource utilization.
    pub async fn resource_utilization(&self) -> ResourceUtilization {
        self.registry.read().await.utilization()
    }

    /// Run one monitor sweep synchronously. Primarily for tests and
    /// embedders that drive their own cadence.
    pub async fn sweep_once(&self) -> monitor::SweepStats {
        self.monitor.sweep_once().await
    }

    /// Run one pattern-analysis, behavior, and adaptation tick synchronously.
    pub async fn analyze_once(&self) {
        self.patterns.analysis_once().await;
        self.patterns.behavior_once().await;
        self.patterns.adaptation_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_status_reflects_modules_and_channels() {
        let mut kernel = Kernel::new(Config::default());

        let status = kernel.system_status().await;
        assert_eq!(status.status, "initializing");
        assert_eq!(status.module_count, 0);
        assert_eq!(status.channel_count, 0);

        let a = kernel
            .register_module(ModuleType::ProcessManager, vec![])
            .await
            .unwrap();
        let b = kernel
            .register_module(ModuleType::NetworkManager, vec![])
            .await
            .unwrap();
        kernel
            .send(&a, &b, Message::new("status-request", json!({})))
            .await
            .unwrap();

        let handles = kernel.start();
        let status = kernel.system_status().await;
        assert_eq!(status.status, "active");
        assert_eq!(status.module_count, 2);
        assert_eq!(status.channel_count, 1);

        kernel.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unregister_detaches_endpoint() {
        let kernel = Kernel::new(Config::default());
        let a = kernel
            .register_module(ModuleType::ProcessManager, vec![])
            .await
            .unwrap();
        let b = kernel
            .register_module(ModuleType::MemoryManager, vec![])
            .await
            .unwrap();

        kernel
            .send(&a, &b, Message::new("ping", json!({})))
            .await
            .unwrap();
        kernel.unregister_module(&b).await.unwrap();

        let err = kernel
            .send(&a, &b, Message::new("ping", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::UnknownDestination(_)));
        assert_eq!(kernel.system_status().await.channel_count, 0);
    }

    #[tokio::test]
    async fn test_facade_task_round_trip() {
        let kernel = Kernel::new(Config::default());
        kernel
            .register_module(ModuleType::SecuritySystem, vec![])
            .await
            .unwrap();

        let handle = kernel
            .submit_task(Task::new("threat-detection", json!({"scan": "deep"})))
            .await
            .unwrap();
        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome.result["action"], "security_operation");
    }

    #[tokio::test]
    async fn test_facade_pattern_queries() {
        let kernel = Kernel::new(Config::default());
        for i in 0..6 {
            kernel
                .record_interaction(
                    InteractionEvent::new(format!("app{}", i % 2), "open").with_location("home"),
                )
                .await;
        }

        kernel.analyze_once().await;

        assert!(kernel
            .pattern_report(PatternCategory::Temporal)
            .await
            .is_some());
        match kernel.pattern_report(PatternCategory::Spatial).await {
            Some(PatternReport::Spatial(report)) => {
                assert_eq!(report.top_locations[0].key, "home");
            }
            other => panic!("expected spatial report, got {other:?}"),
        }
    }
}
