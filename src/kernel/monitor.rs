//! Health monitor and recovery supervisor.
//!
//! Periodic sweep over every Active/Degraded module: pull metrics from the
//! injected provider, decay health scores by observed faults, classify, and
//! dispatch recovery through the decision engine. Health changes happen
//! only here - task failures elsewhere never touch module state.
//!
//! Recovery supervision: a module that was recovered stays on probation
//! until it survives a healthy tick. Falling below the failure threshold
//! again counts as a failed recovery; at the configured limit the module is
//! permanently failed and `ModuleUnrecoverable` is raised once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;

use super::decision::decide_recovery;
use super::registry::ModuleRegistry;
use super::types::{HealthReport, Module, ModuleState, RecoveryAction, ResourceUtilization};
use crate::events::{EventHub, KernelEvent};
use crate::types::{ModuleId, MonitorConfig};

/// Metrics observed for one module on one sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleMetrics {
    /// Utilization of the module's own grant, per resource type (0-100).
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub storage_pct: f64,
    /// Faults observed since the previous sweep.
    pub faults: u32,
}

/// Source of per-module runtime metrics.
///
/// Injected so tests supply deterministic fakes; production collaborators
/// plug in real probes.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsProvider: Send + Sync {
    fn sample(&self, module: &Module) -> ModuleMetrics;
}

/// Default provider: nominal utilization, no faults.
#[derive(Debug, Default)]
pub struct NominalMetrics;

impl MetricsProvider for NominalMetrics {
    fn sample(&self, _module: &Module) -> ModuleMetrics {
        ModuleMetrics {
            cpu_pct: 10.0,
            memory_pct: 15.0,
            storage_pct: 5.0,
            faults: 0,
        }
    }
}

/// Collaborator hook invoked when the decision engine chooses
/// ActivateBackup. Pass-through: the kernel does not act on it further.
pub trait BackupHook: Send + Sync {
    fn activate(&self, module_id: &ModuleId);
}

/// Default hook: log and move on.
#[derive(Debug, Default)]
pub struct NoopBackup;

impl BackupHook for NoopBackup {
    fn activate(&self, module_id: &ModuleId) {
        tracing::warn!(module_id = %module_id, "backup activation requested, no hook installed");
    }
}

/// Statistics from one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    pub swept: usize,
    pub degraded: usize,
    pub escalated: usize,
    pub recovered: usize,
    pub unrecoverable: usize,
}

/// Health monitor service - owns the sweep loop.
pub struct MonitorService {
    registry: Arc<RwLock<ModuleRegistry>>,
    events: Arc<EventHub>,
    metrics: Arc<dyn MetricsProvider>,
    backup: Arc<dyn BackupHook>,
    config: MonitorConfig,
    /// Latest report per module, overwrite semantics.
    reports: Arc<RwLock<HashMap<ModuleId, HealthReport>>>,
    /// Modules recovered but not yet past a healthy tick.
    probation: Arc<Mutex<HashSet<ModuleId>>>,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl std::fmt::Debug for MonitorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MonitorService {
    pub fn new(
        registry: Arc<RwLock<ModuleRegistry>>,
        events: Arc<EventHub>,
        metrics: Arc<dyn MetricsProvider>,
        backup: Arc<dyn BackupHook>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            events,
            metrics,
            backup,
            config,
            reports: Arc::new(RwLock::new(HashMap::new())),
            probation: Arc::new(Mutex::new(HashSet::new())),
            stop_tx: None,
        }
    }

    /// Latest health report for a module, if one has been produced.
    pub async fn latest_report(&self, module_id: &ModuleId) -> Option<HealthReport> {
        self.reports.read().await.get(module_id).cloned()
    }

    /// Start the sweep loop in the background.
    /// Returns immediately; sweeps run in a spawned task.
    pub fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        let events = self.events.clone();
        let metrics = self.metrics.clone();
        let backup = self.backup.clone();
        let config = self.config.clone();
        let reports = self.reports.clone();
        let probation = self.probation.clone();
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut ticker = interval(config.tick_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = Self::run_sweep(
                            &registry, &events, &metrics, &backup, &config, &reports, &probation,
                        )
                        .await;
                        if stats.escalated > 0 || stats.unrecoverable > 0 {
                            tracing::warn!(?stats, "health sweep completed with escalations");
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("health monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the sweep loop.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Run a single sweep. Exposed so tests drive ticks deterministically.
    pub async fn sweep_once(&self) -> SweepStats {
        Self::run_sweep(
            &self.registry,
            &self.events,
            &self.metrics,
            &self.backup,
            &self.config,
            &self.reports,
            &self.probation,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_sweep(
        registry: &Arc<RwLock<ModuleRegistry>>,
        events: &Arc<EventHub>,
        metrics: &Arc<dyn MetricsProvider>,
        backup: &Arc<dyn BackupHook>,
        config: &MonitorConfig,
        reports: &Arc<RwLock<HashMap<ModuleId, HealthReport>>>,
        probation: &Arc<Mutex<HashSet<ModuleId>>>,
    ) -> SweepStats {
        let mut stats = SweepStats::default();

        // Phase 1: verify recoveries that did not stick. A probation module
        // no longer monitored (stayed Failed after a backup hand-off) is a
        // failed recovery.
        let stalled: Vec<ModuleId> = {
            let probation = probation.lock().await;
            let registry = registry.read().await;
            probation
                .iter()
                .filter(|id| {
                    registry
                        .get(id)
                        .map(|m| !m.state.is_monitored())
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };
        for module_id in stalled {
            Self::handle_failed_recovery(
                registry, events, backup, config, probation, &module_id, &mut stats,
            )
            .await;
        }

        // Phase 2: sweep every monitored module.
        let swept: Vec<ModuleId> = registry.read().await.monitored();
        stats.swept = swept.len();

        for module_id in swept {
            let sample = {
                let registry = registry.read().await;
                match registry.get(&module_id) {
                    Ok(module) => metrics.sample(module),
                    Err(_) => continue, // unregistered mid-sweep
                }
            };

            let decay = sample.faults * config.fault_decay;
            let score = {
                let mut registry = registry.write().await;
                match registry.decay_health(&module_id, decay) {
                    Ok(score) => score,
                    Err(_) => continue,
                }
            };

            // Latest report per module, previous tick overwritten.
            {
                let registry = registry.read().await;
                if let Ok(module) = registry.get(&module_id) {
                    let report = HealthReport {
                        module_id: module_id.clone(),
                        module_type: module.module_type,
                        state: module.state,
                        score,
                        utilization: ResourceUtilization {
                            cpu_pct: sample.cpu_pct,
                            memory_pct: sample.memory_pct,
                            storage_pct: sample.storage_pct,
                        },
                        observed_at: chrono::Utc::now(),
                    };
                    reports.write().await.insert(module_id.clone(), report);
                }
            }

            if score < config.failure_threshold {
                Self::escalate(
                    registry, events, backup, config, probation, &module_id, &mut stats,
                )
                .await;
            } else if score < config.degraded_threshold {
                let mut registry = registry.write().await;
                if registry
                    .get(&module_id)
                    .map(|m| m.state == ModuleState::Active)
                    .unwrap_or(false)
                    && registry.transition(&module_id, ModuleState::Degraded).is_ok()
                {
                    stats.degraded += 1;
                    drop(registry);
                    events
                        .publish(KernelEvent::ModuleDegraded {
                            module_id: module_id.clone(),
                            score,
                        })
                        .await;
                }
            } else {
                // Healthy tick: probation ends, the failure streak resets.
                let mut probation = probation.lock().await;
                if probation.remove(&module_id) {
                    let _ = registry.write().await.reset_recovery_attempts(&module_id);
                    stats.recovered += 1;
                }
            }
        }

        stats
    }

    /// A monitored module fell below the failure threshold: mark it Failed
    /// and run the decision engine's recovery action.
    async fn escalate(
        registry: &Arc<RwLock<ModuleRegistry>>,
        events: &Arc<EventHub>,
        backup: &Arc<dyn BackupHook>,
        config: &MonitorConfig,
        probation: &Arc<Mutex<HashSet<ModuleId>>>,
        module_id: &ModuleId,
        stats: &mut SweepStats,
    ) {
        {
            let mut registry = registry.write().await;
            if registry.transition(module_id, ModuleState::Failed).is_err() {
                return;
            }
        }
        stats.escalated += 1;

        // Falling back below the threshold while on probation means the
        // previous recovery did not stick.
        let was_probation = probation.lock().await.contains(module_id);
        if was_probation {
            Self::handle_failed_recovery(
                registry, events, backup, config, probation, module_id, stats,
            )
            .await;
            return;
        }

        Self::dispatch_recovery(registry, events, backup, config, probation, module_id, stats)
            .await;
    }

    /// Record a failed recovery, then either give up or try again.
    async fn handle_failed_recovery(
        registry: &Arc<RwLock<ModuleRegistry>>,
        events: &Arc<EventHub>,
        backup: &Arc<dyn BackupHook>,
        config: &MonitorConfig,
        probation: &Arc<Mutex<HashSet<ModuleId>>>,
        module_id: &ModuleId,
        stats: &mut SweepStats,
    ) {
        let attempts = {
            let mut registry = registry.write().await;
            match registry.note_recovery_failure(module_id) {
                Ok(attempts) => attempts,
                Err(_) => return,
            }
        };

        if attempts >= config.max_recovery_attempts {
            probation.lock().await.remove(module_id);
            stats.unrecoverable += 1;
            tracing::error!(module_id = %module_id, attempts, "module permanently failed");
            events
                .publish(KernelEvent::ModuleUnrecoverable {
                    module_id: module_id.clone(),
                })
                .await;
            return;
        }

        Self::dispatch_recovery(registry, events, backup, config, probation, module_id, stats)
            .await;
    }

    /// Consult the decision engine and execute its action.
    async fn dispatch_recovery(
        registry: &Arc<RwLock<ModuleRegistry>>,
        events: &Arc<EventHub>,
        backup: &Arc<dyn BackupHook>,
        _config: &MonitorConfig,
        probation: &Arc<Mutex<HashSet<ModuleId>>>,
        module_id: &ModuleId,
        stats: &mut SweepStats,
    ) {
        let (module_type, attempts, report) = {
            let registry = registry.read().await;
            let module = match registry.get(module_id) {
                Ok(m) => m,
                Err(_) => return,
            };
            let report = HealthReport {
                module_id: module_id.clone(),
                module_type: module.module_type,
                state: module.state,
                score: module.health_score,
                utilization: ResourceUtilization::default(),
                observed_at: chrono::Utc::now(),
            };
            (module.module_type, module.recovery_attempts, report)
        };

        let action = decide_recovery(module_type, &report, attempts);
        tracing::info!(module_id = %module_id, ?action, attempts, "recovery action dispatched");

        match action {
            RecoveryAction::Restart => {
                let recovered = registry.write().await.recover(module_id).is_ok();
                if recovered {
                    stats.recovered += 1;
                    probation.lock().await.insert(module_id.clone());
                }
            }
            RecoveryAction::ReallocateResources => {
                let recovered = {
                    let mut registry = registry.write().await;
                    // Enlarged grant for the retry. A denied regrant is not
                    // fatal: recovery proceeds on the existing grant.
                    if let Err(err) = registry
                        .reallocate(module_id, module_type.resource_requirements().scaled(2))
                    {
                        tracing::warn!(module_id = %module_id, %err, "reallocation denied");
                    }
                    registry.recover(module_id).is_ok()
                };
                if recovered {
                    stats.recovered += 1;
                    probation.lock().await.insert(module_id.clone());
                }
            }
            RecoveryAction::ActivateBackup => {
                backup.activate(module_id);
                events
                    .publish(KernelEvent::BackupRequested {
                        module_id: module_id.clone(),
                    })
                    .await;
                // The module stays Failed until the collaborator acts;
                // probation keeps it under supervision.
                probation.lock().await.insert(module_id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ledger::ResourceLedger;
    use crate::kernel::registry::RegistryPolicy;
    use crate::kernel::types::ModuleType;
    use crate::types::{Error, PoolConfig};
    use std::collections::VecDeque;

    /// Deterministic fault script: pops one fault count per sample call,
    /// then stays at the last value.
    #[derive(Debug)]
    struct ScriptedMetrics {
        faults: std::sync::Mutex<VecDeque<u32>>,
        hold: u32,
    }

    impl ScriptedMetrics {
        fn new(script: Vec<u32>, hold: u32) -> Self {
            Self {
                faults: std::sync::Mutex::new(script.into()),
                hold,
            }
        }
    }

    impl MetricsProvider for ScriptedMetrics {
        fn sample(&self, _module: &Module) -> ModuleMetrics {
            let faults = self
                .faults
                .lock()
                .map(|mut s| s.pop_front().unwrap_or(self.hold))
                .unwrap_or(0);
            ModuleMetrics {
                cpu_pct: 20.0,
                memory_pct: 30.0,
                storage_pct: 10.0,
                faults,
            }
        }
    }

    #[derive(Debug, Default)]
    struct RecordingBackup {
        activations: std::sync::Mutex<Vec<ModuleId>>,
    }

    impl BackupHook for RecordingBackup {
        fn activate(&self, module_id: &ModuleId) {
            if let Ok(mut activations) = self.activations.lock() {
                activations.push(module_id.clone());
            }
        }
    }

    fn test_registry() -> Arc<RwLock<ModuleRegistry>> {
        let ledger = ResourceLedger::new(PoolConfig {
            cpu: 1000,
            memory: 65536,
            storage: 262144,
        });
        Arc::new(RwLock::new(ModuleRegistry::new(
            ledger,
            RegistryPolicy {
                recovery_baseline: 80,
                max_recovery_attempts: 3,
                history_capacity: 8,
            },
        )))
    }

    fn service(
        registry: &Arc<RwLock<ModuleRegistry>>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> (MonitorService, Arc<EventHub>, Arc<RecordingBackup>) {
        let events = Arc::new(EventHub::new());
        let backup = Arc::new(RecordingBackup::default());
        let monitor = MonitorService::new(
            registry.clone(),
            events.clone(),
            metrics,
            backup.clone(),
            MonitorConfig::default(),
        );
        (monitor, events, backup)
    }

    #[tokio::test]
    async fn test_degraded_classification_emits_event() {
        let registry = test_registry();
        let id = registry
            .write()
            .await
            .register(ModuleType::NetworkManager, vec![])
            .unwrap();

        // 6 faults x decay 10 = 60: score 40, below the degraded threshold.
        let (monitor, events, _) =
            service(&registry, Arc::new(ScriptedMetrics::new(vec![6], 0)));
        let mut rx = events.subscribe().await;

        let stats = monitor.sweep_once().await;
        assert_eq!(stats.swept, 1);
        assert_eq!(stats.degraded, 1);

        let reg = registry.read().await;
        assert_eq!(reg.get(&id).unwrap().state, ModuleState::Degraded);
        assert_eq!(
            rx.recv().await.unwrap(),
            KernelEvent::ModuleDegraded {
                module_id: id,
                score: 40
            }
        );
    }

    #[tokio::test]
    async fn test_mock_provider_is_consulted_per_module() {
        let registry = test_registry();
        registry
            .write()
            .await
            .register(ModuleType::ProcessManager, vec![])
            .unwrap();
        registry
            .write()
            .await
            .register(ModuleType::MemoryManager, vec![])
            .unwrap();

        let mut mock = MockMetricsProvider::new();
        mock.expect_sample().times(2).returning(|_| ModuleMetrics {
            cpu_pct: 50.0,
            memory_pct: 50.0,
            storage_pct: 50.0,
            faults: 0,
        });

        let (monitor, _, _) = service(&registry, Arc::new(mock));
        let stats = monitor.sweep_once().await;
        assert_eq!(stats.swept, 2);
        assert_eq!(stats.degraded, 0);
    }

    #[tokio::test]
    async fn test_reports_overwrite_per_tick() {
        let registry = test_registry();
        let id = registry
            .write()
            .await
            .register(ModuleType::FileSystem, vec![])
            .unwrap();

        let (monitor, _, _) =
            service(&registry, Arc::new(ScriptedMetrics::new(vec![1, 1], 0)));

        monitor.sweep_once().await;
        let first = monitor.latest_report(&id).await.unwrap();
        assert_eq!(first.score, 90);

        monitor.sweep_once().await;
        let second = monitor.latest_report(&id).await.unwrap();
        assert_eq!(second.score, 80);
        assert_eq!(second.utilization.cpu_pct, 20.0);
    }

    #[tokio::test]
    async fn test_failure_restarts_to_recovery_baseline() {
        let registry = test_registry();
        let id = registry
            .write()
            .await
            .register(ModuleType::NetworkManager, vec![])
            .unwrap();

        // 10 faults x 10 = 100 decay: score 0, first failure -> Restart.
        let (monitor, _, backup) =
            service(&registry, Arc::new(ScriptedMetrics::new(vec![10], 0)));

        let stats = monitor.sweep_once().await;
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.recovered, 1);

        let reg = registry.read().await;
        let module = reg.get(&id).unwrap();
        assert_eq!(module.state, ModuleState::Active);
        assert_eq!(module.health_score, 80); // baseline, not 100
        assert!(backup.activations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_healthy_tick_resets_failure_streak() {
        let registry = test_registry();
        let id = registry
            .write()
            .await
            .register(ModuleType::NetworkManager, vec![])
            .unwrap();

        // Tick 1 fails hard; tick 2 is clean.
        let (monitor, _, _) =
            service(&registry, Arc::new(ScriptedMetrics::new(vec![10, 0], 0)));

        monitor.sweep_once().await;
        monitor.sweep_once().await;

        let reg = registry.read().await;
        let module = reg.get(&id).unwrap();
        assert_eq!(module.state, ModuleState::Active);
        assert_eq!(module.recovery_attempts, 0);
    }

    #[tokio::test]
    async fn test_three_failed_recoveries_permanently_fail() {
        let registry = test_registry();
        let id = registry
            .write()
            .await
            .register(ModuleType::NetworkManager, vec![])
            .unwrap();

        // Every tick reports 10 faults: each recovery is immediately undone.
        let (monitor, events, backup) =
            service(&registry, Arc::new(ScriptedMetrics::new(vec![], 10)));
        let mut rx = events.subscribe().await;

        // T1: escalate, Restart -> Active@80.
        monitor.sweep_once().await;
        // T2: fails again on probation -> attempt 1, ReallocateResources.
        monitor.sweep_once().await;
        // T3: fails again -> attempt 2, ActivateBackup (stays Failed).
        monitor.sweep_once().await;
        // T4: still not Active -> attempt 3 = limit, permanently failed.
        let stats = monitor.sweep_once().await;
        assert_eq!(stats.unrecoverable, 1);

        {
            let reg = registry.read().await;
            let module = reg.get(&id).unwrap();
            assert_eq!(module.state, ModuleState::Failed);
            assert_eq!(module.recovery_attempts, 3);
        }

        // Backup hook fired exactly once, unrecoverable event raised.
        assert_eq!(backup.activations.lock().unwrap().as_slice(), &[id.clone()]);
        let mut saw_unrecoverable = false;
        while let Ok(event) = rx.try_recv() {
            if event == (KernelEvent::ModuleUnrecoverable { module_id: id.clone() }) {
                saw_unrecoverable = true;
            }
        }
        assert!(saw_unrecoverable);

        // Terminal: recover is rejected without unregister + register.
        let err = registry.write().await.recover(&id).unwrap_err();
        assert!(matches!(err, Error::Unrecoverable(_)));

        // And no further sweeps touch it.
        let stats = monitor.sweep_once().await;
        assert_eq!(stats.swept, 0);
    }

    #[tokio::test]
    async fn test_background_loop_start_stop() {
        let registry = test_registry();
        registry
            .write()
            .await
            .register(ModuleType::ProcessManager, vec![])
            .unwrap();

        let events = Arc::new(EventHub::new());
        let mut monitor = MonitorService::new(
            registry.clone(),
            events,
            Arc::new(NominalMetrics),
            Arc::new(NoopBackup),
            MonitorConfig {
                tick_interval: std::time::Duration::from_millis(10),
                ..MonitorConfig::default()
            },
        );

        let handle = monitor.start();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        monitor.stop();
        handle.await.unwrap();

        // Nominal metrics: module untouched.
        let reg = registry.read().await;
        assert_eq!(reg.count_by_state(ModuleState::Active), 1);
    }
}
