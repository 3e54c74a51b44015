//! Kernel types: ModuleType, ModuleState, Module, resource accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{ModuleId, TaskId};

/// Fixed set of subsystem module types the kernel supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    ProcessManager,
    MemoryManager,
    FileSystem,
    NetworkManager,
    SecuritySystem,
    UiFramework,
    DatabaseEngine,
    AiManager,
}

impl ModuleType {
    /// Default resource requirement for this type: cpu-units, memory units,
    /// storage units.
    pub fn resource_requirements(self) -> ResourceRequest {
        let (cpu, memory, storage) = match self {
            ModuleType::ProcessManager => (20, 512, 1024),
            ModuleType::MemoryManager => (15, 256, 512),
            ModuleType::FileSystem => (25, 1024, 8192),
            ModuleType::NetworkManager => (30, 512, 2048),
            ModuleType::SecuritySystem => (35, 768, 4096),
            ModuleType::UiFramework => (40, 1536, 2048),
            ModuleType::DatabaseEngine => (45, 2048, 8192),
            ModuleType::AiManager => (50, 1024, 3072),
        };
        ResourceRequest {
            cpu,
            memory,
            storage,
        }
    }

    /// Capabilities a module of this type advertises by default. Types
    /// without a built-in set rely on caller-supplied capabilities.
    pub fn default_capabilities(self) -> &'static [&'static str] {
        match self {
            ModuleType::ProcessManager => {
                &["process-optimization", "load-balancing", "deadlock-detection"]
            }
            ModuleType::MemoryManager => {
                &["memory-optimization", "garbage-collection", "cache-management"]
            }
            ModuleType::NetworkManager => {
                &["traffic-optimization", "bandwidth-management", "connection-pooling"]
            }
            ModuleType::SecuritySystem => {
                &["threat-detection", "access-control", "encryption-management"]
            }
            _ => &[],
        }
    }

    /// Internal services a module of this type runs; restarted on recovery.
    pub fn required_services(self) -> &'static [&'static str] {
        match self {
            ModuleType::ProcessManager => &["process_monitor", "load_balancer", "resource_tracker"],
            ModuleType::MemoryManager => &["memory_monitor", "garbage_collector", "cache_manager"],
            ModuleType::FileSystem => &["file_monitor", "storage_manager", "indexer"],
            ModuleType::NetworkManager => &["network_monitor", "protocol_handler", "traffic_analyzer"],
            ModuleType::SecuritySystem => &["security_monitor", "access_controller", "threat_analyzer"],
            ModuleType::UiFramework => &["ui_renderer", "event_handler", "theme_manager"],
            ModuleType::DatabaseEngine => &["query_processor", "index_manager", "transaction_manager"],
            ModuleType::AiManager => &["ai_coordinator", "model_manager", "learning_engine"],
        }
    }
}

/// Module lifecycle state.
///
/// State transitions:
/// ```text
/// INITIALIZING → ACTIVE ⇄ DEGRADED → RECOVERING → ACTIVE
///                   ↓         ↓           ↓
///                 FAILED    FAILED      FAILED
/// ```
/// Failed is terminal for external callers; the recovery supervisor may
/// drive Failed → Recovering while recovery attempts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Initializing,
    Active,
    Degraded,
    Recovering,
    Failed,
}

impl ModuleState {
    /// Check if this is the terminal state.
    pub fn is_terminal(self) -> bool {
        self == ModuleState::Failed
    }

    /// Check if the module can accept new task dispatch.
    pub fn can_dispatch(self) -> bool {
        self == ModuleState::Active
    }

    /// Check if the health monitor sweeps this module.
    pub fn is_monitored(self) -> bool {
        matches!(self, ModuleState::Active | ModuleState::Degraded)
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: ModuleState) -> bool {
        match (self, to) {
            // INITIALIZING
            (ModuleState::Initializing, ModuleState::Active) => true,
            (ModuleState::Initializing, ModuleState::Failed) => true,
            // ACTIVE
            (ModuleState::Active, ModuleState::Degraded) => true,
            (ModuleState::Active, ModuleState::Failed) => true,
            // DEGRADED
            (ModuleState::Degraded, ModuleState::Active) => true,
            (ModuleState::Degraded, ModuleState::Recovering) => true,
            (ModuleState::Degraded, ModuleState::Failed) => true,
            // RECOVERING
            (ModuleState::Recovering, ModuleState::Active) => true,
            (ModuleState::Recovering, ModuleState::Failed) => true,
            // FAILED: only the supervisor re-enters Recovering
            (ModuleState::Failed, ModuleState::Recovering) => true,
            // All other transitions invalid
            _ => false,
        }
    }
}

/// Requested resource amounts for a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu: u64,
    pub memory: u64,
    pub storage: u64,
}

impl ResourceRequest {
    /// Scale every dimension by an integer factor (used when reallocating).
    pub fn scaled(self, factor: u64) -> Self {
        Self {
            cpu: self.cpu * factor,
            memory: self.memory * factor,
            storage: self.storage * factor,
        }
    }
}

/// Committed resource grant for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub cpu: u64,
    pub memory: u64,
    pub storage: u64,
}

impl From<ResourceRequest> for ResourceGrant {
    fn from(req: ResourceRequest) -> Self {
        Self {
            cpu: req.cpu,
            memory: req.memory,
            storage: req.storage,
        }
    }
}

/// Per-type pool consumption, as percentages of capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceUtilization {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub storage_pct: f64,
}

/// Internal service owned by a module; restarted as part of recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub name: String,
    pub running: bool,
}

/// One completed execution in a module's bounded history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub capability: String,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
}

/// Full health score for a freshly registered module.
pub const FULL_HEALTH: u32 = 100;

/// A registered module - the kernel's record of a supervised subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    // Identity
    pub id: ModuleId,
    pub module_type: ModuleType,

    // State
    pub state: ModuleState,
    pub health_score: u32,

    // Resources
    pub grant: ResourceGrant,

    // Capabilities and internal services
    pub capabilities: Vec<String>,
    pub services: Vec<ServiceState>,

    // Bounded execution history (oldest evicted first)
    pub history: VecDeque<TaskRecord>,

    // Bookkeeping
    pub registered_at: DateTime<Utc>,
    pub recovery_attempts: u32,
}

impl Module {
    pub fn new(
        id: ModuleId,
        module_type: ModuleType,
        grant: ResourceGrant,
        extra_capabilities: Vec<String>,
    ) -> Self {
        let mut capabilities: Vec<String> = module_type
            .default_capabilities()
            .iter()
            .map(|c| (*c).to_string())
            .collect();
        for cap in extra_capabilities {
            if !capabilities.contains(&cap) {
                capabilities.push(cap);
            }
        }

        let services = module_type
            .required_services()
            .iter()
            .map(|name| ServiceState {
                name: (*name).to_string(),
                running: false,
            })
            .collect();

        Self {
            id,
            module_type,
            state: ModuleState::Initializing,
            health_score: FULL_HEALTH,
            grant,
            capabilities,
            services,
            history: VecDeque::new(),
            registered_at: Utc::now(),
            recovery_attempts: 0,
        }
    }

    /// Check whether this module advertises a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Start all internal services.
    pub fn start_services(&mut self) {
        for service in &mut self.services {
            service.running = true;
        }
    }

    /// Decrease the health score, saturating at zero.
    pub fn decay_health(&mut self, amount: u32) -> u32 {
        self.health_score = self.health_score.saturating_sub(amount);
        self.health_score
    }

    /// Append an execution record, evicting the oldest beyond capacity.
    pub fn record_execution(&mut self, record: TaskRecord, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// Recovery action chosen by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Restart,
    ReallocateResources,
    ActivateBackup,
}

/// Per-module health snapshot produced each monitor tick.
///
/// Overwrite semantics: only the latest report per module is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub module_id: ModuleId,
    pub module_type: ModuleType,
    pub state: ModuleState,
    pub score: u32,
    pub utilization: ResourceUtilization,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_validation() {
        assert!(ModuleState::Initializing.can_transition_to(ModuleState::Active));
        assert!(ModuleState::Active.can_transition_to(ModuleState::Degraded));
        assert!(ModuleState::Degraded.can_transition_to(ModuleState::Active));
        assert!(ModuleState::Degraded.can_transition_to(ModuleState::Recovering));
        assert!(ModuleState::Recovering.can_transition_to(ModuleState::Active));
        assert!(ModuleState::Failed.can_transition_to(ModuleState::Recovering));

        assert!(!ModuleState::Initializing.can_transition_to(ModuleState::Degraded));
        assert!(!ModuleState::Active.can_transition_to(ModuleState::Recovering));
        assert!(!ModuleState::Failed.can_transition_to(ModuleState::Active));
        assert!(!ModuleState::Recovering.can_transition_to(ModuleState::Degraded));
    }

    #[test]
    fn test_dispatch_only_when_active() {
        assert!(ModuleState::Active.can_dispatch());
        assert!(!ModuleState::Degraded.can_dispatch());
        assert!(!ModuleState::Recovering.can_dispatch());
        assert!(!ModuleState::Failed.can_dispatch());
        assert!(!ModuleState::Initializing.can_dispatch());
    }

    #[test]
    fn test_requirement_table() {
        let req = ModuleType::NetworkManager.resource_requirements();
        assert_eq!(req.cpu, 30);
        assert_eq!(req.memory, 512);
        assert_eq!(req.storage, 2048);
    }

    #[test]
    fn test_default_capabilities_extended_without_duplicates() {
        let module = Module::new(
            ModuleId::new(),
            ModuleType::NetworkManager,
            ModuleType::NetworkManager.resource_requirements().into(),
            vec![
                "traffic-optimization".to_string(),
                "packet-inspection".to_string(),
            ],
        );
        assert!(module.has_capability("traffic-optimization"));
        assert!(module.has_capability("packet-inspection"));
        let count = module
            .capabilities
            .iter()
            .filter(|c| c.as_str() == "traffic-optimization")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_history_ring_evicts_oldest() {
        let mut module = Module::new(
            ModuleId::new(),
            ModuleType::ProcessManager,
            ModuleType::ProcessManager.resource_requirements().into(),
            vec![],
        );
        for i in 0..5 {
            module.record_execution(
                TaskRecord {
                    task_id: TaskId::from_string(format!("task-{i}")).unwrap(),
                    capability: "load-balancing".to_string(),
                    success: true,
                    completed_at: Utc::now(),
                },
                3,
            );
        }
        assert_eq!(module.history.len(), 3);
        assert_eq!(module.history.front().unwrap().task_id.as_str(), "task-2");
        assert_eq!(module.history.back().unwrap().task_id.as_str(), "task-4");
    }

    #[test]
    fn test_decay_health_saturates() {
        let mut module = Module::new(
            ModuleId::new(),
            ModuleType::MemoryManager,
            ModuleType::MemoryManager.resource_requirements().into(),
            vec![],
        );
        assert_eq!(module.decay_health(30), 70);
        assert_eq!(module.decay_health(200), 0);
    }
}
