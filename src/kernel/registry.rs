//! Module registry - lifecycle management for supervised modules.
//!
//! The registry owns the resource ledger: registration grants resources
//! before a module object exists, and unregistration is the only path that
//! releases them. Recovery re-runs module initialization without touching
//! the grant.

use std::collections::HashMap;

use super::ledger::ResourceLedger;
use super::types::{Module, ModuleState, ModuleType, ResourceRequest, ResourceUtilization, TaskRecord};
use crate::types::{Error, ModuleId, Result};

/// Registry policy constants, extracted from the kernel config.
#[derive(Debug, Clone, Copy)]
pub struct RegistryPolicy {
    /// Health score assigned after a successful recovery.
    pub recovery_baseline: u32,
    /// Consecutive failed recoveries before a module is permanently failed.
    pub max_recovery_attempts: u32,
    /// Execution history ring capacity per module.
    pub history_capacity: usize,
}

/// Module registry - owns module lifecycles and the resource ledger.
///
/// NOT a separate actor - owned by the Kernel and called via &mut self.
#[derive(Debug)]
pub struct ModuleRegistry {
    ledger: ResourceLedger,
    modules: HashMap<ModuleId, Module>,
    /// Registration order, for deterministic selection tie-breaks.
    order: Vec<ModuleId>,
    policy: RegistryPolicy,
}

impl ModuleRegistry {
    pub fn new(ledger: ResourceLedger, policy: RegistryPolicy) -> Self {
        Self {
            ledger,
            modules: HashMap::new(),
            order: Vec::new(),
            policy,
        }
    }

    /// Register a new module of the given type.
    ///
    /// Resources are granted from the type's fixed requirement table before
    /// the module object is created; on `ResourceExhausted` nothing is
    /// registered. The module initializes synchronously and enters Active.
    pub fn register(
        &mut self,
        module_type: ModuleType,
        extra_capabilities: Vec<String>,
    ) -> Result<ModuleId> {
        let id = ModuleId::new();
        let grant = self
            .ledger
            .grant(&id, module_type.resource_requirements())?;

        let mut module = Module::new(id.clone(), module_type, grant, extra_capabilities);
        module.start_services();
        module.state = ModuleState::Active;

        tracing::info!(module_id = %id, ?module_type, "module registered");
        self.modules.insert(id.clone(), module);
        self.order.push(id.clone());
        Ok(id)
    }

    /// Unregister a module: release its grant and remove the entry.
    ///
    /// This is the only operation that releases resources. Returns the
    /// removed module.
    pub fn unregister(&mut self, module_id: &ModuleId) -> Result<Module> {
        let module = self
            .modules
            .remove(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;
        self.ledger.release(module_id);
        self.order.retain(|id| id != module_id);
        tracing::info!(module_id = %module_id, "module unregistered");
        Ok(module)
    }

    /// Recover a module: re-run initialization and reset the health score
    /// to the recovery baseline. The resource grant is untouched.
    ///
    /// Idempotent on Active modules. Rejected with `Unrecoverable` once the
    /// module has exhausted its recovery attempts.
    pub fn recover(&mut self, module_id: &ModuleId) -> Result<()> {
        let max_attempts = self.policy.max_recovery_attempts;
        let baseline = self.policy.recovery_baseline;
        let module = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;

        match module.state {
            ModuleState::Active => return Ok(()),
            ModuleState::Failed if module.recovery_attempts >= max_attempts => {
                return Err(Error::unrecoverable(format!(
                    "module {} exhausted {} recovery attempts",
                    module_id, max_attempts
                )));
            }
            ModuleState::Initializing => {
                return Err(Error::state_transition(format!(
                    "cannot recover module {}: still initializing",
                    module_id
                )));
            }
            _ => {}
        }

        module.state = ModuleState::Recovering;
        tracing::info!(module_id = %module_id, "module recovery started");

        // Re-run initialization: restart internal services. Capabilities are
        // reconfigured from the same tables, so the set is unchanged.
        for service in &mut module.services {
            service.running = false;
        }
        module.start_services();

        module.state = ModuleState::Active;
        module.health_score = baseline;
        tracing::info!(module_id = %module_id, score = baseline, "module recovered");
        Ok(())
    }

    /// Get a module by id.
    pub fn get(&self, module_id: &ModuleId) -> Result<&Module> {
        self.modules
            .get(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))
    }

    /// Get a cloned snapshot of a module.
    pub fn snapshot(&self, module_id: &ModuleId) -> Result<Module> {
        self.get(module_id).cloned()
    }

    /// Validated state transition.
    pub fn transition(&mut self, module_id: &ModuleId, to: ModuleState) -> Result<()> {
        let module = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;

        if !module.state.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "cannot transition module {}: {:?} -> {:?}",
                module_id, module.state, to
            )));
        }

        tracing::debug!(module_id = %module_id, from = ?module.state, ?to, "state transition");
        module.state = to;
        Ok(())
    }

    /// Decrease a module's health score, saturating at zero.
    pub fn decay_health(&mut self, module_id: &ModuleId, amount: u32) -> Result<u32> {
        let module = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;
        Ok(module.decay_health(amount))
    }

    /// Replace a module's resource grant (recovery with reallocation).
    pub fn reallocate(&mut self, module_id: &ModuleId, request: ResourceRequest) -> Result<()> {
        if !self.modules.contains_key(module_id) {
            return Err(Error::not_found(format!("unknown module: {}", module_id)));
        }
        let grant = self.ledger.regrant(module_id, request)?;
        if let Some(module) = self.modules.get_mut(module_id) {
            module.grant = grant;
        }
        Ok(())
    }

    /// Record a failed recovery attempt; returns the consecutive count.
    pub fn note_recovery_failure(&mut self, module_id: &ModuleId) -> Result<u32> {
        let module = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;
        module.recovery_attempts += 1;
        Ok(module.recovery_attempts)
    }

    /// Clear the consecutive failed-recovery count after a healthy period.
    pub fn reset_recovery_attempts(&mut self, module_id: &ModuleId) -> Result<()> {
        let module = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;
        module.recovery_attempts = 0;
        Ok(())
    }

    /// Append to a module's bounded execution history.
    pub fn record_execution(&mut self, module_id: &ModuleId, record: TaskRecord) -> Result<()> {
        let capacity = self.policy.history_capacity;
        let module = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| Error::not_found(format!("unknown module: {}", module_id)))?;
        module.record_execution(record, capacity);
        Ok(())
    }

    /// Modules currently swept by the health monitor, in registration order.
    pub fn monitored(&self) -> Vec<ModuleId> {
        self.order
            .iter()
            .filter(|id| {
                self.modules
                    .get(id)
                    .map(|m| m.state.is_monitored())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Active modules advertising a capability, in registration order.
    pub fn active_with_capability(&self, capability: &str) -> Vec<&Module> {
        self.order
            .iter()
            .filter_map(|id| self.modules.get(id))
            .filter(|m| m.state.can_dispatch() && m.has_capability(capability))
            .collect()
    }

    /// List all modules.
    pub fn list(&self) -> Vec<&Module> {
        self.order.iter().filter_map(|id| self.modules.get(id)).collect()
    }

    /// Count modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Count modules by state.
    pub fn count_by_state(&self, state: ModuleState) -> usize {
        self.modules.values().filter(|m| m.state == state).count()
    }

    /// Pool utilization, delegated to the ledger.
    pub fn utilization(&self) -> ResourceUtilization {
        self.ledger.utilization()
    }

    /// The registry's policy constants.
    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }
}
