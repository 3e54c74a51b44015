//! Resource ledger - declarative accounting of per-module grants.
//!
//! Grants are atomic: either the full request commits or nothing does.
//! The numbers are accounting against a configured pool, not OS-level
//! enforcement.

use std::collections::HashMap;

use super::types::{ResourceGrant, ResourceRequest, ResourceUtilization};
use crate::types::{Error, ModuleId, PoolConfig, Result};

/// Tracks outstanding grants against the configured pool capacity.
///
/// NOT a separate actor - owned by the registry and called via &mut self.
#[derive(Debug)]
pub struct ResourceLedger {
    pool: PoolConfig,
    grants: HashMap<ModuleId, ResourceGrant>,
}

impl ResourceLedger {
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            pool,
            grants: HashMap::new(),
        }
    }

    /// Commit a grant for a module. Fails with `ResourceExhausted` if any
    /// resource type would exceed pool capacity; nothing is committed on
    /// failure. A module may hold at most one grant.
    pub fn grant(&mut self, module_id: &ModuleId, request: ResourceRequest) -> Result<ResourceGrant> {
        if self.grants.contains_key(module_id) {
            return Err(Error::internal(format!(
                "module {} already holds a grant",
                module_id
            )));
        }

        let (cpu, memory, storage) = self.outstanding();
        if cpu + request.cpu > self.pool.cpu {
            return Err(Error::resource_exhausted(format!(
                "cpu: {} requested, {} of {} in use",
                request.cpu, cpu, self.pool.cpu
            )));
        }
        if memory + request.memory > self.pool.memory {
            return Err(Error::resource_exhausted(format!(
                "memory: {} requested, {} of {} in use",
                request.memory, memory, self.pool.memory
            )));
        }
        if storage + request.storage > self.pool.storage {
            return Err(Error::resource_exhausted(format!(
                "storage: {} requested, {} of {} in use",
                request.storage, storage, self.pool.storage
            )));
        }

        let grant = ResourceGrant::from(request);
        self.grants.insert(module_id.clone(), grant);
        tracing::debug!(module_id = %module_id, ?grant, "resource grant committed");
        Ok(grant)
    }

    /// Release a module's grant. Releasing an unknown module is a no-op.
    pub fn release(&mut self, module_id: &ModuleId) {
        if self.grants.remove(module_id).is_some() {
            tracing::debug!(module_id = %module_id, "resource grant released");
        }
    }

    /// Atomically replace an existing grant. The old grant is kept intact
    /// when the replacement would exceed capacity.
    pub fn regrant(
        &mut self,
        module_id: &ModuleId,
        request: ResourceRequest,
    ) -> Result<ResourceGrant> {
        let old = self
            .grants
            .get(module_id)
            .copied()
            .ok_or_else(|| Error::not_found(format!("no grant for module {}", module_id)))?;

        let (cpu, memory, storage) = self.outstanding();
        let fits = cpu - old.cpu + request.cpu <= self.pool.cpu
            && memory - old.memory + request.memory <= self.pool.memory
            && storage - old.storage + request.storage <= self.pool.storage;
        if !fits {
            return Err(Error::resource_exhausted(format!(
                "regrant for module {} exceeds pool capacity",
                module_id
            )));
        }

        let grant = ResourceGrant::from(request);
        self.grants.insert(module_id.clone(), grant);
        tracing::debug!(module_id = %module_id, ?grant, "resource grant replaced");
        Ok(grant)
    }

    /// Get a module's current grant.
    pub fn get(&self, module_id: &ModuleId) -> Option<ResourceGrant> {
        self.grants.get(module_id).copied()
    }

    /// Per-type percentage of pool capacity currently consumed.
    pub fn utilization(&self) -> ResourceUtilization {
        let (cpu, memory, storage) = self.outstanding();
        ResourceUtilization {
            cpu_pct: percentage(cpu, self.pool.cpu),
            memory_pct: percentage(memory, self.pool.memory),
            storage_pct: percentage(storage, self.pool.storage),
        }
    }

    /// Number of outstanding grants.
    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }

    fn outstanding(&self) -> (u64, u64, u64) {
        self.grants.values().fold((0, 0, 0), |acc, g| {
            (acc.0 + g.cpu, acc.1 + g.memory, acc.2 + g.storage)
        })
    }
}

fn percentage(used: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        (used as f64 / capacity as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_pool() -> PoolConfig {
        PoolConfig {
            cpu: 100,
            memory: 1024,
            storage: 4096,
        }
    }

    fn request(cpu: u64, memory: u64, storage: u64) -> ResourceRequest {
        ResourceRequest {
            cpu,
            memory,
            storage,
        }
    }

    #[test]
    fn test_grant_and_utilization() {
        let mut ledger = ResourceLedger::new(small_pool());
        let id = ModuleId::new();

        ledger.grant(&id, request(30, 512, 1024)).unwrap();

        let util = ledger.utilization();
        assert_eq!(util.cpu_pct, 30.0);
        assert_eq!(util.memory_pct, 50.0);
        assert_eq!(util.storage_pct, 25.0);
    }

    #[test]
    fn test_grant_exceeding_capacity_fails_atomically() {
        let mut ledger = ResourceLedger::new(small_pool());
        ledger.grant(&ModuleId::new(), request(30, 0, 0)).unwrap();

        // cpu would exceed; memory and storage would fit. Nothing commits.
        let err = ledger
            .grant(&ModuleId::new(), request(80, 100, 100))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
        assert_eq!(ledger.utilization().cpu_pct, 30.0);
        assert_eq!(ledger.utilization().memory_pct, 0.0);
        assert_eq!(ledger.grant_count(), 1);
    }

    #[test]
    fn test_release_returns_to_baseline() {
        let mut ledger = ResourceLedger::new(small_pool());
        let id = ModuleId::new();

        ledger.grant(&id, request(30, 512, 1024)).unwrap();
        ledger.release(&id);

        assert_eq!(ledger.utilization().cpu_pct, 0.0);
        assert_eq!(ledger.grant_count(), 0);

        // Re-grant after release does not double-count.
        ledger.grant(&id, request(30, 512, 1024)).unwrap();
        assert_eq!(ledger.utilization().cpu_pct, 30.0);
    }

    #[test]
    fn test_double_grant_rejected() {
        let mut ledger = ResourceLedger::new(small_pool());
        let id = ModuleId::new();

        ledger.grant(&id, request(10, 10, 10)).unwrap();
        assert!(ledger.grant(&id, request(10, 10, 10)).is_err());
        assert_eq!(ledger.grant_count(), 1);
    }

    #[test]
    fn test_regrant_replaces_within_capacity() {
        let mut ledger = ResourceLedger::new(small_pool());
        let id = ModuleId::new();

        ledger.grant(&id, request(60, 512, 1024)).unwrap();
        // 60 -> 90 fits because the old grant is returned first.
        ledger.regrant(&id, request(90, 512, 1024)).unwrap();
        assert_eq!(ledger.utilization().cpu_pct, 90.0);
    }

    #[test]
    fn test_regrant_failure_keeps_old_grant() {
        let mut ledger = ResourceLedger::new(small_pool());
        let id = ModuleId::new();

        ledger.grant(&id, request(60, 512, 1024)).unwrap();
        let err = ledger.regrant(&id, request(120, 512, 1024)).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));
        assert_eq!(ledger.get(&id).unwrap().cpu, 60);
    }

    #[test]
    fn test_regrant_unknown_module() {
        let mut ledger = ResourceLedger::new(small_pool());
        assert!(ledger.regrant(&ModuleId::new(), request(1, 1, 1)).is_err());
    }

    proptest! {
        /// For any interleaving of grants and releases, outstanding grants
        /// never exceed pool capacity in any resource type.
        #[test]
        fn prop_outstanding_never_exceeds_capacity(
            ops in proptest::collection::vec((0u8..2, 0u64..60, 0u64..600, 0u64..2048), 1..40)
        ) {
            let mut ledger = ResourceLedger::new(small_pool());
            let mut ids: Vec<ModuleId> = Vec::new();

            for (op, cpu, memory, storage) in ops {
                if op == 0 {
                    let id = ModuleId::new();
                    if ledger.grant(&id, request(cpu, memory, storage)).is_ok() {
                        ids.push(id);
                    }
                } else if let Some(id) = ids.pop() {
                    ledger.release(&id);
                }

                let (c, m, s) = ledger.outstanding();
                prop_assert!(c <= 100);
                prop_assert!(m <= 1024);
                prop_assert!(s <= 4096);
            }
        }
    }
}
