//! Core types for the warden kernel.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ModuleId, TaskId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for pool, monitor, and analysis policy

mod config;
mod errors;
mod ids;

pub use config::{
    Config, FabricConfig, MonitorConfig, OrchestratorConfig, PatternConfig, PoolConfig,
};
pub use errors::{Error, Result};
pub use ids::{ModuleId, TaskId};
