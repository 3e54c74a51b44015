//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

use crate::types::ModuleId;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the warden kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// A resource grant would exceed the configured pool capacity.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A message was addressed to an unregistered module.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    /// A channel's bounded queue is full; the send is rejected, not queued.
    #[error("channel full: {0}")]
    ChannelFull(String),

    /// Module or task not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target module exists but cannot accept new dispatch in its
    /// current state.
    #[error("capacity rejected: {0}")]
    CapacityRejected(String),

    /// No Active module advertises the required capability.
    #[error("no capable module: {0}")]
    NoCapableModule(String),

    /// A task failed inside the executing module. Non-fatal to module
    /// health; attribution stays with the task.
    #[error("task execution failed in module {module_id}: {cause}")]
    TaskExecutionFailed { module_id: ModuleId, cause: String },

    /// The module has exhausted its recovery attempts and is permanently
    /// failed; only unregister + register can reuse the slot.
    #[error("module unrecoverable: {0}")]
    Unrecoverable(String),

    /// Invalid lifecycle state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Operation cancelled before or during dispatch.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Convenience constructors
impl Error {
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn unknown_destination(msg: impl Into<String>) -> Self {
        Self::UnknownDestination(msg.into())
    }

    pub fn channel_full(msg: impl Into<String>) -> Self {
        Self::ChannelFull(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn capacity_rejected(msg: impl Into<String>) -> Self {
        Self::CapacityRejected(msg.into())
    }

    pub fn no_capable_module(msg: impl Into<String>) -> Self {
        Self::NoCapableModule(msg.into())
    }

    pub fn task_execution_failed(module_id: ModuleId, cause: impl Into<String>) -> Self {
        Self::TaskExecutionFailed {
            module_id,
            cause: cause.into(),
        }
    }

    pub fn unrecoverable(msg: impl Into<String>) -> Self {
        Self::Unrecoverable(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
