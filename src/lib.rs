//! # Warden Core - Autonomous Module Orchestration Kernel
//!
//! Supervisory control kernel providing:
//! - Module lifecycle management with health-driven state transitions
//! - Declarative resource accounting (cpu, memory, storage grants)
//! - Point-to-point inter-module messaging with bounded channels
//! - Periodic health monitoring, failure classification, and recovery dispatch
//! - Behavioral pattern mining over a rolling interaction-event window
//!
//! ## Architecture
//!
//! The kernel follows a single-owner model where the `Kernel` owns all mutable state:
//! ```text
//!                       ┌───────────────────────────────────┐
//!   collaborator calls →│           Kernel                  │
//!                       │  ┌────────┐ ┌─────────┐ ┌──────┐  │
//!                       │  │Resource│ │ Module  │ │Fabric│  │
//!                       │  │ Ledger │ │Registry │ │      │  │
//!                       │  └────────┘ └─────────┘ └──────┘  │
//!                       │  ┌────────────┐ ┌──────────────┐  │
//!                       │  │    Task    │ │Health Monitor│  │
//!                       │  │Orchestrator│ │ & Supervisor │  │
//!                       │  └────────────┘ └──────────────┘  │
//!                       └───────────────┬───────────────────┘
//!                                       │ events / reports
//!                       ┌───────────────┴───────────────────┐
//!                       │  Pattern Engine (3 analysis loops)│
//!                       └───────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod events;
pub mod fabric;
pub mod kernel;
pub mod patterns;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
