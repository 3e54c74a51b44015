//! Configuration structures.
//!
//! All policy constants live here: pool capacities, monitor thresholds,
//! analysis periods and windows. Every section has serde defaults so a
//! partial config deserializes cleanly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Resource pool capacities.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Communication fabric configuration.
    #[serde(default)]
    pub fabric: FabricConfig,

    /// Health monitor and recovery supervision.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Task orchestration.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Behavioral pattern engine.
    #[serde(default)]
    pub patterns: PatternConfig,
}

/// Resource pool capacities per resource type.
///
/// These numbers are declarative accounting, not OS-level enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Total cpu-units available for grants.
    pub cpu: u64,

    /// Total memory units available for grants.
    pub memory: u64,

    /// Total storage units available for grants.
    pub storage: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        // Large enough to hold a full default module complement.
        Self {
            cpu: 300,
            memory: 8192,
            storage: 36864,
        }
    }
}

/// Communication fabric configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Bounded queue capacity per directed channel. A full queue rejects
    /// sends with ChannelFull rather than blocking.
    pub channel_capacity: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sweep period.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Below this score a module is marked Degraded.
    pub degraded_threshold: u32,

    /// Below this score a module is marked Failed and escalated.
    pub failure_threshold: u32,

    /// Score assigned after a successful recovery. Below 100: recovered
    /// modules start under probation.
    pub recovery_baseline: u32,

    /// Consecutive failed recoveries before a module is permanently failed.
    pub max_recovery_attempts: u32,

    /// Score decrement per observed fault.
    pub fault_decay: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            degraded_threshold: 50,
            failure_threshold: 10,
            recovery_baseline: 80,
            max_recovery_attempts: 3,
            fault_decay: 10,
        }
    }
}

/// Task orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-module execution history ring capacity (oldest entries evicted).
    pub history_capacity: usize,

    /// Workflow confidence boost applied to the success rate, clamped at
    /// 1.0. Placeholder scoring policy, tunable.
    pub workflow_confidence_boost: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 32,
            workflow_confidence_boost: 1.2,
        }
    }
}

/// Behavioral pattern engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Period of the pattern-analysis tick (temporal, spatial, sequential).
    #[serde(with = "humantime_serde")]
    pub analysis_interval: Duration,

    /// Event window read by the pattern-analysis tick.
    #[serde(with = "humantime_serde")]
    pub analysis_window: Duration,

    /// Period of the behavior-modeling tick.
    #[serde(with = "humantime_serde")]
    pub behavior_interval: Duration,

    /// Event window read by the behavior-modeling tick.
    #[serde(with = "humantime_serde")]
    pub behavior_window: Duration,

    /// Period of the adaptation-suggestion tick.
    #[serde(with = "humantime_serde")]
    pub adaptation_interval: Duration,

    /// A sequential pair is common only when its count exceeds this.
    pub sequence_support_threshold: u32,

    /// Behavior modeling is skipped below this many events in the window.
    pub min_behavior_events: usize,

    /// Below this event count the usage style is Light.
    pub light_usage_threshold: usize,

    /// At or above this event count the usage style is Intensive.
    pub heavy_usage_threshold: usize,

    /// Actor-diversity ratio (distinct actors / events) at or above which
    /// the usage style is Exploratory.
    pub diversity_threshold: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            analysis_interval: Duration::from_secs(30),
            analysis_window: Duration::from_secs(300),
            behavior_interval: Duration::from_secs(60),
            behavior_window: Duration::from_secs(3600),
            adaptation_interval: Duration::from_secs(120),
            sequence_support_threshold: 2,
            min_behavior_events: 5,
            light_usage_threshold: 10,
            heavy_usage_threshold: 50,
            diversity_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_documented_policy() {
        let cfg = Config::default();
        assert_eq!(cfg.monitor.degraded_threshold, 50);
        assert_eq!(cfg.monitor.failure_threshold, 10);
        assert_eq!(cfg.monitor.recovery_baseline, 80);
        assert_eq!(cfg.monitor.max_recovery_attempts, 3);
        assert_eq!(cfg.patterns.sequence_support_threshold, 2);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let cfg: Config = serde_json::from_str(r#"{"pool": {"cpu": 100, "memory": 512, "storage": 1024}}"#)
            .unwrap();
        assert_eq!(cfg.pool.cpu, 100);
        assert_eq!(cfg.fabric.channel_capacity, 64);
    }

    #[test]
    fn test_humantime_durations() {
        let cfg: Config =
            serde_json::from_str(r#"{"monitor": {"tick_interval": "250ms", "degraded_threshold": 50, "failure_threshold": 10, "recovery_baseline": 80, "max_recovery_attempts": 3, "fault_decay": 10}}"#)
                .unwrap();
        assert_eq!(cfg.monitor.tick_interval, Duration::from_millis(250));
    }
}
