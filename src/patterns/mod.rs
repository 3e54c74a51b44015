//! Behavioral pattern engine.
//!
//! Mines the interaction-event log on three independent periods: a pattern
//! analysis tick (temporal, spatial, sequential over a short window), a
//! behavior-modeling tick (longer window), and an adaptation tick deriving
//! read-only suggestions from the latest behavioral report. Each category
//! keeps only its latest report; a new tick overwrites the previous one.

mod analysis;
mod log;

pub use analysis::{
    analyze_behavioral, analyze_sequential, analyze_spatial, analyze_temporal,
    derive_adaptations, AdaptationSuggestion, BehavioralReport, FrequencyEntry, PatternCategory,
    PeakHour, SequencePattern, SequentialReport, SpatialReport, TemporalReport, UsageStyle,
};
pub use log::{InteractionEvent, InteractionLog};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::interval;

use crate::types::PatternConfig;

/// Latest report for a category, as returned by the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum PatternReport {
    Temporal(TemporalReport),
    Spatial(SpatialReport),
    Behavioral(BehavioralReport),
    Sequential(SequentialReport),
}

#[derive(Debug, Default)]
struct LatestReports {
    temporal: Option<TemporalReport>,
    spatial: Option<SpatialReport>,
    behavioral: Option<BehavioralReport>,
    sequential: Option<SequentialReport>,
}

/// Pattern engine - owns the event log, the latest reports, and the three
/// analysis loops.
#[derive(Debug)]
pub struct PatternEngine {
    log: Arc<RwLock<InteractionLog>>,
    reports: Arc<RwLock<LatestReports>>,
    suggestions: Arc<RwLock<Vec<AdaptationSuggestion>>>,
    config: PatternConfig,
    stop_txs: Vec<tokio::sync::oneshot::Sender<()>>,
}

impl PatternEngine {
    pub fn new(config: PatternConfig) -> Self {
        // Retain events for the largest window any tick reads.
        let retention = config.analysis_window.max(config.behavior_window);
        Self {
            log: Arc::new(RwLock::new(InteractionLog::new(retention))),
            reports: Arc::new(RwLock::new(LatestReports::default())),
            suggestions: Arc::new(RwLock::new(Vec::new())),
            config,
            stop_txs: Vec::new(),
        }
    }

    /// Append an interaction event to the log.
    pub async fn record(&self, event: InteractionEvent) {
        self.log.write().await.record(event);
    }

    /// Number of events currently retained.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.len()
    }

    /// Latest report for a category, if one has been produced.
    pub async fn latest(&self, category: PatternCategory) -> Option<PatternReport> {
        let reports = self.reports.read().await;
        match category {
            PatternCategory::Temporal => reports.temporal.clone().map(PatternReport::Temporal),
            PatternCategory::Spatial => reports.spatial.clone().map(PatternReport::Spatial),
            PatternCategory::Behavioral => {
                reports.behavioral.clone().map(PatternReport::Behavioral)
            }
            PatternCategory::Sequential => {
                reports.sequential.clone().map(PatternReport::Sequential)
            }
        }
    }

    /// Latest adaptation suggestions. Read-only; nothing is applied.
    pub async fn adaptation_suggestions(&self) -> Vec<AdaptationSuggestion> {
        self.suggestions.read().await.clone()
    }

    /// Run one pattern-analysis tick: temporal, spatial, and sequential
    /// reports over the short window.
    pub async fn analysis_once(&self) {
        Self::run_analysis(&self.log, &self.reports, &self.config).await;
    }

    /// Run one behavior-modeling tick over the long window.
    pub async fn behavior_once(&self) {
        Self::run_behavior(&self.log, &self.reports, &self.config).await;
    }

    /// Run one adaptation tick from the latest behavioral report.
    pub async fn adaptation_once(&self) {
        Self::run_adaptation(&self.reports, &self.suggestions, &self.config).await;
    }

    /// Start the three analysis loops. Returns their join handles.
    pub fn start(&mut self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);

        {
            let log = self.log.clone();
            let reports = self.reports.clone();
            let config = self.config.clone();
            let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
            self.stop_txs.push(stop_tx);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(config.analysis_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => Self::run_analysis(&log, &reports, &config).await,
                        _ = &mut stop_rx => break,
                    }
                }
            }));
        }

        {
            let log = self.log.clone();
            let reports = self.reports.clone();
            let config = self.config.clone();
            let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
            self.stop_txs.push(stop_tx);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(config.behavior_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => Self::run_behavior(&log, &reports, &config).await,
                        _ = &mut stop_rx => break,
                    }
                }
            }));
        }

        {
            let reports = self.reports.clone();
            let suggestions = self.suggestions.clone();
            let config = self.config.clone();
            let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
            self.stop_txs.push(stop_tx);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(config.adaptation_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => Self::run_adaptation(&reports, &suggestions, &config).await,
                        _ = &mut stop_rx => break,
                    }
                }
            }));
        }

        handles
    }

    /// Stop all analysis loops.
    pub fn stop(&mut self) {
        for tx in self.stop_txs.drain(..) {
            let _ = tx.send(());
        }
    }

    async fn run_analysis(
        log: &Arc<RwLock<InteractionLog>>,
        reports: &Arc<RwLock<LatestReports>>,
        config: &PatternConfig,
    ) {
        let events = log
            .read()
            .await
            .window_at(chrono::Utc::now(), config.analysis_window);
        tracing::debug!(events = events.len(), "pattern analysis tick");

        let temporal = analyze_temporal(&events);
        let spatial = analyze_spatial(&events);
        let sequential = analyze_sequential(&events, config);

        let mut reports = reports.write().await;
        reports.temporal = Some(temporal);
        reports.spatial = Some(spatial);
        reports.sequential = Some(sequential);
    }

    async fn run_behavior(
        log: &Arc<RwLock<InteractionLog>>,
        reports: &Arc<RwLock<LatestReports>>,
        config: &PatternConfig,
    ) {
        let events = log
            .read()
            .await
            .window_at(chrono::Utc::now(), config.behavior_window);

        // Too little signal to model: keep the previous report.
        if events.len() < config.min_behavior_events {
            tracing::debug!(events = events.len(), "behavior modeling skipped");
            return;
        }

        let behavioral = analyze_behavioral(&events, config);
        tracing::debug!(style = ?behavioral.usage_style, "behavior model updated");
        reports.write().await.behavioral = Some(behavioral);
    }

    async fn run_adaptation(
        reports: &Arc<RwLock<LatestReports>>,
        suggestions: &Arc<RwLock<Vec<AdaptationSuggestion>>>,
        config: &PatternConfig,
    ) {
        let behavioral = reports.read().await.behavioral.clone();
        let Some(behavioral) = behavioral else {
            return;
        };

        let derived = derive_adaptations(&behavioral, config);
        tracing::debug!(count = derived.len(), "adaptation suggestions refreshed");
        *suggestions.write().await = derived;
    }
}
