//! Pattern analyzers - pure derivations over an event window.
//!
//! Each analyzer is a plain function of its inputs so reports are
//! reproducible: same window, same report. No model, no randomness -
//! documented thresholds only.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::log::InteractionEvent;
use crate::types::PatternConfig;

/// Report category, for the latest-report query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PatternCategory {
    Temporal,
    Spatial,
    Behavioral,
    Sequential,
}

/// One peak hour in the temporal report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHour {
    pub hour: u32,
    pub count: u32,
}

/// Hour-of-day usage distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalReport {
    /// Event counts per hour of day, 24 buckets.
    pub hourly: Vec<u32>,
    /// Top-3 hours by count; ties break toward the earlier hour.
    pub peak_hours: Vec<PeakHour>,
    pub window_events: usize,
    pub generated_at: DateTime<Utc>,
}

/// Frequency entry for a named key (location, actor, event type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub key: String,
    pub count: u32,
}

/// Location frequency table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialReport {
    /// Top-5 locations by count; ties keep first-seen order.
    pub top_locations: Vec<FrequencyEntry>,
    pub window_events: usize,
    pub generated_at: DateTime<Utc>,
}

/// Usage style classification - a deterministic function of interaction
/// count and actor diversity, not ML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStyle {
    /// Too few events to say much.
    Light,
    /// Many distinct actors relative to event count.
    Exploratory,
    /// Heavy sustained interaction.
    Intensive,
    /// Steady use of a small actor set.
    Routine,
}

/// Actor and event-type frequency tables plus the style classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralReport {
    /// Most-used actors, descending; ties keep first-seen order.
    pub top_actors: Vec<FrequencyEntry>,
    pub event_type_counts: Vec<FrequencyEntry>,
    pub usage_style: UsageStyle,
    pub interaction_count: usize,
    pub distinct_actors: usize,
    /// distinct_actors / interaction_count (0 when the window is empty).
    pub actor_diversity: f64,
    pub generated_at: DateTime<Utc>,
}

/// One adjacent event-type transition that cleared the support threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePattern {
    pub from: String,
    pub to: String,
    pub count: u32,
    /// count / window event count.
    pub confidence: f64,
}

/// Adjacent-pair transition table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialReport {
    /// Pairs with count strictly above the support threshold, descending.
    pub common_sequences: Vec<SequencePattern>,
    pub window_events: usize,
    pub generated_at: DateTime<Utc>,
}

/// Read-only suggestion derived from the latest behavioral report. Never
/// applied by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "suggestion", rename_all = "snake_case")]
pub enum AdaptationSuggestion {
    /// Low diversity or light usage: reduce surface area.
    SimplifyInterface,
    /// Promote the most-used actors.
    PrioritizeFrequentActors { actors: Vec<String> },
    /// Heavy usage: expose faster paths.
    EnableShortcuts,
}

/// Count occurrences keeping first-seen insertion order.
fn count_in_order<'a, I: Iterator<Item = &'a str>>(keys: I) -> Vec<FrequencyEntry> {
    let mut entries: Vec<FrequencyEntry> = Vec::new();
    for key in keys {
        match entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.count += 1,
            None => entries.push(FrequencyEntry {
                key: key.to_string(),
                count: 1,
            }),
        }
    }
    entries
}

/// Hour-of-day histogram and peak hours.
pub fn analyze_temporal(events: &[InteractionEvent]) -> TemporalReport {
    let mut hourly = vec![0u32; 24];
    for event in events {
        hourly[event.timestamp.hour() as usize] += 1;
    }

    let mut peaks: Vec<PeakHour> = hourly
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(hour, count)| PeakHour {
            hour: hour as u32,
            count: *count,
        })
        .collect();
    // Descending by count; the enumeration order breaks ties toward the
    // earlier hour under a stable sort.
    peaks.sort_by(|a, b| b.count.cmp(&a.count));
    peaks.truncate(3);

    TemporalReport {
        hourly,
        peak_hours: peaks,
        window_events: events.len(),
        generated_at: Utc::now(),
    }
}

/// Location frequency table over events that carry a location.
pub fn analyze_spatial(events: &[InteractionEvent]) -> SpatialReport {
    let mut entries = count_in_order(
        events
            .iter()
            .filter_map(|e| e.location.as_deref()),
    );
    entries.sort_by(|a, b| b.count.cmp(&a.count)); // stable: first-seen on ties
    entries.truncate(5);

    SpatialReport {
        top_locations: entries,
        window_events: events.len(),
        generated_at: Utc::now(),
    }
}

/// Actor/event-type frequencies and the usage-style classification.
pub fn analyze_behavioral(events: &[InteractionEvent], config: &PatternConfig) -> BehavioralReport {
    let mut top_actors = count_in_order(events.iter().map(|e| e.actor.as_str()));
    let distinct_actors = top_actors.len();
    top_actors.sort_by(|a, b| b.count.cmp(&a.count));
    top_actors.truncate(10);

    let mut event_type_counts = count_in_order(events.iter().map(|e| e.event_type.as_str()));
    event_type_counts.sort_by(|a, b| b.count.cmp(&a.count));

    let interaction_count = events.len();
    let actor_diversity = if interaction_count == 0 {
        0.0
    } else {
        distinct_actors as f64 / interaction_count as f64
    };

    let usage_style = if interaction_count < config.light_usage_threshold {
        UsageStyle::Light
    } else if actor_diversity >= config.diversity_threshold {
        UsageStyle::Exploratory
    } else if interaction_count >= config.heavy_usage_threshold {
        UsageStyle::Intensive
    } else {
        UsageStyle::Routine
    };

    BehavioralReport {
        top_actors,
        event_type_counts,
        usage_style,
        interaction_count,
        distinct_actors,
        actor_diversity,
        generated_at: Utc::now(),
    }
}

/// Adjacent event-type transitions above the support threshold.
pub fn analyze_sequential(events: &[InteractionEvent], config: &PatternConfig) -> SequentialReport {
    let mut pairs: Vec<(String, String, u32)> = Vec::new();
    for window in events.windows(2) {
        let (from, to) = (&window[0].event_type, &window[1].event_type);
        match pairs
            .iter_mut()
            .find(|(f, t, _)| f == from && t == to)
        {
            Some((_, _, count)) => *count += 1,
            None => pairs.push((from.clone(), to.clone(), 1)),
        }
    }

    let window_events = events.len();
    let mut common_sequences: Vec<SequencePattern> = pairs
        .into_iter()
        .filter(|(_, _, count)| *count > config.sequence_support_threshold)
        .map(|(from, to, count)| SequencePattern {
            from,
            to,
            count,
            confidence: count as f64 / window_events as f64,
        })
        .collect();
    common_sequences.sort_by(|a, b| b.count.cmp(&a.count));
    common_sequences.truncate(10);

    SequentialReport {
        common_sequences,
        window_events,
        generated_at: Utc::now(),
    }
}

/// Derive read-only adaptation suggestions from a behavioral report.
pub fn derive_adaptations(
    report: &BehavioralReport,
    config: &PatternConfig,
) -> Vec<AdaptationSuggestion> {
    let mut suggestions = Vec::new();

    if report.usage_style == UsageStyle::Light
        || report.actor_diversity < config.diversity_threshold / 2.0
    {
        suggestions.push(AdaptationSuggestion::SimplifyInterface);
    }

    let actors: Vec<String> = report
        .top_actors
        .iter()
        .take(3)
        .map(|e| e.key.clone())
        .collect();
    if !actors.is_empty() {
        suggestions.push(AdaptationSuggestion::PrioritizeFrequentActors { actors });
    }

    if report.interaction_count >= config.heavy_usage_threshold {
        suggestions.push(AdaptationSuggestion::EnableShortcuts);
    }

    suggestions
}
