//! Effective-confidence model.
//!
//! Combines stored confidence, idle time, confirmations, contradictions, and
//! importance into an effective score and a discrete level. High-importance
//! memories keep a raised floor: contradictions alone can never fully
//! discredit them.

use serde::Serialize;

/// Confidence lost per idle day.
const DECAY_PER_DAY: f64 = 0.005;

/// Confidence gained per confirmation beyond the first source.
const CONFIRM_BOOST: f64 = 0.05;

/// Confidence lost per contradiction, up to [`CONTRADICTION_CAP`] counted.
const CONTRADICTION_PENALTY: f64 = 0.1;
const CONTRADICTION_CAP: u32 = 5;

/// Flat bonus for importance above 0.7.
const HIGH_IMPORTANCE_BOOST: f64 = 0.1;

const HIGH_THRESHOLD: f64 = 0.8;
const MEDIUM_THRESHOLD: f64 = 0.55;
const LOW_THRESHOLD: f64 = 0.3;

/// Discrete confidence buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Uncertain,
}

impl ConfidenceLevel {
    /// Human-readable caution note for uncertain memories; `None` otherwise.
    pub fn caution(&self) -> Option<&'static str> {
        match self {
            Self::Uncertain => {
                Some("this memory is uncertain — verify before relying on it")
            }
            _ => None,
        }
    }
}

/// Floor below which effective confidence cannot fall, by importance tier.
pub fn confidence_floor(importance: f64) -> f64 {
    if importance >= 0.9 {
        0.4
    } else if importance >= 0.7 {
        0.3
    } else if importance >= 0.4 {
        0.15
    } else {
        0.05
    }
}

/// Effective confidence in `[floor, 1]`.
pub fn effective_confidence(
    confidence: f64,
    days_since_access: f64,
    source_count: u32,
    contradiction_count: u32,
    importance: f64,
) -> f64 {
    let idle_penalty = days_since_access.max(0.0) * DECAY_PER_DAY;
    let confirm = (source_count.saturating_sub(1)) as f64 * CONFIRM_BOOST;
    let contradiction =
        contradiction_count.min(CONTRADICTION_CAP) as f64 * CONTRADICTION_PENALTY;
    let importance_bonus = if importance > 0.7 {
        HIGH_IMPORTANCE_BOOST
    } else {
        0.0
    };

    let raw = confidence - idle_penalty + confirm - contradiction + importance_bonus;
    raw.clamp(confidence_floor(importance), 1.0)
}

/// Bucket an effective confidence into a discrete level.
pub fn confidence_level(effective: f64) -> ConfidenceLevel {
    if effective >= HIGH_THRESHOLD {
        ConfidenceLevel::High
    } else if effective >= MEDIUM_THRESHOLD {
        ConfidenceLevel::Medium
    } else if effective >= LOW_THRESHOLD {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::Uncertain
    }
}
