//! Forgetting-curve retention model.
//!
//! Pure functions: current retention from elapsed time, strength, and
//! importance (Ebbinghaus-style exponential decay), the strength boost
//! applied on access, and the archive eligibility policy. All tunables live
//! in [`RetentionConfig`](crate::config::RetentionConfig).

use serde::Serialize;

use crate::config::RetentionConfig;

/// Discrete retention buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionLevel {
    Strong,
    Moderate,
    Weak,
    Forgotten,
}

const STRONG_THRESHOLD: f64 = 0.75;
const MODERATE_THRESHOLD: f64 = 0.4;
const WEAK_THRESHOLD: f64 = 0.15;

/// Retention floor for the highest importance tier. Memories with
/// importance ≥ 0.9 never decay below this.
const HIGH_IMPORTANCE_RETENTION_FLOOR: f64 = 0.25;

/// Step multiplier applied to strength per importance tier.
pub fn importance_multiplier(importance: f64) -> f64 {
    if importance >= 0.9 {
        4.0
    } else if importance >= 0.6 {
        2.0
    } else if importance >= 0.3 {
        1.0
    } else {
        0.5
    }
}

/// Current retention in `[0, 1]` after `hours_since_access` hours.
///
/// `retention = exp(-t · λ / (s_eff · 24))` with
/// `s_eff = max(min_strength, strength × importance_multiplier)`.
pub fn retention(
    hours_since_access: f64,
    strength: f64,
    importance: f64,
    cfg: &RetentionConfig,
) -> f64 {
    let t = hours_since_access.max(0.0);
    let s_eff = (strength * importance_multiplier(importance)).max(cfg.min_strength);
    let r = (-t * cfg.decay_lambda / (s_eff * 24.0)).exp();

    if importance >= 0.9 {
        r.max(HIGH_IMPORTANCE_RETENTION_FLOOR)
    } else {
        r
    }
}

/// Bucket a retention value into a discrete level.
pub fn retention_level(retention: f64) -> RetentionLevel {
    if retention >= STRONG_THRESHOLD {
        RetentionLevel::Strong
    } else if retention >= MODERATE_THRESHOLD {
        RetentionLevel::Moderate
    } else if retention >= WEAK_THRESHOLD {
        RetentionLevel::Weak
    } else {
        RetentionLevel::Forgotten
    }
}

/// Strength boost earned by one access.
///
/// Diminishes with prior access count and scales mildly with importance:
/// `min(max_boost, (base / (1 + d·count)) × (1 + (importance − 0.5) × 0.5))`.
pub fn access_boost(access_count: u32, importance: f64, cfg: &RetentionConfig) -> f64 {
    let diminished = cfg.boost_base / (1.0 + cfg.boost_diminishing * access_count as f64);
    let scaled = diminished * (1.0 + (importance - 0.5) * 0.5);
    scaled.min(cfg.max_boost)
}

/// New strength after applying a boost, capped at `max_strength`.
pub fn apply_boost(strength: f64, boost: f64, cfg: &RetentionConfig) -> f64 {
    (strength + boost).min(cfg.max_strength)
}

/// Archive eligibility: low-importance, low-retention, weak, and inactive.
///
/// The caller is responsible for the corpus-size floor
/// (`archive_min_corpus`) — eligibility is per-record only.
pub fn is_archive_candidate(
    importance: f64,
    current_retention: f64,
    strength: f64,
    days_inactive: i64,
    cfg: &RetentionConfig,
) -> bool {
    importance < cfg.archive_importance_ceiling
        && current_retention < cfg.archive_retention_floor
        && strength < cfg.archive_strength_floor
        && days_inactive > cfg.archive_inactive_days
}
