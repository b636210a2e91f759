//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the six record categories), [`MemoryRecord`] (a
//! full row), [`Edge`] with its [`EdgeRelation`] tagged union, and the
//! [`ContradictionKind`] subtypes emitted by the detector.

use serde::{Deserialize, Serialize};

/// Reserved project value visible to every project.
pub const GLOBAL_PROJECT: &str = "global";

/// Maximum number of tags per memory.
pub const MAX_TAGS: usize = 16;

/// Maximum length of a single tag, in bytes.
pub const MAX_TAG_LEN: usize = 64;

/// The six memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Event,
    Observation,
    Preference,
    Note,
    Decision,
}

impl MemoryType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Event => "event",
            Self::Observation => "observation",
            Self::Preference => "preference",
            Self::Note => "note",
            Self::Decision => "decision",
        }
    }

    pub const ALL: [MemoryType; 6] = [
        Self::Fact,
        Self::Event,
        Self::Observation,
        Self::Preference,
        Self::Note,
        Self::Decision,
    ];
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "event" => Ok(Self::Event),
            "observation" => Ok(Self::Observation),
            "preference" => Ok(Self::Preference),
            "note" => Ok(Self::Note),
            "decision" => Ok(Self::Decision),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Owning project. [`GLOBAL_PROJECT`] is visible to every project.
    pub project: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    pub tags: Vec<String>,
    /// How much this memory matters, in `[0, 1]`. Drives decay tier and
    /// confidence floor.
    pub importance: f64,
    /// Stored base confidence in `[0, 1]`. Effective confidence is derived
    /// at read time, see [`crate::memory::confidence`].
    pub confidence: f64,
    /// Decay strength. Grows with access, see [`crate::memory::retention`].
    pub strength: f64,
    /// Number of independent confirmations (starts at 1).
    pub source_count: u32,
    /// Number of active contradiction edges touching this memory.
    pub contradiction_count: u32,
    pub access_count: u32,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 timestamp of the last recall, or `None` if never accessed.
    pub last_accessed: Option<String>,
    /// Tombstone. Non-null rows are hidden from retrieval and candidate sets
    /// but retained for audit.
    pub deleted_at: Option<String>,
    /// 384-dim embedding, or `None` when generation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryRecord {
    /// `true` if this record is visible from `project` (its own project or
    /// the global scope).
    pub fn visible_from(&self, project: &str) -> bool {
        self.project == GLOBAL_PROJECT || self.project == project
    }
}

/// Contradiction subtypes, ordered by pipeline layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// One side negates the other with high lexical overlap.
    Negation,
    /// A configured antonym pair splits across the two texts.
    Antonym,
    /// Subject–predicate–object triples with matching subjects and
    /// incompatible objects. Near-certain.
    Factual,
    /// Very similar meaning, low overlap, both sides negated — rephrasing risk.
    Semantic,
    /// Flagged by the NLI cross-encoder.
    Nli,
}

impl ContradictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negation => "negation",
            Self::Antonym => "antonym",
            Self::Factual => "factual",
            Self::Semantic => "semantic",
            Self::Nli => "nli",
        }
    }
}

impl std::fmt::Display for ContradictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation carried by an edge. Matched exhaustively everywhere an edge is
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRelation {
    Confirms,
    Contradicts(ContradictionKind),
    /// Contradiction asserted explicitly by the caller rather than detected.
    ContradictsManual,
}

impl EdgeRelation {
    /// SQL-compatible string representation (edge CHECK constraint values).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirms => "confirms",
            Self::Contradicts(ContradictionKind::Negation) => "contradicts_negation",
            Self::Contradicts(ContradictionKind::Antonym) => "contradicts_antonym",
            Self::Contradicts(ContradictionKind::Factual) => "contradicts_factual",
            Self::Contradicts(ContradictionKind::Semantic) => "contradicts_semantic",
            Self::Contradicts(ContradictionKind::Nli) => "contradicts_nli",
            Self::ContradictsManual => "contradicts_manual",
        }
    }

    /// `true` for any contradiction relation, detected or manual.
    pub fn is_contradiction(&self) -> bool {
        !matches!(self, Self::Confirms)
    }
}

impl std::str::FromStr for EdgeRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirms" => Ok(Self::Confirms),
            "contradicts_negation" => Ok(Self::Contradicts(ContradictionKind::Negation)),
            "contradicts_antonym" => Ok(Self::Contradicts(ContradictionKind::Antonym)),
            "contradicts_factual" => Ok(Self::Contradicts(ContradictionKind::Factual)),
            "contradicts_semantic" => Ok(Self::Contradicts(ContradictionKind::Semantic)),
            "contradicts_nli" => Ok(Self::Contradicts(ContradictionKind::Nli)),
            "contradicts_manual" => Ok(Self::ContradictsManual),
            _ => Err(format!("unknown edge relation: {s}")),
        }
    }
}

/// A bitemporal relation edge between two memories.
///
/// Edges are created only as a side effect of memory writes. The single
/// permitted mutation is invalidation (setting `valid_to`).
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub relation: EdgeRelation,
    pub confidence: f64,
    /// Subtype-specific evidence (overlap ratios, matched triples, …).
    pub metadata: Option<serde_json::Value>,
    pub valid_from: String,
    /// `None` means currently active.
    pub valid_to: Option<String>,
}

impl Edge {
    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn memory_type_round_trips_through_str() {
        for t in MemoryType::ALL {
            assert_eq!(MemoryType::from_str(t.as_str()).unwrap(), t);
        }
        assert!(MemoryType::from_str("bogus").is_err());
    }

    #[test]
    fn edge_relation_round_trips_through_str() {
        let relations = [
            EdgeRelation::Confirms,
            EdgeRelation::Contradicts(ContradictionKind::Negation),
            EdgeRelation::Contradicts(ContradictionKind::Antonym),
            EdgeRelation::Contradicts(ContradictionKind::Factual),
            EdgeRelation::Contradicts(ContradictionKind::Semantic),
            EdgeRelation::Contradicts(ContradictionKind::Nli),
            EdgeRelation::ContradictsManual,
        ];
        for r in relations {
            assert_eq!(EdgeRelation::from_str(r.as_str()).unwrap(), r);
        }
    }

    #[test]
    fn global_project_is_visible_everywhere() {
        let mut record = MemoryRecord {
            id: "m1".into(),
            project: GLOBAL_PROJECT.into(),
            memory_type: MemoryType::Fact,
            content: "x".into(),
            tags: vec![],
            importance: 0.5,
            confidence: 0.7,
            strength: 1.0,
            source_count: 1,
            contradiction_count: 0,
            access_count: 0,
            created_at: "2026-01-01T00:00:00Z".into(),
            last_accessed: None,
            deleted_at: None,
            embedding: None,
        };
        assert!(record.visible_from("alpha"));
        assert!(record.visible_from("beta"));

        record.project = "alpha".into();
        assert!(record.visible_from("alpha"));
        assert!(!record.visible_from("beta"));
    }
}
