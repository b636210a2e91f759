//! Typed request/response payloads for the sidecar wire protocol.
//!
//! Every endpoint the sidecar backend touches gets a concrete struct pair,
//! validated at the boundary — no free-form JSON maps cross this module.

use serde::{Deserialize, Serialize};

// ── Collection management ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateCollectionRequest {
    pub vectors: VectorParams,
    pub quantization_config: QuantizationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorParams {
    pub size: usize,
    pub distance: Distance,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum Distance {
    Cosine,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantizationConfig {
    pub scalar: ScalarQuantization,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScalarQuantization {
    #[serde(rename = "type")]
    pub kind: String,
    pub always_ram: bool,
}

impl ScalarQuantization {
    pub fn int8() -> Self {
        Self {
            kind: "int8".into(),
            always_ram: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFieldIndexRequest {
    pub field_name: String,
    pub field_schema: FieldSchema,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSchema {
    Keyword,
    Bool,
}

#[derive(Debug, Deserialize)]
pub struct CollectionInfoResponse {
    pub result: CollectionInfo,
}

#[derive(Debug, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub points_count: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
}

// ── Points ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    pub project: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointStruct {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertPointsRequest {
    pub points: Vec<PointStruct>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletePointsRequest {
    pub points: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPointsRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub with_payload: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Field {
        key: String,
        #[serde(rename = "match")]
        matches: MatchValue,
    },
    HasId {
        has_id: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MatchValue {
    Value { value: serde_json::Value },
    Any { any: Vec<String> },
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub result: Vec<ScoredPointWire>,
}

#[derive(Debug, Deserialize)]
pub struct ScoredPointWire {
    pub id: serde_json::Value,
    pub score: f64,
}

impl ScoredPointWire {
    /// Point ids come back as either JSON strings or integers.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub status: serde_json::Value,
}
