use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::knowledge_point::KpId;

// ---------------------------------------------------------------------------
// HistoryEntry: one observed interaction of a student with a knowledge point
// ---------------------------------------------------------------------------

/// A single interaction, in the order it occurred. Owned by the caller and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kp_id: KpId,
    /// Outcome, conventionally in `0.0..=1.0`.
    #[serde(default)]
    pub score: f64,
    /// Interaction kind (quiz, video, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Additional model features (`est_minutes`, `difficulty`, ...).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl HistoryEntry {
    pub fn new(kp_id: KpId, score: f64) -> Self {
        Self {
            kp_id,
            score,
            kind: None,
            timestamp: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Numeric value of a named feature. Booleans count as 0/1 and numeric
    /// strings are parsed.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        match name {
            "score" => Some(self.score),
            "kp_id" => Some(self.kp_id as f64),
            _ => match self.extra.get(name)? {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            },
        }
    }

    /// Categorical value of a named feature, rendered as a string.
    pub fn categorical(&self, name: &str) -> Option<String> {
        match name {
            "type" | "kind" => self.kind.clone(),
            "kp_id" => Some(self.kp_id.to_string()),
            _ => match self.extra.get(name)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// PredictionResult
// ---------------------------------------------------------------------------

/// A candidate weak knowledge point with the predictor's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpConfidence {
    pub kp_id: KpId,
    pub confidence: f64,
}

/// Which branch of the predictor produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Fallback,
}

/// Ranked weak-KP candidates for one request. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub top_kp_id: KpId,
    pub confidence: f64,
    /// Highest confidence first, at most three entries, distinct ids.
    pub top_k: Vec<KpConfidence>,
    pub source: PredictionSource,
}

impl PredictionResult {
    /// A single certain answer, as produced by the fallback rule.
    pub fn certain(kp_id: KpId) -> Self {
        Self {
            top_kp_id: kp_id,
            confidence: 1.0,
            top_k: vec![KpConfidence {
                kp_id,
                confidence: 1.0,
            }],
            source: PredictionSource::Fallback,
        }
    }
}
