use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{WaypointError, WaypointResult};

/// Externally assigned, stable identifier of a knowledge point.
pub type KpId = i64;

// ---------------------------------------------------------------------------
// KnowledgePoint: an atomic unit of learnable material
// ---------------------------------------------------------------------------

/// A knowledge point in the curriculum graph. Immutable reference data,
/// written only by curriculum ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgePoint {
    /// Positive, externally assigned identifier.
    pub id: KpId,
    /// Unique display name.
    pub name: String,
    /// Coarse ordinal difficulty, starting at 1.
    pub difficulty: u32,
}

impl KnowledgePoint {
    pub fn new(id: KpId, name: impl Into<String>, difficulty: u32) -> Self {
        Self {
            id,
            name: name.into(),
            difficulty,
        }
    }

    /// Ordering used for every KP set inside a learning path:
    /// difficulty, then name, then id.
    pub fn path_order(&self, other: &Self) -> Ordering {
        self.difficulty
            .cmp(&other.difficulty)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.id.cmp(&other.id))
    }
}

// ---------------------------------------------------------------------------
// Raw records as they come out of a backend
// ---------------------------------------------------------------------------

/// A number as it may appear in loosely typed backend rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl LooseNumber {
    /// Coerce to an integer, rounding fractional values. Non-finite and
    /// non-numeric values yield `None`.
    pub fn as_integer(&self) -> Option<i64> {
        let rounded = |f: f64| f.is_finite().then(|| f.round() as i64);
        match self {
            LooseNumber::Int(v) => Some(*v),
            LooseNumber::Float(f) => rounded(*f),
            LooseNumber::Text(s) => s.trim().parse::<f64>().ok().and_then(rounded),
        }
    }
}

/// Untyped shape of a knowledge point row. Validated into a
/// [`KnowledgePoint`] at the gateway boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgePointRecord {
    #[serde(default, alias = "kp_id")]
    pub id: Option<LooseNumber>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub difficulty: Option<LooseNumber>,
}

impl TryFrom<KnowledgePointRecord> for KnowledgePoint {
    type Error = WaypointError;

    fn try_from(record: KnowledgePointRecord) -> WaypointResult<Self> {
        let id = record
            .id
            .as_ref()
            .and_then(LooseNumber::as_integer)
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                WaypointError::MalformedRecord(format!(
                    "knowledge point without a positive id: {:?}",
                    record.id
                ))
            })?;

        let name = record
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                WaypointError::MalformedRecord(format!("knowledge point {} has no name", id))
            })?;

        // Missing or nonsensical difficulty is coerced to the easiest tier.
        let difficulty = record
            .difficulty
            .as_ref()
            .and_then(LooseNumber::as_integer)
            .filter(|d| *d >= 1)
            .map(|d| u32::try_from(d).unwrap_or(u32::MAX))
            .unwrap_or(1);

        Ok(KnowledgePoint {
            id,
            name,
            difficulty,
        })
    }
}

impl From<&KnowledgePoint> for KnowledgePointRecord {
    fn from(kp: &KnowledgePoint) -> Self {
        Self {
            id: Some(LooseNumber::Int(kp.id)),
            name: Some(kp.name.clone()),
            difficulty: Some(LooseNumber::Int(i64::from(kp.difficulty))),
        }
    }
}

/// A directed `PREREQUISITE_OF` relation: `from` must be learned before `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prerequisite {
    pub from: KpId,
    pub to: KpId,
}

impl Prerequisite {
    pub fn new(from: KpId, to: KpId) -> Self {
        Self { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> KnowledgePointRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_valid_record() {
        let kp = KnowledgePoint::try_from(record(
            r#"{"id": 3, "name": "Loops (for/while)", "difficulty": 2}"#,
        ))
        .unwrap();
        assert_eq!(kp, KnowledgePoint::new(3, "Loops (for/while)", 2));
    }

    #[test]
    fn test_kp_id_alias_and_coercion() {
        let kp = KnowledgePoint::try_from(record(
            r#"{"kp_id": 4.0, "name": " Functions ", "difficulty": "2.4"}"#,
        ))
        .unwrap();
        assert_eq!(kp.id, 4);
        assert_eq!(kp.name, "Functions");
        assert_eq!(kp.difficulty, 2);
    }

    #[test]
    fn test_missing_difficulty_defaults_to_one() {
        let kp = KnowledgePoint::try_from(record(r#"{"id": 7, "name": "OOP"}"#)).unwrap();
        assert_eq!(kp.difficulty, 1);
    }

    #[test]
    fn test_rejects_missing_or_invalid_id() {
        assert!(KnowledgePoint::try_from(record(r#"{"name": "Orphan"}"#)).is_err());
        assert!(KnowledgePoint::try_from(record(r#"{"id": 0, "name": "Zero"}"#)).is_err());
        assert!(KnowledgePoint::try_from(record(r#"{"id": "abc", "name": "Text"}"#)).is_err());
    }

    #[test]
    fn test_rejects_blank_name() {
        assert!(KnowledgePoint::try_from(record(r#"{"id": 2, "name": "  "}"#)).is_err());
    }

    #[test]
    fn test_path_order() {
        let easy = KnowledgePoint::new(9, "Variables", 1);
        let hard_a = KnowledgePoint::new(5, "Functions", 2);
        let hard_b = KnowledgePoint::new(3, "Loops", 2);

        let mut kps = vec![hard_b.clone(), easy.clone(), hard_a.clone()];
        kps.sort_by(KnowledgePoint::path_order);
        assert_eq!(kps, vec![easy, hard_a, hard_b]);
    }
}
