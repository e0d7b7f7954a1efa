use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{WaypointError, WaypointResult};
use crate::model::knowledge_point::KpId;

// ---------------------------------------------------------------------------
// ContentItem: a unit of learning material attached to one knowledge point
// ---------------------------------------------------------------------------

/// Longest duration a single item may claim: one week.
pub const MAX_EST_MINUTES: u32 = 7 * 24 * 60;

/// A learning-content record owned by the content catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub title: String,
    pub url: String,
    /// The knowledge point this item teaches.
    pub kp_id: KpId,
    /// Estimated time to complete, in minutes.
    pub est_minutes: u32,
    pub difficulty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ContentItem {
    /// Check the fields the ranking logic relies on.
    pub fn validate(self) -> WaypointResult<Self> {
        if self.id.trim().is_empty() {
            return Err(WaypointError::MalformedRecord(format!(
                "content item for kp {} has an empty id",
                self.kp_id
            )));
        }
        if self.est_minutes == 0 {
            return Err(WaypointError::MalformedRecord(format!(
                "content item {} has no estimated duration",
                self.id
            )));
        }
        if self.est_minutes > MAX_EST_MINUTES {
            return Err(WaypointError::MalformedRecord(format!(
                "content item {} claims {} minutes, above the {MAX_EST_MINUTES} limit",
                self.id, self.est_minutes
            )));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// ContentKind
// ---------------------------------------------------------------------------

/// Kind of learning material. Kinds outside the known set are preserved
/// verbatim and rank after every known kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    Video,
    Reading,
    Practice,
    Quiz,
    Assessment,
    Other(String),
}

impl ContentKind {
    /// Position in the canonical learning flow.
    pub fn rank(&self) -> u8 {
        match self {
            ContentKind::Video => 1,
            ContentKind::Reading => 2,
            ContentKind::Practice => 3,
            ContentKind::Quiz => 4,
            ContentKind::Assessment => 5,
            ContentKind::Other(_) => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Reading => "reading",
            ContentKind::Practice => "practice",
            ContentKind::Quiz => "quiz",
            ContentKind::Assessment => "assessment",
            ContentKind::Other(other) => other,
        }
    }
}

impl From<String> for ContentKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "video" => ContentKind::Video,
            "reading" => ContentKind::Reading,
            "practice" => ContentKind::Practice,
            "quiz" => ContentKind::Quiz,
            "assessment" => ContentKind::Assessment,
            _ => ContentKind::Other(value),
        }
    }
}

impl From<ContentKind> for String {
    fn from(kind: ContentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!(ContentKind::from("Video".to_string()), ContentKind::Video);
        assert_eq!(ContentKind::from("QUIZ".to_string()), ContentKind::Quiz);
        assert_eq!(
            ContentKind::from("podcast".to_string()),
            ContentKind::Other("podcast".to_string())
        );
    }

    #[test]
    fn test_unknown_kind_ranks_last() {
        let other = ContentKind::Other("podcast".into());
        assert!(ContentKind::Assessment.rank() < other.rank());
        assert!(ContentKind::Video.rank() < ContentKind::Reading.rank());
        assert!(ContentKind::Practice.rank() < ContentKind::Quiz.rank());
    }

    #[test]
    fn test_item_uses_type_field() {
        let item: ContentItem = serde_json::from_str(
            r#"{"id": "vid-101", "type": "video", "title": "Intro to Variables",
                "url": "https://example.com/vid-101", "kp_id": 1,
                "est_minutes": 6, "difficulty": 1, "metadata": {"source": "internal"}}"#,
        )
        .unwrap();
        assert_eq!(item.kind, ContentKind::Video);

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "video");
    }

    fn quiz(est_minutes: u32) -> ContentItem {
        ContentItem {
            id: "q-1".into(),
            kind: ContentKind::Quiz,
            title: "Quiz".into(),
            url: "https://example.com/q-1".into(),
            kp_id: 1,
            est_minutes,
            difficulty: 1,
            metadata: None,
        }
    }

    #[test]
    fn test_validate_rejects_zero_minutes() {
        assert!(quiz(0).validate().is_err());
    }

    #[test]
    fn test_validate_bounds_minutes() {
        assert!(quiz(MAX_EST_MINUTES).validate().is_ok());
        assert!(quiz(MAX_EST_MINUTES + 1).validate().is_err());
        assert!(quiz(u32::MAX).validate().is_err());
    }
}
