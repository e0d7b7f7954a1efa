use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{WaypointError, WaypointResult};
use crate::model::{
    ContentItem, ContentKind, HistoryEntry, KnowledgePoint, KnowledgePointRecord, KpId,
    Prerequisite,
};
use crate::store::graph::{InMemoryKnowledgeGraph, SurrealKnowledgeGraph};
use crate::store::content::InMemoryContentCatalog;

// ---------------------------------------------------------------------------
// Curriculum ingestion: load reference data into the graph and catalog
// ---------------------------------------------------------------------------

/// A curriculum document: knowledge points, prerequisite edges as
/// `[from, to]` pairs, and the content attached to each knowledge point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curriculum {
    #[serde(default)]
    pub knowledge_points: Vec<KnowledgePointRecord>,
    #[serde(default)]
    pub prerequisites: Vec<(KpId, KpId)>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// Counts of what an ingestion run accepted and rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub knowledge_points: usize,
    pub prerequisites: usize,
    pub content_items: usize,
    pub rejected: usize,
}

impl Curriculum {
    /// Read a curriculum document from a JSON file.
    pub async fn from_path(path: &Path) -> WaypointResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let curriculum: Curriculum = serde_json::from_str(&raw)?;
        Ok(curriculum)
    }

    /// Validated knowledge points plus the number of rejected records.
    fn valid_knowledge_points(&self) -> (Vec<KnowledgePoint>, usize) {
        let mut rejected = 0;
        let mut kps = Vec::with_capacity(self.knowledge_points.len());
        for record in &self.knowledge_points {
            match KnowledgePoint::try_from(record.clone()) {
                Ok(kp) => kps.push(kp),
                Err(err) => {
                    warn!(error = %err, "Skipping knowledge point");
                    rejected += 1;
                }
            }
        }
        (kps, rejected)
    }

    /// The built-in introductory programming curriculum used by the demo
    /// and by the in-memory backend when no document is configured.
    pub fn demo() -> Self {
        let knowledge_points = [
            (1, "Variables & Data Types", 1),
            (2, "Control Structures (if/else)", 1),
            (3, "Loops (for/while)", 2),
            (4, "Functions", 2),
            (5, "Lists & Dictionaries", 2),
            (6, "Recursion", 3),
            (7, "Object-Oriented Programming", 3),
            (8, "File Handling", 2),
        ]
        .into_iter()
        .map(|(id, name, difficulty)| {
            KnowledgePointRecord::from(&KnowledgePoint::new(id, name, difficulty))
        })
        .collect();

        let prerequisites = vec![(1, 2), (1, 3), (2, 3), (3, 4), (1, 5), (5, 6), (4, 7), (1, 8)];

        let content = [
            ("vid-101", ContentKind::Video, "Intro to Variables", 1, 6, 1, Some("internal")),
            ("quiz-101", ContentKind::Quiz, "Variables Practice Quiz", 1, 8, 1, None),
            ("vid-201", ContentKind::Video, "If/Else Explained", 2, 7, 1, Some("youtube")),
            ("quiz-201", ContentKind::Quiz, "Conditional Logic Quiz", 2, 10, 2, None),
            ("vid-301", ContentKind::Video, "Loops Deep Dive", 3, 12, 2, Some("vimeo")),
            ("quiz-301", ContentKind::Quiz, "Loops Checkpoint", 3, 10, 2, None),
            ("vid-401", ContentKind::Video, "Functions in Python", 4, 9, 2, None),
            ("quiz-401", ContentKind::Quiz, "Functions Quiz", 4, 11, 3, None),
        ]
        .into_iter()
        .map(|(id, kind, title, kp_id, est_minutes, difficulty, source)| ContentItem {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            url: format!("https://example.com/{id}"),
            kp_id,
            est_minutes,
            difficulty,
            metadata: Some(
                source
                    .map(|s| serde_json::Map::from_iter([("source".to_string(), s.into())]))
                    .unwrap_or_default(),
            ),
        })
        .collect();

        Self {
            knowledge_points,
            prerequisites,
            content,
        }
    }
}

/// Sample interaction histories matching the demo curriculum.
pub fn demo_histories() -> Vec<(&'static str, Vec<HistoryEntry>)> {
    let quiz = |kp_id: KpId, score: f64, minutes: i64, difficulty: i64| {
        HistoryEntry::new(kp_id, score)
            .with_kind("quiz")
            .with_feature("est_minutes", minutes.into())
            .with_feature("difficulty", difficulty.into())
    };

    vec![
        (
            "student-123",
            vec![quiz(1, 0.9, 8, 1), quiz(2, 0.7, 10, 2), quiz(3, 0.5, 10, 2)],
        ),
        ("student-456", vec![quiz(1, 1.0, 8, 1), quiz(4, 0.6, 11, 3)]),
        ("student-new", Vec::new()),
    ]
}

/// Load a curriculum into fresh in-memory stores.
pub async fn ingest_into_memory(
    curriculum: &Curriculum,
) -> WaypointResult<(InMemoryKnowledgeGraph, InMemoryContentCatalog, IngestReport)> {
    let graph = InMemoryKnowledgeGraph::new();
    let (kps, mut rejected) = curriculum.valid_knowledge_points();
    let mut report = IngestReport::default();

    for kp in kps {
        match graph.add_knowledge_point(kp).await {
            Ok(()) => report.knowledge_points += 1,
            Err(err) => {
                warn!(error = %err, "Skipping knowledge point");
                rejected += 1;
            }
        }
    }

    for &(from, to) in &curriculum.prerequisites {
        match graph.add_prerequisite(Prerequisite::new(from, to)).await {
            Ok(()) => report.prerequisites += 1,
            Err(err) => {
                warn!(from, to, error = %err, "Skipping prerequisite edge");
                rejected += 1;
            }
        }
    }

    let (catalog, accepted, skipped) = load_catalog(curriculum).await;
    report.content_items = accepted;
    report.rejected = rejected + skipped;
    info!(?report, "Curriculum loaded into memory");
    Ok((graph, catalog, report))
}

/// Load a curriculum's content into a fresh catalog. Returns the catalog
/// with the number of accepted and rejected items.
pub async fn load_catalog(curriculum: &Curriculum) -> (InMemoryContentCatalog, usize, usize) {
    let catalog = InMemoryContentCatalog::new();
    let (mut accepted, mut rejected) = (0, 0);
    for item in &curriculum.content {
        match item.clone().validate() {
            Ok(item) => {
                catalog.add_item(item).await;
                accepted += 1;
            }
            Err(err) => {
                warn!(error = %err, "Skipping content item");
                rejected += 1;
            }
        }
    }
    (catalog, accepted, rejected)
}

/// Write a curriculum's knowledge points and edges into SurrealDB.
/// Re-running with the same document leaves the graph unchanged.
pub async fn ingest_into_surreal(
    graph: &SurrealKnowledgeGraph,
    curriculum: &Curriculum,
) -> WaypointResult<IngestReport> {
    let (kps, rejected) = curriculum.valid_knowledge_points();
    let mut report = IngestReport {
        rejected,
        ..Default::default()
    };

    for kp in &kps {
        graph.upsert_knowledge_point(kp).await?;
        report.knowledge_points += 1;
    }

    for &(from, to) in &curriculum.prerequisites {
        match graph.add_prerequisite(Prerequisite::new(from, to)).await {
            Ok(()) => report.prerequisites += 1,
            Err(WaypointError::KnowledgePointNotFound(missing)) => {
                warn!(from, to, missing, "Skipping prerequisite edge to unknown knowledge point");
                report.rejected += 1;
            }
            Err(err) => return Err(err),
        }
    }

    info!(?report, "Curriculum written to graph database");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConfig;
    use crate::store::content::ContentCatalog;
    use crate::store::graph::KnowledgeGraphGateway;
    use std::io::Write;

    #[tokio::test]
    async fn test_demo_curriculum_loads_cleanly() {
        let (graph, catalog, report) = ingest_into_memory(&Curriculum::demo()).await.unwrap();
        assert_eq!(
            report,
            IngestReport {
                knowledge_points: 8,
                prerequisites: 8,
                content_items: 8,
                rejected: 0,
            }
        );
        assert_eq!(graph.knowledge_point_count().await, 8);
        assert_eq!(catalog.by_kp(3).await.unwrap()[0].title, "Loops Deep Dive");
        assert!(catalog.by_kp(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let curriculum: Curriculum = serde_json::from_str(
            r#"{
                "knowledge_points": [
                    {"id": 1, "name": "Variables", "difficulty": 1},
                    {"name": "No id"},
                    {"id": 2, "name": "Loops", "difficulty": 2}
                ],
                "prerequisites": [[1, 2], [2, 99]],
                "content": [
                    {"id": "v-1", "type": "video", "title": "Intro",
                     "url": "https://example.com/v-1",
                     "kp_id": 1, "est_minutes": 0, "difficulty": 1},
                    {"id": "v-2", "type": "video", "title": "Endless",
                     "url": "https://example.com/v-2",
                     "kp_id": 2, "est_minutes": 4294967295, "difficulty": 1}
                ]
            }"#,
        )
        .unwrap();

        let (graph, _catalog, report) = ingest_into_memory(&curriculum).await.unwrap();
        assert_eq!(report.knowledge_points, 2);
        assert_eq!(report.prerequisites, 1);
        assert_eq!(report.content_items, 0);
        assert_eq!(report.rejected, 4);
        assert_eq!(graph.direct_prerequisites(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&Curriculum::demo()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let curriculum = Curriculum::from_path(file.path()).await.unwrap();
        assert_eq!(curriculum.knowledge_points.len(), 8);
        assert_eq!(curriculum.content.len(), 8);
    }

    #[tokio::test]
    async fn test_surreal_seed_is_idempotent() {
        let db = DatabaseConfig::memory().connect().await.unwrap();
        let graph = SurrealKnowledgeGraph::new(db);
        let demo = Curriculum::demo();

        ingest_into_surreal(&graph, &demo).await.unwrap();
        let report = ingest_into_surreal(&graph, &demo).await.unwrap();
        assert_eq!(report.knowledge_points, 8);
        assert_eq!(report.prerequisites, 8);

        let pre = graph.direct_prerequisites(3).await.unwrap();
        assert_eq!(pre.iter().map(|kp| kp.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_demo_histories() {
        let histories = demo_histories();
        assert_eq!(histories.len(), 3);
        assert!(histories[2].1.is_empty());
    }
}
