use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::db::WaypointDatabase;
use crate::error::{WaypointError, WaypointResult};
use crate::model::{KnowledgePoint, KnowledgePointRecord, KpId, Prerequisite};

// ---------------------------------------------------------------------------
// KnowledgeGraphGateway trait: read surface over the prerequisite graph
// ---------------------------------------------------------------------------

/// Trait for prerequisite-graph backends. Every method is a read.
#[async_trait]
pub trait KnowledgeGraphGateway: Send + Sync {
    /// Get a knowledge point by ID.
    async fn fetch_by_id(&self, id: KpId) -> WaypointResult<Option<KnowledgePoint>>;

    /// Knowledge points with a `PREREQUISITE_OF` edge into `id`, ordered by
    /// difficulty then name.
    async fn direct_prerequisites(&self, id: KpId) -> WaypointResult<Vec<KnowledgePoint>>;

    /// Knowledge points `id` is a direct prerequisite of.
    async fn direct_successors(&self, id: KpId) -> WaypointResult<Vec<KnowledgePoint>>;

    /// Knowledge points reachable from `id` within `max_hops` outbound
    /// `PREREQUISITE_OF` edges. Deduplicated, `id` itself excluded, ordered by
    /// difficulty then name. Terminates on cyclic graphs.
    async fn downstream(&self, id: KpId, max_hops: usize) -> WaypointResult<Vec<KnowledgePoint>> {
        let mut visited: HashSet<KpId> = HashSet::new();
        let mut found: Vec<KnowledgePoint> = Vec::new();
        let mut queue: VecDeque<(KpId, usize)> = VecDeque::new();

        visited.insert(id);
        queue.push_back((id, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }

            for kp in self.direct_successors(current).await? {
                if visited.insert(kp.id) {
                    queue.push_back((kp.id, depth + 1));
                    found.push(kp);
                }
            }
        }

        found.sort_by(KnowledgePoint::path_order);
        Ok(found)
    }
}

/// Validate raw rows, dropping (and logging) any that cannot be trusted.
/// Rows that do not decode into a record at all are dropped the same way.
fn accept_records(rows: Vec<serde_json::Value>) -> Vec<KnowledgePoint> {
    rows.into_iter()
        .filter_map(|row| {
            let parsed = serde_json::from_value::<KnowledgePointRecord>(row)
                .map_err(WaypointError::from)
                .and_then(KnowledgePoint::try_from);
            match parsed {
                Ok(kp) => Some(kp),
                Err(err) => {
                    warn!(error = %err, "Rejecting malformed knowledge point row");
                    None
                }
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SurrealDB graph store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct KpRow {
    kp_id: i64,
    name: String,
    difficulty: i64,
}

#[derive(Debug, Serialize)]
struct PrerequisiteRow {
    from_kp: i64,
    to_kp: i64,
}

/// SurrealDB-backed prerequisite graph. All queries use bound parameters.
#[derive(Clone)]
pub struct SurrealKnowledgeGraph {
    db: WaypointDatabase,
}

impl SurrealKnowledgeGraph {
    pub fn new(db: WaypointDatabase) -> Self {
        Self { db }
    }

    async fn select_records(
        &self,
        query: &'static str,
        id: KpId,
    ) -> WaypointResult<Vec<KnowledgePoint>> {
        let mut response = self.db.inner().query(query).bind(("id", id)).await?;
        let rows: Vec<serde_json::Value> = response.take(0)?;
        Ok(accept_records(rows))
    }

    /// Insert or replace a knowledge point, keyed by its id.
    pub async fn upsert_knowledge_point(&self, kp: &KnowledgePoint) -> WaypointResult<()> {
        let row = KpRow {
            kp_id: kp.id,
            name: kp.name.clone(),
            difficulty: i64::from(kp.difficulty),
        };
        self.db
            .inner()
            .query("DELETE kp WHERE kp_id = $kp_id; CREATE kp CONTENT $row;")
            .bind(("kp_id", kp.id))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }

    /// Record a `PREREQUISITE_OF` edge. Re-adding an existing edge is a no-op.
    pub async fn add_prerequisite(&self, edge: Prerequisite) -> WaypointResult<()> {
        for id in [edge.from, edge.to] {
            if self.fetch_by_id(id).await?.is_none() {
                return Err(WaypointError::KnowledgePointNotFound(id));
            }
        }

        self.db
            .inner()
            .query(
                "DELETE prerequisite_of WHERE from_kp = $from AND to_kp = $to;
                 CREATE prerequisite_of CONTENT $row;",
            )
            .bind(("from", edge.from))
            .bind(("to", edge.to))
            .bind((
                "row",
                PrerequisiteRow {
                    from_kp: edge.from,
                    to_kp: edge.to,
                },
            ))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeGraphGateway for SurrealKnowledgeGraph {
    async fn fetch_by_id(&self, id: KpId) -> WaypointResult<Option<KnowledgePoint>> {
        let mut kps = self
            .select_records(
                "SELECT kp_id, name, difficulty FROM kp WHERE kp_id = $id LIMIT 1",
                id,
            )
            .await?;
        Ok(kps.pop())
    }

    async fn direct_prerequisites(&self, id: KpId) -> WaypointResult<Vec<KnowledgePoint>> {
        let mut kps = self
            .select_records(
                "SELECT kp_id, name, difficulty FROM kp
                 WHERE kp_id INSIDE (SELECT VALUE from_kp FROM prerequisite_of WHERE to_kp = $id)",
                id,
            )
            .await?;
        kps.sort_by(KnowledgePoint::path_order);
        debug!(kp_id = id, count = kps.len(), "Fetched direct prerequisites");
        Ok(kps)
    }

    async fn direct_successors(&self, id: KpId) -> WaypointResult<Vec<KnowledgePoint>> {
        let mut kps = self
            .select_records(
                "SELECT kp_id, name, difficulty FROM kp
                 WHERE kp_id INSIDE (SELECT VALUE to_kp FROM prerequisite_of WHERE from_kp = $id)",
                id,
            )
            .await?;
        kps.sort_by(KnowledgePoint::path_order);
        Ok(kps)
    }
}

// ---------------------------------------------------------------------------
// InMemoryKnowledgeGraph: for testing and the demo curriculum
// ---------------------------------------------------------------------------

/// In-memory prerequisite graph using adjacency lists.
pub struct InMemoryKnowledgeGraph {
    nodes: RwLock<HashMap<KpId, KnowledgePoint>>,
    outbound: RwLock<HashMap<KpId, Vec<KpId>>>,
    inbound: RwLock<HashMap<KpId, Vec<KpId>>>,
}

impl InMemoryKnowledgeGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
            inbound: RwLock::new(HashMap::new()),
        }
    }

    /// Add a knowledge point. Ids and names must be unique.
    pub async fn add_knowledge_point(&self, kp: KnowledgePoint) -> WaypointResult<()> {
        let mut nodes = self.nodes.write().await;

        if nodes.contains_key(&kp.id) {
            return Err(WaypointError::MalformedRecord(format!(
                "duplicate knowledge point id {}",
                kp.id
            )));
        }
        if nodes.values().any(|existing| existing.name == kp.name) {
            return Err(WaypointError::MalformedRecord(format!(
                "duplicate knowledge point name '{}'",
                kp.name
            )));
        }

        nodes.insert(kp.id, kp);
        Ok(())
    }

    /// Add a `PREREQUISITE_OF` edge between two existing knowledge points.
    pub async fn add_prerequisite(&self, edge: Prerequisite) -> WaypointResult<()> {
        let nodes = self.nodes.read().await;
        for id in [edge.from, edge.to] {
            if !nodes.contains_key(&id) {
                return Err(WaypointError::KnowledgePointNotFound(id));
            }
        }
        drop(nodes);

        let mut outbound = self.outbound.write().await;
        let mut inbound = self.inbound.write().await;

        let targets = outbound.entry(edge.from).or_default();
        if !targets.contains(&edge.to) {
            targets.push(edge.to);
            inbound.entry(edge.to).or_default().push(edge.from);
        }

        Ok(())
    }

    pub async fn knowledge_point_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn prerequisite_count(&self) -> usize {
        self.outbound.read().await.values().map(Vec::len).sum()
    }

    async fn resolve(&self, ids: &[KpId]) -> Vec<KnowledgePoint> {
        let nodes = self.nodes.read().await;
        let mut kps: Vec<KnowledgePoint> =
            ids.iter().filter_map(|id| nodes.get(id).cloned()).collect();
        kps.sort_by(KnowledgePoint::path_order);
        kps
    }
}

impl Default for InMemoryKnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeGraphGateway for InMemoryKnowledgeGraph {
    async fn fetch_by_id(&self, id: KpId) -> WaypointResult<Option<KnowledgePoint>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.get(&id).cloned())
    }

    async fn direct_prerequisites(&self, id: KpId) -> WaypointResult<Vec<KnowledgePoint>> {
        let ids = {
            let inbound = self.inbound.read().await;
            inbound.get(&id).cloned().unwrap_or_default()
        };
        Ok(self.resolve(&ids).await)
    }

    async fn direct_successors(&self, id: KpId) -> WaypointResult<Vec<KnowledgePoint>> {
        let ids = {
            let outbound = self.outbound.read().await;
            outbound.get(&id).cloned().unwrap_or_default()
        };
        Ok(self.resolve(&ids).await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
