pub mod placeholder;
pub mod ranking;

pub use ranking::rank_content;

use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{WaypointError, WaypointResult};
use crate::model::{KnowledgePoint, KpId, LearningPath, PathModule, Stage};
use crate::store::{ContentCatalog, KnowledgeGraphGateway};

/// Items kept per module after ranking. `None` keeps everything.
pub const DEFAULT_MAX_ITEMS_PER_MODULE: Option<usize> = Some(3);
/// Follow-up modules kept after ordering. `None` keeps everything.
pub const DEFAULT_MAX_FOLLOW_UPS: Option<usize> = None;
pub const DEFAULT_DOWNSTREAM_MAX_HOPS: usize = 2;
pub const DEFAULT_PLACEHOLDER_ITEMS: usize = 3;
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// PathPolicy
// ---------------------------------------------------------------------------

/// Tunable limits applied while assembling a path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPolicy {
    pub max_items_per_module: Option<usize>,
    pub max_follow_ups: Option<usize>,
    pub downstream_max_hops: usize,
    /// Items synthesized for a knowledge point without catalog content.
    pub placeholder_items: usize,
    /// Fixed placeholder seed. Unset seeds each knowledge point by its id.
    pub placeholder_seed: Option<u64>,
    /// Upper bound on each graph or catalog call.
    pub lookup_timeout: Duration,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            max_items_per_module: DEFAULT_MAX_ITEMS_PER_MODULE,
            max_follow_ups: DEFAULT_MAX_FOLLOW_UPS,
            downstream_max_hops: DEFAULT_DOWNSTREAM_MAX_HOPS,
            placeholder_items: DEFAULT_PLACEHOLDER_ITEMS,
            placeholder_seed: None,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// PathAssembler
// ---------------------------------------------------------------------------

/// Builds a learning path around a target knowledge point from the
/// prerequisite graph and the content catalog.
pub struct PathAssembler {
    graph: Arc<dyn KnowledgeGraphGateway>,
    catalog: Arc<dyn ContentCatalog>,
    policy: PathPolicy,
}

impl PathAssembler {
    pub fn new(
        graph: Arc<dyn KnowledgeGraphGateway>,
        catalog: Arc<dyn ContentCatalog>,
        policy: PathPolicy,
    ) -> Self {
        Self {
            graph,
            catalog,
            policy,
        }
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Assemble the path for `target_kp_id`: prerequisites, then the target,
    /// then follow-ups, each with ranked content.
    #[instrument(skip(self))]
    pub async fn assemble(&self, target_kp_id: KpId) -> WaypointResult<LearningPath> {
        let target = self
            .bounded(self.graph.fetch_by_id(target_kp_id))
            .await?
            .ok_or(WaypointError::KnowledgePointNotFound(target_kp_id))?;

        let (mut prerequisites, downstream) = tokio::try_join!(
            self.bounded(self.graph.direct_prerequisites(target.id)),
            self.bounded(
                self.graph
                    .downstream(target.id, self.policy.downstream_max_hops)
            ),
        )?;

        prerequisites.sort_by(KnowledgePoint::path_order);
        let mut placed: HashSet<KpId> = HashSet::from([target.id]);
        prerequisites.retain(|kp| placed.insert(kp.id));

        let mut follow_ups: Vec<KnowledgePoint> = downstream
            .into_iter()
            .filter(|kp| placed.insert(kp.id))
            .collect();
        follow_ups.sort_by(KnowledgePoint::path_order);
        if let Some(cap) = self.policy.max_follow_ups {
            follow_ups.truncate(cap);
        }

        debug!(
            prerequisites = prerequisites.len(),
            follow_ups = follow_ups.len(),
            "Resolved path skeleton"
        );

        let slots = prerequisites
            .into_iter()
            .map(|kp| (Stage::Prerequisite, kp))
            .chain(std::iter::once((Stage::Target, target.clone())))
            .chain(follow_ups.into_iter().map(|kp| (Stage::FollowUp, kp)));

        let modules = join_all(slots.map(|(stage, kp)| self.build_module(stage, kp))).await;
        Ok(LearningPath::new(target, modules))
    }

    async fn build_module(&self, stage: Stage, kp: KnowledgePoint) -> PathModule {
        let lookup = self.catalog.by_kp(kp.id);
        let fetched = match tokio::time::timeout(self.policy.lookup_timeout, lookup).await {
            Ok(Ok(items)) => items,
            Ok(Err(err)) => {
                warn!(kp_id = kp.id, error = %err, "Content lookup failed, treating as empty");
                Vec::new()
            }
            Err(_) => {
                warn!(kp_id = kp.id, "Content lookup timed out, treating as empty");
                Vec::new()
            }
        };

        let synthesized = fetched.is_empty();
        let items = if synthesized {
            let seed = self.policy.placeholder_seed.unwrap_or(kp.id as u64);
            placeholder::synthesize(&kp, seed, self.policy.placeholder_items)
        } else {
            fetched
        };

        PathModule {
            stage,
            content: rank_content(items, self.policy.max_items_per_module),
            kp,
            synthesized,
        }
    }

    /// Run a graph call under the lookup timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = WaypointResult<T>>,
    ) -> WaypointResult<T> {
        tokio::time::timeout(self.policy.lookup_timeout, call)
            .await
            .map_err(|_| {
                WaypointError::UpstreamUnavailable(format!(
                    "graph lookup exceeded {} ms",
                    self.policy.lookup_timeout.as_millis()
                ))
            })?
    }
}
