use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::{AppConfig, GraphBackend};
use crate::db::WaypointDatabase;
use crate::error::{WaypointError, WaypointResult};
use crate::ingest::{ingest_into_memory, ingest_into_surreal, load_catalog, Curriculum};
use crate::model::{HistoryEntry, KpId, LearningPath};
use crate::path::PathAssembler;
use crate::predict::{ArtifactLoader, ModelPredictor, WeaknessPredictor};
use crate::store::{KnowledgeGraphGateway, SurrealKnowledgeGraph};

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// One path-generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathRequest {
    pub student_id: String,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub force_kp_id: Option<KpId>,
}

/// How the goal knowledge point was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Forced,
    Predicted,
    Default,
}

/// A generated path and how its goal was resolved.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPath {
    pub student_id: String,
    pub resolution: Resolution,
    pub message: String,
    pub path: LearningPath,
}

// ---------------------------------------------------------------------------
// PathService
// ---------------------------------------------------------------------------

/// Chooses a goal (forced, predicted, or default) and assembles its path.
pub struct PathService {
    predictor: Arc<dyn WeaknessPredictor>,
    assembler: PathAssembler,
    default_kp_id: KpId,
}

impl PathService {
    pub fn new(
        predictor: Arc<dyn WeaknessPredictor>,
        assembler: PathAssembler,
        default_kp_id: KpId,
    ) -> Self {
        Self {
            predictor,
            assembler,
            default_kp_id,
        }
    }

    /// Generate a learning path. `NotFound` and `UpstreamUnavailable` are
    /// returned as is; any other failure becomes a generic internal error.
    #[instrument(skip(self, request), fields(student_id = %request.student_id))]
    pub async fn generate(&self, request: PathRequest) -> WaypointResult<GeneratedPath> {
        match self.resolve_and_assemble(request).await {
            Ok(generated) => {
                info!(
                    goal = generated.path.goal.id,
                    resolution = ?generated.resolution,
                    modules = generated.path.modules.len(),
                    total_minutes = generated.path.total_minutes,
                    "Learning path generated"
                );
                Ok(generated)
            }
            Err(err) if err.is_caller_visible() => Err(err),
            Err(err) => {
                error!(error = %err, "Path generation failed");
                Err(WaypointError::Internal("path generation failed".to_string()))
            }
        }
    }

    async fn resolve_and_assemble(&self, request: PathRequest) -> WaypointResult<GeneratedPath> {
        let PathRequest {
            student_id,
            history,
            force_kp_id,
        } = request;
        let history = history.unwrap_or_default();

        let (resolution, message, path) = if let Some(kp_id) = force_kp_id {
            let path = self.assembler.assemble(kp_id).await?;
            let message = format!("Path built for requested knowledge point {kp_id}");
            (Resolution::Forced, message, path)
        } else if !history.is_empty() {
            let prediction = self.predictor.predict(&history).await;
            let message = format!(
                "Predicted weak knowledge point {} with confidence {:.2}",
                prediction.top_kp_id, prediction.confidence
            );
            let path = self
                .assembler
                .assemble(prediction.top_kp_id)
                .await?
                .with_prediction(prediction);
            (Resolution::Predicted, message, path)
        } else {
            let kp_id = self.default_kp_id;
            let path = self.assembler.assemble(kp_id).await?;
            let message = format!("No history provided, using default knowledge point {kp_id}");
            (Resolution::Default, message, path)
        };

        Ok(GeneratedPath {
            student_id,
            resolution,
            message,
            path,
        })
    }
}

// ---------------------------------------------------------------------------
// ServiceContext: process-wide collaborators with an explicit lifecycle
// ---------------------------------------------------------------------------

/// Owns the graph connection and the service built on it.
pub struct ServiceContext {
    service: Arc<PathService>,
    database: Option<WaypointDatabase>,
}

impl ServiceContext {
    /// Load the curriculum, open the graph backend, and wire the service.
    pub async fn initialize(config: &AppConfig) -> WaypointResult<Self> {
        let curriculum = match &config.graph.curriculum_path {
            Some(path) => Curriculum::from_path(path).await?,
            None => Curriculum::demo(),
        };

        let (graph, catalog, database) = match config.graph.backend {
            GraphBackend::Memory => {
                let (graph, catalog, _) = ingest_into_memory(&curriculum).await?;
                let graph: Arc<dyn KnowledgeGraphGateway> = Arc::new(graph);
                (graph, catalog, None)
            }
            GraphBackend::Surreal => {
                let db = config.graph.database_config().connect_with_retry().await?;
                let surreal = SurrealKnowledgeGraph::new(db.clone());
                // An embedded store starts empty on every run.
                if config.graph.url == "memory" {
                    ingest_into_surreal(&surreal, &curriculum).await?;
                }
                let (catalog, _, _) = load_catalog(&curriculum).await;
                let graph: Arc<dyn KnowledgeGraphGateway> = Arc::new(surreal);
                (graph, catalog, Some(db))
            }
        };

        let predictor = ModelPredictor::new(
            ArtifactLoader::from_config(&config.model),
            config.policy.default_kp_id,
        );
        let assembler = PathAssembler::new(graph, Arc::new(catalog), config.policy.path_policy());
        let service = PathService::new(Arc::new(predictor), assembler, config.policy.default_kp_id);

        info!(backend = ?config.graph.backend, "Service context initialized");
        Ok(Self {
            service: Arc::new(service),
            database,
        })
    }

    pub fn service(&self) -> Arc<PathService> {
        Arc::clone(&self.service)
    }

    /// Release the graph connection.
    pub fn shutdown(self) {
        if let Some(db) = self.database {
            db.close();
        }
        info!("Service context shut down");
    }
}
