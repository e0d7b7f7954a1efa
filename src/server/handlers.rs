use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::error::WaypointError;
use crate::model::{ContentItem, KpConfidence, KpId, PredictionSource, Stage};
use crate::server::AppState;
use crate::service::{GeneratedPath, PathRequest, Resolution};

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct GoalInfo {
    pub kp_id: KpId,
    pub name: String,
    pub difficulty: u32,
}

#[derive(Debug, Serialize)]
pub struct PredictionInfo {
    pub kp_id: KpId,
    pub confidence: f64,
    pub top3: Vec<KpConfidence>,
    pub source: PredictionSource,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub stage: Stage,
    pub kp_id: KpId,
    pub kp_name: String,
    pub difficulty: u32,
    pub synthesized: bool,
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub student_id: String,
    pub resolution: Resolution,
    pub message: String,
    pub goal: GoalInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_info: Option<PredictionInfo>,
    pub learning_path: Vec<ModuleInfo>,
    pub total_minutes: u32,
}

impl From<GeneratedPath> for PathResponse {
    fn from(generated: GeneratedPath) -> Self {
        let path = generated.path;
        Self {
            student_id: generated.student_id,
            resolution: generated.resolution,
            message: generated.message,
            goal: GoalInfo {
                kp_id: path.goal.id,
                name: path.goal.name,
                difficulty: path.goal.difficulty,
            },
            prediction_info: path.prediction.map(|p| PredictionInfo {
                kp_id: p.top_kp_id,
                confidence: p.confidence,
                top3: p.top_k,
                source: p.source,
            }),
            learning_path: path
                .modules
                .into_iter()
                .map(|module| ModuleInfo {
                    stage: module.stage,
                    kp_id: module.kp.id,
                    kp_name: module.kp.name,
                    difficulty: module.kp.difficulty,
                    synthesized: module.synthesized,
                    content: module.content,
                })
                .collect(),
            total_minutes: path.total_minutes,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<WaypointError> for ApiError {
    fn from(err: WaypointError) -> Self {
        match err {
            WaypointError::KnowledgePointNotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("Knowledge point {id} not found"),
            },
            WaypointError::UpstreamUnavailable(_) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "Knowledge graph unavailable".to_string(),
            },
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Internal server error".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn generate_path(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PathResponse>, ApiError> {
    let generated = state.service.generate(request).await?;
    Ok(Json(generated.into()))
}
