//! End-to-end tests driving the HTTP router over in-memory stores.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

use waypoint::error::WaypointResult;
use waypoint::ingest::{load_catalog, Curriculum};
use waypoint::model::{KnowledgePoint, Prerequisite};
use waypoint::path::{PathAssembler, PathPolicy};
use waypoint::predict::{
    FeatureSequence, ModelArtifacts, ModelMetadata, ModelPredictor, SequenceClassifier,
    StandardScaler,
};
use waypoint::server::{router, AppState};
use waypoint::service::PathService;
use waypoint::store::InMemoryKnowledgeGraph;

const TOKEN: &str = "test-token";

struct FixedClassifier(Vec<f64>);

impl SequenceClassifier for FixedClassifier {
    fn predict_proba(&self, _sequence: &FeatureSequence) -> WaypointResult<Vec<f64>> {
        Ok(self.0.clone())
    }
}

async fn app() -> Router {
    let graph = InMemoryKnowledgeGraph::new();
    for kp in [
        KnowledgePoint::new(1, "Variables & Data Types", 1),
        KnowledgePoint::new(2, "Control Structures (if/else)", 1),
        KnowledgePoint::new(3, "Loops (for/while)", 2),
        KnowledgePoint::new(4, "Functions", 2),
        KnowledgePoint::new(5, "Lists & Dictionaries", 2),
    ] {
        graph.add_knowledge_point(kp).await.unwrap();
    }
    graph.add_prerequisite(Prerequisite::new(1, 3)).await.unwrap();
    graph.add_prerequisite(Prerequisite::new(3, 4)).await.unwrap();

    let (catalog, _, _) = load_catalog(&Curriculum::demo()).await;

    let artifacts = ModelArtifacts::Loaded {
        classifier: Arc::new(FixedClassifier(vec![0.1, 0.2, 0.6, 0.05, 0.05])),
        scaler: StandardScaler {
            mean: vec![0.0],
            scale: vec![1.0],
        },
        metadata: ModelMetadata {
            max_sequence_length: 10,
            numeric_features: vec!["score".into()],
            categorical_features_map: BTreeMap::new(),
            feature_order: vec!["score".into()],
            kp_label_vocabulary: (1..=5).map(|i| json!(format!("KP{i}"))).collect(),
        },
    };

    let assembler = PathAssembler::new(Arc::new(graph), Arc::new(catalog), PathPolicy::default());
    let service = PathService::new(
        Arc::new(ModelPredictor::with_artifacts(artifacts, 1)),
        assembler,
        1,
    );
    router(AppState::new(Arc::new(service), Some(TOKEN)))
}

fn generate_request(auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/generate-path")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn bearer() -> String {
    format!("Bearer {TOKEN}")
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .await
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_predicted_path_end_to_end() {
    let body = json!({
        "student_id": "student-123",
        "history": [
            {"kp_id": 1, "score": 0.9, "type": "quiz"},
            {"kp_id": 3, "score": 0.4, "type": "quiz"}
        ]
    });
    let response = app()
        .await
        .oneshot(generate_request(Some(&bearer()), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["student_id"], "student-123");
    assert_eq!(body["resolution"], "predicted");
    assert_eq!(body["goal"]["kp_id"], 3);
    assert_eq!(body["prediction_info"]["kp_id"], 3);
    assert_eq!(body["prediction_info"]["confidence"], 0.6);
    assert_eq!(body["prediction_info"]["top3"].as_array().unwrap().len(), 3);

    let modules = body["learning_path"].as_array().unwrap();
    let kp_ids: Vec<i64> = modules
        .iter()
        .map(|m| m["kp_id"].as_i64().unwrap())
        .collect();
    assert_eq!(kp_ids, vec![1, 3, 4]);
    assert_eq!(modules[0]["stage"], "prerequisite");
    assert_eq!(modules[1]["stage"], "target");
    assert_eq!(modules[2]["stage"], "follow_up");
    assert_eq!(modules[1]["content"][0]["title"], "Loops Deep Dive");
    assert_eq!(modules[1]["content"][0]["type"], "video");

    let sum: u64 = modules
        .iter()
        .flat_map(|m| m["content"].as_array().unwrap())
        .map(|c| c["est_minutes"].as_u64().unwrap())
        .sum();
    assert_eq!(body["total_minutes"].as_u64().unwrap(), sum);
}

#[tokio::test]
async fn test_default_and_forced_resolution() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(generate_request(
            Some(&bearer()),
            json!({"student_id": "new-student"}),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["resolution"], "default");
    assert_eq!(body["goal"]["kp_id"], 1);
    assert!(body.get("prediction_info").is_none());

    let response = app
        .oneshot(generate_request(
            Some(&bearer()),
            json!({"student_id": "s", "history": [{"kp_id": 1, "score": 0.1}], "force_kp_id": 5}),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["resolution"], "forced");
    assert_eq!(body["goal"]["kp_id"], 5);
    assert_eq!(body["learning_path"].as_array().unwrap().len(), 1);
    assert_eq!(body["learning_path"][0]["synthesized"], true);
}

#[tokio::test]
async fn test_unknown_kp_is_404() {
    let response = app()
        .await
        .oneshot(generate_request(
            Some(&bearer()),
            json!({"student_id": "s", "force_kp_id": 99}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let response = app()
        .await
        .oneshot(generate_request(None, json!({"student_id": "s"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_scheme_is_401() {
    let app = app().await;
    for auth in ["Basic test-token", "test-token", "Token test-token"] {
        let response = app
            .clone()
            .oneshot(generate_request(Some(auth), json!({"student_id": "s"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header {auth}");
    }
}

#[tokio::test]
async fn test_bad_token_is_403() {
    let app = app().await;
    for auth in ["Bearer wrong", "Bearer ", "bearer test-token-2"] {
        let response = app
            .clone()
            .oneshot(generate_request(Some(auth), json!({"student_id": "s"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "header {auth}");
    }
}

#[tokio::test]
async fn test_scheme_is_case_insensitive() {
    let app = app().await;
    for auth in ["bearer test-token", "BEARER test-token"] {
        let response = app
            .clone()
            .oneshot(generate_request(Some(auth), json!({"student_id": "s"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "header {auth}");
    }
}
