use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::ModelConfig;
use crate::error::{WaypointError, WaypointResult};
use crate::model::KpId;
use crate::predict::classifier::{LinearSoftmaxClassifier, SequenceClassifier};

// ---------------------------------------------------------------------------
// Metadata descriptor
// ---------------------------------------------------------------------------

/// Preprocessing contract the classifier was trained against.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMetadata {
    #[serde(alias = "max_seq_len")]
    pub max_sequence_length: usize,
    #[serde(default)]
    pub numeric_features: Vec<String>,
    /// Categorical feature name to its known categories. Each category
    /// becomes a `<feature>_<category>` column.
    #[serde(default)]
    pub categorical_features_map: BTreeMap<String, Vec<String>>,
    /// Column order of one encoded timestep.
    #[serde(alias = "sequence_features")]
    pub feature_order: Vec<String>,
    /// Output labels, in classifier output order.
    #[serde(alias = "kp_label_encoder")]
    pub kp_label_vocabulary: Vec<serde_json::Value>,
}

impl ModelMetadata {
    /// KP id for each output label.
    ///
    /// Integer labels are ids, string labels use their trailing digits
    /// (`"KP3"` is 3), anything else falls back to position + 1. A label
    /// that names its KP wins over its position, so an unsorted vocabulary
    /// such as `["KP3", "KP1"]` maps to `[3, 1]`.
    pub fn label_kp_ids(&self) -> Vec<KpId> {
        self.kp_label_vocabulary
            .iter()
            .enumerate()
            .map(|(position, label)| label_to_kp_id(label).unwrap_or(position as KpId + 1))
            .collect()
    }

    pub fn width(&self) -> usize {
        self.feature_order.len()
    }
}

fn label_to_kp_id(label: &serde_json::Value) -> Option<KpId> {
    match label {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            let digits_start = trimmed
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit())
                .last()
                .map(|(i, _)| i)?;
            trimmed[digits_start..].parse().ok()
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Scaler
// ---------------------------------------------------------------------------

/// Fitted standardization for the numeric features, in `numeric_features`
/// order.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn transform(&self, index: usize, value: f64) -> f64 {
        let mean = self.mean.get(index).copied().unwrap_or(0.0);
        let scale = match self.scale.get(index).copied() {
            Some(s) if s != 0.0 && s.is_finite() => s,
            _ => 1.0,
        };
        (value - mean) / scale
    }
}

// ---------------------------------------------------------------------------
// Load result
// ---------------------------------------------------------------------------

/// Outcome of loading the classifier artifacts.
pub enum ModelArtifacts {
    Loaded {
        classifier: Arc<dyn SequenceClassifier>,
        scaler: StandardScaler,
        metadata: ModelMetadata,
    },
    Degraded {
        reason: String,
    },
}

impl ModelArtifacts {
    pub fn degraded(reason: impl Into<String>) -> Self {
        ModelArtifacts::Degraded {
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelArtifacts::Loaded { .. })
    }
}

impl std::fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelArtifacts::Loaded { metadata, .. } => f
                .debug_struct("Loaded")
                .field("labels", &metadata.kp_label_vocabulary.len())
                .field("width", &metadata.width())
                .finish(),
            ModelArtifacts::Degraded { reason } => {
                f.debug_struct("Degraded").field("reason", reason).finish()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Where a predictor gets its artifacts from. Never fails: problems produce
/// `Degraded`.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn load(&self) -> ModelArtifacts;
}

/// Locates and reads the three artifact files.
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    dir: Option<PathBuf>,
    model_file: String,
    scaler_file: String,
    metadata_file: String,
}

impl ArtifactLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let defaults = ModelConfig::default();
        Self {
            dir: Some(dir.into()),
            model_file: defaults.model_file,
            scaler_file: defaults.scaler_file,
            metadata_file: defaults.metadata_file,
        }
    }

    /// A loader that never finds anything; the predictor always falls back.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            ..Self::new("")
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            dir: config.artifacts_dir.clone(),
            model_file: config.model_file.clone(),
            scaler_file: config.scaler_file.clone(),
            metadata_file: config.metadata_file.clone(),
        }
    }

    /// Load all artifacts. Never fails: problems produce `Degraded`.
    pub async fn load(&self) -> ModelArtifacts {
        let Some(dir) = &self.dir else {
            info!("No model artifact directory configured, using fallback predictor");
            return ModelArtifacts::degraded("no artifact directory configured");
        };

        let metadata_path = dir.join(&self.metadata_file);
        let metadata: ModelMetadata = match read_json(&metadata_path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                error!(
                    path = %metadata_path.display(),
                    error = %err,
                    "CRITICAL: model metadata unavailable, predictions will use the fallback rule"
                );
                return ModelArtifacts::degraded(format!("metadata unavailable: {err}"));
            }
        };

        let scaler_path = dir.join(&self.scaler_file);
        let scaler: StandardScaler = match read_json(&scaler_path).await {
            Ok(scaler) => scaler,
            Err(err) => {
                warn!(path = %scaler_path.display(), error = %err, "Feature scaler unavailable");
                return ModelArtifacts::degraded(format!("scaler unavailable: {err}"));
            }
        };

        let model_path = dir.join(&self.model_file);
        let classifier: LinearSoftmaxClassifier = match read_json(&model_path).await {
            Ok(classifier) => classifier,
            Err(err) => {
                warn!(path = %model_path.display(), error = %err, "Classifier unavailable");
                return ModelArtifacts::degraded(format!("classifier unavailable: {err}"));
            }
        };

        if let Err(err) = check_dimensions(&metadata, &scaler, &classifier) {
            warn!(error = %err, "Model artifacts are inconsistent");
            return ModelArtifacts::degraded(err.to_string());
        }

        info!(
            labels = metadata.kp_label_vocabulary.len(),
            width = metadata.width(),
            max_sequence_length = metadata.max_sequence_length,
            "Model artifacts loaded"
        );

        ModelArtifacts::Loaded {
            classifier: Arc::new(classifier),
            scaler,
            metadata,
        }
    }
}

#[async_trait]
impl ArtifactSource for ArtifactLoader {
    async fn load(&self) -> ModelArtifacts {
        ArtifactLoader::load(self).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> WaypointResult<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

fn check_dimensions(
    metadata: &ModelMetadata,
    scaler: &StandardScaler,
    classifier: &LinearSoftmaxClassifier,
) -> WaypointResult<()> {
    if metadata.max_sequence_length == 0 {
        return Err(WaypointError::Artifact(
            "max_sequence_length must be positive".to_string(),
        ));
    }
    if metadata.kp_label_vocabulary.is_empty() {
        return Err(WaypointError::Artifact("label vocabulary is empty".to_string()));
    }
    if scaler.mean.len() != metadata.numeric_features.len()
        || scaler.scale.len() != metadata.numeric_features.len()
    {
        return Err(WaypointError::Artifact(format!(
            "scaler covers {} features, metadata declares {}",
            scaler.mean.len(),
            metadata.numeric_features.len()
        )));
    }
    classifier.check_shape(metadata.kp_label_vocabulary.len(), metadata.width())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_artifacts(dir: &Path, with_model: bool) {
        std::fs::write(
            dir.join("metadata.json"),
            json!({
                "max_seq_len": 4,
                "numeric_features": ["score"],
                "categorical_features_map": {"type": ["quiz", "video"]},
                "sequence_features": ["score", "type_quiz", "type_video"],
                "kp_label_encoder": ["KP1", "KP2", "KP3"]
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join("feature_scaler.json"),
            json!({"mean": [0.5], "scale": [0.25]}).to_string(),
        )
        .unwrap();
        if with_model {
            std::fs::write(
                dir.join("model.json"),
                json!({
                    "weights": [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                    "bias": [0.0, 0.0, 1.0]
                })
                .to_string(),
            )
            .unwrap();
        }
    }

    #[test]
    fn test_label_mapping() {
        let metadata = ModelMetadata {
            max_sequence_length: 1,
            numeric_features: vec![],
            categorical_features_map: BTreeMap::new(),
            feature_order: vec![],
            kp_label_vocabulary: vec![json!("KP3"), json!(7), json!("loops"), json!(2.0)],
        };
        assert_eq!(metadata.label_kp_ids(), vec![3, 7, 3, 2]);
    }

    #[test]
    fn test_unsorted_labels_keep_their_ids() {
        let metadata = ModelMetadata {
            max_sequence_length: 1,
            numeric_features: vec![],
            categorical_features_map: BTreeMap::new(),
            feature_order: vec![],
            kp_label_vocabulary: vec![json!("KP3"), json!("KP1"), json!(2)],
        };
        assert_eq!(metadata.label_kp_ids(), vec![3, 1, 2]);
    }

    #[test]
    fn test_zero_scale_is_identity_scale() {
        let scaler = StandardScaler {
            mean: vec![1.0, 0.0],
            scale: vec![0.0, 2.0],
        };
        assert_eq!(scaler.transform(0, 3.0), 2.0);
        assert_eq!(scaler.transform(1, 3.0), 1.5);
    }

    #[tokio::test]
    async fn test_load_complete_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), true);

        let artifacts = ArtifactLoader::new(dir.path()).load().await;
        assert!(artifacts.is_loaded());
    }

    #[tokio::test]
    async fn test_missing_model_degrades() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), false);

        let artifacts = ArtifactLoader::new(dir.path()).load().await;
        match artifacts {
            ModelArtifacts::Degraded { reason } => assert!(reason.contains("classifier")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_metadata_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactLoader::new(dir.path()).load().await;
        match artifacts {
            ModelArtifacts::Degraded { reason } => assert!(reason.contains("metadata")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shape_mismatch_degrades() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), false);
        std::fs::write(
            dir.path().join("model.json"),
            json!({"weights": [[0.0, 0.0]], "bias": [0.0]}).to_string(),
        )
        .unwrap();

        assert!(!ArtifactLoader::new(dir.path()).load().await.is_loaded());
    }

    #[tokio::test]
    async fn test_disabled_loader() {
        assert!(!ArtifactLoader::disabled().load().await.is_loaded());
    }
}
