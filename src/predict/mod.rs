pub mod artifacts;
pub mod classifier;
pub mod features;

pub use artifacts::{
    ArtifactLoader, ArtifactSource, ModelArtifacts, ModelMetadata, StandardScaler,
};
pub use classifier::{LinearSoftmaxClassifier, SequenceClassifier};
pub use features::{encode_history, FeatureSequence};

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{WaypointError, WaypointResult};
use crate::model::{HistoryEntry, KpConfidence, KpId, PredictionResult, PredictionSource};

/// Number of candidates reported by the classifier branch.
pub const TOP_K: usize = 3;

// ---------------------------------------------------------------------------
// WeaknessPredictor trait
// ---------------------------------------------------------------------------

/// Turns an interaction history into ranked weak-KP candidates. Never fails:
/// every problem degrades to the deterministic fallback rule.
#[async_trait]
pub trait WeaknessPredictor: Send + Sync {
    async fn predict(&self, history: &[HistoryEntry]) -> PredictionResult;
}

// ---------------------------------------------------------------------------
// ModelPredictor
// ---------------------------------------------------------------------------

/// Classifier-backed predictor with lazily loaded artifacts.
pub struct ModelPredictor {
    source: Box<dyn ArtifactSource>,
    artifacts: OnceCell<ModelArtifacts>,
    default_kp_id: KpId,
}

impl ModelPredictor {
    pub fn new(source: impl ArtifactSource + 'static, default_kp_id: KpId) -> Self {
        Self {
            source: Box::new(source),
            artifacts: OnceCell::new(),
            default_kp_id,
        }
    }

    /// A predictor with already-loaded artifacts.
    pub fn with_artifacts(artifacts: ModelArtifacts, default_kp_id: KpId) -> Self {
        Self {
            source: Box::new(ArtifactLoader::disabled()),
            artifacts: OnceCell::new_with(Some(artifacts)),
            default_kp_id,
        }
    }

    /// Artifacts, loading them on first use. Concurrent first callers wait
    /// on a single load.
    pub async fn artifacts(&self) -> &ModelArtifacts {
        self.artifacts.get_or_init(|| self.source.load()).await
    }

    fn classify(
        &self,
        history: &[HistoryEntry],
        artifacts: &ModelArtifacts,
    ) -> WaypointResult<PredictionResult> {
        let ModelArtifacts::Loaded {
            classifier,
            scaler,
            metadata,
        } = artifacts
        else {
            return Err(WaypointError::Artifact("model artifacts not loaded".to_string()));
        };

        let sequence = encode_history(history, metadata, scaler)?;
        let probabilities = classifier.predict_proba(&sequence)?;
        let labels = metadata.label_kp_ids();
        if probabilities.len() != labels.len() {
            return Err(WaypointError::Feature(format!(
                "classifier returned {} probabilities for {} labels",
                probabilities.len(),
                labels.len()
            )));
        }

        let top_k = top_candidates(&labels, &probabilities, TOP_K);
        let best = top_k.first().copied().ok_or_else(|| {
            WaypointError::Feature("classifier returned no candidates".to_string())
        })?;

        Ok(PredictionResult {
            top_kp_id: best.kp_id,
            confidence: best.confidence,
            top_k,
            source: PredictionSource::Model,
        })
    }
}

#[async_trait]
impl WeaknessPredictor for ModelPredictor {
    async fn predict(&self, history: &[HistoryEntry]) -> PredictionResult {
        if history.is_empty() {
            return PredictionResult::certain(self.default_kp_id);
        }

        let artifacts = self.artifacts().await;
        match artifacts {
            ModelArtifacts::Loaded { .. } => match self.classify(history, artifacts) {
                Ok(result) => {
                    debug!(
                        kp_id = result.top_kp_id,
                        confidence = result.confidence,
                        "Model prediction"
                    );
                    result
                }
                Err(err) => {
                    warn!(error = %err, "Classifier inference failed, using fallback rule");
                    fallback_prediction(history, self.default_kp_id)
                }
            },
            ModelArtifacts::Degraded { reason } => {
                debug!(reason = %reason, "Model degraded, using fallback rule");
                fallback_prediction(history, self.default_kp_id)
            }
        }
    }
}

/// Highest-probability distinct KP ids, ties to the lower id.
fn top_candidates(labels: &[KpId], probabilities: &[f64], k: usize) -> Vec<KpConfidence> {
    let mut best: BTreeMap<KpId, f64> = BTreeMap::new();
    for (&kp_id, &p) in labels.iter().zip(probabilities) {
        if !p.is_finite() {
            continue;
        }
        best.entry(kp_id)
            .and_modify(|current| *current = current.max(p))
            .or_insert(p);
    }

    let mut ranked: Vec<KpConfidence> = best
        .into_iter()
        .map(|(kp_id, confidence)| KpConfidence { kp_id, confidence })
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.kp_id.cmp(&b.kp_id))
    });
    ranked.truncate(k);
    ranked
}

// ---------------------------------------------------------------------------
// Fallback rule
// ---------------------------------------------------------------------------

/// The KP with the lowest mean score, ties to the lower id. Entries with a
/// non-finite score are ignored; with nothing usable the default KP wins.
pub fn fallback_prediction(history: &[HistoryEntry], default_kp_id: KpId) -> PredictionResult {
    let mut totals: BTreeMap<KpId, (f64, usize)> = BTreeMap::new();
    for entry in history.iter().filter(|e| e.score.is_finite()) {
        let slot = totals.entry(entry.kp_id).or_insert((0.0, 0));
        slot.0 += entry.score;
        slot.1 += 1;
    }

    let mut weakest: Option<(KpId, f64)> = None;
    for (kp_id, (sum, count)) in totals {
        let mean = sum / count as f64;
        match weakest {
            Some((_, lowest)) if mean >= lowest => {}
            _ => weakest = Some((kp_id, mean)),
        }
    }

    PredictionResult::certain(weakest.map(|(kp_id, _)| kp_id).unwrap_or(default_kp_id))
}
