use serde::Deserialize;

use crate::error::{WaypointError, WaypointResult};
use crate::predict::features::FeatureSequence;

/// A trained sequence classifier producing one probability per label.
pub trait SequenceClassifier: Send + Sync {
    fn predict_proba(&self, sequence: &FeatureSequence) -> WaypointResult<Vec<f64>>;
}

/// Softmax over a linear layer applied to the mean of the observed
/// timesteps. Padding rows do not contribute.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearSoftmaxClassifier {
    /// `weights[label][feature]`
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LinearSoftmaxClassifier {
    pub fn check_shape(&self, labels: usize, width: usize) -> WaypointResult<()> {
        if self.weights.len() != labels || self.bias.len() != labels {
            return Err(WaypointError::Artifact(format!(
                "classifier has {} weight rows and {} biases for {} labels",
                self.weights.len(),
                self.bias.len(),
                labels
            )));
        }
        if let Some(row) = self.weights.iter().find(|row| row.len() != width) {
            return Err(WaypointError::Artifact(format!(
                "classifier expects {} features per timestep, metadata declares {}",
                row.len(),
                width
            )));
        }
        Ok(())
    }
}

impl SequenceClassifier for LinearSoftmaxClassifier {
    fn predict_proba(&self, sequence: &FeatureSequence) -> WaypointResult<Vec<f64>> {
        let observed = sequence.observed_rows();
        if observed.is_empty() {
            return Err(WaypointError::Feature("sequence has no observed rows".to_string()));
        }

        let mut pooled = vec![0.0; sequence.width()];
        for row in observed {
            for (acc, value) in pooled.iter_mut().zip(row) {
                *acc += value;
            }
        }
        let n = observed.len() as f64;
        pooled.iter_mut().for_each(|v| *v /= n);

        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| row.iter().zip(&pooled).map(|(w, x)| w * x).sum::<f64>() + bias)
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(WaypointError::Feature("classifier produced non-finite output".to_string()));
        }

        Ok(exp.into_iter().map(|e| e / total).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_ignores_padding() {
        let classifier = LinearSoftmaxClassifier {
            weights: vec![vec![1.0], vec![-1.0]],
            bias: vec![0.0, 0.0],
        };
        let padded = FeatureSequence::new(vec![vec![0.0], vec![0.0], vec![2.0]], 1);
        let unpadded = FeatureSequence::new(vec![vec![2.0]], 1);

        let a = classifier.predict_proba(&padded).unwrap();
        let b = classifier.predict_proba(&unpadded).unwrap();
        assert_eq!(a, b);
        assert!((a.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(a[0] > a[1]);
    }

    #[test]
    fn test_shape_check() {
        let classifier = LinearSoftmaxClassifier {
            weights: vec![vec![0.0, 0.0]],
            bias: vec![0.0],
        };
        assert!(classifier.check_shape(1, 2).is_ok());
        assert!(classifier.check_shape(2, 2).is_err());
        assert!(classifier.check_shape(1, 3).is_err());
    }
}
