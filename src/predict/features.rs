use crate::error::{WaypointError, WaypointResult};
use crate::model::HistoryEntry;
use crate::predict::artifacts::{ModelMetadata, StandardScaler};

/// A fixed-shape encoded history: `max_sequence_length` rows of
/// `feature_order.len()` columns, zero-padded at the front.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSequence {
    rows: Vec<Vec<f64>>,
    observed: usize,
}

impl FeatureSequence {
    /// Wrap pre-built rows; the last `observed` rows are real timesteps.
    pub fn new(rows: Vec<Vec<f64>>, observed: usize) -> Self {
        let observed = observed.min(rows.len());
        Self { rows, observed }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn observed_rows(&self) -> &[Vec<f64>] {
        &self.rows[self.rows.len() - self.observed..]
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }
}

/// How one output column is filled.
enum Column<'a> {
    Numeric { name: &'a str, scaler_index: usize },
    OneHot { feature: &'a str, category: &'a str },
    Absent,
}

fn plan_columns(metadata: &ModelMetadata) -> Vec<Column<'_>> {
    metadata
        .feature_order
        .iter()
        .map(|column| {
            if let Some(index) = metadata.numeric_features.iter().position(|n| n == column) {
                return Column::Numeric {
                    name: column,
                    scaler_index: index,
                };
            }
            for (feature, categories) in &metadata.categorical_features_map {
                let Some(category) = column
                    .strip_prefix(feature.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                else {
                    continue;
                };
                if categories.iter().any(|c| c == category) {
                    return Column::OneHot { feature, category };
                }
            }
            Column::Absent
        })
        .collect()
}

/// Encode a history against the model metadata. Only the most recent
/// `max_sequence_length` entries are kept.
pub fn encode_history(
    history: &[HistoryEntry],
    metadata: &ModelMetadata,
    scaler: &StandardScaler,
) -> WaypointResult<FeatureSequence> {
    let max_len = metadata.max_sequence_length;
    if max_len == 0 {
        return Err(WaypointError::Feature("max_sequence_length is zero".to_string()));
    }

    let columns = plan_columns(metadata);
    let recent = &history[history.len().saturating_sub(max_len)..];
    let padding = max_len - recent.len();

    let mut rows = vec![vec![0.0; columns.len()]; padding];
    for entry in recent {
        let row = columns
            .iter()
            .map(|column| match column {
                Column::Numeric { name, scaler_index } => {
                    let raw = entry.numeric(name).unwrap_or(0.0);
                    scaler.transform(*scaler_index, raw)
                }
                Column::OneHot { feature, category } => match entry.categorical(feature) {
                    Some(value) if value == *category => 1.0,
                    _ => 0.0,
                },
                Column::Absent => 0.0,
            })
            .collect();
        rows.push(row);
    }

    Ok(FeatureSequence::new(rows, recent.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn metadata(max_len: usize) -> ModelMetadata {
        ModelMetadata {
            max_sequence_length: max_len,
            numeric_features: vec!["score".into(), "est_minutes".into()],
            categorical_features_map: BTreeMap::from([(
                "type".to_string(),
                vec!["quiz".to_string(), "video".to_string()],
            )]),
            feature_order: vec![
                "type_video".into(),
                "score".into(),
                "type_quiz".into(),
                "est_minutes".into(),
                "unused".into(),
            ],
            kp_label_vocabulary: vec![],
        }
    }

    fn identity_scaler() -> StandardScaler {
        StandardScaler {
            mean: vec![0.0, 0.0],
            scale: vec![1.0, 1.0],
        }
    }

    #[test]
    fn test_left_padding_and_column_order() {
        let history = vec![HistoryEntry::new(2, 0.5)
            .with_kind("quiz")
            .with_feature("est_minutes", 10.into())];

        let seq = encode_history(&history, &metadata(3), &identity_scaler()).unwrap();
        assert_eq!(seq.rows().len(), 3);
        assert_eq!(seq.rows()[0], vec![0.0; 5]);
        assert_eq!(seq.rows()[1], vec![0.0; 5]);
        assert_eq!(seq.rows()[2], vec![0.0, 0.5, 1.0, 10.0, 0.0]);
        assert_eq!(seq.observed_rows().len(), 1);
    }

    #[test]
    fn test_truncation_keeps_most_recent() {
        let history: Vec<_> = (1..=4)
            .map(|i| HistoryEntry::new(i, i as f64 / 10.0).with_kind("video"))
            .collect();

        let seq = encode_history(&history, &metadata(2), &identity_scaler()).unwrap();
        assert_eq!(seq.rows().len(), 2);
        assert_eq!(seq.rows()[0][1], 0.3);
        assert_eq!(seq.rows()[1][1], 0.4);
        assert_eq!(seq.rows()[1][0], 1.0);
    }

    #[test]
    fn test_numeric_columns_are_scaled() {
        let scaler = StandardScaler {
            mean: vec![0.5, 10.0],
            scale: vec![0.25, 5.0],
        };
        let history = vec![HistoryEntry::new(1, 1.0).with_feature("est_minutes", 20.into())];

        let seq = encode_history(&history, &metadata(1), &scaler).unwrap();
        assert_eq!(seq.rows()[0], vec![0.0, 2.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_zero_length_rejected() {
        let result = encode_history(&[], &metadata(0), &identity_scaler());
        assert!(matches!(result, Err(WaypointError::Feature(_))));
    }
}
