//! `StubClassifier`: deterministic backend without a trained model.
//!
//! Splits the window's bands into one contiguous group per label and scores
//! each label by the mean energy of its group, softmaxed. Loud low-frequency
//! content favours the first labels, bright content the last ones. Good
//! enough to drive the whole pipeline end to end without ONNX.

use ndarray::{ArrayView2, Axis};
use tracing::debug;

use crate::error::{Result, TaggerError};
use crate::inference::{label_probabilities, softmax, Classifier};
use crate::ipc::events::PredictionEntry;

/// Scales mean energies before the softmax so differences are visible.
const SHARPNESS: f32 = 8.0;

pub struct StubClassifier {
    labels: Vec<String>,
}

impl StubClassifier {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl Classifier for StubClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn warm_up(&mut self) -> Result<()> {
        debug!(classes = self.labels.len(), "StubClassifier::warm_up: no-op");
        Ok(())
    }

    fn classify(&mut self, window: ArrayView2<'_, f32>) -> Result<Vec<PredictionEntry>> {
        let classes = self.labels.len();
        if classes == 0 {
            return Err(TaggerError::Inference("stub classifier has no labels".into()));
        }
        let bands = window.nrows();
        if bands == 0 || window.ncols() == 0 {
            return Err(TaggerError::Inference("empty feature window".into()));
        }

        let band_means = window.mean_axis(Axis(1)).ok_or_else(|| {
            TaggerError::Inference("cannot average an empty feature window".into())
        })?;
        let scores: Vec<f32> = (0..classes)
            .map(|c| {
                let lo = c * bands / classes;
                let hi = ((c + 1) * bands / classes).max(lo + 1).min(bands);
                let group: f32 = band_means.iter().skip(lo).take(hi - lo).sum();
                SHARPNESS * group / (hi - lo) as f32
            })
            .collect();

        Ok(label_probabilities(&self.labels, &softmax(&scores)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{i}")).collect()
    }

    #[test]
    fn zero_window_is_uniform() {
        let mut stub = StubClassifier::new(labels(4));
        let out = stub.classify(Array2::<f32>::zeros((8, 16)).view()).unwrap();
        assert_eq!(out.len(), 4);
        for (i, entry) in out.iter().enumerate() {
            assert_eq!(entry.class_index, i);
            assert_relative_eq!(entry.probability, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn energetic_band_group_wins() {
        let mut stub = StubClassifier::new(labels(4));
        let mut window = Array2::<f32>::zeros((8, 16));
        window.row_mut(6).fill(1.0);
        window.row_mut(7).fill(1.0);
        let out = stub.classify(window.view()).unwrap();
        let best = out
            .iter()
            .max_by(|a, b| a.probability.total_cmp(&b.probability))
            .unwrap();
        assert_eq!(best.label, "class_3");
        assert_relative_eq!(
            out.iter().map(|e| e.probability).sum::<f32>(),
            1.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn uneven_groups_score_their_own_band_mean() {
        // 8 bands over 3 labels: bands 0..2, 2..5 and 5..8.
        let mut stub = StubClassifier::new(labels(3));
        let mut window = Array2::<f32>::zeros((8, 4));
        for (band, mut row) in window.rows_mut().into_iter().enumerate() {
            row.fill(band as f32);
        }
        let out = stub.classify(window.view()).unwrap();
        // Group means 0.5, 3 and 6, scaled by SHARPNESS before the softmax.
        let gap = |a: usize, b: usize| (out[a].probability / out[b].probability).ln();
        assert_relative_eq!(gap(1, 0), SHARPNESS * 2.5, epsilon = 1e-2);
        assert_relative_eq!(gap(2, 1), SHARPNESS * 3.0, epsilon = 1e-2);
    }

    #[test]
    fn more_labels_than_bands_still_scores_every_label() {
        let mut stub = StubClassifier::new(labels(41));
        let out = stub.classify(Array2::<f32>::ones((4, 2)).view()).unwrap();
        assert_eq!(out.len(), 41);
    }

    #[test]
    fn no_labels_is_an_error() {
        let mut stub = StubClassifier::new(Vec::new());
        assert!(stub.classify(Array2::<f32>::zeros((2, 2)).view()).is_err());
    }
}
