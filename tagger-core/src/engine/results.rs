//! Latest published results, overwritten in place by the consumers.

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::Array2;
use parking_lot::RwLock;

use crate::ipc::events::{default_predictions, PredictionEntry};

/// One slot per consumer. Readers always get a copy, never a reference
/// into the slot, so a publish can never tear a read.
#[derive(Debug)]
pub struct PublishedResults {
    visualization: RwLock<Array2<f32>>,
    predictions: RwLock<Vec<PredictionEntry>>,
    prediction_seq: AtomicU64,
}

impl PublishedResults {
    pub fn new(bands: usize, width: usize) -> Self {
        Self {
            visualization: RwLock::new(Array2::zeros((bands, width))),
            predictions: RwLock::new(Vec::new()),
            prediction_seq: AtomicU64::new(0),
        }
    }

    pub fn visualization(&self) -> Array2<f32> {
        self.visualization.read().clone()
    }

    pub fn predictions(&self) -> Vec<PredictionEntry> {
        self.predictions.read().clone()
    }

    pub fn publish_visualization(&self, window: Array2<f32>) {
        *self.visualization.write() = window;
    }

    /// Store `predictions` and return the event sequence number assigned.
    pub fn publish_predictions(&self, predictions: Vec<PredictionEntry>) -> u64 {
        *self.predictions.write() = predictions;
        self.prediction_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Zero-filled visualization and zero-probability predictions for `labels`.
    pub fn reset(&self, labels: &[String]) {
        self.visualization.write().fill(0.0);
        *self.predictions.write() = default_predictions(labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_copies() {
        let results = PublishedResults::new(2, 3);
        let mut copy = results.visualization();
        copy.fill(9.0);
        assert!(results.visualization().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn reset_restores_defaults() {
        let results = PublishedResults::new(2, 2);
        results.publish_visualization(Array2::ones((2, 2)));
        assert_eq!(
            results.publish_predictions(vec![PredictionEntry::new("dog", 0.9, 0)]),
            1
        );
        results.reset(&["dog".to_string(), "cat".to_string()]);
        assert!(results.visualization().iter().all(|&v| v == 0.0));
        let preds = results.predictions();
        assert_eq!(preds.len(), 2);
        assert!(preds.iter().all(|p| p.probability == 0.0));
        assert_eq!(results.publish_predictions(Vec::new()), 2);
    }
}
