//! Classifier abstraction.
//!
//! The `Classifier` trait decouples the predictor consumer from any specific
//! backend (band-energy stub, ONNX CNN, ...). A classifier sees the full
//! sliding window and returns one probability per label.
//!
//! `&mut self` on `classify` expresses that backends may keep state (an ONNX
//! session needs exclusive access to run). All mutation is serialised
//! through `ClassifierHandle`'s `parking_lot::Mutex`.

pub mod registry;
pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, OnnxClassifierConfig};
pub use registry::{dcase_labels, ClassifierFactory, PredictorEntry, PredictorRegistry, DCASE_LABELS};
pub use stub::StubClassifier;

use std::sync::Arc;

use ndarray::ArrayView2;
use parking_lot::Mutex;

use crate::error::Result;
use crate::ipc::events::PredictionEntry;

/// Contract for sound-event classification backends.
pub trait Classifier: Send + 'static {
    /// Class labels in output order.
    fn labels(&self) -> &[String];

    /// One-time warm-up before the first `classify` call.
    ///
    /// # Errors
    /// Returns an error if the backend cannot run at all.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Classify a `bands × width` feature window.
    ///
    /// # Returns
    /// One entry per label, in label order, probabilities summing to ~1.
    fn classify(&mut self, window: ArrayView2<'_, f32>) -> Result<Vec<PredictionEntry>>;
}

/// Thread-safe reference-counted handle to any `Classifier` implementor.
#[derive(Clone)]
pub struct ClassifierHandle(pub Arc<Mutex<dyn Classifier>>);

impl ClassifierHandle {
    pub fn new<C: Classifier>(classifier: C) -> Self {
        Self(Arc::new(Mutex::new(classifier)))
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.lock().labels().to_vec()
    }

    pub fn classify(&self, window: ArrayView2<'_, f32>) -> Result<Vec<PredictionEntry>> {
        self.0.lock().classify(window)
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle").finish_non_exhaustive()
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![1.0 / logits.len().max(1) as f32; logits.len()]
    }
}

/// Pair probabilities with their labels.
pub(crate) fn label_probabilities(labels: &[String], probs: &[f32]) -> Vec<PredictionEntry> {
    labels
        .iter()
        .zip(probs)
        .enumerate()
        .map(|(i, (label, &p))| PredictionEntry::new(label.clone(), p, i))
        .collect()
}
