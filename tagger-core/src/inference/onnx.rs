//! CNN classifier backend via the `ort` crate.
//!
//! Expects a single-input, single-output export:
//! - input  `[1, 1, bands, width]` f32, the sliding window as one image
//! - output `[1, classes]` f32, logits (or probabilities when
//!   `apply_softmax` is off)
//!
//! Input and output names are read from the session, so any export with
//! that shape works.

use std::path::PathBuf;

use ndarray::{Array4, ArrayView2};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};
use ort::value::Value;
use tracing::{debug, info};

use crate::{
    error::{Result, TaggerError},
    inference::{label_probabilities, softmax, Classifier},
    ipc::events::PredictionEntry,
};

#[derive(Debug, Clone)]
pub struct OnnxClassifierConfig {
    pub model_path: PathBuf,
    pub labels: Vec<String>,
    /// Off for exports that already end in a softmax layer.
    pub apply_softmax: bool,
    pub intra_threads: usize,
}

impl OnnxClassifierConfig {
    pub fn new(model_path: PathBuf, labels: Vec<String>) -> Self {
        Self {
            model_path,
            labels,
            apply_softmax: true,
            intra_threads: 1,
        }
    }
}

pub struct OnnxClassifier {
    config: OnnxClassifierConfig,
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Build an ONNX session for `config.model_path`.
    ///
    /// # Errors
    /// `ModelNotFound` if the file is missing, `OnnxSession` if ORT rejects it.
    pub fn load(config: OnnxClassifierConfig) -> Result<Self> {
        if !config.model_path.is_file() {
            return Err(TaggerError::ModelNotFound {
                path: config.model_path.clone(),
            });
        }

        let session = SessionBuilder::new()
            .map_err(|e| TaggerError::OnnxSession(e.to_string()))?
            .with_intra_threads(config.intra_threads.clamp(1, 32))
            .map_err(|e| TaggerError::OnnxSession(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::All)
            .map_err(|e| TaggerError::OnnxSession(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e| TaggerError::OnnxSession(e.to_string()))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| TaggerError::OnnxSession("model has no inputs".into()))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| TaggerError::OnnxSession("model has no outputs".into()))?;

        info!(
            model = %config.model_path.display(),
            input = input_name.as_str(),
            output = output_name.as_str(),
            classes = config.labels.len(),
            "ONNX classifier loaded"
        );

        Ok(Self {
            config,
            session,
            input_name,
            output_name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn labels(&self) -> &[String] {
        &self.config.labels
    }

    fn classify(&mut self, window: ArrayView2<'_, f32>) -> Result<Vec<PredictionEntry>> {
        let (bands, width) = window.dim();
        let input = Array4::from_shape_vec((1, 1, bands, width), window.iter().copied().collect())
            .map_err(|e| TaggerError::Inference(e.to_string()))?;
        let input_val =
            Value::from_array(input).map_err(|e: ort::Error| TaggerError::OnnxSession(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_val])
            .map_err(|e| TaggerError::OnnxSession(e.to_string()))?;
        let (_shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| TaggerError::OnnxSession(e.to_string()))?;

        let classes = self.config.labels.len();
        if data.len() < classes {
            return Err(TaggerError::Inference(format!(
                "model produced {} scores for {} labels",
                data.len(),
                classes
            )));
        }
        let scores = &data[..classes];
        let probs = if self.config.apply_softmax {
            softmax(scores)
        } else {
            scores.to_vec()
        };
        debug!(classes, "ONNX classification done");

        Ok(label_probabilities(&self.config.labels, &probs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_reported() {
        let config = OnnxClassifierConfig::new(
            PathBuf::from("/nonexistent/model.onnx"),
            vec!["a".into(), "b".into()],
        );
        assert!(matches!(
            OnnxClassifier::load(config),
            Err(TaggerError::ModelNotFound { .. })
        ));
    }
}
