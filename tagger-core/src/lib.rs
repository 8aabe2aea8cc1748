//! # tagger-core
//!
//! Real-time audio tagging engine: one producer, two sliding-window
//! consumers, live reconfiguration.
//!
//! ## Architecture
//!
//! ```text
//! ChunkSource (mic / file / memory)
//!      │  producer thread
//!      ▼
//! RingBuffer[N] + GroundTruthClock ──────────────┐
//!      │                                         │
//!      ▼ visualizer thread                       ▼ predictor thread
//! FeatureExtractor → SlidingWindowCache    FeatureExtractor → SlidingWindowCache
//!      │                                         │            └─► Classifier
//!      ▼                                         ▼
//! latest visualization                     latest prediction + broadcast
//! ```
//!
//! The producer never waits on a consumer. Consumers that fall more than `N`
//! chunks behind skip forward to the newest data.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod inference;
pub mod ipc;
pub mod source;
pub mod transform;

// Convenience re-exports for downstream crates
pub use engine::{
    diagnostics::DiagnosticsSnapshot, producer::ProducerExit, ActiveSettings, Coordinator,
    TaggerConfig,
};
pub use error::{Result, TaggerError};
pub use inference::{
    dcase_labels, Classifier, ClassifierHandle, PredictorEntry, PredictorRegistry, StubClassifier,
};
pub use ipc::events::{
    CoordinatorStatus, PredictionEntry, PredictionEvent, PredictorInfo, SettingsRequest,
    SourceInfo, StatusEvent,
};
pub use source::{ChunkSource, SourceParams, SourceRegistry};
pub use transform::{FeatureExtractor, SpectrogramConfig};

#[cfg(feature = "onnx")]
pub use inference::{OnnxClassifier, OnnxClassifierConfig};
