use thiserror::Error;

/// All errors produced by tagger-core.
#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("audio capture delivered no samples for {timeout_ms} ms")]
    CaptureStalled { timeout_ms: u64 },

    #[error("audio file error: {0}")]
    AudioFile(String),

    #[error("feature transform error: {0}")]
    Transform(String),

    #[error("feature column has {actual} bands, window expects {expected}")]
    FeatureShape { expected: usize, actual: usize },

    #[error("inference error: {0}")]
    Inference(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("unknown predictor id {0}")]
    UnknownPredictor(u32),

    #[error("no factory registered for predictor kind '{0}'")]
    UnknownPredictorKind(String),

    #[error("unknown audio source id {0}")]
    UnknownSource(u32),

    #[error("file playback requested without a source id")]
    MissingSource,

    #[error("audio source unavailable: {path}")]
    SourceUnavailable { path: std::path::PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("coordinator is already running")]
    AlreadyRunning,

    #[error("worker '{0}' panicked")]
    WorkerPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TaggerError>;
