//! Predictor catalog.
//!
//! Each entry names a backend *kind* (`"stub"`, `"onnx"`, or anything an
//! embedder registers) plus the labels and model file it needs. Resolving an
//! id builds a fresh, warmed-up classifier, so a failed load never touches
//! the running pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::{
    error::{Result, TaggerError},
    inference::{ClassifierHandle, StubClassifier},
    ipc::events::PredictorInfo,
};

/// The 41 sound classes of the DCASE 2018 general-purpose tagging task.
pub const DCASE_LABELS: [&str; 41] = [
    "Acoustic_guitar",
    "Applause",
    "Bark",
    "Bass_drum",
    "Burping_or_eructation",
    "Bus",
    "Cello",
    "Chime",
    "Clarinet",
    "Computer_keyboard",
    "Cough",
    "Cowbell",
    "Double_bass",
    "Drawer_open_or_close",
    "Electric_piano",
    "Fart",
    "Finger_snapping",
    "Fireworks",
    "Flute",
    "Glockenspiel",
    "Gong",
    "Gunshot_or_gunfire",
    "Harmonica",
    "Hi-hat",
    "Keys_jangling",
    "Knock",
    "Laughter",
    "Meow",
    "Microwave_oven",
    "Oboe",
    "Saxophone",
    "Scissors",
    "Shatter",
    "Snare_drum",
    "Squeak",
    "Tambourine",
    "Tearing",
    "Telephone",
    "Trumpet",
    "Violin_or_fiddle",
    "Writing",
];

pub fn dcase_labels() -> Vec<String> {
    DCASE_LABELS.iter().map(|s| s.to_string()).collect()
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorEntry {
    pub id: u32,
    pub display_name: String,
    pub description: String,
    /// Backend kind, looked up in the registry's factory table.
    pub kind: String,
    pub model_path: Option<PathBuf>,
    pub labels: Vec<String>,
}

impl PredictorEntry {
    pub fn new(
        id: u32,
        display_name: impl Into<String>,
        kind: impl Into<String>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            description: String::new(),
            kind: kind.into(),
            model_path: None,
            labels,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_model_path(mut self, path: PathBuf) -> Self {
        self.model_path = Some(path);
        self
    }

    pub fn info(&self) -> PredictorInfo {
        PredictorInfo {
            id: self.id,
            display_name: self.display_name.clone(),
            num_classes: self.labels.len(),
            description: self.description.clone(),
        }
    }
}

/// Builds a classifier for a catalog entry.
pub type ClassifierFactory = Arc<dyn Fn(&PredictorEntry) -> Result<ClassifierHandle> + Send + Sync>;

pub struct PredictorRegistry {
    factories: HashMap<String, ClassifierFactory>,
    entries: Vec<PredictorEntry>,
}

impl PredictorRegistry {
    /// Empty catalog with no backend kinds.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Empty catalog that knows the built-in kinds: `stub`, and `onnx` when
    /// compiled with the `onnx` feature.
    pub fn with_builtin_factories() -> Self {
        let mut registry = Self::new();
        registry.register_factory(
            "stub",
            Arc::new(|entry: &PredictorEntry| -> Result<ClassifierHandle> {
                Ok(ClassifierHandle::new(StubClassifier::new(entry.labels.clone())))
            }),
        );

        #[cfg(feature = "onnx")]
        registry.register_factory(
            "onnx",
            Arc::new(|entry: &PredictorEntry| -> Result<ClassifierHandle> {
                use crate::inference::{OnnxClassifier, OnnxClassifierConfig};
                let path = entry.model_path.clone().ok_or_else(|| {
                    TaggerError::InvalidConfig(format!(
                        "predictor {} has kind 'onnx' but no model path",
                        entry.id
                    ))
                })?;
                let config = OnnxClassifierConfig::new(path, entry.labels.clone());
                Ok(ClassifierHandle::new(OnnxClassifier::load(config)?))
            }),
        );

        registry
    }

    pub fn register_factory(&mut self, kind: impl Into<String>, factory: ClassifierFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Add or replace an entry by id.
    pub fn add(&mut self, entry: PredictorEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.push(entry);
    }

    pub fn list(&self) -> Vec<PredictorInfo> {
        self.entries.iter().map(PredictorEntry::info).collect()
    }

    pub fn get(&self, id: u32) -> Option<&PredictorEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Id of the first catalog entry.
    pub fn default_id(&self) -> Option<u32> {
        self.entries.first().map(|e| e.id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build and warm up a new classifier for `id`.
    ///
    /// # Errors
    /// `UnknownPredictor`, `UnknownPredictorKind`, or whatever the backend
    /// reports while loading.
    pub fn resolve(&self, id: u32) -> Result<ClassifierHandle> {
        let entry = self.get(id).ok_or(TaggerError::UnknownPredictor(id))?;
        let factory = self
            .factories
            .get(&entry.kind)
            .ok_or_else(|| TaggerError::UnknownPredictorKind(entry.kind.clone()))?;
        let handle = factory(entry)?;
        handle.0.lock().warm_up()?;
        info!(id, name = entry.display_name.as_str(), kind = entry.kind.as_str(), "predictor loaded");
        Ok(handle)
    }
}

impl Default for PredictorRegistry {
    fn default() -> Self {
        Self::with_builtin_factories()
    }
}

impl std::fmt::Debug for PredictorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("PredictorRegistry")
            .field("kinds", &kinds)
            .field("entries", &self.entries)
            .finish()
    }
}
