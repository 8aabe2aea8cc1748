//! Persistent host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagger_core::{
    dcase_labels, PredictorEntry, PredictorRegistry, SettingsRequest, SourceRegistry,
    TaggerConfig,
};

/// One predictor catalog row as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSettings {
    pub id: u32,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Backend kind: `stub` or `onnx`.
    pub kind: String,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Empty means the DCASE 2018 label set.
    #[serde(default)]
    pub labels: Vec<String>,
}

impl PredictorSettings {
    fn entry(&self) -> PredictorEntry {
        let labels = if self.labels.is_empty() {
            dcase_labels()
        } else {
            self.labels.clone()
        };
        let mut entry = PredictorEntry::new(self.id, &self.display_name, &self.kind, labels)
            .with_description(&self.description);
        if let Some(path) = &self.model_path {
            entry = entry.with_model_path(path.clone());
        }
        entry
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    pub id: u32,
    pub display_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub ring_capacity: usize,
    pub chunk_size: usize,
    pub sample_rate: u32,
    pub window_width: usize,
    pub spectrogram_bands: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub pace_file_playback: bool,
    /// Settings applied at startup.
    pub start: SettingsRequest,
    pub predictors: Vec<PredictorSettings>,
    pub sources: Vec<SourceSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            ring_capacity: 1000,
            chunk_size: 1024,
            sample_rate: 32_000,
            window_width: 256,
            spectrogram_bands: 128,
            min_frequency_hz: 20.0,
            max_frequency_hz: 14_000.0,
            poll_interval_ms: 5,
            read_timeout_ms: 2_000,
            pace_file_playback: true,
            start: SettingsRequest::live(Some(0)),
            predictors: vec![
                PredictorSettings {
                    id: 0,
                    display_name: "DCASE 2018 (band energy)".into(),
                    description: "Model-free baseline over the DCASE 2018 classes".into(),
                    kind: "stub".into(),
                    model_path: None,
                    labels: Vec::new(),
                },
                PredictorSettings {
                    id: 1,
                    display_name: "DCASE 2018 CNN".into(),
                    description: "ONNX export of the DCASE 2018 tagging CNN".into(),
                    kind: "onnx".into(),
                    model_path: Some(PathBuf::from("models/dcase2018.onnx")),
                    labels: Vec::new(),
                },
            ],
            sources: vec![SourceSettings {
                id: 0,
                display_name: "Sample clip".into(),
                path: PathBuf::from("samples/sample.wav"),
            }],
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.ring_capacity = self.ring_capacity.clamp(2, 100_000);
        self.chunk_size = self.chunk_size.clamp(64, 16_384);
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.window_width = self.window_width.clamp(1, self.ring_capacity);
        self.spectrogram_bands = self.spectrogram_bands.clamp(1, 512);
        let nyquist = self.sample_rate as f32 / 2.0;
        self.max_frequency_hz = self.max_frequency_hz.clamp(1.0, nyquist);
        if !(self.min_frequency_hz > 0.0 && self.min_frequency_hz < self.max_frequency_hz) {
            self.min_frequency_hz = 20.0_f32.min(self.max_frequency_hz / 2.0);
        }
        self.poll_interval_ms = self.poll_interval_ms.clamp(1, 1_000);
        self.read_timeout_ms = self.read_timeout_ms.clamp(50, 60_000);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.predictors = dedup_by_id(std::mem::take(&mut self.predictors), |p| p.id);
        self.sources = dedup_by_id(std::mem::take(&mut self.sources), |s| s.id);
    }

    pub fn tagger_config(&self) -> TaggerConfig {
        TaggerConfig {
            ring_capacity: self.ring_capacity,
            chunk_size: self.chunk_size,
            sample_rate: self.sample_rate,
            window_width: self.window_width,
            spectrogram_bands: self.spectrogram_bands,
            min_frequency_hz: self.min_frequency_hz,
            max_frequency_hz: self.max_frequency_hz,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            pace_file_playback: self.pace_file_playback,
            preferred_input_device: self.preferred_input_device.clone(),
            start: self.start,
        }
    }

    /// Relative model paths resolve against `base` (the settings directory).
    pub fn predictor_registry(&self, base: &Path) -> PredictorRegistry {
        let mut registry = PredictorRegistry::with_builtin_factories();
        for predictor in &self.predictors {
            let mut entry = predictor.entry();
            entry.model_path = entry.model_path.map(|p| resolve_relative(base, p));
            registry.add(entry);
        }
        registry
    }

    /// Relative file paths resolve against `base` (the settings directory).
    pub fn source_registry(&self, base: &Path) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for source in &self.sources {
            registry.register_file(
                source.id,
                &source.display_name,
                resolve_relative(base, source.path.clone()),
            );
        }
        registry
    }
}

fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> u32) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|seen| id(seen) == id(&item)) {
            out.push(item);
        }
    }
    out
}

fn resolve_relative(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("AudioTagger")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("audio-tagger")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_settings(&dir.path().join("nope.json"));
        assert_eq!(missing.ring_capacity, 1000);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(load_settings(&broken).predictors.len(), 2);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "windowWidth": 64, "start": { "isLive": false, "sourceId": 3 } }"#,
        )
        .unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.window_width, 64);
        assert_eq!(settings.chunk_size, 1024);
        assert!(!settings.start.is_live);
        assert_eq!(settings.start.source_id, Some(3));
        assert_eq!(settings.start.predictor_id, None);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings = AppSettings {
            ring_capacity: 0,
            window_width: 5_000,
            max_frequency_hz: 50_000.0,
            min_frequency_hz: 60_000.0,
            preferred_input_device: Some("   ".into()),
            ..AppSettings::default()
        };
        settings.predictors.push(settings.predictors[0].clone());
        settings.normalize();

        assert_eq!(settings.ring_capacity, 2);
        assert_eq!(settings.window_width, 2);
        assert_eq!(settings.max_frequency_hz, 16_000.0);
        assert_eq!(settings.min_frequency_hz, 20.0);
        assert_eq!(settings.preferred_input_device, None);
        assert_eq!(settings.predictors.len(), 2);
        settings.tagger_config().validate().unwrap();
    }

    #[test]
    fn save_then_load_preserves_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = AppSettings::default();
        settings.sources.push(SourceSettings {
            id: 9,
            display_name: "Street".into(),
            path: PathBuf::from("/data/street.wav"),
        });
        save_settings(&path, &settings).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"displayName\": \"Street\""));
        assert!(raw.contains("\"modelPath\""));
        assert_eq!(load_settings(&path).sources, settings.sources);
    }

    #[test]
    fn registries_expose_the_catalogs() {
        let settings = AppSettings::default();
        let base = Path::new("/opt/tagger");

        let predictors = settings.predictor_registry(base);
        let infos = predictors.list();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].num_classes, 41);
        assert_eq!(
            predictors.get(1).unwrap().model_path.as_deref(),
            Some(Path::new("/opt/tagger/models/dcase2018.onnx"))
        );

        let sources = settings.source_registry(base);
        assert_eq!(sources.list()[0].display_name, "Sample clip");
    }
}
