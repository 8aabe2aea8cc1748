//! Types exchanged with the outer interface layer.
//!
//! | Type | Direction |
//! |------|-----------|
//! | `PredictionEvent` | broadcast on every published prediction |
//! | `StatusEvent` | broadcast on every coordinator state change |
//! | `PredictorInfo` / `SourceInfo` | catalog listings |
//! | `SettingsRequest` | inbound "change settings" request |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// One class in a prediction: `(label, probability, classIndex)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEntry {
    pub label: String,
    /// Probability in [0.0, 1.0].
    pub probability: f32,
    /// Position of the class in the predictor's label list.
    pub class_index: usize,
}

impl PredictionEntry {
    pub fn new(label: impl Into<String>, probability: f32, class_index: usize) -> Self {
        Self {
            label: label.into(),
            probability,
            class_index,
        }
    }
}

/// Zero-probability entries for every label: the "no prediction yet" value.
pub fn default_predictions(labels: &[String]) -> Vec<PredictionEntry> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| PredictionEntry::new(label.clone(), 0.0, i))
        .collect()
}

/// The `k` most probable entries, best first.
pub fn top_predictions(entries: &[PredictionEntry], k: usize) -> Vec<PredictionEntry> {
    let mut ranked = entries.to_vec();
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked.truncate(k);
    ranked
}

/// Broadcast whenever the predictor publishes a new result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub predictions: Vec<PredictionEntry>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorStatus {
    /// No tasks running.
    Stopped,
    /// Producer and consumers active.
    Running,
    /// Tasks stopped, shared state being reset and rewired.
    Reconfiguring,
    /// Last (re)start failed; a new `apply_settings` is required.
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: CoordinatorStatus,
    /// Optional human-readable detail (e.g. error message, source exhausted).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Catalogs and settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorInfo {
    pub id: u32,
    pub display_name: String,
    pub num_classes: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub id: u32,
    pub display_name: String,
}

/// Inbound reconfiguration request.
///
/// `None` ids keep the currently active choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    pub is_live: bool,
    #[serde(default)]
    pub source_id: Option<u32>,
    #[serde(default)]
    pub predictor_id: Option<u32>,
}

impl SettingsRequest {
    pub fn live(predictor_id: Option<u32>) -> Self {
        Self {
            is_live: true,
            source_id: None,
            predictor_id,
        }
    }

    pub fn file(source_id: u32, predictor_id: Option<u32>) -> Self {
        Self {
            is_live: false,
            source_id: Some(source_id),
            predictor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_entry_serializes_with_camel_case() {
        let event = PredictionEvent {
            seq: 4,
            predictions: vec![PredictionEntry::new("Applause", 0.75, 1)],
        };
        let json = serde_json::to_value(&event).expect("serialize prediction event");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["predictions"][0]["label"], "Applause");
        assert_eq!(json["predictions"][0]["classIndex"], 1);
        let p = json["predictions"][0]["probability"]
            .as_f64()
            .expect("probability should serialize as number");
        assert!((p - 0.75).abs() < 1e-6);
    }

    #[test]
    fn status_serializes_lowercase() {
        let event = StatusEvent {
            status: CoordinatorStatus::Reconfiguring,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "reconfiguring");
        assert!(json["detail"].is_null());
        assert!(serde_json::from_str::<CoordinatorStatus>(r#""Running""#).is_err());
    }

    #[test]
    fn settings_request_accepts_missing_ids() {
        let req: SettingsRequest =
            serde_json::from_str(r#"{"isLive": true}"#).expect("deserialize settings");
        assert_eq!(req, SettingsRequest::live(None));

        let req: SettingsRequest =
            serde_json::from_str(r#"{"isLive": false, "sourceId": 2, "predictorId": 1}"#)
                .expect("deserialize settings");
        assert_eq!(req, SettingsRequest::file(2, Some(1)));
    }

    #[test]
    fn catalog_entries_use_display_name_keys() {
        let info = PredictorInfo {
            id: 0,
            display_name: "DCASE".into(),
            num_classes: 41,
            description: "general purpose".into(),
        };
        let json = serde_json::to_value(&info).expect("serialize predictor info");
        assert_eq!(json["displayName"], "DCASE");
        assert_eq!(json["numClasses"], 41);
    }

    #[test]
    fn defaults_and_ranking() {
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let defaults = default_predictions(&labels);
        assert!(defaults.iter().all(|e| e.probability == 0.0));
        assert_eq!(defaults[2].class_index, 2);

        let entries = vec![
            PredictionEntry::new("a", 0.2, 0),
            PredictionEntry::new("b", 0.5, 1),
            PredictionEntry::new("c", 0.3, 2),
        ];
        let top = top_predictions(&entries, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].label, "b");
        assert_eq!(top[1].label, "c");
    }
}
