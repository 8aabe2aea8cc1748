//! Host application state shared by the command loop and event tasks.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use tagger_core::{Coordinator, DiagnosticsSnapshot, SettingsRequest};
use tracing::warn;

use crate::settings::{save_settings, AppSettings};

pub struct AppState {
    /// Wrapped in `Arc` so it can be cloned into event-forwarding tasks.
    pub coordinator: Arc<Coordinator>,
    /// Persisted settings cache.
    pub settings: Arc<Mutex<AppSettings>>,
    /// Absolute path to `settings.json`.
    pub settings_path: PathBuf,
    pub reconfigure_calls: Arc<AtomicUsize>,
    pub reconfigure_failures: Arc<AtomicUsize>,
    /// Rolling latency metrics.
    pub perf_metrics: Arc<Mutex<PerfMetrics>>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, settings: AppSettings, settings_path: PathBuf) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            settings: Arc::new(Mutex::new(settings)),
            settings_path,
            reconfigure_calls: Arc::new(AtomicUsize::new(0)),
            reconfigure_failures: Arc::new(AtomicUsize::new(0)),
            perf_metrics: Arc::new(Mutex::new(PerfMetrics::default())),
        }
    }

    /// Reconfigure the coordinator and remember the choice as the next
    /// startup selection.
    pub fn apply(&self, request: SettingsRequest) -> tagger_core::Result<()> {
        self.reconfigure_calls.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        if let Err(e) = self.coordinator.apply_settings(request) {
            self.reconfigure_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        self.perf_metrics
            .lock()
            .record_reconfigure(started.elapsed().as_secs_f64() * 1_000.0);

        if let Some(active) = self.coordinator.active_settings() {
            let mut settings = self.settings.lock();
            settings.start = SettingsRequest {
                is_live: active.is_live,
                source_id: active.source_id,
                predictor_id: Some(active.predictor_id),
            };
            if let Err(e) = save_settings(&self.settings_path, &settings) {
                warn!("failed to persist settings: {e}");
            }
        }
        Ok(())
    }

    pub fn diagnostics_snapshot(&self) -> AppDiagnostics {
        AppDiagnostics {
            reconfigure_calls: self.reconfigure_calls.load(Ordering::Relaxed),
            reconfigure_failures: self.reconfigure_failures.load(Ordering::Relaxed),
            pipeline: self.coordinator.diagnostics_snapshot(),
        }
    }

    pub fn perf_snapshot(&self) -> PerfSnapshot {
        let metrics = self.perf_metrics.lock().snapshot();
        PerfSnapshot {
            diagnostics: self.diagnostics_snapshot(),
            reconfigure_ms: metrics.reconfigure_ms,
            prediction_gap_ms: metrics.prediction_gap_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDiagnostics {
    pub reconfigure_calls: usize,
    pub reconfigure_failures: usize,
    pub pipeline: DiagnosticsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSnapshot {
    pub diagnostics: AppDiagnostics,
    pub reconfigure_ms: PerfStageSnapshot,
    pub prediction_gap_ms: PerfStageSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfStageSnapshot {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Default)]
pub struct PerfMetrics {
    reconfigure_ms: LatencyWindow,
    prediction_gap_ms: LatencyWindow,
    last_prediction: Option<Instant>,
}

impl PerfMetrics {
    pub fn record_reconfigure(&mut self, elapsed_ms: f64) {
        self.reconfigure_ms.push(elapsed_ms);
    }

    /// Record the time since the previous prediction event.
    pub fn record_prediction(&mut self, at: Instant) {
        if let Some(prev) = self.last_prediction.replace(at) {
            let gap = at.saturating_duration_since(prev);
            self.prediction_gap_ms.push(gap.as_secs_f64() * 1_000.0);
        }
    }

    pub fn snapshot(&self) -> PerfMetricsSnapshot {
        PerfMetricsSnapshot {
            reconfigure_ms: self.reconfigure_ms.summary(),
            prediction_gap_ms: self.prediction_gap_ms.summary(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PerfMetricsSnapshot {
    pub reconfigure_ms: PerfStageSnapshot,
    pub prediction_gap_ms: PerfStageSnapshot,
}

/// How many recent samples each latency series keeps.
const LATENCY_HISTORY: usize = 256;

/// Recent durations of one kind, in milliseconds. Non-finite samples are
/// dropped; the summary covers the retained samples, `count` covers all.
#[derive(Debug, Default)]
struct LatencyWindow {
    recent: VecDeque<f64>,
    total: usize,
}

impl LatencyWindow {
    fn push(&mut self, ms: f64) {
        if !ms.is_finite() {
            return;
        }
        if self.recent.len() == LATENCY_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(ms.max(0.0));
        self.total += 1;
    }

    fn summary(&self) -> PerfStageSnapshot {
        let mut sorted: Vec<f64> = self.recent.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let Some(&max_ms) = sorted.last() else {
            return PerfStageSnapshot::default();
        };
        // Nearest-rank percentile.
        let rank = |q: f64| {
            let n = sorted.len();
            sorted[((q * n as f64).ceil() as usize).clamp(1, n) - 1]
        };
        PerfStageSnapshot {
            count: self.total,
            mean_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50_ms: rank(0.50),
            p95_ms: rank(0.95),
            max_ms,
        }
    }
}
