//! Pipeline counters shared by the producer and both consumers.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub chunks_produced: AtomicUsize,
    pub source_errors: AtomicUsize,
    pub columns_folded: AtomicUsize,
    pub transform_errors: AtomicUsize,
    pub visualizations_published: AtomicUsize,
    pub predictions_published: AtomicUsize,
    pub classify_errors: AtomicUsize,
    pub idle_polls: AtomicUsize,
    /// Consumer fell more than a ring's worth behind and jumped to the head.
    pub lag_skips: AtomicUsize,
    /// Sequences overwritten while a consumer was catching up.
    pub positions_dropped: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_produced.store(0, Ordering::Relaxed);
        self.source_errors.store(0, Ordering::Relaxed);
        self.columns_folded.store(0, Ordering::Relaxed);
        self.transform_errors.store(0, Ordering::Relaxed);
        self.visualizations_published.store(0, Ordering::Relaxed);
        self.predictions_published.store(0, Ordering::Relaxed);
        self.classify_errors.store(0, Ordering::Relaxed);
        self.idle_polls.store(0, Ordering::Relaxed);
        self.lag_skips.store(0, Ordering::Relaxed);
        self.positions_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_produced: self.chunks_produced.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            columns_folded: self.columns_folded.load(Ordering::Relaxed),
            transform_errors: self.transform_errors.load(Ordering::Relaxed),
            visualizations_published: self.visualizations_published.load(Ordering::Relaxed),
            predictions_published: self.predictions_published.load(Ordering::Relaxed),
            classify_errors: self.classify_errors.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            lag_skips: self.lag_skips.load(Ordering::Relaxed),
            positions_dropped: self.positions_dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_produced: usize,
    pub source_errors: usize,
    pub columns_folded: usize,
    pub transform_errors: usize,
    pub visualizations_published: usize,
    pub predictions_published: usize,
    pub classify_errors: usize,
    pub idle_polls: usize,
    pub lag_skips: usize,
    pub positions_dropped: usize,
}
