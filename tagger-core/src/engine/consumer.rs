//! Consumer tasks: ring buffer → feature column → sliding window → result.
//!
//! Both roles share the same poll discipline:
//!
//! 1. Read the clock. Nothing new since the last fold → no work at all.
//! 2. Fold every sequence written since the last fold (at most one window's
//!    worth) into the consumer's own [`SlidingWindowCache`], transforming
//!    each chunk exactly once.
//! 3. Publish: the visualizer copies its window, the predictor classifies it.
//!
//! The predictor keeps its own cache fed straight from the ring buffer
//! rather than reading the visualizer's window, so a slow or failing
//! visualizer never starves it. The price is a second spectral transform
//! per chunk.
//!
//! A consumer that falls so far behind that its next sequence has already
//! been overwritten jumps straight to the head and accepts the gap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{diagnostics::PipelineDiagnostics, results::PublishedResults};
use crate::{
    buffering::{window::SlidingWindowCache, SharedMemory},
    engine::task::CancelToken,
    inference::ClassifierHandle,
    ipc::events::PredictionEvent,
    transform::FeatureExtractor,
};

/// What a consumer publishes.
#[derive(Debug, Clone)]
pub enum Role {
    Visualizer,
    Predictor(ClassifierHandle),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Visualizer => "visualizer",
            Role::Predictor(_) => "predictor",
        }
    }
}

/// Result of one [`Consumer::poll_once`] cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not enough chunks in the buffer yet.
    Waiting,
    /// No new chunk since the last fold; previous result stands.
    Unchanged,
    Published,
    /// Transform or classifier failed; previous result stands.
    Skipped,
    /// Lagged past the buffer; jumped to the head without folding.
    FastForwarded,
}

pub struct ConsumerContext {
    pub memory: Arc<SharedMemory>,
    pub results: Arc<PublishedResults>,
    pub diagnostics: Arc<PipelineDiagnostics>,
    pub prediction_tx: broadcast::Sender<PredictionEvent>,
    pub window_width: usize,
    pub poll_interval: Duration,
}

pub struct Consumer {
    role: Role,
    extractor: Box<dyn FeatureExtractor>,
    cache: SlidingWindowCache,
    ctx: ConsumerContext,
}

impl Consumer {
    /// A consumer with a zero-filled window sized by the extractor's bands.
    pub fn new(role: Role, extractor: Box<dyn FeatureExtractor>, ctx: ConsumerContext) -> Self {
        let cache = SlidingWindowCache::new(extractor.bands(), ctx.window_width);
        Self {
            role,
            extractor,
            cache,
            ctx,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn cache(&self) -> &SlidingWindowCache {
        &self.cache
    }

    /// Minimum occupied slots before this consumer does any work.
    fn gate(&self) -> usize {
        match self.role {
            Role::Visualizer => 1,
            Role::Predictor(_) => self.cache.width().max(1),
        }
    }

    /// Run one poll cycle.
    pub fn poll_once(&mut self) -> PollOutcome {
        let memory = Arc::clone(&self.ctx.memory);
        let written = memory.clock().written();

        if memory.len() < self.gate() {
            PipelineDiagnostics::bump(&self.ctx.diagnostics.idle_polls);
            return PollOutcome::Waiting;
        }
        if self.cache.last_processed() == Some(written) {
            PipelineDiagnostics::bump(&self.ctx.diagnostics.idle_polls);
            return PollOutcome::Unchanged;
        }

        let oldest = memory.oldest_readable(written);
        let newest_window_start = written.saturating_sub(self.cache.width() as u64);
        let start = match self.cache.last_processed() {
            Some(last) if last < oldest => {
                warn!(
                    consumer = self.role.name(),
                    last_processed = last,
                    written,
                    lag = written - last,
                    "consumer lagged past the ring buffer; fast-forwarding"
                );
                self.cache.mark_processed(written);
                PipelineDiagnostics::bump(&self.ctx.diagnostics.lag_skips);
                return PollOutcome::FastForwarded;
            }
            Some(last) => last.max(newest_window_start),
            None => oldest.max(newest_window_start),
        };

        let mut failed = false;
        for sequence in start..written {
            let Some(chunk) = memory.chunk_at(sequence) else {
                // Overwritten while we were catching up.
                PipelineDiagnostics::bump(&self.ctx.diagnostics.positions_dropped);
                continue;
            };
            let folded = self
                .extractor
                .transform_frame(&chunk)
                .and_then(|column| self.cache.push_column(&column));
            match folded {
                Ok(()) => PipelineDiagnostics::bump(&self.ctx.diagnostics.columns_folded),
                Err(e) => {
                    warn!(consumer = self.role.name(), sequence, "transform failed: {e}");
                    PipelineDiagnostics::bump(&self.ctx.diagnostics.transform_errors);
                    failed = true;
                }
            }
        }
        self.cache.mark_processed(written);
        debug!(consumer = self.role.name(), from = start, to = written, "window updated");

        if failed {
            return PollOutcome::Skipped;
        }
        self.publish()
    }

    fn publish(&self) -> PollOutcome {
        match &self.role {
            Role::Visualizer => {
                self.ctx.results.publish_visualization(self.cache.snapshot());
                PipelineDiagnostics::bump(&self.ctx.diagnostics.visualizations_published);
                PollOutcome::Published
            }
            Role::Predictor(classifier) => match classifier.classify(self.cache.view()) {
                Ok(predictions) => {
                    let seq = self.ctx.results.publish_predictions(predictions.clone());
                    let _ = self
                        .ctx
                        .prediction_tx
                        .send(PredictionEvent { seq, predictions });
                    PipelineDiagnostics::bump(&self.ctx.diagnostics.predictions_published);
                    PollOutcome::Published
                }
                Err(e) => {
                    warn!("classification failed, keeping previous prediction: {e}");
                    PipelineDiagnostics::bump(&self.ctx.diagnostics.classify_errors);
                    PollOutcome::Skipped
                }
            },
        }
    }

    /// Poll until `cancel` fires, sleeping `poll_interval` between cycles.
    pub fn run(mut self, cancel: CancelToken) {
        info!(consumer = self.role.name(), "consumer started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.poll_once();
            if cancel.wait(self.ctx.poll_interval) {
                break;
            }
        }
        info!(consumer = self.role.name(), "consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffering::chunk::AudioChunk,
        error::{Result, TaggerError},
        inference::Classifier,
        ipc::events::PredictionEntry,
    };
    use ndarray::ArrayView2;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Column = the chunk's first sample repeated; counts calls.
    struct Echo {
        bands: usize,
        calls: Arc<AtomicUsize>,
        fail_on: Option<f32>,
    }

    impl FeatureExtractor for Echo {
        fn bands(&self) -> usize {
            self.bands
        }

        fn transform_frame(&mut self, chunk: &AudioChunk) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let v = chunk.samples[0];
            if Some(v) == self.fail_on {
                return Err(TaggerError::Transform("bad chunk".into()));
            }
            Ok(vec![v; self.bands])
        }
    }

    /// Reports the newest column's value as the probability of "last";
    /// fails when told to.
    struct Newest {
        labels: Vec<String>,
        calls: Arc<AtomicUsize>,
        fail: Arc<Mutex<bool>>,
    }

    impl Classifier for Newest {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn classify(&mut self, window: ArrayView2<'_, f32>) -> Result<Vec<PredictionEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock() {
                return Err(TaggerError::Inference("model exploded".into()));
            }
            let last = window[[0, window.ncols() - 1]];
            Ok(vec![PredictionEntry::new("last", last, 0)])
        }
    }

    struct Rig {
        memory: Arc<SharedMemory>,
        results: Arc<PublishedResults>,
        diagnostics: Arc<PipelineDiagnostics>,
        prediction_tx: broadcast::Sender<PredictionEvent>,
        transforms: Arc<AtomicUsize>,
    }

    impl Rig {
        fn new(capacity: usize) -> Self {
            let (prediction_tx, _) = broadcast::channel(16);
            Self {
                memory: Arc::new(SharedMemory::new(capacity)),
                results: Arc::new(PublishedResults::new(2, 3)),
                diagnostics: Arc::new(PipelineDiagnostics::default()),
                prediction_tx,
                transforms: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn consumer(&self, role: Role, width: usize, fail_on: Option<f32>) -> Consumer {
            let extractor = Echo {
                bands: 2,
                calls: Arc::clone(&self.transforms),
                fail_on,
            };
            Consumer::new(
                role,
                Box::new(extractor),
                ConsumerContext {
                    memory: Arc::clone(&self.memory),
                    results: Arc::clone(&self.results),
                    diagnostics: Arc::clone(&self.diagnostics),
                    prediction_tx: self.prediction_tx.clone(),
                    window_width: width,
                    poll_interval: Duration::from_millis(1),
                },
            )
        }

        fn append(&self, value: f32) {
            self.memory.append(AudioChunk::new(vec![value; 4], 16_000));
        }

        fn transforms(&self) -> usize {
            self.transforms.load(Ordering::SeqCst)
        }
    }

    fn predictor(fail: Arc<Mutex<bool>>, calls: Arc<AtomicUsize>) -> Role {
        Role::Predictor(ClassifierHandle::new(Newest {
            labels: vec!["last".into()],
            calls,
            fail,
        }))
    }

    #[test]
    fn visualizer_waits_for_first_chunk() {
        let rig = Rig::new(8);
        let mut vis = rig.consumer(Role::Visualizer, 3, None);
        assert_eq!(vis.poll_once(), PollOutcome::Waiting);
        assert_eq!(rig.transforms(), 0);
        rig.append(1.0);
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        assert_eq!(rig.results.visualization().row(0).to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn second_poll_without_new_chunk_does_no_work() {
        let rig = Rig::new(8);
        let mut vis = rig.consumer(Role::Visualizer, 3, None);
        rig.append(1.0);
        rig.append(2.0);
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        let first = rig.results.visualization();
        let transforms = rig.transforms();

        assert_eq!(vis.poll_once(), PollOutcome::Unchanged);
        assert_eq!(rig.transforms(), transforms);
        assert_eq!(rig.results.visualization(), first);
    }

    #[test]
    fn every_chunk_is_folded_exactly_once_under_skewed_polling() {
        let rig = Rig::new(16);
        let mut vis = rig.consumer(Role::Visualizer, 8, None);
        let mut value = 0.0;
        for burst in [1usize, 3, 0, 2, 1, 0, 0, 1] {
            for _ in 0..burst {
                value += 1.0;
                rig.append(value);
            }
            vis.poll_once();
            vis.poll_once();
        }
        assert_eq!(rig.transforms(), 8);
        assert_eq!(
            vis.cache().view().row(0).to_vec(),
            (1..=8).map(|v| v as f32).collect::<Vec<_>>()
        );
        assert_eq!(vis.cache().width(), 8);
    }

    #[test]
    fn catch_up_only_transforms_the_newest_window() {
        let rig = Rig::new(16);
        let mut vis = rig.consumer(Role::Visualizer, 3, None);
        for v in 1..=10 {
            rig.append(v as f32);
        }
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        assert_eq!(rig.transforms(), 3);
        assert_eq!(vis.cache().view().row(1).to_vec(), vec![8.0, 9.0, 10.0]);
    }

    #[test]
    fn lag_beyond_capacity_fast_forwards_without_transforming() {
        let rig = Rig::new(4);
        let mut vis = rig.consumer(Role::Visualizer, 2, None);
        rig.append(1.0);
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        for v in 2..=9 {
            rig.append(v as f32);
        }
        let before = rig.transforms();
        assert_eq!(vis.poll_once(), PollOutcome::FastForwarded);
        assert_eq!(rig.transforms(), before);
        assert_eq!(vis.cache().last_processed(), Some(9));
        assert_eq!(rig.diagnostics.snapshot().lag_skips, 1);

        rig.append(10.0);
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        assert_eq!(vis.cache().view().row(0).to_vec(), vec![1.0, 10.0]);
    }

    #[test]
    fn nan_columns_are_cached_as_zero() {
        let rig = Rig::new(4);
        let mut vis = rig.consumer(Role::Visualizer, 2, None);
        rig.append(f32::NAN);
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        assert!(rig.results.visualization().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn transform_failure_skips_publish_and_is_not_retried() {
        let rig = Rig::new(8);
        let mut vis = rig.consumer(Role::Visualizer, 3, Some(2.0));
        rig.append(1.0);
        assert_eq!(vis.poll_once(), PollOutcome::Published);
        let published = rig.results.visualization();

        rig.append(2.0);
        assert_eq!(vis.poll_once(), PollOutcome::Skipped);
        assert_eq!(rig.results.visualization(), published);
        assert_eq!(vis.poll_once(), PollOutcome::Unchanged);
        assert_eq!(rig.diagnostics.snapshot().transform_errors, 1);
    }

    #[test]
    fn predictor_is_gated_on_a_full_window() {
        let rig = Rig::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pred = rig.consumer(
            predictor(Arc::new(Mutex::new(false)), Arc::clone(&calls)),
            3,
            None,
        );
        rig.append(1.0);
        rig.append(2.0);
        assert_eq!(pred.poll_once(), PollOutcome::Waiting);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        rig.append(3.0);
        let mut events = rig.prediction_tx.subscribe();
        assert_eq!(pred.poll_once(), PollOutcome::Published);
        assert_eq!(pred.cache().view().row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(rig.results.predictions()[0].probability, 3.0);
        let event = events.try_recv().unwrap();
        assert_eq!(event.seq, 1);
        assert_eq!(event.predictions[0].label, "last");
    }

    #[test]
    fn classifier_error_keeps_the_previous_prediction() {
        let rig = Rig::new(8);
        let fail = Arc::new(Mutex::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pred = rig.consumer(predictor(Arc::clone(&fail), Arc::clone(&calls)), 1, None);

        rig.append(0.25);
        assert_eq!(pred.poll_once(), PollOutcome::Published);
        let before = rig.results.predictions();

        *fail.lock() = true;
        rig.append(0.75);
        assert_eq!(pred.poll_once(), PollOutcome::Skipped);
        assert_eq!(rig.results.predictions(), before);
        assert_eq!(rig.diagnostics.snapshot().classify_errors, 1);

        assert_eq!(pred.poll_once(), PollOutcome::Unchanged);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn run_exits_promptly_on_stop() {
        let rig = Rig::new(8);
        let vis = rig.consumer(Role::Visualizer, 3, None);
        rig.append(5.0);
        let worker = crate::engine::task::Worker::spawn("test-vis", move |cancel| vis.run(cancel))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        worker.stop_and_join().unwrap();
        assert_eq!(rig.results.visualization()[[0, 2]], 5.0);
    }
}
