//! `Coordinator`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Coordinator::new()          status = Stopped
//!     └─► start()             producer + visualizer + predictor spawned, status = Running
//!         └─► apply_settings()
//!                 resolve predictor + source   (failure: nothing changes)
//!                 status = Reconfiguring
//!                 stop + join all three tasks
//!                 reset clock, ring buffer, published results
//!                 spawn fresh tasks            status = Running (or Error)
//!         └─► shutdown()      tasks joined, status = Stopped
//! ```
//!
//! `Coordinator::spawn()` is `new()` followed by `start()`.
//!
//! ## Threading
//!
//! Every task is a named [`Worker`] thread. The producer opens its source on
//! its own thread (a cpal stream is `!Send`) and reports the outcome through
//! a sync channel, so `start()` / `apply_settings()` only return once the new
//! source is confirmed open.
//!
//! All pipeline mutations happen under one `parking_lot::Mutex`, which also
//! serialises concurrent reconfiguration requests.

pub mod consumer;
pub mod diagnostics;
pub mod producer;
pub mod results;
pub mod task;

use std::sync::{mpsc, Arc};
use std::time::Duration;

use ndarray::Array2;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    buffering::SharedMemory,
    error::{Result, TaggerError},
    inference::{ClassifierHandle, PredictorRegistry},
    ipc::events::{
        CoordinatorStatus, PredictionEntry, PredictionEvent, PredictorInfo, SettingsRequest,
        SourceInfo, StatusEvent,
    },
    source::{SourceFactory, SourceParams, SourceRegistry, SourceSelection},
    transform::{log_spectrogram_factory, ExtractorFactory, SpectrogramConfig},
};

use consumer::{Consumer, ConsumerContext, Role};
use diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics};
use producer::{ProducerContext, ProducerExit};
use results::PublishedResults;
use task::Worker;

/// Broadcast channel capacity: 256 events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `Coordinator`.
#[derive(Debug, Clone)]
pub struct TaggerConfig {
    /// Ring buffer slots `N`. Default: 1000.
    pub ring_capacity: usize,
    /// Samples per chunk. Default: 1024.
    pub chunk_size: usize,
    /// Analysis sample rate (Hz). Sources resample to it. Default: 32000.
    pub sample_rate: u32,
    /// Sliding window columns `W`. Default: 256.
    pub window_width: usize,
    /// Feature bands per column. Default: 128.
    pub spectrogram_bands: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// Sleep between consumer polls. Default: 5 ms.
    pub poll_interval: Duration,
    /// Live capture read timeout. Default: 2 s.
    pub read_timeout: Duration,
    /// Release file chunks at real-time pace. Default: true.
    pub pace_file_playback: bool,
    /// `None` uses the system default input.
    pub preferred_input_device: Option<String>,
    /// Settings applied by `start()`.
    pub start: SettingsRequest,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            chunk_size: 1024,
            sample_rate: 32_000,
            window_width: 256,
            spectrogram_bands: 128,
            min_frequency_hz: 20.0,
            max_frequency_hz: 14_000.0,
            poll_interval: Duration::from_millis(5),
            read_timeout: Duration::from_millis(2_000),
            pace_file_playback: true,
            preferred_input_device: None,
            start: SettingsRequest::live(None),
        }
    }
}

impl TaggerConfig {
    /// # Errors
    /// `InvalidConfig` describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(TaggerError::InvalidConfig(msg)) };
        if self.ring_capacity < 2 {
            return fail(format!("ring_capacity must be >= 2, got {}", self.ring_capacity));
        }
        if self.chunk_size == 0 || self.sample_rate == 0 {
            return fail("chunk_size and sample_rate must be non-zero".into());
        }
        if self.window_width == 0 || self.spectrogram_bands == 0 {
            return fail("window_width and spectrogram_bands must be non-zero".into());
        }
        if self.window_width > self.ring_capacity {
            return fail(format!(
                "window_width {} exceeds ring_capacity {}",
                self.window_width, self.ring_capacity
            ));
        }
        if self.min_frequency_hz <= 0.0 || self.min_frequency_hz >= self.max_frequency_hz {
            return fail(format!(
                "min_frequency_hz {} must be positive and below max_frequency_hz {}",
                self.min_frequency_hz, self.max_frequency_hz
            ));
        }
        Ok(())
    }

    pub fn source_params(&self) -> SourceParams {
        SourceParams {
            sample_rate: self.sample_rate,
            chunk_size: self.chunk_size,
            read_timeout: self.read_timeout,
            pace_playback: self.pace_file_playback,
            preferred_input_device: self.preferred_input_device.clone(),
        }
    }

    pub fn spectrogram_config(&self) -> SpectrogramConfig {
        SpectrogramConfig {
            sample_rate: self.sample_rate,
            frame_size: self.chunk_size,
            bands: self.spectrogram_bands,
            min_frequency_hz: self.min_frequency_hz,
            max_frequency_hz: self.max_frequency_hz,
        }
    }
}

/// The settings the pipeline is currently running with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSettings {
    pub is_live: bool,
    /// Last file source chosen; kept while live so a later file request
    /// without an id can reuse it.
    pub source_id: Option<u32>,
    pub predictor_id: u32,
}

/// Everything needed to launch, resolved before anything is torn down.
struct LaunchPlan {
    settings: ActiveSettings,
    source: SourceFactory,
    classifier: ClassifierHandle,
    labels: Vec<String>,
}

#[derive(Default)]
struct Pipeline {
    producer: Option<Worker>,
    visualizer: Option<Worker>,
    predictor: Option<Worker>,
    settings: Option<ActiveSettings>,
}

impl Pipeline {
    fn is_running(&self) -> bool {
        self.producer.is_some() || self.visualizer.is_some() || self.predictor.is_some()
    }

    /// Signal every worker first, then join them all.
    fn stop_all(&mut self) -> Result<()> {
        let mut workers: Vec<Worker> = [
            self.producer.take(),
            self.visualizer.take(),
            self.predictor.take(),
        ]
        .into_iter()
        .flatten()
        .collect();
        for worker in &mut workers {
            worker.signal_stop();
        }
        let mut first_err = None;
        for worker in workers {
            if let Err(e) = worker.stop_and_join() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// The top-level coordinator handle.
///
/// `Coordinator` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<Coordinator>` to share between the host and event tasks.
pub struct Coordinator {
    config: TaggerConfig,
    predictors: PredictorRegistry,
    sources: SourceRegistry,
    extractor: ExtractorFactory,
    memory: Arc<SharedMemory>,
    results: Arc<PublishedResults>,
    diagnostics: Arc<PipelineDiagnostics>,
    status: Arc<Mutex<CoordinatorStatus>>,
    status_tx: broadcast::Sender<StatusEvent>,
    prediction_tx: broadcast::Sender<PredictionEvent>,
    producer_exit: Arc<Mutex<Option<ProducerExit>>>,
    pipeline: Mutex<Pipeline>,
}

impl Coordinator {
    /// Create a stopped coordinator using the log spectrogram extractor.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(
        config: TaggerConfig,
        predictors: PredictorRegistry,
        sources: SourceRegistry,
    ) -> Result<Self> {
        let extractor = log_spectrogram_factory(config.spectrogram_config());
        Self::with_extractor(config, predictors, sources, extractor)
    }

    /// Create a coordinator and immediately start it with `config.start`.
    ///
    /// # Errors
    /// Anything [`new`](Self::new) or [`start`](Self::start) reports.
    pub fn spawn(
        config: TaggerConfig,
        predictors: PredictorRegistry,
        sources: SourceRegistry,
    ) -> Result<Self> {
        let coordinator = Self::new(config, predictors, sources)?;
        coordinator.start()?;
        Ok(coordinator)
    }

    /// Create a stopped coordinator with a custom feature extractor.
    ///
    /// The factory is called once; its band count must match
    /// `config.spectrogram_bands`.
    pub fn with_extractor(
        config: TaggerConfig,
        predictors: PredictorRegistry,
        sources: SourceRegistry,
        extractor: ExtractorFactory,
    ) -> Result<Self> {
        config.validate()?;
        let bands = extractor()?.bands();
        if bands != config.spectrogram_bands {
            return Err(TaggerError::InvalidConfig(format!(
                "extractor yields {bands} bands, config expects {}",
                config.spectrogram_bands
            )));
        }

        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (prediction_tx, _) = broadcast::channel(BROADCAST_CAP);
        let memory = Arc::new(SharedMemory::new(config.ring_capacity));
        let results = Arc::new(PublishedResults::new(bands, config.window_width));
        let initial = config
            .start
            .predictor_id
            .and_then(|id| predictors.get(id))
            .or_else(|| predictors.default_id().and_then(|id| predictors.get(id)));
        if let Some(entry) = initial {
            results.reset(&entry.labels);
        }

        info!(
            ring_capacity = config.ring_capacity,
            window_width = config.window_width,
            bands,
            predictors = predictors.list().len(),
            sources = sources.list().len(),
            "coordinator created"
        );

        Ok(Self {
            config,
            predictors,
            sources,
            extractor,
            memory,
            results,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            status: Arc::new(Mutex::new(CoordinatorStatus::Stopped)),
            status_tx,
            prediction_tx,
            producer_exit: Arc::new(Mutex::new(None)),
            pipeline: Mutex::new(Pipeline::default()),
        })
    }

    /// Launch the pipeline with `config.start`.
    ///
    /// Blocks until the source is confirmed open (or fails).
    ///
    /// # Errors
    /// - `AlreadyRunning` if tasks are active.
    /// - Resolution errors (`UnknownPredictor`, `UnknownSource`, ...).
    /// - Source open errors.
    pub fn start(&self) -> Result<()> {
        let mut pipeline = self.pipeline.lock();
        if pipeline.is_running() {
            return Err(TaggerError::AlreadyRunning);
        }
        let plan = self.resolve(self.config.start, pipeline.settings.as_ref())?;
        self.memory.reset();
        self.launch(&mut pipeline, plan)
    }

    /// Reconfigure: swap source and/or predictor.
    ///
    /// The request is fully resolved first; an unresolvable request returns
    /// an error and leaves the running pipeline untouched. Returns once the
    /// new tasks are running.
    pub fn apply_settings(&self, request: SettingsRequest) -> Result<()> {
        let mut pipeline = self.pipeline.lock();
        let plan = match self.resolve(request, pipeline.settings.as_ref()) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(?request, "settings rejected: {e}");
                return Err(e);
            }
        };

        info!(?request, "reconfiguring pipeline");
        self.set_status(CoordinatorStatus::Reconfiguring, None);
        if let Err(e) = pipeline.stop_all() {
            error!("task failed during reconfiguration: {e}");
        }
        self.memory.reset();
        self.launch(&mut pipeline, plan)
    }

    /// Stop and join every task. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        let mut pipeline = self.pipeline.lock();
        if !pipeline.is_running() && self.status() == CoordinatorStatus::Stopped {
            return Ok(());
        }
        let joined = pipeline.stop_all();
        self.set_status(CoordinatorStatus::Stopped, None);
        info!("coordinator stopped");
        joined
    }

    /// Latest published visualization window (`bands × width`), copied.
    pub fn get_live_visualization(&self) -> Array2<f32> {
        self.results.visualization()
    }

    /// Latest published prediction, copied.
    pub fn get_live_prediction(&self) -> Vec<PredictionEntry> {
        self.results.predictions()
    }

    pub fn list_predictors(&self) -> Vec<PredictorInfo> {
        self.predictors.list()
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.sources.list()
    }

    pub fn status(&self) -> CoordinatorStatus {
        *self.status.lock()
    }

    pub fn active_settings(&self) -> Option<ActiveSettings> {
        self.pipeline.lock().settings
    }

    /// Why the current producer ended, if it has.
    pub fn producer_exit(&self) -> Option<ProducerExit> {
        self.producer_exit.lock().clone()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_predictions(&self) -> broadcast::Receiver<PredictionEvent> {
        self.prediction_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn resolve(
        &self,
        request: SettingsRequest,
        current: Option<&ActiveSettings>,
    ) -> Result<LaunchPlan> {
        let predictor_id = request
            .predictor_id
            .or(current.map(|c| c.predictor_id))
            .or_else(|| self.predictors.default_id())
            .ok_or_else(|| TaggerError::InvalidConfig("no predictors registered".into()))?;

        let source_id = request.source_id.or(current.and_then(|c| c.source_id));
        let selection = if request.is_live {
            SourceSelection::Live
        } else {
            SourceSelection::File(source_id.ok_or(TaggerError::MissingSource)?)
        };

        let source = self.sources.resolve(selection)?;
        let classifier = self.predictors.resolve(predictor_id)?;
        let labels = classifier.labels();

        Ok(LaunchPlan {
            settings: ActiveSettings {
                is_live: request.is_live,
                source_id,
                predictor_id,
            },
            source,
            classifier,
            labels,
        })
    }

    /// Spawn producer and consumers on a clean memory. Caller holds the
    /// pipeline lock and guarantees no task is running.
    fn launch(&self, pipeline: &mut Pipeline, plan: LaunchPlan) -> Result<()> {
        self.diagnostics.reset();
        self.results.reset(&plan.labels);
        *self.producer_exit.lock() = None;
        pipeline.settings = Some(plan.settings);

        match self.spawn_tasks(pipeline, plan) {
            Ok(()) => {
                let settings = pipeline.settings;
                info!(?settings, "pipeline running");
                self.set_status(CoordinatorStatus::Running, None);
                Ok(())
            }
            Err(e) => {
                if let Err(stop_err) = pipeline.stop_all() {
                    error!("task failed while aborting start: {stop_err}");
                }
                error!("pipeline failed to start: {e}");
                self.set_status(CoordinatorStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn spawn_tasks(&self, pipeline: &mut Pipeline, plan: LaunchPlan) -> Result<()> {
        // Extractors are built before anything runs so a failure leaves no
        // half-started pipeline behind.
        let visualizer = Consumer::new(Role::Visualizer, (self.extractor)()?, self.consumer_context());
        let predictor = Consumer::new(
            Role::Predictor(plan.classifier),
            (self.extractor)()?,
            self.consumer_context(),
        );

        let (open_tx, open_rx) = mpsc::channel::<Result<u32>>();
        let ctx = ProducerContext {
            factory: plan.source,
            params: self.config.source_params(),
            memory: Arc::clone(&self.memory),
            diagnostics: Arc::clone(&self.diagnostics),
            on_exit: self.exit_hook(),
        };
        pipeline.producer = Some(Worker::spawn("tagger-producer", move |cancel| {
            producer::run(ctx, cancel, open_tx)
        })?);

        match open_rx.recv() {
            Ok(Ok(rate)) => info!(sample_rate = rate, "source open"),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(TaggerError::Other(anyhow::anyhow!(
                    "producer task died before opening its source"
                )))
            }
        }

        pipeline.visualizer = Some(Worker::spawn("tagger-visualizer", move |cancel| {
            visualizer.run(cancel)
        })?);
        pipeline.predictor = Some(Worker::spawn("tagger-predictor", move |cancel| {
            predictor.run(cancel)
        })?);
        Ok(())
    }

    fn consumer_context(&self) -> ConsumerContext {
        ConsumerContext {
            memory: Arc::clone(&self.memory),
            results: Arc::clone(&self.results),
            diagnostics: Arc::clone(&self.diagnostics),
            prediction_tx: self.prediction_tx.clone(),
            window_width: self.config.window_width,
            poll_interval: self.config.poll_interval,
        }
    }

    /// Records the producer's exit and reports end-of-stream / failure.
    fn exit_hook(&self) -> producer::ExitHook {
        let slot = Arc::clone(&self.producer_exit);
        let status = Arc::clone(&self.status);
        let status_tx = self.status_tx.clone();
        Box::new(move |exit| {
            let detail = match &exit {
                ProducerExit::Cancelled => None,
                ProducerExit::Exhausted => Some("source exhausted".to_string()),
                ProducerExit::Failed(msg) => Some(format!("source failed: {msg}")),
            };
            *slot.lock() = Some(exit);
            if let Some(detail) = detail {
                warn!(detail = detail.as_str(), "producer ended; reconfigure to resume");
                let _ = status_tx.send(StatusEvent {
                    status: *status.lock(),
                    detail: Some(detail),
                });
            }
        })
    }

    fn set_status(&self, new_status: CoordinatorStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(StatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("shutdown on drop failed: {e}");
        }
    }
}
