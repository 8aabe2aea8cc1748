//! Producer task: source → ring buffer → clock.
//!
//! Runs on its own worker thread. The source is opened *on that thread*
//! (a live capture stream cannot move between threads) and the open result
//! is reported back through `open_tx` so the coordinator can fail the
//! (re)start synchronously.

use std::sync::{mpsc, Arc};

use tracing::{debug, error, info};

use super::diagnostics::PipelineDiagnostics;
use crate::{
    buffering::SharedMemory,
    engine::task::CancelToken,
    error::Result,
    source::{SourceFactory, SourceParams},
};

/// Why the producer loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerExit {
    /// Stop was requested.
    Cancelled,
    /// End of stream.
    Exhausted,
    /// Read error from the source.
    Failed(String),
}

pub type ExitHook = Box<dyn FnOnce(ProducerExit) + Send>;

pub struct ProducerContext {
    pub factory: SourceFactory,
    pub params: SourceParams,
    pub memory: Arc<SharedMemory>,
    pub diagnostics: Arc<PipelineDiagnostics>,
    /// Called once when the loop ends (not when opening fails).
    pub on_exit: ExitHook,
}

/// Open the source, report it, then append chunks until stopped or the
/// source ends.
pub fn run(ctx: ProducerContext, cancel: CancelToken, open_tx: mpsc::Sender<Result<u32>>) {
    let mut source = match (ctx.factory)(&ctx.params) {
        Ok(source) => {
            let _ = open_tx.send(Ok(source.sample_rate()));
            source
        }
        Err(e) => {
            let _ = open_tx.send(Err(e));
            return;
        }
    };
    drop(open_tx);
    info!(sample_rate = source.sample_rate(), "producer started");

    let exit = loop {
        if cancel.is_cancelled() {
            break ProducerExit::Cancelled;
        }
        match source.read_chunk(&cancel) {
            Ok(Some(chunk)) => {
                let sequence = ctx.memory.append(chunk);
                PipelineDiagnostics::bump(&ctx.diagnostics.chunks_produced);
                debug!(sequence, position = ctx.memory.clock().position(), "chunk appended");
            }
            Ok(None) if cancel.is_cancelled() => break ProducerExit::Cancelled,
            Ok(None) => {
                info!(written = ctx.memory.clock().written(), "source exhausted");
                break ProducerExit::Exhausted;
            }
            Err(e) => {
                PipelineDiagnostics::bump(&ctx.diagnostics.source_errors);
                error!("source read failed: {e}");
                break ProducerExit::Failed(e.to_string());
            }
        }
    };

    // The source (and any device stream) is released on this thread.
    drop(source);
    debug!(?exit, "producer stopped");
    (ctx.on_exit)(exit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffering::chunk::AudioChunk,
        engine::task::{cancel_pair, Worker},
        error::TaggerError,
        source::{ChunkSource, MemorySource},
    };
    use parking_lot::Mutex;
    use std::time::Duration;

    fn params() -> SourceParams {
        SourceParams {
            sample_rate: 16_000,
            chunk_size: 4,
            read_timeout: Duration::from_millis(50),
            pace_playback: false,
            preferred_input_device: None,
        }
    }

    struct Failing;

    impl ChunkSource for Failing {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn read_chunk(&mut self, _cancel: &CancelToken) -> Result<Option<AudioChunk>> {
            Err(TaggerError::CaptureStalled { timeout_ms: 50 })
        }
    }

    fn context(
        factory: SourceFactory,
        memory: Arc<SharedMemory>,
        exit: Arc<Mutex<Option<ProducerExit>>>,
    ) -> ProducerContext {
        ProducerContext {
            factory,
            params: params(),
            memory,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            on_exit: Box::new(move |e| *exit.lock() = Some(e)),
        }
    }

    #[test]
    fn appends_every_chunk_then_reports_exhaustion() {
        let memory = Arc::new(SharedMemory::new(8));
        let exit = Arc::new(Mutex::new(None));
        let factory: SourceFactory = Arc::new(|p: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Ok(Box::new(MemorySource::generated(5, p.chunk_size, p.sample_rate, |i| i as f32))
                as Box<dyn ChunkSource>)
        });
        let ctx = context(factory, Arc::clone(&memory), Arc::clone(&exit));
        let diagnostics = Arc::clone(&ctx.diagnostics);
        let (_stop, cancel) = cancel_pair();
        let (open_tx, open_rx) = mpsc::channel();

        run(ctx, cancel, open_tx);

        assert_eq!(open_rx.recv().unwrap().unwrap(), 16_000);
        assert_eq!(memory.clock().written(), 5);
        assert_eq!(memory.latest().unwrap().samples[0], 4.0);
        assert_eq!(*exit.lock(), Some(ProducerExit::Exhausted));
        assert_eq!(diagnostics.snapshot().chunks_produced, 5);
    }

    #[test]
    fn open_failure_is_reported_without_exit_hook() {
        let memory = Arc::new(SharedMemory::new(8));
        let exit = Arc::new(Mutex::new(None));
        let factory: SourceFactory = Arc::new(|_: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Err(TaggerError::NoDefaultInputDevice)
        });
        let (_stop, cancel) = cancel_pair();
        let (open_tx, open_rx) = mpsc::channel();

        run(context(factory, memory, Arc::clone(&exit)), cancel, open_tx);

        assert!(matches!(
            open_rx.recv().unwrap(),
            Err(TaggerError::NoDefaultInputDevice)
        ));
        assert!(exit.lock().is_none());
    }

    #[test]
    fn read_error_ends_the_loop() {
        let memory = Arc::new(SharedMemory::new(8));
        let exit = Arc::new(Mutex::new(None));
        let factory: SourceFactory = Arc::new(|_: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Ok(Box::new(Failing) as Box<dyn ChunkSource>)
        });
        let (_stop, cancel) = cancel_pair();
        let (open_tx, _open_rx) = mpsc::channel();

        run(context(factory, Arc::clone(&memory), Arc::clone(&exit)), cancel, open_tx);

        assert!(matches!(&*exit.lock(), Some(ProducerExit::Failed(msg)) if msg.contains("50 ms")));
        assert_eq!(memory.clock().written(), 0);
    }

    #[test]
    fn stop_interrupts_a_slow_source() {
        let memory = Arc::new(SharedMemory::new(8));
        let exit = Arc::new(Mutex::new(None));
        let factory: SourceFactory = Arc::new(|p: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Ok(Box::new(
                MemorySource::generated(100, p.chunk_size, p.sample_rate, |_| 0.1)
                    .with_interval(Duration::from_secs(30)),
            ) as Box<dyn ChunkSource>)
        });
        let ctx = context(factory, Arc::clone(&memory), Arc::clone(&exit));
        let (open_tx, open_rx) = mpsc::channel();
        let worker = Worker::spawn("test-producer", move |cancel| run(ctx, cancel, open_tx)).unwrap();

        assert!(open_rx.recv().unwrap().is_ok());
        std::thread::sleep(Duration::from_millis(30));
        worker.stop_and_join().unwrap();

        assert_eq!(*exit.lock(), Some(ProducerExit::Cancelled));
        assert_eq!(memory.clock().written(), 1);
    }
}
