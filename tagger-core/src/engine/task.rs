//! Long-lived background tasks with cooperative cancellation.
//!
//! A [`Worker`] is an OS thread running a closure that receives a
//! [`CancelToken`]. Stopping drops the worker's sender half, which
//! disconnects the channel and wakes every `wait` on the token immediately.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error};

use crate::error::{Result, TaggerError};

/// Receiver side of a stop signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for up to `timeout`. Returns `true` as soon as the stop signal
    /// fires, `false` when the full timeout elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

/// Sender side of a stop signal.
#[derive(Debug)]
pub struct StopSignal {
    tx: Option<Sender<()>>,
}

impl StopSignal {
    pub fn trigger(&mut self) {
        self.tx.take();
    }
}

/// A linked stop signal / cancel token pair.
pub fn cancel_pair() -> (StopSignal, CancelToken) {
    // Nothing is ever sent; only disconnection matters.
    let (tx, rx) = bounded(0);
    (StopSignal { tx: Some(tx) }, CancelToken { rx })
}

/// Handle to a named background thread.
///
/// Dropping a `Worker` stops and joins it.
#[derive(Debug)]
pub struct Worker {
    name: String,
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let (stop, token) = cancel_pair();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;
        debug!(worker = name, "worker spawned");
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to exit without waiting for it.
    pub fn signal_stop(&mut self) {
        self.stop.trigger();
    }

    /// `true` once the body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal stop and block until the thread has exited.
    pub fn stop_and_join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        self.stop.trigger();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(()) => {
                debug!(worker = %self.name, "worker joined");
                Ok(())
            }
            Err(_) => {
                error!(worker = %self.name, "worker panicked");
                Err(TaggerError::WorkerPanicked(self.name.clone()))
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.join_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_stop() {
        let (_stop, token) = cancel_pair();
        assert!(!token.wait(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn trigger_wakes_a_pending_wait() {
        let (mut stop, token) = cancel_pair();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            let stopped = token.wait(Duration::from_secs(10));
            (stopped, start.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        stop.trigger();
        let (stopped, elapsed) = waiter.join().expect("waiter panicked");
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn stop_and_join_ends_a_looping_worker() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let worker = Worker::spawn("test-loop", move |cancel| {
            while !cancel.wait(Duration::from_millis(1)) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        })
        .expect("spawn worker");
        thread::sleep(Duration::from_millis(20));
        worker.stop_and_join().expect("join worker");
        let seen = iterations.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(iterations.load(Ordering::Relaxed), seen);
    }

    #[test]
    fn panicking_body_is_reported() {
        let worker = Worker::spawn("test-panic", |_cancel| panic!("boom")).expect("spawn");
        let err = worker.stop_and_join().unwrap_err();
        assert!(matches!(err, TaggerError::WorkerPanicked(name) if name == "test-panic"));
    }
}
