//! Per-event-type decode queue drained by one dedicated worker thread.
//!
//! Producers never block beyond the channel send. The worker decodes each raw
//! payload in arrival order and hands successful results to the callback on
//! its own thread, so a slow callback stalls only its own event type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use bchsock_chain::DecodeError;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::EventMetrics;

enum Job {
    Work(Vec<u8>),
    Stop,
}

pub struct DecodePipeline {
    metrics: EventMetrics,
    sender: Sender<Job>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DecodePipeline {
    /// Start the worker thread for one event type.
    pub fn spawn<E, D, F>(metrics: EventMetrics, decode: D, on_event: F) -> Result<Self>
    where
        E: 'static,
        D: Fn(&[u8]) -> std::result::Result<E, DecodeError> + Send + 'static,
        F: Fn(E) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let worker_metrics = metrics.clone();
        let worker = thread::Builder::new()
            .name(format!("decode-{}", metrics.event()))
            .spawn(move || run_worker(receiver, worker_metrics, decode, on_event))?;

        info!(event = metrics.event(), "decode pipeline started");
        Ok(Self {
            metrics,
            sender,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a raw payload. Fails only after shutdown.
    pub fn submit(&self, raw: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::PipelineClosed(self.metrics.event()));
        }
        self.metrics.inc_queue_depth();
        self.sender.send(Job::Work(raw)).map_err(|_| {
            self.metrics.dec_queue_depth();
            Error::PipelineClosed(self.metrics.event())
        })
    }

    /// Let the worker finish queued work, then join it. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sender.send(Job::Stop);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(event = self.metrics.event(), "decode worker panicked");
            }
        }
        info!(event = self.metrics.event(), "decode pipeline stopped");
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<E, D, F>(receiver: Receiver<Job>, metrics: EventMetrics, decode: D, on_event: F)
where
    D: Fn(&[u8]) -> std::result::Result<E, DecodeError>,
    F: Fn(E),
{
    while let Ok(job) = receiver.recv() {
        let raw = match job {
            Job::Work(raw) => raw,
            Job::Stop => break,
        };
        metrics.dec_queue_depth();
        match decode(&raw) {
            Ok(event) => {
                metrics.inc_decoded();
                on_event(event);
            }
            Err(e) => {
                metrics.inc_decode_failure();
                warn!(event = metrics.event(), bytes = raw.len(), error = %e, "dropping undecodable payload");
            }
        }
    }
    debug!(event = metrics.event(), "decode worker exiting");
}
