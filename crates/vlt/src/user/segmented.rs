// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background worker for segmented network traces.
//!
//! Large network-trace payloads are split into a start frame, a run of chunk
//! frames and an end frame. Pushing all of them through the daemon link on
//! the caller's thread would stall the application, so the pre-encoded frames
//! are handed to a dedicated worker over a bounded channel. A full channel
//! drops the whole trace; partial traces are never queued.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;

use super::Inner;
use crate::config::SEGMENTED_QUEUE_DEPTH;
use crate::error::{DltError, Result};

pub(super) enum Job {
    /// One complete segmented trace, frames in wire order.
    Trace(Vec<Vec<u8>>),
    Shutdown,
}

pub(super) struct SegmentedSender {
    tx: Sender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl SegmentedSender {
    pub(super) fn spawn(inner: Arc<Mutex<Inner>>) -> Self {
        let (tx, rx) = bounded::<Job>(SEGMENTED_QUEUE_DEPTH);
        let worker = thread::Builder::new()
            .name("vlt-segmented".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Trace(frames) => {
                            let mut guard = inner.lock();
                            for frame in &frames {
                                if let Err(e) = super::route_locked(&mut guard, frame) {
                                    log::debug!("[SEG] frame dropped: {e}");
                                }
                            }
                        }
                        Job::Shutdown => break,
                    }
                }
            })
            .ok();
        if worker.is_none() {
            log::error!("[SEG] failed to spawn worker thread");
        }
        Self { tx, worker }
    }

    /// Queue one trace without blocking. A full queue counts as backpressure
    /// and the trace is dropped as a unit.
    pub(super) fn enqueue(&self, frames: Vec<Vec<u8>>) -> Result<()> {
        match self.tx.try_send(Job::Trace(frames)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DltError::UserBufferFull),
            Err(TrySendError::Disconnected(_)) => Err(DltError::LoggingDisabled),
        }
    }
}

impl Drop for SegmentedSender {
    fn drop(&mut self) {
        let _ = self.tx.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
