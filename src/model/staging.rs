//! Hand-off of prepared models to the audio thread, and their retirement.
//!
//! The staged slot holds at most one model. A newer load replaces a pending
//! one on the loading thread. Models that leave the live slot are sent to a
//! reclaim thread and dropped there.

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::debug;
use std::thread::{self, JoinHandle};

use crate::model::resampling::ResamplingModel;

/// Models that can wait for reclamation before promotion is deferred.
pub const RETIRE_QUEUE_CAPACITY: usize = 8;

pub const RECLAIM_THREAD_NAME: &str = "model-reclaim";

/// Control-thread side of the staged slot.
#[derive(Clone)]
pub struct StagingProducer {
    tx: Sender<ResamplingModel>,
    rx: Receiver<ResamplingModel>,
}

/// Audio-thread side of the staged slot.
pub struct StagingConsumer {
    rx: Receiver<ResamplingModel>,
}

pub fn staged_slot() -> (StagingProducer, StagingConsumer) {
    let (tx, rx) = bounded(1);
    (
        StagingProducer {
            tx,
            rx: rx.clone(),
        },
        StagingConsumer { rx },
    )
}

impl StagingProducer {
    /// Put `model` in the slot, dropping any model still waiting there.
    pub fn stage(&self, mut model: ResamplingModel) {
        loop {
            self.discard_pending();
            match self.tx.try_send(model) {
                Ok(()) => return,
                // Another loader got in between; try again.
                Err(TrySendError::Full(m)) => model = m,
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Drop a staged model that has not been promoted yet.
    pub fn discard_pending(&self) -> bool {
        let mut discarded = false;
        while let Ok(old) = self.rx.try_recv() {
            debug!("Discarding superseded staged model");
            drop(old);
            discarded = true;
        }
        discarded
    }
}

impl StagingConsumer {
    #[inline]
    pub fn try_take(&self) -> Option<ResamplingModel> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Audio-thread side of the retirement queue.
pub struct Retirer {
    tx: Sender<ResamplingModel>,
}

impl Retirer {
    /// Whether a retirement would be refused right now.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    /// Hand a model to the reclaim thread. Gives it back if the queue is full.
    #[inline]
    pub fn retire(&self, model: ResamplingModel) -> Result<(), ResamplingModel> {
        match self.tx.try_send(model) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(m) | TrySendError::Disconnected(m)) => Err(m),
        }
    }
}

/// A retirer whose reclaim thread is gone; every retirement is refused.
#[cfg(test)]
pub(crate) fn disconnected_retirer() -> Retirer {
    let (tx, rx) = bounded(1);
    drop(rx);
    Retirer { tx }
}

/// Start the reclaim thread. It exits once the `Retirer` is dropped.
pub fn spawn_reclaimer() -> Result<(Retirer, JoinHandle<()>)> {
    let (tx, rx) = bounded::<ResamplingModel>(RETIRE_QUEUE_CAPACITY);

    let handle = thread::Builder::new()
        .name(RECLAIM_THREAD_NAME.to_string())
        .spawn(move || {
            for model in rx {
                debug!(
                    "Reclaiming model ({} Hz, latency {})",
                    model.model_sample_rate(),
                    model.latency()
                );
                drop(model);
            }
            debug!("Model reclaim thread exiting");
        })
        .context("failed to spawn model reclaim thread")?;

    Ok((Retirer { tx }, handle))
}
