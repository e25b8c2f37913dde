use anyhow::{Context, Result, bail};
use atomic_float::AtomicF64;
use log::{debug, error, info};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crate::dsp::db_to_lin;
use crate::model::engine::InferenceEngine;
use crate::model::loader;
use crate::model::resampling::ResamplingModel;
use crate::model::staging::{Retirer, StagingConsumer, StagingProducer, spawn_reclaimer, staged_slot};

/// Loudness that normalised model output is brought to, in dB.
pub const TARGET_LOUDNESS_DB: f64 = -18.0;

/// State the audio side publishes and the control side reads.
struct HostShared {
    sample_rate: AtomicF64,
    max_block_size: AtomicUsize,
    clear_requested: AtomicBool,
    model_loaded: AtomicBool,
    latency: AtomicUsize,
}

/// Audio-thread owner of the live model.
pub struct ModelHost {
    live: Option<ResamplingModel>,
    staged: StagingConsumer,
    retirer: Retirer,
    shared: Arc<HostShared>,
    /// A model the retirement queue refused. Held, never dropped here, until
    /// a later block hands it over.
    retiring: Option<ResamplingModel>,
    scratch: Vec<f32>,
    sample_rate: f64,
    max_block_size: usize,
    _reclaimer: JoinHandle<()>,
}

/// Control-thread handle for loading and clearing models.
#[derive(Clone)]
pub struct ModelLoader {
    staging: StagingProducer,
    shared: Arc<HostShared>,
}

impl ModelHost {
    pub fn new(sample_rate: f64, max_block_size: usize) -> Result<(Self, ModelLoader)> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            bail!("invalid sample rate {sample_rate}");
        }
        if max_block_size == 0 {
            bail!("max block size must be positive");
        }

        let (producer, consumer) = staged_slot();
        let (retirer, reclaimer) = spawn_reclaimer()?;
        let shared = Arc::new(HostShared {
            sample_rate: AtomicF64::new(sample_rate),
            max_block_size: AtomicUsize::new(max_block_size),
            clear_requested: AtomicBool::new(false),
            model_loaded: AtomicBool::new(false),
            latency: AtomicUsize::new(0),
        });

        Ok((
            Self {
                live: None,
                staged: consumer,
                retirer,
                shared: Arc::clone(&shared),
                retiring: None,
                scratch: vec![0.0; max_block_size],
                sample_rate,
                max_block_size,
                _reclaimer: reclaimer,
            },
            ModelLoader {
                staging: producer,
                shared,
            },
        ))
    }

    /// Adopt a new session format. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            bail!("invalid sample rate {sample_rate}");
        }
        if max_block_size == 0 {
            bail!("max block size must be positive");
        }

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.scratch = vec![0.0; max_block_size];
        self.shared.sample_rate.store(sample_rate, Ordering::Release);
        self.shared
            .max_block_size
            .store(max_block_size, Ordering::Release);

        // Off the audio thread, so pending removals can be dropped here.
        drop(self.retiring.take());
        if self.shared.clear_requested.swap(false, Ordering::AcqRel) {
            drop(self.live.take());
            self.shared.model_loaded.store(false, Ordering::Release);
            self.shared.latency.store(0, Ordering::Release);
        }

        if let Some(model) = self.live.as_mut() {
            model
                .reset(sample_rate, max_block_size)
                .context("failed to prepare live model")?;
            self.shared.latency.store(model.latency(), Ordering::Release);
        }

        // A staged model was bound to the old format. Rebind it and promote
        // it here; loads that race this call are caught by the format check
        // in `apply_staging`.
        if let Some(mut model) = self.staged.try_take() {
            model
                .reset(sample_rate, max_block_size)
                .context("failed to prepare staged model")?;
            let latency = model.latency();
            drop(self.live.replace(model));
            self.shared.model_loaded.store(true, Ordering::Release);
            self.shared.latency.store(latency, Ordering::Release);
            debug!("Promoted staged model while preparing for {sample_rate} Hz");
        }
        Ok(())
    }

    /// Send `model` to the reclaim thread, or hold it if the queue refuses.
    fn retire(&mut self, model: ResamplingModel) -> bool {
        match self.retirer.retire(model) {
            Ok(()) => true,
            Err(model) => {
                self.retiring = Some(model);
                false
            }
        }
    }

    /// Apply a pending removal or promotion. Call once at the start of each
    /// block on the audio thread.
    pub fn apply_staging(&mut self) {
        if let Some(model) = self.retiring.take()
            && !self.retire(model)
        {
            return;
        }

        if self.shared.clear_requested.load(Ordering::Acquire) {
            if self.live.is_some() && self.retirer.is_full() {
                // Try again next block.
                return;
            }
            self.shared.clear_requested.store(false, Ordering::Release);
            self.shared.model_loaded.store(false, Ordering::Release);
            self.shared.latency.store(0, Ordering::Release);
            if let Some(old) = self.live.take()
                && !self.retire(old)
            {
                return;
            }
        }

        if self.retirer.is_full() {
            return;
        }
        let Some(mut model) = self.staged.try_take() else {
            return;
        };

        if model.host_sample_rate() != self.sample_rate
            || model.max_block_size() != self.max_block_size
        {
            // Prepared for an older session format.
            self.retire(model);
            return;
        }

        model.flush();
        let latency = model.latency();
        if let Some(old) = self.live.replace(model) {
            self.retire(old);
        }
        self.shared.model_loaded.store(true, Ordering::Release);
        self.shared.latency.store(latency, Ordering::Release);
    }

    /// Run the live model in place over `samples`. Passes audio through
    /// unchanged when no model is live.
    pub fn process(&mut self, input_gain_db: f32, normalize: bool, samples: &mut [f32]) {
        let Some(model) = self.live.as_mut() else {
            return;
        };

        let gain = db_to_lin(input_gain_db);
        if gain != 1.0 {
            for sample in samples.iter_mut() {
                *sample *= gain;
            }
        }

        let frames = samples.len();
        let output = &mut self.scratch[..frames];
        let ticket = model.process(samples, output);
        model.finalize(ticket);

        if normalize && let Some(loudness) = model.loudness() {
            let gain = 10f64.powf((TARGET_LOUDNESS_DB - loudness) / 20.0) as f32;
            for sample in output.iter_mut() {
                *sample *= gain;
            }
        }

        samples.copy_from_slice(output);
    }

    pub fn has_model(&self) -> bool {
        self.live.is_some()
    }

    pub fn latency(&self) -> usize {
        self.live.as_ref().map_or(0, ResamplingModel::latency)
    }
}

impl ModelLoader {
    /// Load a model file and stage it. Errors are logged and reported as
    /// `false`; the live model is untouched either way.
    pub fn load_model(&self, path: &Path) -> bool {
        match self.try_load_model(path) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to load model {}: {e:#}", path.display());
                false
            }
        }
    }

    pub fn load_model_from_bytes(&self, bytes: &[u8]) -> bool {
        match self.try_load_model_from_bytes(bytes) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to load model: {e:#}");
                false
            }
        }
    }

    pub fn try_load_model(&self, path: &Path) -> Result<()> {
        let engine = loader::load_from_path(path)?;
        self.stage_engine(engine)?;
        info!("Staged model {}", path.display());
        Ok(())
    }

    pub fn try_load_model_from_bytes(&self, bytes: &[u8]) -> Result<()> {
        let engine = loader::load_from_bytes(bytes)?;
        self.stage_engine(engine)?;
        info!("Staged model from memory ({} bytes)", bytes.len());
        Ok(())
    }

    /// Wrap an already-built engine for the current session and stage it.
    pub fn stage_engine(&self, engine: Box<dyn InferenceEngine>) -> Result<()> {
        let sample_rate = self.shared.sample_rate.load(Ordering::Acquire);
        let max_block_size = self.shared.max_block_size.load(Ordering::Acquire);
        let model = ResamplingModel::new(engine, sample_rate, max_block_size)
            .context("failed to prepare model for the session")?;
        debug!(
            "Model runs at {} Hz (host {} Hz), latency {} frames",
            model.model_sample_rate(),
            sample_rate,
            model.latency()
        );
        self.staging.stage(model);
        Ok(())
    }

    /// Request removal of the live model at the next block. A staged model
    /// that has not been promoted yet is dropped as well.
    pub fn clear_model(&self) {
        if self.staging.discard_pending() {
            debug!("Dropped staged model on clear");
        }
        self.shared.clear_requested.store(true, Ordering::Release);
    }

    pub fn is_model_loaded(&self) -> bool {
        self.shared.model_loaded.load(Ordering::Acquire)
    }

    /// Latency of the live model in host frames.
    pub fn latency(&self) -> usize {
        self.shared.latency.load(Ordering::Acquire)
    }
}
