//! The cached synthesis pipeline.
//!
//! ```text
//! CHECK_CACHE ──hit──────────────────────────────────────────▶ DELIVER
//!      │
//!     miss ──▶ SYNTHESIZE ──▶ FILTER ──▶ STORE (final) ──▶ DELIVER
//!               │    ▲
//!               └OOM─┘ one retry on the CPU
//! ```
//!
//! Synthesis dominates the run time, so a hit skips both backends. A raw
//! artifact left behind by a run that died while filtering is picked up again
//! instead of being re-synthesized.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    error::{PipelineError, StoreError, SynthError},
    filter::{FilterBackend, FilterChain, DEFAULT_CHAIN},
    key::CacheKey,
    store::{ArtifactKind, CacheStore},
    synth::{Device, SynthesisBackend, SynthesisRequest},
    wav,
};

/// One invocation: speak `text` in the voice of `speaker_wav` into `output`.
#[derive(Debug, Clone)]
pub struct Job {
    pub text: String,
    pub output: PathBuf,
    pub speaker_wav: PathBuf,
}

/// How the delivered audio came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from an existing final artifact; no backend ran.
    CacheHit,
    /// Filtered from an existing raw artifact; synthesis was skipped.
    ReusedRaw,
    /// Synthesized on `device`. `fell_back` is set when a GPU attempt ran out
    /// of memory first.
    Synthesized { device: Device, fell_back: bool },
}

/// Result of a successful [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct Outcome {
    pub key: CacheKey,
    pub source: Source,
    /// The final artifact in the cache.
    pub cached: PathBuf,
    /// The caller's copy.
    pub delivered: PathBuf,
    pub bytes: u64,
}

/// Orchestrates cache, synthesis and filter backends.
pub struct Pipeline<S, F> {
    store: CacheStore,
    synth: S,
    filter: F,
    chain: FilterChain,
    language: String,
    model_tag: Option<String>,
}

impl<S: SynthesisBackend, F: FilterBackend> Pipeline<S, F> {
    /// A pipeline using [`DEFAULT_CHAIN`] and English output.
    pub fn new(store: CacheStore, synth: S, filter: F) -> Self {
        Self {
            store,
            synth,
            filter,
            chain: DEFAULT_CHAIN.clone(),
            language: "en".to_string(),
            model_tag: None,
        }
    }

    pub fn with_chain(mut self, chain: FilterChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_model_tag(mut self, tag: Option<String>) -> Self {
        self.model_tag = tag;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Cache key for `text` spoken in the voice of `speaker_clip`.
    pub fn key_for(&self, text: &str, speaker_clip: &[u8]) -> CacheKey {
        CacheKey::derive(text, speaker_clip, self.chain.version(), self.model_tag.as_deref())
    }

    /// Produce `job.output`, from the cache when possible.
    pub fn run(&self, job: &Job) -> Result<Outcome, PipelineError> {
        let clip = fs::read(&job.speaker_wav).map_err(|e| StoreError::io(&job.speaker_wav, e))?;
        let key = self.key_for(&job.text, &clip);
        drop(clip);

        if self.store.exists(&key) {
            let bytes = self.store.deliver(&key, &job.output)?;
            let cached = self.store.final_path(&key);
            info!("Cache hit: {} -> {}", cached.display(), job.output.display());
            return Ok(Outcome {
                key,
                source: Source::CacheHit,
                cached,
                delivered: job.output.clone(),
                bytes,
            });
        }
        info!("Cache miss: {key}");

        let source = if self.store.raw_exists(&key) {
            info!("Reusing raw synthesis {}", self.store.raw_path(&key).display());
            Source::ReusedRaw
        } else {
            self.advise_on_clip(&job.speaker_wav);
            self.synthesize(&key, job)?
        };

        let cached = self.filter_raw(&key)?;

        let bytes = self.store.deliver(&key, &job.output)?;
        info!("Wrote {} (cached at {})", job.output.display(), cached.display());
        Ok(Outcome { key, source, cached, delivered: job.output.clone(), bytes })
    }

    // ── Stages ────────────────────────────────────────────────────────────────

    fn advise_on_clip(&self, speaker_wav: &Path) {
        match wav::inspect(speaker_wav) {
            Ok(info) => {
                debug!(?info, "reference clip");
                for note in info.advisories() {
                    warn!("Warning: {note}");
                }
            }
            Err(e) => warn!("Warning: {e:#}; passing the clip to the synthesizer as is"),
        }
    }

    /// SYNTHESIZE: GPU when available, one CPU retry on device OOM. Commits
    /// the raw artifact.
    fn synthesize(&self, key: &CacheKey, job: &Job) -> Result<Source, PipelineError> {
        let gpu = self.synth.gpu_available();
        info!("GPU available: {gpu}");
        let device = if gpu { Device::Gpu } else { Device::Cpu };

        let request = SynthesisRequest {
            text: job.text.clone(),
            speaker_wav: job.speaker_wav.clone(),
            language: self.language.clone(),
            device,
        };

        info!("Synthesizing on {device}...");
        let staged = self.store.stage(key, ArtifactKind::Raw)?;
        let (staged, source) = match self.synth.synthesize(&request, staged.path()) {
            Ok(()) => (staged, Source::Synthesized { device, fell_back: false }),
            Err(SynthError::DeviceMemoryExhausted { detail }) if device == Device::Gpu => {
                info!("GPU out of memory during synthesis; falling back to CPU.");
                debug!(%detail, "out-of-memory detail");
                if let Err(e) = self.synth.release_device_memory() {
                    debug!("device memory release failed: {e:#}");
                }
                // Start over with a fresh staging file; the GPU attempt may
                // have left a partial one behind.
                drop(staged);
                let retry = self.store.stage(key, ArtifactKind::Raw)?;
                self.synth
                    .synthesize(&request.on(Device::Cpu), retry.path())
                    .map_err(PipelineError::Synthesis)?;
                (retry, Source::Synthesized { device: Device::Cpu, fell_back: true })
            }
            Err(e) => return Err(PipelineError::Synthesis(e)),
        };

        let len = fs::metadata(staged.path())
            .map_err(|e| StoreError::io(staged.path(), e))?
            .len();
        if len == 0 {
            return Err(PipelineError::Synthesis(SynthError::NoOutput {
                path: staged.path().to_path_buf(),
            }));
        }

        self.store.commit(staged)?;
        Ok(source)
    }

    /// FILTER + STORE: raw artifact → staged output → final artifact.
    fn filter_raw(&self, key: &CacheKey) -> Result<PathBuf, PipelineError> {
        info!("Filtering ({})...", self.chain.version());
        let raw = self.store.raw_path(key);
        let staged = self.store.stage(key, ArtifactKind::Final)?;
        self.filter.apply(&raw, staged.path(), &self.chain)?;
        Ok(self.store.commit(staged)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
