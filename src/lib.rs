//! # ctts
//!
//! Voice-cloned text-to-speech with a content-addressed cache.
//!
//! Speech is synthesized by Coqui XTTS-v2 (through its `tts` command), cleaned
//! up with a fixed SoX effect chain, and the filtered result is cached under a
//! key derived from the text, the speaker clip's bytes and the filter chain's
//! version. Repeating a request costs one file copy.
//!
//! ## Quick start
//!
//! ```no_run
//! use ctts::{CacheStore, CoquiCli, Job, Pipeline, Sox};
//!
//! let pipeline = Pipeline::new(
//!     CacheStore::new(std::env::temp_dir(), "ctts"),
//!     CoquiCli::default(),
//!     Sox::default(),
//! );
//! let outcome = pipeline.run(&Job {
//!     text: "Your text here".into(),
//!     output: "out.wav".into(),
//!     speaker_wav: "speaker.wav".into(),
//! })?;
//! println!("{:?}", outcome.source);
//! # Ok::<(), ctts::PipelineError>(())
//! ```
//!
//! ## Pipeline
//! 1. **Key** — SHA-256 over text, speaker clip and filter version, 16 hex chars.
//! 2. **Lookup** — `<cache>/ctts_<key>.wav` existing is a hit; copy it out.
//! 3. **Synthesis** — GPU when available; one CPU retry if the GPU runs out
//!    of memory. Output is kept as `<cache>/ctts_<key>_raw.wav`.
//! 4. **Filter** — SoX chain [`filter::DEFAULT_CHAIN`] into the final artifact.
//! 5. **Deliver** — copy the final artifact to the requested path.
//!
//! Artifacts are written to staging files and renamed into place without
//! clobbering, so concurrent runs never expose half-written audio.

pub mod config;
pub mod error;
pub mod filter;
pub mod key;
pub mod pipeline;
pub mod store;
pub mod synth;
pub mod wav;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::Config;
pub use error::{FilterError, PipelineError, StoreError, SynthError};
pub use filter::{FilterBackend, FilterChain, Sox, FILTER_VERSION};
pub use key::CacheKey;
pub use pipeline::{Job, Outcome, Pipeline, Source};
pub use store::CacheStore;
pub use synth::{CoquiCli, Device, SynthesisBackend};

/// Build the production pipeline described by `config`.
pub fn pipeline_from_config(config: &Config) -> Pipeline<CoquiCli, Sox> {
    Pipeline::new(
        CacheStore::new(&config.cache_dir, &config.cache_prefix),
        CoquiCli::new(&config.tts_command, &config.model, config.device.into()),
        Sox::new(&config.sox_command),
    )
    .with_language(&config.language)
    .with_model_tag(config.model_tag.clone())
}
