//! Error types shared by the cache store, the backends and the orchestrator.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Failures of a [`SynthesisBackend`](crate::synth::SynthesisBackend).
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    /// The accelerator ran out of memory. Recoverable by retrying on the CPU.
    #[error("device memory exhausted: {detail}")]
    DeviceMemoryExhausted { detail: String },

    /// The backend ran and reported failure.
    #[error("synthesis failed ({status}): {detail}")]
    Failed { status: ExitStatus, detail: String },

    /// The backend reported success but left an empty output file.
    #[error("synthesis produced no audio at {path}")]
    NoOutput { path: PathBuf },

    /// The backend program could not be started.
    #[error("cannot run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Failures of a [`FilterBackend`](crate::filter::FilterBackend).
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("filter exited with {status}")]
    Failed { status: ExitStatus },

    #[error("cannot run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Failures reading or writing cache artifacts and delivery copies.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no cached artifact at {path}")]
    Missing { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A fatal failure of one pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("synthesis error: {0}")]
    Synthesis(#[source] SynthError),

    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl PipelineError {
    /// Process exit code reported by the `ctts` binary.
    ///
    /// `1` is reserved for usage errors and `2` for configuration errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Synthesis(_) => 3,
            Self::Filter(_) => 4,
            Self::Storage(_) => 5,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_names_path() {
        let err = StoreError::io(
            "/tmp/ctts_0123456789abcdef.wav",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("ctts_0123456789abcdef.wav"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let synth = PipelineError::Synthesis(SynthError::DeviceMemoryExhausted {
            detail: "CUDA out of memory".into(),
        });
        let store = PipelineError::Storage(StoreError::Missing { path: "x".into() });
        let filter = PipelineError::Filter(FilterError::Spawn {
            program: "sox".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        });
        let codes = [synth.exit_code(), filter.exit_code(), store.exit_code()];
        assert_eq!(codes, [3, 4, 5]);
    }

    #[test]
    fn test_spawn_error_message() {
        let err = FilterError::Spawn {
            program: "sox".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        };
        assert_eq!(err.to_string(), "cannot run 'sox': No such file");
    }
}
