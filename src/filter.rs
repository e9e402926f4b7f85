//! Audio post-filtering through an external effects program.
//!
//! The effect chain is data ([`FilterChain`]) so that its exact arguments can
//! be checked against [`FILTER_VERSION`]. The version string is a hand-kept
//! cache-invalidation token: it is folded into every cache key, so it **must**
//! be bumped whenever an effect or parameter below changes, otherwise old
//! cached audio is served as if it came from the new chain.

use std::{
    path::Path,
    process::{Command, Stdio},
};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::FilterError;

/// Identifies [`DEFAULT_CHAIN`]. Bump together with any change to it.
pub const FILTER_VERSION: &str = "sox:v1:highpass120:reverb20:compand0.3,1_6:-70,-60,-20:gain-3";

/// The chain applied to every synthesized clip.
///
/// Cuts rumble below 120 Hz, adds a little room, evens out dynamics and
/// leaves 3 dB of headroom.
pub static DEFAULT_CHAIN: Lazy<FilterChain> = Lazy::new(|| {
    FilterChain::new(FILTER_VERSION)
        .effect("highpass", ["120"])
        .effect("reverb", ["20"])
        .effect("compand", ["0.3,1", "6:-70,-60,-20"])
        .effect("gain", ["-3"])
});

/// One named effect stage and its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub name: String,
    pub params: Vec<String>,
}

/// An ordered list of effects plus the version string that names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    version: String,
    effects: Vec<Effect>,
}

impl FilterChain {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), effects: Vec::new() }
    }

    /// Append an effect stage.
    pub fn effect<I, S>(mut self, name: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.effects.push(Effect {
            name: name.to_string(),
            params: params.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Flatten to `name p1 p2 name p1 …`, the effects syntax SoX expects.
    pub fn to_args(&self) -> Vec<String> {
        self.effects
            .iter()
            .flat_map(|e| std::iter::once(e.name.clone()).chain(e.params.iter().cloned()))
            .collect()
    }
}

/// Turns a raw waveform file into a filtered one.
pub trait FilterBackend {
    fn apply(&self, input: &Path, output: &Path, chain: &FilterChain) -> Result<(), FilterError>;
}

impl<T: FilterBackend + ?Sized> FilterBackend for &T {
    fn apply(&self, input: &Path, output: &Path, chain: &FilterChain) -> Result<(), FilterError> {
        (**self).apply(input, output, chain)
    }
}

/// Runs the chain through the `sox` command-line tool.
#[derive(Debug, Clone)]
pub struct Sox {
    program: String,
}

impl Sox {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn command(&self, input: &Path, output: &Path, chain: &FilterChain) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(input).arg(output).args(chain.to_args());
        cmd
    }
}

impl Default for Sox {
    fn default() -> Self {
        Self::new("sox")
    }
}

impl FilterBackend for Sox {
    fn apply(&self, input: &Path, output: &Path, chain: &FilterChain) -> Result<(), FilterError> {
        let mut cmd = self.command(input, output, chain);
        debug!(command = ?cmd, "running filter");
        let status = cmd
            .stdin(Stdio::null())
            .status()
            .map_err(|source| FilterError::Spawn { program: self.program.clone(), source })?;
        if !status.success() {
            return Err(FilterError::Failed { status });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Pins the default chain to its version string. If this fails after
    /// editing the chain, bump FILTER_VERSION and update the expected args.
    #[test]
    fn test_default_chain_matches_version() {
        assert_eq!(DEFAULT_CHAIN.version(), FILTER_VERSION);
        assert_eq!(
            DEFAULT_CHAIN.to_args(),
            vec![
                "highpass", "120",
                "reverb", "20",
                "compand", "0.3,1", "6:-70,-60,-20",
                "gain", "-3",
            ]
        );
    }

    #[test]
    fn test_effects_keep_order() {
        let chain = FilterChain::new("t").effect("a", ["1"]).effect("b", Vec::<String>::new());
        let names: Vec<&str> = chain.effects().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(chain.to_args(), ["a", "1", "b"]);
    }

    #[test]
    fn test_sox_command_line() {
        let sox = Sox::default();
        let cmd = sox.command(Path::new("in.wav"), Path::new("out.wav"), &DEFAULT_CHAIN);
        assert_eq!(cmd.get_program(), "sox");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..2], ["in.wav", "out.wav"]);
        assert_eq!(args[2..], DEFAULT_CHAIN.to_args()[..]);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let sox = Sox::new("/nonexistent/ctts-test-sox");
        let err = sox
            .apply(Path::new("in.wav"), Path::new("out.wav"), &DEFAULT_CHAIN)
            .unwrap_err();
        assert!(matches!(err, FilterError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure() {
        let sox = Sox::new("false");
        let err = sox
            .apply(Path::new("in.wav"), Path::new("out.wav"), &DEFAULT_CHAIN)
            .unwrap_err();
        assert!(matches!(err, FilterError::Failed { .. }));
    }
}
