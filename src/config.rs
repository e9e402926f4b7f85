//! Runtime configuration.
//!
//! Resolution order, later sources win:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. a JSON file named by `CTTS_CONFIG`,
//! 3. individual `CTTS_*` environment variables.
//!
//! Example `ctts.json` (every field optional):
//!
//! ```json
//! {
//!   "cache_dir": "/var/cache/ctts",
//!   "device": "cpu",
//!   "model_tag": "xtts_v2-2024-06"
//! }
//! ```

use std::{collections::HashMap, path::PathBuf, str::FromStr};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::synth::{GpuProbe, XTTS_V2};

/// Environment variable naming the optional JSON config file.
pub const CONFIG_ENV: &str = "CTTS_CONFIG";

/// Device selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    /// GPU if one is detected, CPU otherwise.
    Auto,
    Gpu,
    Cpu,
}

impl FromStr for DevicePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => bail!("Unknown device '{}' — expected auto, gpu or cpu", other),
        }
    }
}

impl From<DevicePolicy> for GpuProbe {
    fn from(policy: DevicePolicy) -> Self {
        match policy {
            DevicePolicy::Auto => GpuProbe::Auto,
            DevicePolicy::Gpu => GpuProbe::Always,
            DevicePolicy::Cpu => GpuProbe::Never,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding cached artifacts. Shared by every user of the host
    /// when left at the system temp dir.
    pub cache_dir: PathBuf,

    /// File-name prefix of cached artifacts.
    pub cache_prefix: String,

    /// Coqui TTS executable.
    pub tts_command: String,

    /// Coqui model identifier passed as `--model_name`.
    pub model: String,

    /// Language tag passed as `--language_idx`.
    pub language: String,

    pub device: DevicePolicy,

    /// SoX executable.
    pub sox_command: String,

    /// Extra key material naming the synthesis model build. Set it when the
    /// model changes to stop old cache entries from being served.
    pub model_tag: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir(),
            cache_prefix: "ctts".to_string(),
            tts_command: "tts".to_string(),
            model: XTTS_V2.to_string(),
            language: "en".to_string(),
            device: DevicePolicy::Auto,
            sox_command: "sox".to_string(),
            model_tag: None,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("CTTS_"))
            .collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable map (the environment, in production).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = match vars.get(CONFIG_ENV) {
            Some(path) => Self::from_file(&PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_overrides(vars)?;
        Ok(config)
    }

    /// Parse a JSON config file; missing fields take their defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        let get = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();

        if let Some(v) = get("CTTS_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CTTS_DEVICE") {
            self.device = v.parse().context("Invalid CTTS_DEVICE")?;
        }
        if let Some(v) = get("CTTS_TTS_COMMAND") {
            self.tts_command = v;
        }
        if let Some(v) = get("CTTS_SOX_COMMAND") {
            self.sox_command = v;
        }
        if let Some(v) = get("CTTS_LANGUAGE") {
            self.language = v;
        }
        if let Some(v) = get("CTTS_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("CTTS_MODEL_TAG") {
            self.model_tag = Some(v);
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
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let c = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.cache_prefix, "ctts");
        assert_eq!(c.model, XTTS_V2);
        assert_eq!(c.language, "en");
        assert_eq!(c.device, DevicePolicy::Auto);
        assert_eq!(c.model_tag, None);
    }

    #[test]
    fn test_env_overrides() {
        let c = Config::from_vars(&vars(&[
            ("CTTS_CACHE_DIR", "/var/cache/ctts"),
            ("CTTS_DEVICE", "CPU"),
            ("CTTS_SOX_COMMAND", "/opt/sox/bin/sox"),
            ("CTTS_MODEL_TAG", "xtts-2.0.3"),
            ("CTTS_LANGUAGE", ""),
        ]))
        .unwrap();
        assert_eq!(c.cache_dir, PathBuf::from("/var/cache/ctts"));
        assert_eq!(c.device, DevicePolicy::Cpu);
        assert_eq!(c.sox_command, "/opt/sox/bin/sox");
        assert_eq!(c.model_tag.as_deref(), Some("xtts-2.0.3"));
        assert_eq!(c.language, "en", "empty values are ignored");
    }

    #[test]
    fn test_bad_device_is_an_error() {
        let err = Config::from_vars(&vars(&[("CTTS_DEVICE", "tpu")])).unwrap_err();
        assert!(format!("{err:#}").contains("tpu"));
    }

    #[test]
    fn test_file_then_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ctts.json");
        std::fs::write(
            &path,
            r#"{ "cache_dir": "/srv/tts-cache", "device": "gpu", "language": "de" }"#,
        )
        .unwrap();

        let c = Config::from_vars(&vars(&[
            ("CTTS_CONFIG", path.to_str().unwrap()),
            ("CTTS_LANGUAGE", "fr"),
        ]))
        .unwrap();
        assert_eq!(c.cache_dir, PathBuf::from("/srv/tts-cache"));
        assert_eq!(c.device, DevicePolicy::Gpu);
        assert_eq!(c.language, "fr");
        assert_eq!(c.tts_command, "tts");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ctts.json");
        std::fs::write(&path, r#"{ "cache_size": 10 }"#).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::from_vars(&vars(&[("CTTS_CONFIG", "/nonexistent/ctts.json")])).unwrap_err();
        assert!(err.to_string().contains("Cannot read config"));
    }

    #[test]
    fn test_policy_to_probe() {
        assert_eq!(GpuProbe::from(DevicePolicy::Auto), GpuProbe::Auto);
        assert_eq!(GpuProbe::from(DevicePolicy::Gpu), GpuProbe::Always);
        assert_eq!(GpuProbe::from(DevicePolicy::Cpu), GpuProbe::Never);
    }
}
