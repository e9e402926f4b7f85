//! Voice-cloning synthesis backends.
//!
//! The model itself lives outside this crate. [`CoquiCli`] drives Coqui
//! XTTS-v2 through the `tts` command that ships with the `coqui-tts` Python
//! package:
//!
//! ```text
//! tts --model_name=tts_models/multilingual/multi-dataset/xtts_v2 \
//!     --text="…" --speaker_wav=speaker.wav --language_idx=en \
//!     --out_path=out.wav --device=cuda
//! ```
//!
//! Running out of GPU memory is reported as
//! [`SynthError::DeviceMemoryExhausted`] so the caller can retry on the CPU.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use tracing::debug;

use crate::error::SynthError;

/// Default Coqui model identifier.
pub const XTTS_V2: &str = "tts_models/multilingual/multi-dataset/xtts_v2";

/// Substrings of backend stderr that mean the accelerator ran out of memory.
const OOM_MARKERS: [&str; 4] = [
    "CUDA out of memory",
    "OutOfMemoryError",
    "CUDA error: out of memory",
    "CUBLAS_STATUS_ALLOC_FAILED",
];

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Gpu,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Gpu => "GPU",
            Device::Cpu => "CPU",
        })
    }
}

/// Everything a backend needs for one utterance.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_wav: PathBuf,
    /// Target language tag, e.g. `"en"`.
    pub language: String,
    pub device: Device,
}

impl SynthesisRequest {
    pub fn on(&self, device: Device) -> Self {
        Self { device, ..self.clone() }
    }
}

pub trait SynthesisBackend {
    /// Whether an accelerator is usable for [`Device::Gpu`] requests.
    fn gpu_available(&self) -> bool;

    /// Synthesize `request` into a WAV file at `out`.
    fn synthesize(&self, request: &SynthesisRequest, out: &Path) -> Result<(), SynthError>;

    /// Best-effort release of accelerator memory after an out-of-memory
    /// failure. Callers ignore the result.
    fn release_device_memory(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T: SynthesisBackend + ?Sized> SynthesisBackend for &T {
    fn gpu_available(&self) -> bool {
        (**self).gpu_available()
    }

    fn synthesize(&self, request: &SynthesisRequest, out: &Path) -> Result<(), SynthError> {
        (**self).synthesize(request, out)
    }

    fn release_device_memory(&self) -> anyhow::Result<()> {
        (**self).release_device_memory()
    }
}

/// How [`CoquiCli`] decides whether a GPU is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuProbe {
    /// Ask `nvidia-smi`.
    Auto,
    /// Assume a GPU is present.
    Always,
    /// Never use a GPU.
    Never,
}

/// Coqui TTS command-line front end.
#[derive(Debug, Clone)]
pub struct CoquiCli {
    program: String,
    model: String,
    probe: GpuProbe,
}

impl CoquiCli {
    pub fn new(program: impl Into<String>, model: impl Into<String>, probe: GpuProbe) -> Self {
        Self { program: program.into(), model: model.into(), probe }
    }

    /// Every value is glued to its flag (`--text=…`) so that text or paths
    /// starting with `-` are not mistaken for options by argparse.
    fn command(&self, request: &SynthesisRequest, out: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("--model_name={}", self.model))
            .arg(format!("--text={}", request.text))
            .arg(flag_value("--speaker_wav=", &request.speaker_wav))
            .arg(format!("--language_idx={}", request.language))
            .arg(flag_value("--out_path=", out))
            .arg(match request.device {
                Device::Gpu => "--device=cuda",
                Device::Cpu => "--device=cpu",
            });
        cmd
    }
}

/// `--flag=<path>` without a lossy UTF-8 round trip.
fn flag_value(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

impl Default for CoquiCli {
    fn default() -> Self {
        Self::new("tts", XTTS_V2, GpuProbe::Auto)
    }
}

impl SynthesisBackend for CoquiCli {
    fn gpu_available(&self) -> bool {
        match self.probe {
            GpuProbe::Always => true,
            GpuProbe::Never => false,
            GpuProbe::Auto => probe_nvidia(),
        }
    }

    fn synthesize(&self, request: &SynthesisRequest, out: &Path) -> Result<(), SynthError> {
        let mut cmd = self.command(request, out);
        debug!(program = %self.program, device = %request.device, out = %out.display(), "running synthesis");
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| SynthError::Spawn { program: self.program.clone(), source })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(output.status, &stderr))
    }
}

/// Map a failed run's stderr onto the error taxonomy.
fn classify_failure(status: std::process::ExitStatus, stderr: &str) -> SynthError {
    if let Some(line) = stderr
        .lines()
        .find(|l| OOM_MARKERS.iter().any(|m| l.contains(m)))
    {
        return SynthError::DeviceMemoryExhausted { detail: line.trim().to_string() };
    }
    let detail = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string();
    SynthError::Failed { status, detail }
}

/// `true` if `nvidia-smi -L` runs and lists at least one GPU, unless
/// `CUDA_VISIBLE_DEVICES` hides them all.
fn probe_nvidia() -> bool {
    if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
        if cuda_devices_hidden(&visible) {
            return false;
        }
    }
    match Command::new("nvidia-smi").arg("-L").stderr(Stdio::null()).output() {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).lines().any(|l| l.starts_with("GPU"))
        }
        _ => false,
    }
}

fn cuda_devices_hidden(visible: &str) -> bool {
    let visible = visible.trim();
    visible.is_empty() || visible == "-1"
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
