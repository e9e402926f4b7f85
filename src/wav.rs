//! Speaker reference clip inspection.
//!
//! XTTS clones best from a clip that is mono, 16-bit PCM at 22.05 or 44.1 kHz
//! with no music, little noise or reverb and a steady volume. Only the header
//! half of that can be checked mechanically; [`ClipInfo::advisories`] lists
//! the deviations so the caller can warn about them. Nothing here rejects a
//! clip — the synthesis backend decides what it can work with.

use std::path::Path;

use anyhow::{Context, Result};

/// Sample rates the voice-cloning model is known to handle well.
pub const PREFERRED_SAMPLE_RATES: [u32; 2] = [22_050, 44_100];

/// Header fields of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub sample_format: hound::SampleFormat,
    /// Length in seconds.
    pub duration: f32,
}

impl ClipInfo {
    /// Human-readable notes for every way this clip differs from the
    /// recommended format. Empty when the clip looks ideal.
    pub fn advisories(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.channels != 1 {
            notes.push(format!("reference clip has {} channels, mono is recommended", self.channels));
        }
        if self.sample_format != hound::SampleFormat::Int || self.bits_per_sample != 16 {
            notes.push(format!(
                "reference clip is {}-bit {}, 16-bit PCM is recommended",
                self.bits_per_sample,
                match self.sample_format {
                    hound::SampleFormat::Int => "PCM",
                    hound::SampleFormat::Float => "float",
                }
            ));
        }
        if !PREFERRED_SAMPLE_RATES.contains(&self.sample_rate) {
            notes.push(format!(
                "reference clip is sampled at {} Hz, 22050 or 44100 Hz is recommended",
                self.sample_rate
            ));
        }
        notes
    }
}

/// Read the WAV header of `path`.
pub fn inspect(path: &Path) -> Result<ClipInfo> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Cannot read WAV header: {}", path.display()))?;
    let spec = reader.spec();
    // `duration()` counts frames (samples per channel).
    let frames = reader.duration();
    Ok(ClipInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        sample_format: spec.sample_format,
        duration: frames as f32 / spec.sample_rate.max(1) as f32,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_clip(path: &Path, channels: u16, sample_rate: u32, frames: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as u32 {
            w.write_sample((i % 100) as i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn test_inspect_ideal_clip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("speaker.wav");
        write_clip(&path, 1, 22_050, 22_050);

        let info = inspect(&path).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.bits_per_sample, 16);
        assert!((info.duration - 1.0).abs() < 1e-6);
        assert!(info.advisories().is_empty());
    }

    #[test]
    fn test_stereo_odd_rate_clip_gets_advisories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("speaker.wav");
        write_clip(&path, 2, 48_000, 480);

        let notes = inspect(&path).unwrap().advisories();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].contains("2 channels"));
        assert!(notes[1].contains("48000 Hz"));
    }

    #[test]
    fn test_float_clip_gets_advisory() {
        let info = ClipInfo {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
            duration: 3.0,
        };
        let notes = info.advisories();
        assert_eq!(notes, vec!["reference clip is 32-bit float, 16-bit PCM is recommended"]);
    }

    #[test]
    fn test_non_wav_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("speaker.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();
        assert!(inspect(&path).is_err());
    }
}
