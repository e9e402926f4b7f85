//! Content-addressed cache keys.
//!
//! A key is the first [`KEY_LEN`] hex characters of a SHA-256 digest over
//!
//! ```text
//! text ‖ "\n---\n" ‖ speaker clip bytes ‖ "\n---\n" ‖ filter version [‖ "\n---\n" ‖ model tag]
//! ```
//!
//! Without a model tag this is byte-for-byte the key material of the original
//! `ctts` script, so existing `/tmp/ctts_*.wav` caches keep hitting.

use std::fmt;

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the full SHA-256 digest.
pub const KEY_LEN: usize = 16;

/// Separator placed between the segments of the key material.
const SEPARATOR: &[u8] = b"\n---\n";

/// SHA-256 of `data` as lowercase hex, truncated to [`KEY_LEN`] characters.
pub fn digest(data: &[u8]) -> String {
    let mut full = hex::encode(Sha256::digest(data));
    full.truncate(KEY_LEN);
    full
}

/// Identifies one (text, speaker clip, filter chain) combination in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash the key material for one synthesis job.
    ///
    /// `model_tag` lets a deployment fold the synthesis model's identity into
    /// the key so that a model upgrade invalidates old entries. `None` keeps
    /// the three-segment material.
    pub fn derive(
        text: &str,
        speaker_clip: &[u8],
        filter_version: &str,
        model_tag: Option<&str>,
    ) -> Self {
        let tag_len = model_tag.map_or(0, |t| SEPARATOR.len() + t.len());
        let mut material = Vec::with_capacity(
            text.len() + speaker_clip.len() + filter_version.len() + 2 * SEPARATOR.len() + tag_len,
        );
        material.extend_from_slice(text.as_bytes());
        material.extend_from_slice(SEPARATOR);
        material.extend_from_slice(speaker_clip);
        material.extend_from_slice(SEPARATOR);
        material.extend_from_slice(filter_version.as_bytes());
        if let Some(tag) = model_tag {
            material.extend_from_slice(SEPARATOR);
            material.extend_from_slice(tag.as_bytes());
        }
        Self(digest(&material))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = "sox:v1:highpass120:reverb20:compand0.3,1_6:-70,-60,-20:gain-3";

    #[test]
    fn test_digest_known_vector() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(digest(b"abc"), "ba7816bf8f01cfea");
    }

    #[test]
    fn test_digest_length_and_charset() {
        let d = digest(b"");
        assert_eq!(d.len(), KEY_LEN);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = CacheKey::derive("Hello there.", b"RIFF....WAVE", VERSION, None);
        let b = CacheKey::derive("Hello there.", b"RIFF....WAVE", VERSION, None);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), KEY_LEN);
    }

    #[test]
    fn test_key_matches_manual_material() {
        let key = CacheKey::derive("hi", b"clip", "v1", None);
        assert_eq!(key.as_str(), digest(b"hi\n---\nclip\n---\nv1"));
    }

    #[test]
    fn test_key_changes_with_each_input() {
        let base = CacheKey::derive("Hello there.", b"clip-bytes", VERSION, None);
        let text = CacheKey::derive("Hello there!", b"clip-bytes", VERSION, None);
        let clip = CacheKey::derive("Hello there.", b"clip-bytez", VERSION, None);
        let filter = CacheKey::derive("Hello there.", b"clip-bytes", "sox:v2", None);
        assert_ne!(base, text);
        assert_ne!(base, clip);
        assert_ne!(base, filter);
        assert_ne!(text, clip);
    }

    #[test]
    fn test_model_tag_extends_material() {
        let plain = CacheKey::derive("hi", b"clip", "v1", None);
        let tagged = CacheKey::derive("hi", b"clip", "v1", Some("xtts_v2"));
        assert_ne!(plain, tagged);
        assert_eq!(tagged.as_str(), digest(b"hi\n---\nclip\n---\nv1\n---\nxtts_v2"));
    }

    #[test]
    fn test_display_is_the_hex_string() {
        let key = CacheKey::derive("a", b"b", "c", None);
        assert_eq!(key.to_string(), key.as_str());
    }
}
