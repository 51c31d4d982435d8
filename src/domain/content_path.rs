use std::fmt;

use super::audio_attachment::AudioFormat;

const MAX_STEM_LEN: usize = 96;
const FALLBACK_STEM: &str = "audio";
const RESULT_EXTENSION: &str = "json";

/// Location of a file inside the content directory.
///
/// Audio and its transcript share a stem: `memo-1.wav` pairs with `memo-1.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentPath(String);

impl ContentPath {
    /// Builds the stored name for an upload. `attempt` 0 keeps the sanitized
    /// stem, later attempts append `-<attempt>` to disambiguate.
    pub fn for_upload(filename: &str, format: AudioFormat, attempt: u32) -> Self {
        let stem = sanitize_stem(filename);
        if attempt == 0 {
            Self(format!("{}.{}", stem, format.extension()))
        } else {
            Self(format!("{}-{}.{}", stem, attempt, format.extension()))
        }
    }

    pub fn from_raw(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn stem(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.0,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match self.0.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext),
            _ => None,
        }
    }

    pub fn result_path(&self) -> ContentPath {
        self.with_extension(RESULT_EXTENSION)
    }

    /// Every other path that would map to the same transcript: the other
    /// audio formats under this stem, then the transcript itself.
    pub fn siblings(&self) -> impl Iterator<Item = ContentPath> + '_ {
        AudioFormat::ALL
            .into_iter()
            .map(|format| format.extension())
            .filter(move |ext| self.extension() != Some(*ext))
            .chain(std::iter::once(RESULT_EXTENSION))
            .map(move |ext| self.with_extension(ext))
    }

    fn with_extension(&self, extension: &str) -> ContentPath {
        Self(format!("{}.{}", self.stem(), extension))
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduces an untrusted filename to a flat, filesystem-safe stem.
pub fn sanitize_stem(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}
