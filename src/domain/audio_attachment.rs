use bytes::Bytes;

/// Audio containers the service accepts for transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Mp3,
    M4a,
    Ogg,
    Flac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 5] = [Self::Wav, Self::Mp3, Self::M4a, Self::Ogg, Self::Flac];

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(Self::Wav),
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg-3" => Some(Self::Mp3),
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" | "audio/x-aac" => {
                Some(Self::M4a)
            }
            "audio/ogg" | "audio/vorbis" | "audio/x-vorbis+ogg" => Some(Self::Ogg),
            "audio/flac" | "audio/x-flac" => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "m4a" | "mp4" | "aac" => Some(Self::M4a),
            "ogg" | "oga" => Some(Self::Ogg),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        Self::from_extension(extension)
    }

    /// Resolves the format of an upload.
    ///
    /// A declared content type wins. Missing or generic binary content types
    /// fall back to the filename extension.
    pub fn resolve(content_type: Option<&str>, filename: &str) -> Option<Self> {
        match content_type.map(str::trim) {
            None | Some("") => Self::from_filename(filename),
            Some(ct) if ct.starts_with("application/octet-stream") => Self::from_filename(filename),
            Some(ct) => Self::from_mime(ct),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
        }
    }
}

/// Raw audio received by the webhook, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAttachment {
    pub filename: String,
    pub format: AudioFormat,
    pub data: Bytes,
}

impl AudioAttachment {
    pub fn new(filename: String, format: AudioFormat, data: Bytes) -> Self {
        Self {
            filename,
            format,
            data,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}
