use std::io::Cursor;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::TranscriptionError;
use crate::domain::AudioFormat;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Mono PCM at [`TARGET_SAMPLE_RATE`].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(TARGET_SAMPLE_RATE)
    }
}

/// Decodes any supported container to 16 kHz mono `f32` samples.
///
/// Corrupt frames are skipped; a file that yields no samples at all is an error.
pub fn decode_audio_to_pcm(
    data: &[u8],
    format: Option<AudioFormat>,
) -> Result<DecodedAudio, TranscriptionError> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(format) = format {
        hint.with_extension(format.extension());
        hint.mime_type(format.as_mime());
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| TranscriptionError::DecodingFailed(format!("probe: {}", e)))?;

    let mut reader = probed.format;

    let track = reader
        .default_track()
        .ok_or_else(|| TranscriptionError::DecodingFailed("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| TranscriptionError::DecodingFailed("unknown sample rate".to_string()))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| TranscriptionError::UnsupportedFormat(format!("codec: {}", e)))?;

    let mut mono = Vec::new();
    while let Some(packet) = next_track_packet(reader.as_mut(), track_id)? {
        match decoder.decode(&packet) {
            Ok(buffer) if buffer.frames() > 0 => {
                let mut interleaved = SampleBuffer::<f32>::new(buffer.frames() as u64, *buffer.spec());
                interleaved.copy_interleaved_ref(buffer);
                downmix_into(&mut mono, interleaved.samples(), channels);
            }
            Ok(_) => {}
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::warn!(error = %reason, "Skipping corrupt audio frame");
            }
            Err(e) => {
                return Err(TranscriptionError::DecodingFailed(format!("decode: {}", e)));
            }
        }
    }

    if mono.is_empty() {
        return Err(TranscriptionError::DecodingFailed(
            "no audio samples decoded".to_string(),
        ));
    }

    let samples = if source_rate == TARGET_SAMPLE_RATE {
        mono
    } else {
        MonoResampler::new(source_rate, TARGET_SAMPLE_RATE)?.run(&mono)?
    };

    let audio = DecodedAudio { samples };
    tracing::debug!(
        samples = audio.samples.len(),
        source_rate,
        channels,
        duration_secs = audio.duration_secs(),
        "Audio decoded to 16kHz mono PCM"
    );

    Ok(audio)
}

/// Next packet of `track_id`, or `None` once the stream is exhausted.
fn next_track_packet(
    reader: &mut dyn FormatReader,
    track_id: u32,
) -> Result<Option<Packet>, TranscriptionError> {
    loop {
        match reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => {}
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(TranscriptionError::DecodingFailed(format!("packet: {}", e))),
        }
    }
}

/// Averages interleaved frames into `out`.
pub fn downmix_into(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
}

const RESAMPLER_CHUNK: usize = 1024;

/// Single channel sinc resampler that compensates for the filter delay.
struct MonoResampler {
    inner: SincFixedIn<f32>,
    ratio: f64,
}

impl MonoResampler {
    fn new(from_rate: u32, to_rate: u32) -> Result<Self, TranscriptionError> {
        let ratio = f64::from(to_rate) / f64::from(from_rate);
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLER_CHUNK, 1)
            .map_err(|e| TranscriptionError::DecodingFailed(format!("resampler init: {}", e)))?;
        Ok(Self { inner, ratio })
    }

    /// Output is exactly `input.len() * ratio` samples long.
    fn run(mut self, input: &[f32]) -> Result<Vec<f32>, TranscriptionError> {
        let expected = (input.len() as f64 * self.ratio) as usize;
        let delay = self.inner.output_delay();
        let mut output = Vec::with_capacity(expected + delay + RESAMPLER_CHUNK);

        let mut chunks = input.chunks_exact(RESAMPLER_CHUNK);
        for chunk in chunks.by_ref() {
            let wave: &[&[f32]] = &[chunk];
            let frames = self.inner.process(wave, None).map_err(resample_error)?;
            output.extend(frames.into_iter().flatten());
        }
        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let wave: &[&[f32]] = &[remainder];
            let frames = self
                .inner
                .process_partial(Some(wave), None)
                .map_err(resample_error)?;
            output.extend(frames.into_iter().flatten());
        }
        // Push the delayed tail out of the filter.
        while output.len() < expected + delay {
            let frames = self
                .inner
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(resample_error)?;
            output.extend(frames.into_iter().flatten());
        }

        output.drain(..delay);
        output.truncate(expected);
        Ok(output)
    }
}

fn resample_error(e: rubato::ResampleError) -> TranscriptionError {
    TranscriptionError::DecodingFailed(format!("resample: {}", e))
}
