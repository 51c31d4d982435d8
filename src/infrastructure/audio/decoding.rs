//! Model-independent pieces of Whisper decoding.
//!
//! Everything here works on plain token ids and logit vectors, so the candle
//! engine only has to supply a "next token logits" function.

use crate::domain::Segment;

/// Seconds represented by one timestamp token step.
pub const TIME_PRECISION: f64 = 0.02;

/// Largest timestamp the first generated token may carry, in seconds.
pub const MAX_INITIAL_TIMESTAMP: f64 = 1.0;

/// Token ids that steer decoding. Ids at or above `timestamp_begin` are
/// timestamps, ids below `eot` are text.
#[derive(Debug, Clone)]
pub struct TokenFilter {
    pub eot: u32,
    pub timestamp_begin: u32,
    pub suppressed: Vec<u32>,
}

impl TokenFilter {
    pub fn is_timestamp(&self, token: u32) -> bool {
        token >= self.timestamp_begin
    }

    pub fn is_text(&self, token: u32) -> bool {
        token < self.eot
    }

    /// Masks `logits` so the next token keeps the timestamp grammar:
    /// the output opens with a timestamp, timestamps come in pairs around
    /// text, and they never go backwards.
    pub fn apply(&self, logits: &mut [f32], generated: &[u32]) {
        let len = logits.len();
        let tb = (self.timestamp_begin as usize).min(len);
        let eot = (self.eot as usize).min(len);

        for &id in &self.suppressed {
            if let Some(logit) = logits.get_mut(id as usize) {
                *logit = f32::NEG_INFINITY;
            }
        }

        let Some(&last) = generated.last() else {
            mask(&mut logits[..tb]);
            let max_initial = (MAX_INITIAL_TIMESTAMP / TIME_PRECISION).round() as usize;
            let cap = (tb + max_initial + 1).min(len);
            mask(&mut logits[cap..]);
            return;
        };

        let last_was_timestamp = self.is_timestamp(last);
        let penultimate_was_timestamp =
            generated.len() < 2 || self.is_timestamp(generated[generated.len() - 2]);

        if last_was_timestamp {
            if penultimate_was_timestamp {
                mask(&mut logits[tb..]);
            } else {
                mask(&mut logits[..eot]);
            }
        }

        if let Some(&last_timestamp) = generated.iter().rev().find(|&&t| self.is_timestamp(t)) {
            // A closing timestamp may be reused to open the next segment,
            // any other timestamp must move forward.
            let floor = if last_was_timestamp && !penultimate_was_timestamp {
                last_timestamp
            } else {
                last_timestamp + 1
            };
            mask(&mut logits[tb..(floor as usize).min(len)]);
        }
    }
}

fn mask(logits: &mut [f32]) {
    logits.iter_mut().for_each(|l| *l = f32::NEG_INFINITY);
}

pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|l| l.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum: f32 = logits
        .iter()
        .filter(|l| l.is_finite())
        .map(|l| (l - max).exp())
        .sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|l| l - log_sum).collect()
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    log_softmax(logits).into_iter().map(f32::exp).collect()
}

/// The `k` highest finite entries as `(index, value)`, best first.
pub fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut scored: Vec<(u32, f32)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (i as u32, *v))
        .collect();

    if k == 0 {
        return Vec::new();
    }
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    log_prob: f32,
}

impl Hypothesis {
    fn score(&self, prompt_len: usize) -> f32 {
        let generated = self.tokens.len().saturating_sub(prompt_len).max(1);
        self.log_prob / generated as f32
    }
}

/// Beam search over a next-token function. A width of 1 is greedy decoding.
#[derive(Debug, Clone, Copy)]
pub struct BeamSearch {
    beam_width: usize,
    max_tokens: usize,
}

impl BeamSearch {
    pub fn new(beam_width: usize, max_tokens: usize) -> Self {
        Self {
            beam_width: beam_width.max(1),
            max_tokens,
        }
    }

    pub fn beam_width(&self) -> usize {
        self.beam_width
    }

    /// Decodes after `prompt` and returns the generated tokens of the best
    /// hypothesis, without the end-of-text token.
    ///
    /// `next_logits` receives the full token sequence of one hypothesis and
    /// returns unnormalised logits for the following position.
    pub fn run<F, E>(&self, prompt: &[u32], filter: &TokenFilter, mut next_logits: F) -> Result<Vec<u32>, E>
    where
        F: FnMut(&[u32]) -> Result<Vec<f32>, E>,
    {
        let prompt_len = prompt.len();
        let mut live = vec![Hypothesis {
            tokens: prompt.to_vec(),
            log_prob: 0.0,
        }];
        let mut finished: Vec<Hypothesis> = Vec::new();

        for _ in 0..self.max_tokens {
            let mut candidates: Vec<(usize, u32, f32)> = Vec::new();

            for (index, hypothesis) in live.iter().enumerate() {
                let mut logits = next_logits(&hypothesis.tokens)?;
                filter.apply(&mut logits, &hypothesis.tokens[prompt_len..]);
                let log_probs = log_softmax(&logits);
                for (token, log_prob) in top_k(&log_probs, self.beam_width) {
                    candidates.push((index, token, hypothesis.log_prob + log_prob));
                }
            }

            candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

            let mut next = Vec::with_capacity(self.beam_width);
            for (index, token, log_prob) in candidates {
                let mut tokens = live[index].tokens.clone();
                tokens.push(token);
                let hypothesis = Hypothesis { tokens, log_prob };
                if token == filter.eot {
                    finished.push(hypothesis);
                } else {
                    next.push(hypothesis);
                }
                if next.len() == self.beam_width {
                    break;
                }
            }

            live = next;
            if live.is_empty() || finished.len() >= self.beam_width {
                break;
            }
        }

        let best = finished
            .into_iter()
            .chain(live)
            .max_by(|a, b| a.score(prompt_len).total_cmp(&b.score(prompt_len)));

        Ok(best
            .map(|h| {
                h.tokens[prompt_len..]
                    .iter()
                    .copied()
                    .take_while(|&t| t != filter.eot)
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Splits a timestamped token sequence into segments.
///
/// `offset` is the start of the 30 second window in the whole file and
/// `window_secs` its real length; times are clamped to the window. Text that
/// is never closed by a timestamp runs to the end of the window.
pub fn segments_from_tokens<D, E>(
    generated: &[u32],
    filter: &TokenFilter,
    offset: f64,
    window_secs: f64,
    mut decode: D,
) -> Result<Vec<Segment>, E>
where
    D: FnMut(&[u32]) -> Result<String, E>,
{
    let window_end = offset + window_secs.max(0.0);
    let mut segments = Vec::new();
    let mut start: Option<f64> = None;
    let mut text_tokens: Vec<u32> = Vec::new();

    let mut emit = |start: f64, end: f64, tokens: &mut Vec<u32>, segments: &mut Vec<Segment>| -> Result<(), E> {
        if tokens.is_empty() {
            return Ok(());
        }
        let text = decode(tokens)?;
        tokens.clear();
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let start = start.clamp(offset, window_end);
        let end = end.clamp(start, window_end);
        segments.push(Segment::new(text, start, end));
        Ok(())
    };

    for &token in generated {
        if token == filter.eot {
            break;
        }
        if filter.is_timestamp(token) {
            let time = offset + f64::from(token - filter.timestamp_begin) * TIME_PRECISION;
            match start.take() {
                None => start = Some(time),
                Some(opened) => emit(opened, time, &mut text_tokens, &mut segments)?,
            }
        } else if filter.is_text(token) {
            if start.is_none() {
                start = Some(segments.last().map_or(offset, |s: &Segment| s.end));
            }
            text_tokens.push(token);
        }
    }

    if let Some(opened) = start {
        emit(opened, window_end, &mut text_tokens, &mut segments)?;
    }

    Ok(segments)
}

/// Slaney-style mel filterbank, row-major `n_mels x (n_fft / 2 + 1)`.
pub fn mel_filters(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let sr = f64::from(sample_rate);

    let fft_freqs: Vec<f64> = (0..n_freqs).map(|i| i as f64 * sr / n_fft as f64).collect();

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sr / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = vec![0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (lower, center, upper) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let norm = 2.0 / (upper - lower);
        for (f, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - lower) / (center - lower);
            let falling = (upper - freq) / (upper - center);
            let weight = rising.min(falling).max(0.0);
            filters[m * n_freqs + f] = (weight * norm) as f32;
        }
    }
    filters
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    let min_log_mel = MEL_MIN_LOG_HZ / MEL_F_SP;
    if hz >= MEL_MIN_LOG_HZ {
        min_log_mel + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let min_log_mel = MEL_MIN_LOG_HZ / MEL_F_SP;
    if mel >= min_log_mel {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - min_log_mel)).exp()
    } else {
        mel * MEL_F_SP
    }
}
