use proptest::prelude::*;

use scribehook::domain::Segment;
use scribehook::infrastructure::audio::decoding::{
    BeamSearch, TIME_PRECISION, TokenFilter, log_softmax, mel_filters, segments_from_tokens,
    softmax, top_k,
};

const VOCAB: usize = 160;
const EOT: u32 = 50;
const TS: u32 = 100;
const SPECIAL: u32 = 60;

fn filter() -> TokenFilter {
    TokenFilter {
        eot: EOT,
        timestamp_begin: TS,
        suppressed: (EOT + 1..TS).collect(),
    }
}

fn allowed(logits: &[f32]) -> Vec<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .map(|(i, _)| i as u32)
        .collect()
}

fn filtered(generated: &[u32]) -> Vec<f32> {
    let mut logits = vec![0.0f32; VOCAB];
    filter().apply(&mut logits, generated);
    logits
}

fn words(tokens: &[u32]) -> Result<String, std::convert::Infallible> {
    Ok(tokens.iter().map(|t| format!(" w{}", t)).collect())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn given_empty_sequence_when_filtering_then_only_early_timestamps_are_allowed() {
    let logits = filtered(&[]);

    let allowed = allowed(&logits);
    let max_initial = TS + (1.0 / TIME_PRECISION).round() as u32;
    assert_eq!(allowed.first(), Some(&TS));
    assert_eq!(allowed.last(), Some(&max_initial));
    assert!(allowed.iter().all(|&t| t >= TS));
}

#[test]
fn given_special_token_when_filtering_then_it_is_never_allowed() {
    let logits = filtered(&[TS, 5]);

    assert!(logits[SPECIAL as usize].is_infinite());
    assert!(logits[5].is_finite());
}

#[test]
fn given_single_opening_timestamp_when_filtering_then_text_must_follow() {
    let logits = filtered(&[TS]);

    assert!(allowed(&logits).iter().all(|&t| t < TS));
    assert!(logits[7].is_finite());
}

#[test]
fn given_text_after_timestamp_when_filtering_then_timestamps_must_move_forward() {
    let logits = filtered(&[TS + 10, 5]);

    assert!(logits[(TS + 10) as usize].is_infinite());
    assert!(logits[(TS + 11) as usize].is_finite());
    assert!(logits[6].is_finite());
    assert!(logits[EOT as usize].is_finite());
}

#[test]
fn given_closing_timestamp_when_filtering_then_only_timestamps_or_end_may_follow() {
    let logits = filtered(&[TS, 5, TS + 10]);

    let allowed = allowed(&logits);
    assert!(allowed.iter().all(|&t| t == EOT || t >= TS + 10));
    assert!(logits[(TS + 10) as usize].is_finite());
    assert!(logits[(TS + 9) as usize].is_infinite());
}

#[test]
fn given_timestamp_pair_when_filtering_then_no_timestamp_may_follow() {
    let logits = filtered(&[TS, 5, TS + 10, TS + 10]);

    assert!(allowed(&logits).iter().all(|&t| t < TS));
}

#[test]
fn given_logits_when_normalising_then_softmax_sums_to_one() {
    let probs = softmax(&[1.0, 2.0, f32::NEG_INFINITY, 0.5]);

    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert_eq!(probs[2], 0.0);
    assert!(probs[1] > probs[0]);
}

#[test]
fn given_all_masked_logits_when_normalising_then_everything_stays_masked() {
    let log_probs = log_softmax(&[f32::NEG_INFINITY; 3]);

    assert!(log_probs.iter().all(|l| l.is_infinite()));
}

#[test]
fn given_values_when_taking_top_k_then_best_finite_entries_come_first() {
    let best = top_k(&[0.1, f32::NEG_INFINITY, 0.9, 0.5, 0.7], 3);

    assert_eq!(best.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2, 4, 3]);
    assert!(top_k(&[1.0], 0).is_empty());
}

fn scripted(targets: Vec<u32>, prompt_len: usize) -> impl FnMut(&[u32]) -> Result<Vec<f32>, String> {
    move |tokens: &[u32]| {
        let step = tokens.len() - prompt_len;
        let target = targets.get(step).copied().unwrap_or(EOT);
        let mut logits = vec![0.0f32; VOCAB];
        logits[target as usize] = 10.0;
        Ok(logits)
    }
}

#[test]
fn given_scripted_model_when_beam_searching_then_best_sequence_is_returned_without_end() {
    let prompt = [1u32, 2, 3];
    let search = BeamSearch::new(3, 20);

    let tokens = search
        .run(&prompt, &filter(), scripted(vec![TS, 5, 6, TS + 10, EOT], prompt.len()))
        .unwrap();

    assert_eq!(tokens, vec![TS, 5, 6, TS + 10]);
}

#[test]
fn given_width_one_when_beam_searching_then_decoding_is_greedy() {
    let prompt = [1u32];
    let search = BeamSearch::new(1, 20);

    let tokens = search
        .run(&prompt, &filter(), scripted(vec![TS, 8, TS + 3, EOT], prompt.len()))
        .unwrap();

    assert_eq!(search.beam_width(), 1);
    assert_eq!(tokens, vec![TS, 8, TS + 3]);
}

#[test]
fn given_model_error_when_beam_searching_then_error_is_propagated() {
    let search = BeamSearch::new(2, 5);

    let result = search.run(&[1], &filter(), |_| Err::<Vec<f32>, _>("boom"));

    assert_eq!(result, Err("boom"));
}

#[test]
fn given_max_tokens_reached_when_beam_searching_then_output_is_bounded() {
    let search = BeamSearch::new(2, 4);

    let tokens = search
        .run(&[1], &filter(), scripted(vec![TS, 5, 5, 5, 5, 5, 5, 5], 1))
        .unwrap();

    assert!(tokens.len() <= 4);
}

#[test]
fn given_timestamped_tokens_when_parsing_then_segments_carry_window_offset() {
    let tokens = [TS, 5, 6, TS + 10, TS + 10, 7, TS + 25, EOT];

    let segments = segments_from_tokens(&tokens, &filter(), 30.0, 30.0, words).unwrap();

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].text, "w5 w6");
    assert!(close(segments[0].start, 30.0));
    assert!(close(segments[0].end, 30.2));
    assert_eq!(segments[1].text, "w7");
    assert!(close(segments[1].start, 30.2));
    assert!(close(segments[1].end, 30.5));
}

#[test]
fn given_unclosed_text_when_parsing_then_segment_runs_to_window_end() {
    let segments = segments_from_tokens(&[TS, 5], &filter(), 0.0, 12.5, words).unwrap();

    assert_eq!(segments, vec![Segment::new("w5", 0.0, 12.5)]);
}

#[test]
fn given_timestamp_past_window_when_parsing_then_end_is_clamped() {
    let segments = segments_from_tokens(&[TS, 5, TS + 50], &filter(), 0.0, 0.5, words).unwrap();

    assert!(close(segments[0].end, 0.5));
}

#[test]
fn given_empty_text_between_timestamps_when_parsing_then_no_segment_is_emitted() {
    let segments = segments_from_tokens(&[TS, TS + 5, EOT], &filter(), 0.0, 30.0, words).unwrap();

    assert!(segments.is_empty());
}

#[test]
fn given_whisper_dimensions_when_building_mel_filters_then_every_band_is_non_empty() {
    let n_fft = 400;
    let n_mels = 80;
    let n_freqs = n_fft / 2 + 1;

    let filters = mel_filters(16_000, n_fft, n_mels);

    assert_eq!(filters.len(), n_mels * n_freqs);
    assert!(filters.iter().all(|w| *w >= 0.0));
    for band in filters.chunks(n_freqs) {
        assert!(band.iter().any(|w| *w > 0.0));
    }
}

/// Greedy decoding over arbitrary logits, with the timestamp grammar enforced.
fn decode_greedy(steps: &[Vec<f32>]) -> Vec<u32> {
    let filter = filter();
    let mut generated = Vec::new();
    for step in steps {
        let mut logits = step.clone();
        filter.apply(&mut logits, &generated);
        let Some((token, _)) = top_k(&logits, 1).into_iter().next() else {
            break;
        };
        if token == EOT {
            break;
        }
        generated.push(token);
    }
    generated
}

proptest! {
    #[test]
    fn given_any_logits_when_decoding_then_segments_are_ordered_and_non_overlapping(
        steps in prop::collection::vec(prop::collection::vec(-5.0f32..5.0, VOCAB), 1..48),
        offset in 0.0f64..600.0,
        window in 0.5f64..30.0,
    ) {
        let tokens = decode_greedy(&steps);

        let segments = segments_from_tokens(&tokens, &filter(), offset, window, words).unwrap();

        for segment in &segments {
            prop_assert!(segment.end >= segment.start);
            prop_assert!(segment.start >= offset);
            prop_assert!(segment.end <= offset + window + 1e-9);
            prop_assert!(!segment.text.is_empty());
        }
        for pair in segments.windows(2) {
            prop_assert!(pair[0].start <= pair[1].start);
            prop_assert!(pair[0].end <= pair[1].start + 1e-9);
        }
    }

    #[test]
    fn given_any_logits_when_decoding_then_first_token_is_an_early_timestamp(
        steps in prop::collection::vec(prop::collection::vec(-5.0f32..5.0, VOCAB), 1..8),
    ) {
        let tokens = decode_greedy(&steps);

        prop_assert!(!tokens.is_empty());
        prop_assert!(tokens[0] >= TS);
        prop_assert!(f64::from(tokens[0] - TS) * TIME_PRECISION <= 1.0 + 1e-9);
    }
}
