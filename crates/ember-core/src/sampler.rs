// ember-core/src/sampler.rs
//
// Logits -> one token. Stages run in a fixed order: repetition penalty on
// raw logits, top-k, top-p, temperature, stochastic draw.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ember_abi::{DecodingParams, Error, Result, Token};

use crate::history::TokenHistory;

/// Floor for the temperature divisor. `validate()` already rejects
/// non-positive temperatures; the floor keeps a validated-but-tiny value
/// from degenerating into a division by zero.
pub const MIN_TEMPERATURE: f32 = 1e-4;

/// One vocabulary entry under consideration. Rebuilt from the raw logits
/// on every sample call; `prob` stays 0 until the nucleus filter needs it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub token: Token,
    pub logit: f32,
    pub prob: f32,
}

/// Draw one token from `logits` under `params`, seeding the RNG from
/// `params.seed` (negative = wall-clock, i.e. a deliberately
/// non-reproducible run).
pub fn sample(
    logits: &[f32],
    params: &DecodingParams,
    history: &TokenHistory,
    context_length: usize,
) -> Result<Token> {
    let mut rng = StdRng::seed_from_u64(resolve_seed(params.seed));
    sample_with_rng(logits, params, history, context_length, &mut rng)
}

/// Same pipeline with an injected RNG, so tests can supply a fixed
/// generator.
pub fn sample_with_rng<R: Rng>(
    logits: &[f32],
    params: &DecodingParams,
    history: &TokenHistory,
    context_length: usize,
    rng: &mut R,
) -> Result<Token> {
    params.validate()?;
    if logits.is_empty() {
        return Err(Error::NoLogits);
    }

    let last_n = if params.last_n_tokens < 0 {
        context_length as i32
    } else {
        params.last_n_tokens
    };

    let mut candidates: Vec<Candidate> = logits
        .iter()
        .enumerate()
        .map(|(id, &logit)| Candidate {
            token: Token(id as i32),
            logit,
            prob: 0.0,
        })
        .collect();

    // Identity penalty is skipped outright so the history is never consulted.
    #[allow(clippy::float_cmp)]
    if params.repetition_penalty != 1.0 {
        let recent = history.recent(last_n);
        penalize_recent(&mut candidates, &recent, params.repetition_penalty);
    }

    retain_top_k(&mut candidates, params.top_k);
    retain_top_p(&mut candidates, params.top_p);

    let temperature = params.temperature.max(MIN_TEMPERATURE);
    for c in &mut candidates {
        c.logit /= temperature;
    }

    draw(&candidates, rng)
}

fn resolve_seed(seed: i64) -> u64 {
    if seed < 0 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    } else {
        seed as u64
    }
}

/// Down-weight candidates seen in the recent window. Applied to raw
/// logits, before temperature: positive logits are divided by the penalty,
/// negative ones multiplied, matching the usual backend convention.
fn penalize_recent(candidates: &mut [Candidate], recent: &HashSet<Token>, penalty: f32) {
    for c in candidates {
        if recent.contains(&c.token) {
            if c.logit > 0.0 {
                c.logit /= penalty;
            } else {
                c.logit *= penalty;
            }
        }
    }
}

// Tie-break used by both filters: descending logit, equal logits by
// ascending token id. Keeps the filters deterministic across runs.
fn by_logit_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.logit
        .total_cmp(&a.logit)
        .then_with(|| a.token.0.cmp(&b.token.0))
}

/// Keep the k highest-logit candidates; k <= 0 or k >= len keeps all.
fn retain_top_k(candidates: &mut Vec<Candidate>, k: i32) {
    if k <= 0 || k as usize >= candidates.len() {
        return;
    }
    candidates.sort_unstable_by(by_logit_desc);
    candidates.truncate(k as usize);
}

/// Keep the smallest highest-probability prefix whose cumulative softmax
/// mass reaches `top_p`. Never drops below one candidate.
fn retain_top_p(candidates: &mut Vec<Candidate>, top_p: f32) {
    if top_p >= 1.0 || candidates.len() <= 1 {
        return;
    }

    let max_logit = candidates
        .iter()
        .map(|c| c.logit)
        .fold(f32::NEG_INFINITY, f32::max);
    let mut total = 0.0f32;
    for c in candidates.iter_mut() {
        c.prob = (c.logit - max_logit).exp();
        total += c.prob;
    }
    for c in candidates.iter_mut() {
        c.prob /= total;
    }

    candidates.sort_unstable_by(by_logit_desc);

    let mut cumulative = 0.0f32;
    let mut cutoff = candidates.len();
    for (i, c) in candidates.iter().enumerate() {
        cumulative += c.prob;
        if cumulative >= top_p {
            cutoff = i + 1;
            break;
        }
    }
    candidates.truncate(cutoff);
}

/// Normalize the surviving (temperature-scaled) logits and draw one token.
fn draw<R: Rng>(candidates: &[Candidate], rng: &mut R) -> Result<Token> {
    // The filters guarantee non-emptiness; an empty set here is a defect.
    if candidates.is_empty() {
        return Err(Error::EmptyCandidates);
    }

    let max_logit = candidates
        .iter()
        .map(|c| c.logit)
        .fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = candidates.iter().map(|c| (c.logit - max_logit).exp()).collect();
    let total: f32 = weights.iter().sum();

    let r: f32 = rng.gen::<f32>() * total;
    let mut cumulative = 0.0f32;
    for (c, w) in candidates.iter().zip(&weights) {
        cumulative += w;
        if cumulative >= r {
            return Ok(c.token);
        }
    }
    // Float dust can leave r a hair above the accumulated total.
    Ok(candidates[candidates.len() - 1].token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodingParams {
        DecodingParams {
            top_k: 0,
            top_p: 1.0,
            temperature: 1.0,
            repetition_penalty: 1.0,
            last_n_tokens: -1,
            seed: 7,
        }
    }

    fn history(ids: &[i32]) -> TokenHistory {
        let mut h = TokenHistory::new();
        for &id in ids {
            h.push(Token(id));
        }
        h
    }

    #[test]
    fn returns_id_in_vocab_range() {
        let logits: Vec<f32> = (0..17).map(|i| ((i * 31) % 7) as f32 * 0.1).collect();
        for seed in 0..20 {
            let p = DecodingParams { seed, ..params() };
            let tok = sample(&logits, &p, &TokenHistory::new(), 32).unwrap();
            assert!(tok.in_vocab(logits.len()), "seed {seed} produced {tok:?}");
        }
    }

    #[test]
    fn top_k_one_is_argmax_regardless_of_seed() {
        let logits = [0.1, -0.4, 0.9, 0.3, 0.89];
        for seed in [0, 1, 42, 9999] {
            let p = DecodingParams {
                top_k: 1,
                seed,
                ..params()
            };
            let tok = sample(&logits, &p, &TokenHistory::new(), 32).unwrap();
            assert_eq!(tok, Token(2));
        }
    }

    #[test]
    fn nucleus_of_one_is_argmax() {
        let logits = [0.0, 3.0, 1.0];
        for seed in [3, 17, 255] {
            let p = DecodingParams {
                top_p: 0.0,
                seed,
                ..params()
            };
            assert_eq!(sample(&logits, &p, &TokenHistory::new(), 32).unwrap(), Token(1));
        }
    }

    #[test]
    fn same_seed_reproduces_the_draw() {
        let logits: Vec<f32> = (0..50).map(|i| (i as f32 * 0.37).sin()).collect();
        let p = DecodingParams {
            seed: 1234,
            temperature: 1.3,
            ..params()
        };
        let h = TokenHistory::new();
        let first = sample(&logits, &p, &h, 64).unwrap();
        for _ in 0..5 {
            assert_eq!(sample(&logits, &p, &h, 64).unwrap(), first);
        }
    }

    #[test]
    fn identity_penalty_ignores_history() {
        let logits: Vec<f32> = (0..32).map(|i| (i as f32 * 0.11).cos()).collect();
        let p = DecodingParams { seed: 5, ..params() };
        let with_history = sample(&logits, &p, &history(&[1, 2, 3, 4, 5]), 64).unwrap();
        let without = sample(&logits, &p, &TokenHistory::new(), 64).unwrap();
        assert_eq!(with_history, without);
    }

    #[test]
    fn penalty_divides_positive_logits() {
        // Token 1 leads until the penalty knocks it below token 0.
        let logits = [2.0, 2.5];
        let p = DecodingParams {
            top_k: 1,
            repetition_penalty: 10.0,
            ..params()
        };
        assert_eq!(sample(&logits, &p, &history(&[1]), 64).unwrap(), Token(0));
    }

    #[test]
    fn penalty_multiplies_negative_logits() {
        let logits = [-0.5, -0.1];
        let p = DecodingParams {
            top_k: 1,
            repetition_penalty: 10.0,
            ..params()
        };
        // -0.1 * 10 = -1.0, so token 0 wins.
        assert_eq!(sample(&logits, &p, &history(&[1]), 64).unwrap(), Token(0));
    }

    #[test]
    fn window_limits_which_tokens_are_penalized() {
        let logits = [5.0, 6.0, 4.0];
        let base = DecodingParams {
            top_k: 1,
            repetition_penalty: 10.0,
            ..params()
        };
        let h = history(&[0, 1]);

        // Window of 1: only token 1 (most recent) is penalized.
        let narrow = DecodingParams {
            last_n_tokens: 1,
            ..base.clone()
        };
        assert_eq!(sample(&logits, &narrow, &h, 64).unwrap(), Token(0));

        // Window of 2: both history tokens are penalized.
        let wide = DecodingParams {
            last_n_tokens: 2,
            ..base
        };
        assert_eq!(sample(&logits, &wide, &h, 64).unwrap(), Token(2));
    }

    #[test]
    fn negative_window_falls_back_to_context_length() {
        let logits = [5.0, 6.0, 4.0];
        let p = DecodingParams {
            top_k: 1,
            repetition_penalty: 10.0,
            last_n_tokens: -1,
            ..params()
        };
        // Context length covers the whole history, so both get penalized.
        assert_eq!(sample(&logits, &p, &history(&[0, 1]), 64).unwrap(), Token(2));
    }

    #[test]
    fn equal_logits_break_ties_by_ascending_id() {
        let logits = [1.0, 1.0, 1.0, 1.0];
        let p = DecodingParams {
            top_k: 1,
            ..params()
        };
        assert_eq!(sample(&logits, &p, &TokenHistory::new(), 16).unwrap(), Token(0));
    }

    #[test]
    fn tiny_temperature_degenerates_to_argmax() {
        let logits = [0.2, 0.9, 0.5];
        let p = DecodingParams {
            temperature: 1e-30,
            seed: 77,
            ..params()
        };
        assert_eq!(sample(&logits, &p, &TokenHistory::new(), 16).unwrap(), Token(1));
    }

    #[test]
    fn empty_logits_are_rejected() {
        let err = sample(&[], &params(), &TokenHistory::new(), 16).unwrap_err();
        assert!(matches!(err, Error::NoLogits));
    }

    #[test]
    fn degenerate_params_are_rejected_before_the_pipeline() {
        let logits = [0.1, 0.2];
        let p = DecodingParams {
            temperature: 0.0,
            ..params()
        };
        assert!(matches!(
            sample(&logits, &p, &TokenHistory::new(), 16),
            Err(Error::InvalidParams(_))
        ));

        let p = DecodingParams {
            top_p: 2.0,
            ..params()
        };
        assert!(matches!(
            sample(&logits, &p, &TokenHistory::new(), 16),
            Err(Error::InvalidParams(_))
        ));
    }

    #[test]
    fn injected_rng_is_honored() {
        let logits: Vec<f32> = (0..16).map(|i| (i as f32).sqrt()).collect();
        let p = params();
        let h = TokenHistory::new();
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        let ta = sample_with_rng(&logits, &p, &h, 32, &mut a).unwrap();
        let tb = sample_with_rng(&logits, &p, &h, 32, &mut b).unwrap();
        assert_eq!(ta, tb);
    }

    #[test]
    fn nucleus_concentrates_on_dominant_token() {
        // One token holds ~all probability mass; a small nucleus must pick it.
        let mut logits = vec![0.0f32; 20];
        logits[13] = 50.0;
        for seed in 0..10 {
            let p = DecodingParams {
                top_p: 0.5,
                seed,
                ..params()
            };
            assert_eq!(sample(&logits, &p, &TokenHistory::new(), 32).unwrap(), Token(13));
        }
    }
}
