use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Caller-supplied decoding knobs, passed per Sample call. Nothing here is
/// persisted inside the pipeline; the same struct with the same logits and
/// a non-negative seed must reproduce the same draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodingParams {
    /// Keep the k highest-logit candidates; <= 0 (or >= vocab size) keeps all.
    pub top_k: i32,
    /// Nucleus threshold in [0, 1]; 1.0 keeps all.
    pub top_p: f32,
    /// Softmax temperature; must be > 0.
    pub temperature: f32,
    /// Down-weights recently seen tokens; 1.0 disables the penalty entirely.
    pub repetition_penalty: f32,
    /// Recent-token window for the penalty; < 0 means "use the context length".
    pub last_n_tokens: i32,
    /// RNG seed; < 0 means "non-deterministic run" (wall-clock seeded).
    pub seed: i64,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.8,
            repetition_penalty: 1.1,
            last_n_tokens: 64,
            seed: -1,
        }
    }
}

impl DecodingParams {
    /// Reject degenerate values before they reach the pipeline, rather than
    /// letting them produce NaN or undefined draws downstream.
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        if !self.top_p.is_finite() || !(0.0..=1.0).contains(&self.top_p) {
            return Err(Error::InvalidParams(format!(
                "top_p must be within [0, 1], got {}",
                self.top_p
            )));
        }
        if !self.repetition_penalty.is_finite() || self.repetition_penalty <= 0.0 {
            return Err(Error::InvalidParams(format!(
                "repetition_penalty must be > 0, got {}",
                self.repetition_penalty
            )));
        }
        Ok(())
    }
}
