// ember-core/src/generator.rs
//
// Session loop around the Llm facade: chunked prefill, EOS-terminated
// decode, cooperative stop flag. One Generator is one logical session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, info};

use ember_abi::{DecodingParams, Result, Token};

use crate::llm::Llm;
use crate::runtime::ModelRuntime;

/// Prefill batch size. Must stay at or below the backend's batch capacity.
const PREFILL_CHUNK: usize = 64;

pub struct Generator<R: ModelRuntime> {
    llm: Llm<R>,
    params: DecodingParams,
    /// Thread hint forwarded to eval; <= 0 resolves to the CPU count.
    threads: i32,
    /// Flipped by the host to cancel mid-generation.
    stop_flag: Arc<AtomicBool>,
}

impl<R: ModelRuntime> Generator<R> {
    pub fn new(llm: Llm<R>) -> Self {
        Self {
            llm,
            params: DecodingParams::default(),
            threads: 0,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_params(&mut self, params: DecodingParams) {
        self.params = params;
    }

    pub fn set_threads(&mut self, threads: i32) {
        self.threads = threads;
    }

    /// Handle you can keep and flip to cancel decoding (`store(true)`).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    #[inline]
    fn clear_stop(&self) {
        self.stop_flag.store(false, Ordering::Relaxed);
    }

    #[inline]
    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    pub fn llm(&self) -> &Llm<R> {
        &self.llm
    }

    pub fn llm_mut(&mut self) -> &mut Llm<R> {
        &mut self.llm
    }

    /// Generate up to `max_new_tokens` of text for `prompt`.
    pub fn generate(&mut self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        self.run(prompt, max_new_tokens, |_| {})
    }

    /// Streaming variant: `on_delta` receives each decoded piece as it is
    /// emitted; the full string is also returned.
    pub fn generate_stream<F>(
        &mut self,
        prompt: &str,
        max_new_tokens: usize,
        on_delta: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        self.run(prompt, max_new_tokens, on_delta)
    }

    /// Decide how many decode steps to allow this turn: whatever the
    /// context window leaves after the prompt, minus a ~2% safety reserve,
    /// capped by the caller's budget.
    fn step_limit(&self, prompt_len: usize, max_new_tokens: usize) -> usize {
        let n_ctx = self.llm.context_length();
        let reserve = ((n_ctx as f32) * 0.02) as usize;
        let room = n_ctx.saturating_sub(prompt_len).saturating_sub(reserve);
        room.min(max_new_tokens)
    }

    /// Prefill the prompt in chunks, recording every evaluated token.
    /// Returns the advanced position counter.
    fn prefill(&mut self, prompt_tokens: &[Token]) -> Result<i32> {
        let mut n_past = self.llm.n_past();
        for (i, chunk) in prompt_tokens.chunks(PREFILL_CHUNK).enumerate() {
            if self.stopped() {
                debug!(chunk = i, "stop requested during prefill");
                break;
            }
            debug!(chunk = i, len = chunk.len(), n_past, "prefill");
            self.llm.evaluate(chunk, self.threads, n_past)?;
            self.llm.accept_all(chunk);
            n_past += chunk.len() as i32;
        }
        Ok(n_past)
    }

    fn run<F>(&mut self, prompt: &str, max_new_tokens: usize, mut on_delta: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        self.clear_stop();

        let prompt_tokens = self.llm.tokenize(prompt)?;
        let step_limit = self.step_limit(prompt_tokens.len(), max_new_tokens);
        info!(
            prompt_tokens = prompt_tokens.len(),
            step_limit, "starting generation"
        );

        let mut n_past = self.prefill(&prompt_tokens)?;

        let mut out = String::new();
        for step in 0..step_limit {
            if self.stopped() {
                debug!(step, "stop requested during decode");
                break;
            }

            let token = self.llm.sample(&self.params)?;
            if self.llm.is_eos_token(token) {
                debug!(step, "reached EOS");
                break;
            }

            self.llm.evaluate(&[token], self.threads, n_past)?;
            self.llm.accept(token);
            n_past += 1;

            let piece = self.llm.detokenize(token);
            if !piece.is_empty() {
                on_delta(piece);
            }
            out.push_str(piece);
        }

        info!(chars = out.len(), "generation complete");
        Ok(out)
    }
}
