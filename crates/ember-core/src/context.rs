// ember-core/src/context.rs
//
// Owns the loaded runtime and the per-step evaluation state. All mutation
// of logits/embeddings/position happens here; callers serialize
// eval -> sample -> accept strictly per step.

use std::path::Path;

use tracing::debug;

use ember_abi::{Result, Token};

use crate::runtime::{gqa_filename_override, ModelRuntime, RuntimeOptions, GQA_70B_GROUPS};

/// One loaded model plus the derived state of its most recent evaluation.
/// Exactly one context per loaded runtime instance; dropping the context
/// releases the backend resources through the runtime's own Drop.
#[derive(Debug)]
pub struct ModelContext<R: ModelRuntime> {
    runtime: R,
    /// Most recent step's logits; empty until the first successful eval.
    logits: Vec<f32>,
    /// Most recent step's embeddings; stays empty unless extraction was
    /// enabled at load time.
    embeddings: Vec<f32>,
    n_past: i32,
    context_length: usize,
}

impl<R: ModelRuntime> ModelContext<R> {
    /// Load a checkpoint and bind a fresh evaluation context to it.
    ///
    /// `context_length <= 0` defers to the backend default; `gpu_layers`
    /// is forwarded as-is (0 = CPU-only). Embedding extraction is always
    /// requested so `embeddings()` is meaningful after eval. On failure no
    /// backend resources are held.
    pub fn load(path: &Path, context_length: i32, gpu_layers: i32) -> Result<Self> {
        let mut opts = RuntimeOptions {
            context_length,
            gpu_layers,
            embeddings: true,
            gqa_groups: None,
        };
        if gqa_filename_override(path) {
            debug!(path = %path.display(), "70B filename convention: applying GQA override");
            opts.gqa_groups = Some(GQA_70B_GROUPS);
        }

        let runtime = R::load(path, &opts)?;
        let context_length = runtime.context_length();
        debug!(context_length, "model loaded");

        Ok(Self {
            runtime,
            logits: Vec::new(),
            embeddings: Vec::new(),
            n_past: 0,
            context_length,
        })
    }

    /// Feed `tokens` through the runtime at position `n_past`.
    ///
    /// `threads <= 0` defaults to the machine's CPU count. On success the
    /// owned logits/embeddings buffers are overwritten with this step's
    /// outputs; on failure they keep the previous step's values.
    pub fn evaluate(&mut self, tokens: &[Token], threads: i32, n_past: i32) -> Result<()> {
        let threads = if threads <= 0 {
            num_cpus::get() as i32
        } else {
            threads
        };

        self.runtime.evaluate(tokens, n_past, threads)?;

        self.logits.clear();
        self.logits.extend_from_slice(self.runtime.logits());
        debug_assert_eq!(self.logits.len(), self.runtime.vocab_size());

        self.embeddings.clear();
        self.embeddings.extend_from_slice(self.runtime.embeddings());

        self.n_past = n_past + tokens.len() as i32;
        Ok(())
    }

    /// Current logits (read/write, e.g. for logit biasing between eval and
    /// sample). Empty before the first successful eval.
    #[inline]
    pub fn logits(&self) -> &[f32] {
        &self.logits
    }

    #[inline]
    pub fn logits_mut(&mut self) -> &mut [f32] {
        &mut self.logits
    }

    /// Read-only view of the last step's embeddings.
    #[inline]
    pub fn embeddings(&self) -> &[f32] {
        &self.embeddings
    }

    #[inline]
    pub fn n_past(&self) -> i32 {
        self.n_past
    }

    #[inline]
    pub fn context_length(&self) -> usize {
        self.context_length
    }

    pub fn reset_position(&mut self) {
        self.n_past = 0;
    }

    #[inline]
    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}
