// ember-core/src/llm.rs
//
// The capability facade: tokenize / evaluate / sample / detokenize plus
// accessors, composed from the context, the token history, and the
// sampling pipeline. This is the only surface generation loops depend on,
// and it is polymorphic over any ModelRuntime.

use std::path::Path;

use ember_abi::{DecodingParams, Result, Token};

use crate::context::ModelContext;
use crate::history::TokenHistory;
use crate::runtime::ModelRuntime;
use crate::sampler;

/// One logical generation session over one loaded model.
#[derive(Debug)]
pub struct Llm<R: ModelRuntime> {
    context: ModelContext<R>,
    history: TokenHistory,
}

impl<R: ModelRuntime> Llm<R> {
    pub fn load(path: &Path, context_length: i32, gpu_layers: i32) -> Result<Self> {
        Ok(Self {
            context: ModelContext::load(path, context_length, gpu_layers)?,
            history: TokenHistory::new(),
        })
    }

    /// Tokenize `text` with a beginning-of-sequence marker prepended.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        self.context.runtime().tokenize(text, true)
    }

    /// Text form of one token. Ids at or beyond the vocabulary size yield
    /// the empty-string sentinel; that is defined boundary behavior, not
    /// an error.
    pub fn detokenize(&self, token: Token) -> &str {
        if !token.in_vocab(self.vocab_size()) {
            return "";
        }
        self.context.runtime().token_to_str(token).unwrap_or("")
    }

    #[inline]
    pub fn eos_token(&self) -> Token {
        self.context.runtime().eos_token()
    }

    #[inline]
    pub fn is_eos_token(&self, token: Token) -> bool {
        token == self.eos_token()
    }

    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.context.runtime().vocab_size()
    }

    #[inline]
    pub fn context_length(&self) -> usize {
        self.context.context_length()
    }

    #[inline]
    pub fn logits(&self) -> &[f32] {
        self.context.logits()
    }

    #[inline]
    pub fn logits_mut(&mut self) -> &mut [f32] {
        self.context.logits_mut()
    }

    #[inline]
    pub fn embeddings(&self) -> &[f32] {
        self.context.embeddings()
    }

    #[inline]
    pub fn n_past(&self) -> i32 {
        self.context.n_past()
    }

    /// Feed tokens through the model at `n_past`. Does not touch the
    /// history; recording happens through [`accept`](Llm::accept) once the
    /// caller has decided to keep a token.
    pub fn evaluate(&mut self, tokens: &[Token], threads: i32, n_past: i32) -> Result<()> {
        self.context.evaluate(tokens, threads, n_past)
    }

    /// Run the sampling pipeline over the current logits and the recorded
    /// history. Requires at least one successful eval beforehand.
    pub fn sample(&self, params: &DecodingParams) -> Result<Token> {
        sampler::sample(
            self.context.logits(),
            params,
            &self.history,
            self.context.context_length(),
        )
    }

    /// Record a token into the session history (evaluated prompt tokens
    /// and kept samples alike).
    #[inline]
    pub fn accept(&mut self, token: Token) {
        self.history.push(token);
    }

    pub fn accept_all(&mut self, tokens: &[Token]) {
        self.history.extend_from_slice(tokens);
    }

    #[inline]
    pub fn history(&self) -> &TokenHistory {
        &self.history
    }

    /// Start a new session on the same loaded model: clears the history
    /// and the position counter. Logits keep their last values until the
    /// next eval overwrites them.
    pub fn reset(&mut self) {
        self.history.clear();
        self.context.reset_position();
    }
}
