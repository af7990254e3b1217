use std::collections::HashSet;

use ember_abi::Token;

/// Every token evaluated or sampled in this session, in order. Grows for
/// the life of the session; cleared only by starting a new one.
///
/// The repetition penalty only needs *membership* over a recent window, so
/// [`recent`](TokenHistory::recent) deduplicates into a set and discards
/// order and multiplicity.
#[derive(Debug, Clone, Default)]
pub struct TokenHistory {
    tokens: Vec<Token>,
}

impl TokenHistory {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    #[inline]
    pub fn extend_from_slice(&mut self, tokens: &[Token]) {
        self.tokens.extend_from_slice(tokens);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// The last `n` tokens as a set; the whole history when fewer than `n`
    /// were recorded. `n <= 0` also yields the whole history (callers
    /// substitute the context length for negative windows, and the history
    /// never exceeds it).
    pub fn recent(&self, n: i32) -> HashSet<Token> {
        let take = if n <= 0 {
            self.tokens.len()
        } else {
            (n as usize).min(self.tokens.len())
        };
        self.tokens[self.tokens.len() - take..].iter().copied().collect()
    }
}
