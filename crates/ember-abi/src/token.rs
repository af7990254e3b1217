/// Wrapper for a model token (ID). Using a newtype avoids accidental
/// mixing with unrelated `i32`s and keeps conversions explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Token(pub i32);

// i32 matches the common C backends' token type. Backends using u32
// convert at the glue layer and keep this type consistent in core.

impl Token {
    /// True when the id indexes a real vocabulary entry.
    #[inline]
    pub fn in_vocab(self, vocab_size: usize) -> bool {
        self.0 >= 0 && (self.0 as usize) < vocab_size
    }
}

impl From<i32> for Token {
    #[inline]
    fn from(value: i32) -> Self {
        Token(value)
    }
}

impl From<Token> for i32 {
    #[inline]
    fn from(token: Token) -> i32 {
        token.0
    }
}
