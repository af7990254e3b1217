use std::path::Path;

use tracing::debug;

use ember_abi::{Error, Result, Token};
use ember_core::{ModelRuntime, RuntimeOptions};

const DEFAULT_CONTEXT_LENGTH: usize = 2048;
const VOCAB_SIZE: usize = 256;
const EMBEDDING_DIM: usize = 16;

const UNK_TOKEN: Token = Token(0);
const BOS_TOKEN: Token = Token(1);
const EOS_TOKEN: Token = Token(2);

// First id the whitespace tokenizer hashes words into (everything below
// is a special token).
const FIRST_WORD_ID: usize = 3;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic stand-in for a real tensor backend. Logits are a pure
/// function of the evaluated token/position sequence, so any fixed prompt
/// and seed reproduces the same generation end to end.
#[derive(Debug)]
pub struct ReferenceRuntime {
    vocab: Vec<String>,
    logits: Vec<f32>,
    embeddings: Vec<f32>,
    context_length: usize,
    embeddings_enabled: bool,
    options: RuntimeOptions,
    /// Rolling digest of every (position, token) pair evaluated so far.
    state: u64,
}

impl ReferenceRuntime {
    /// The options this runtime was loaded with, mainly so tests can
    /// assert model-family overrides were applied.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    fn refresh_logits(&mut self) {
        self.logits.clear();
        for id in 0..VOCAB_SIZE {
            let r = mix(self.state ^ (id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
            // Map the top bits into [-2, 2).
            let unit = (r >> 40) as f32 / (1u64 << 24) as f32;
            self.logits.push(unit * 4.0 - 2.0);
        }
        if self.embeddings_enabled {
            self.embeddings.clear();
            for i in 0..EMBEDDING_DIM {
                let r = mix(self.state.rotate_left(i as u32 + 1));
                self.embeddings.push((r >> 40) as f32 / (1u64 << 24) as f32);
            }
        }
    }
}

impl ModelRuntime for ReferenceRuntime {
    fn load(path: &Path, opts: &RuntimeOptions) -> Result<Self> {
        // A checkpoint must at least exist; everything else about it is
        // simulated.
        std::fs::metadata(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

        let context_length = if opts.context_length > 0 {
            opts.context_length as usize
        } else {
            DEFAULT_CONTEXT_LENGTH
        };

        let mut vocab = Vec::with_capacity(VOCAB_SIZE);
        vocab.push("<unk>".to_string());
        vocab.push("<s>".to_string());
        vocab.push("</s>".to_string());
        for id in FIRST_WORD_ID..VOCAB_SIZE {
            vocab.push(format!(" w{id}"));
        }

        debug!(
            path = %path.display(),
            context_length,
            gqa = ?opts.gqa_groups,
            "reference runtime loaded"
        );

        Ok(Self {
            vocab,
            logits: Vec::new(),
            embeddings: Vec::new(),
            context_length,
            embeddings_enabled: opts.embeddings,
            options: opts.clone(),
            state: FNV_OFFSET,
        })
    }

    fn evaluate(&mut self, tokens: &[Token], n_past: i32, _threads: i32) -> Result<()> {
        let end = n_past as usize + tokens.len();
        if end > self.context_length {
            // Fail before touching any state so the previous step's
            // outputs stay readable.
            return Err(Error::Eval(format!(
                "evaluation would reach position {end} past the context window ({})",
                self.context_length
            )));
        }

        let mut state = self.state;
        for (i, token) in tokens.iter().enumerate() {
            let pos = n_past as u64 + i as u64;
            state = fnv_step(state, pos);
            state = fnv_step(state, token.0 as u64);
        }
        self.state = state;
        self.refresh_logits();
        Ok(())
    }

    fn logits(&self) -> &[f32] {
        &self.logits
    }

    fn embeddings(&self) -> &[f32] {
        &self.embeddings
    }

    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        if add_bos {
            out.push(BOS_TOKEN);
        }
        for word in text.split_whitespace() {
            let h = word
                .bytes()
                .fold(FNV_OFFSET, |acc, b| fnv_step(acc, b as u64));
            let id = FIRST_WORD_ID + (h % (VOCAB_SIZE - FIRST_WORD_ID) as u64) as usize;
            out.push(Token(id as i32));
        }
        Ok(out)
    }

    fn token_to_str(&self, token: Token) -> Option<&str> {
        if token.0 < 0 {
            return None;
        }
        self.vocab.get(token.0 as usize).map(|s| s.as_str())
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn eos_token(&self) -> Token {
        EOS_TOKEN
    }

    fn context_length(&self) -> usize {
        self.context_length
    }
}

fn fnv_step(hash: u64, value: u64) -> u64 {
    let mut h = hash;
    for shift in [0u32, 8, 16, 24, 32, 40, 48, 56] {
        h ^= (value >> shift) & 0xff;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

// 64-bit finalizer (murmur3 style) to spread the rolling state over ids.
fn mix(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_tokens_are_distinct() {
        assert_ne!(UNK_TOKEN, BOS_TOKEN);
        assert_ne!(BOS_TOKEN, EOS_TOKEN);
    }

    #[test]
    fn tokenizer_is_deterministic_and_in_range() {
        // No loaded file needed for pure tokenizer state.
        let rt = loaded();
        let a = rt.tokenize("the quick brown fox", true).unwrap();
        let b = rt.tokenize("the quick brown fox", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], BOS_TOKEN);
        for t in &a {
            assert!(t.in_vocab(rt.vocab_size()));
        }
    }

    #[test]
    fn same_prefix_same_logits() {
        let mut a = loaded();
        let mut b = loaded();
        let toks = [Token(5), Token(9), Token(41)];
        a.evaluate(&toks, 0, 1).unwrap();
        b.evaluate(&toks, 0, 1).unwrap();
        assert_eq!(a.logits(), b.logits());
        assert_eq!(a.logits().len(), a.vocab_size());
    }

    #[test]
    fn different_positions_change_logits() {
        let mut a = loaded();
        let mut b = loaded();
        a.evaluate(&[Token(5)], 0, 1).unwrap();
        b.evaluate(&[Token(5)], 1, 1).unwrap();
        assert_ne!(a.logits(), b.logits());
    }

    fn loaded() -> ReferenceRuntime {
        let path = std::env::temp_dir().join(format!(
            "ember-reference-unit-{}.bin",
            std::process::id()
        ));
        std::fs::write(&path, b"ref").unwrap();
        ReferenceRuntime::load(
            &path,
            &RuntimeOptions {
                context_length: 64,
                gpu_layers: 0,
                embeddings: false,
                gqa_groups: None,
            },
        )
        .unwrap()
    }
}
