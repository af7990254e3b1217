// ember-core/src/runtime.rs
//
// The backend collaborator contract. One runtime = one loaded model plus
// its evaluation state; dropping the runtime releases backend resources.

use std::path::Path;

use ember_abi::{Result, Token};

/// Attention-group count applied to the 70B model family (see
/// [`gqa_filename_override`]).
pub const GQA_70B_GROUPS: i32 = 8;

/// Options resolved by [`ModelContext::load`](crate::ModelContext::load)
/// and handed to the runtime as-is.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Desired context window; <= 0 means "use the backend default".
    pub context_length: i32,
    /// Layers to place on an accelerator; 0 = CPU-only.
    pub gpu_layers: i32,
    /// Enable embedding extraction for this context.
    pub embeddings: bool,
    /// Grouped-query-attention override required by some model families.
    pub gqa_groups: Option<i32>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            context_length: 0,
            gpu_layers: 0,
            embeddings: false,
            gqa_groups: None,
        }
    }
}

/// What the core requires from a tensor backend. Any runtime exposing
/// load/eval/logits plus the vocabulary surface can be plugged into the
/// [`Llm`](crate::Llm) facade.
pub trait ModelRuntime: Sized {
    /// Load a model checkpoint. On failure no backend resources are held.
    fn load(path: &Path, opts: &RuntimeOptions) -> Result<Self>;

    /// Feed `tokens` through the model at position `n_past`. `threads` is a
    /// hint to the backend's internal parallelism, not a concurrency
    /// boundary managed here. A failure must leave the previous step's
    /// outputs readable.
    fn evaluate(&mut self, tokens: &[Token], n_past: i32, threads: i32) -> Result<()>;

    /// Logits of the most recent evaluation; length == vocab size.
    fn logits(&self) -> &[f32];

    /// Embeddings of the most recent evaluation; empty unless the runtime
    /// was loaded with `embeddings: true`.
    fn embeddings(&self) -> &[f32];

    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<Token>>;

    /// Text form of a single token, or `None` for ids the vocabulary does
    /// not cover. The facade maps `None` to the empty-string sentinel.
    fn token_to_str(&self, token: Token) -> Option<&str>;

    fn vocab_size(&self) -> usize;

    fn eos_token(&self) -> Token;

    /// Effective context window fixed at load time.
    fn context_length(&self) -> usize;
}

/// True when the checkpoint filename names a 70-billion-parameter variant.
///
/// The 70B family needs a grouped-query-attention configuration the backend
/// cannot infer from the file itself, so it is keyed off the filename: a
/// case-insensitive `70b` bounded on both sides by the string edge or a
/// non-alphanumeric delimiter (underscore counts as a delimiter). This is a
/// quirk of that one model family, not a general rule.
pub fn gqa_filename_override(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_ascii_lowercase(),
        None => return false,
    };
    let bytes = name.as_bytes();
    let needle = b"70b";

    let mut start = 0;
    while start + needle.len() <= bytes.len() {
        if &bytes[start..start + needle.len()] == needle {
            let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
            let after = start + needle.len();
            let after_ok = after == bytes.len() || !bytes[after].is_ascii_alphanumeric();
            if before_ok && after_ok {
                return true;
            }
        }
        start += 1;
    }
    false
}
