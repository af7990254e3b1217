//! Ember core: session orchestration and sampling around a model runtime.
//!
//! The runtime itself (weights, forward passes, raw logits) lives behind the
//! [`ModelRuntime`] trait; everything above it (candidate filtering, the
//! stochastic draw, token history, context accounting) is implemented here.

pub mod context;
pub mod generator;
pub mod history;
pub mod llm;
pub mod runtime;
pub mod sampler;

pub use context::ModelContext;
pub use generator::Generator;
pub use history::TokenHistory;
pub use llm::Llm;
pub use runtime::{gqa_filename_override, ModelRuntime, RuntimeOptions, GQA_70B_GROUPS};

pub use ember_abi::{DecodingParams, Error, Result, Token};
