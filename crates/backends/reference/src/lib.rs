//! Reference backend: a deterministic, pure-Rust [`ModelRuntime`]
//! implementation. It simulates a tensor backend closely enough to drive
//! the full facade and generation loop in tests and development builds
//! without any native code: same evaluated prefix, same logits.
//!
//! [`ModelRuntime`]: ember_core::ModelRuntime

mod runtime;

pub use runtime::ReferenceRuntime;
