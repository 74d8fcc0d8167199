//! Run configuration for mirroring operations.
//!
//! A [`MirrorConfig`] is built once at startup, validated, and then shared
//! by reference (or `Arc`) across every pipeline component. It is never
//! mutated after construction.

mod builder;
mod types;

pub use builder::MirrorConfigBuilder;
pub use types::{CanonicalAction, MirrorConfig};
