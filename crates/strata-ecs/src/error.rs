//! ECS error types.
//!
//! Only conditions a caller can reasonably recover from are errors. Misuse of
//! the storage contracts (type mismatches, slicing a full pack, structural
//! mutation while systems run) panics instead.

use thiserror::Error;

use crate::{component::ComponentKey, system::SystemToken};

/// ECS error type.
#[derive(Debug, Error)]
pub enum EcsError {
    /// The dedicated worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Two component names hash to the same key.
    #[error("component key collision: `{incoming}` hashes to {key:?}, already used by `{existing}`")]
    KeyCollision {
        /// The contested key.
        key: ComponentKey,
        /// Name of the component registered first.
        existing: &'static str,
        /// Name of the component that collided.
        incoming: &'static str,
    },

    /// The token does not name a declared system.
    #[error("unknown system: {0:?}")]
    UnknownSystem(SystemToken),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
