//! Error types for ACL compilation and pipeline reconfiguration.
//!
//! Runtime classification and lookup never fail — see [`crate::classify`] —
//! so the only fallible paths in this crate are offline: compiling a rule
//! set into a [`crate::classify::CompiledFilter`], and reconfiguring a
//! [`crate::pipeline::Pipeline`]'s module chain.

use thiserror::Error;

/// Failure compiling a rule set into a [`crate::classify::CompiledFilter`].
///
/// Compilation is transactional: any `CompileError` means no filter is
/// published and the caller's previous filter (if any) keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// A network prefix's mask has bits set below the highest unset bit,
    /// i.e. it is not a contiguous run of ones from the MSB.
    #[error("mask {mask:#018x} is not a contiguous prefix mask")]
    NonContiguousMask { mask: u64 },

    /// A port range's lower bound exceeds its upper bound.
    #[error("port range [{from}..{to}] is empty")]
    InvalidPortRange { from: u16, to: u16 },

    /// An equivalence-class dimension grew past `u32::MAX` entries.
    ///
    /// This is the Rust analogue of the original implementation's
    /// allocation-failure path: the thing that can actually run out during
    /// compilation is the dense id space, not heap memory.
    #[error("{dimension} equivalence classes overflowed u32")]
    ClassCountOverflow { dimension: &'static str },
}

/// Failure reconfiguring a [`crate::pipeline::Pipeline`]'s module chain.
///
/// On any `ReconfigureError` the previously active chain is left in place
/// and continues to serve in-flight and new batches.
#[derive(Debug, Error)]
pub enum ReconfigureError {
    #[error("unknown module {0:?}")]
    UnknownModule(String),

    #[error("module {module:?} rejected configuration {config:?}: {source}")]
    RejectedConfig {
        module: String,
        config: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
