//! Error taxonomy for the search engine core.
//!
//! Everything the engine can fail with is one of these variants; callers at
//! the binary boundary wrap them in `anyhow` for reporting.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid or inconsistent options detected during setup. Fails the
    /// whole search before any subject is touched.
    Configuration(String),
    /// No query context has a usable Karlin-Altschul block, so no
    /// statistical threshold can be derived.
    StatisticsUnavailable { first_context: usize, last_context: usize },
    /// A single subject could not be fetched or processed. The search
    /// continues; only this subject is skipped.
    TransientSubject { oid: usize, reason: String },
    /// An allocation request (DP matrix, lookup backbone) exceeded the
    /// configured bound. Recoverable at the per-alignment level.
    ResourceExhaustion(String),
    /// An internal invariant was violated (e.g. traceback score disagrees
    /// with the preliminary score). Always a bug, never user error.
    InternalConsistency(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            EngineError::StatisticsUnavailable { first_context, last_context } => write!(
                f,
                "no valid Karlin-Altschul block in contexts {first_context}..={last_context}"
            ),
            EngineError::TransientSubject { oid, reason } => {
                write!(f, "subject {oid} skipped: {reason}")
            }
            EngineError::ResourceExhaustion(msg) => write!(f, "resource limit exceeded: {msg}"),
            EngineError::InternalConsistency(msg) => {
                write!(f, "internal consistency failure: {msg}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
