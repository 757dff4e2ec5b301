//! Typed errors shared by the engine and its collaborators.
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`ProviderError`] | embedding / model provider | surfaced to the caller, never retried silently |
//! | [`StoreError::Absent`] | vector store | create-on-demand, or "no context" on read |
//! | [`StoreError::Unavailable`] | vector store | retrieval degrades to empty context |
//! | [`StoreError::Rejected`] | vector store | surfaced on writes, degrades on reads |

use thiserror::Error;

/// Failure talking to an embedding or model provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The provider answered with a non-2xx status.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The provider answered 2xx but the body was not what we expected.
    #[error("malformed provider response: {0}")]
    Malformed(String),
    /// The request never completed (connect error, timeout, dropped stream).
    #[error("provider request failed: {0}")]
    Transport(String),
}

/// Tagged outcome of a vector-store call that did not succeed.
///
/// `Absent` and `Unavailable` carry different policies: an absent
/// collection is created on write and treated as empty on read, while an
/// unavailable store makes retrieval degrade to "no context".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    Absent(String),
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    /// The store was reachable but refused the request (bad dimension,
    /// unknown vector name, malformed body).
    #[error("vector store rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_absent(&self) -> bool {
        matches!(self, StoreError::Absent(_))
    }
}
