//! Error types for the session tracker.
//!
//! Almost nothing here can fail: malformed MODE input recovers to a
//! permissive default and roster/server races are silently ignored.
//! The errors below mark contract violations between the protocol
//! decoder and the tracker, which must not be swallowed.

use thiserror::Error;

/// Convenience type alias for Results using [`TrackError`].
pub type Result<T, E = TrackError> = std::result::Result<T, E>;

/// Contract violations surfaced to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrackError {
    /// A rename was requested for a nickname the session has never
    /// seen. The decoder only emits NICK for users it has already
    /// introduced, so this means the tracker and decoder are out of
    /// sync.
    #[error("unknown nickname: {0}")]
    UnknownNick(String),
}
