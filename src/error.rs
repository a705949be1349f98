//! Error taxonomy for the synchronization core
//!
//! Decode-level problems never surface here: the payload decoder degrades to
//! documented defaults instead. What remains is the small set of failures a
//! consumer can actually act on.

use crate::model::LibraryCategory;
use crate::transport::TransportError;

/// A command or query failure surfaced to the presentation layer.
///
/// Errors are advisory and dismissible; a failed command always leaves the
/// affected container rolled back to its pre-command state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The transport reported that the server is unreachable.
    #[error("server unreachable")]
    TransportUnavailable,

    /// No player or queue is selected. Resolved locally, never reaches the
    /// network.
    #[error("no active {0} selected")]
    NoActiveSelection(&'static str),

    /// The decoder exhausted all fallbacks and the top-level response shape
    /// is still unusable.
    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    /// The server does not expose browsing for this category yet.
    #[error("browsing {0} is not supported yet")]
    UnsupportedCategory(LibraryCategory),

    /// The server accepted the connection but rejected the command.
    #[error("command '{command}' rejected: {reason}")]
    CommandRejected { command: String, reason: String },
}

impl SyncError {
    pub(crate) fn from_transport(command: &str, err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => SyncError::TransportUnavailable,
            TransportError::Rejected(reason) => SyncError::CommandRejected {
                command: command.to_string(),
                reason,
            },
        }
    }
}
