//! State synchronization core for a remote music-server client
//!
//! Mirrors and controls the mutable state of a music-playback server over a
//! push/pull API: server payloads decode defensively into strict domain
//! models, user commands apply optimistically with rollback on rejection,
//! rapid intents (volume drags, seek scrubs) coalesce into single network
//! commands, and library listings are paginated, sortable and cached with a
//! TTL.
//!
//! The rendering layer and the wire transport live outside this crate; the
//! transport is injected as an [`Arc<dyn Transport>`](transport::Transport)
//! and the UI consumes read-only snapshots through `watch` channels.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod sync;
pub mod transport;

pub use config::SyncConfig;
pub use error::SyncError;
pub use model::{
    LibraryCategory, LibraryEntry, PlaybackSnapshot, PlaybackState, Player, QueueItem,
    QueueSnapshot, RepeatMode, SortKey, Track, format_duration,
};
pub use sync::{LibraryContainer, LibrarySnapshot, PageState, PlaybackContainer, QueueContainer};
pub use transport::{EventDomain, ServerEvent, Transport, TransportError};
