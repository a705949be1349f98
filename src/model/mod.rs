//! Model module - domain types, payload decoding and caching
//!
//! This module contains the data half of the synchronization core:
//!
//! - `types`: strict domain models mirrored from the server
//! - `decode`: defensive decoding of untyped server payloads
//! - `cache`: time-bounded cache for library query results

mod cache;
pub mod decode;
mod types;

pub use cache::TimedCache;

pub use types::{
    LibraryCategory, LibraryEntry, PlaybackSnapshot, PlaybackState, Player, QueueItem,
    QueueSnapshot, RepeatMode, SortKey, Track, format_duration, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
    UNKNOWN_TITLE,
};
