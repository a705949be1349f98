//! Sync module - the stateful half of the core
//!
//! One container per domain owns that domain's current-truth state and is
//! the only writer to it. It is organized into submodules by responsibility:
//!
//! - `playback`: the selected player's transport state
//! - `queue`: the selected queue's contents
//! - `library`: browsable listings with pagination, sorting and caching
//! - `optimistic`: pending-mutation ledger shared by the containers
//! - `debounce`: coalescing of rapid intents into single commands
//! - `pagination`: per-category cursor state machine

mod debounce;
mod library;
mod optimistic;
mod pagination;
mod playback;
mod queue;

pub use debounce::Debouncer;
pub use library::{LibraryContainer, LibrarySnapshot};
pub use pagination::{PageCursor, PageState};
pub use playback::PlaybackContainer;
pub use queue::QueueContainer;
