//! Tunables for the synchronization core

use std::time::Duration;

/// Configuration shared by the domain containers.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// How long a cached library page stays valid.
    pub cache_ttl: Duration,
    /// Quiet period before a coalesced volume/seek command is sent.
    pub debounce: Duration,
    /// Number of entries requested per library page.
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            debounce: Duration::from_millis(300),
            page_size: 50,
        }
    }
}
