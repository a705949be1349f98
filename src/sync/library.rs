//! Library browsing: pagination, sorting, filtering, search and caching
//!
//! Each category keeps its own cursor and accumulated entries; the snapshot
//! exposes whichever category is active. Page fetches consult the
//! time-bounded cache first, and library-changed events from the server
//! invalidate the affected category's cached pages.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{Mutex, watch};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::model::decode;
use crate::model::{LibraryCategory, LibraryEntry, SortKey, TimedCache};
use crate::transport::{EventDomain, Transport};

use super::pagination::{PageCursor, PageState};

/// Read-only snapshot of the library domain: the active category's listing.
#[derive(Clone, Debug, Default)]
pub struct LibrarySnapshot {
    pub category: Option<LibraryCategory>,
    pub entries: Vec<LibraryEntry>,
    pub state: PageState,
    pub sort: SortKey,
    pub filter: Option<String>,
    pub has_more: bool,
}

struct CategoryState {
    cursor: PageCursor,
    entries: Vec<LibraryEntry>,
    /// Bumped whenever this category's accumulated results are discarded;
    /// completions from before the bump are stale and dropped. Per category,
    /// so a fetch for one listing never invalidates another's.
    epoch: u64,
}

struct Inner {
    categories: HashMap<LibraryCategory, CategoryState>,
    active: Option<LibraryCategory>,
}

impl Inner {
    fn category_mut(&mut self, category: LibraryCategory, page_size: usize) -> &mut CategoryState {
        self.categories
            .entry(category)
            .or_insert_with(|| CategoryState {
                cursor: PageCursor::new(page_size),
                entries: Vec::new(),
                epoch: 0,
            })
    }

    fn snapshot(&self) -> LibrarySnapshot {
        match self.active.and_then(|c| self.categories.get(&c).map(|s| (c, s))) {
            Some((category, state)) => LibrarySnapshot {
                category: Some(category),
                entries: state.entries.clone(),
                state: state.cursor.state,
                sort: state.cursor.sort,
                filter: state.cursor.filter.clone(),
                has_more: state.cursor.has_more,
            },
            None => LibrarySnapshot::default(),
        }
    }
}

/// Owner of the library domain's observable state.
#[derive(Clone)]
pub struct LibraryContainer {
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<Inner>>,
    cache: Arc<TimedCache<Vec<LibraryEntry>>>,
    snapshot_tx: Arc<watch::Sender<LibrarySnapshot>>,
    error_tx: Arc<watch::Sender<Option<SyncError>>>,
    page_size: usize,
    event_loop_started: Arc<Mutex<bool>>,
}

impl LibraryContainer {
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(LibrarySnapshot::default());
        let (error_tx, _) = watch::channel(None);
        Self {
            transport,
            inner: Arc::new(Mutex::new(Inner {
                categories: HashMap::new(),
                active: None,
            })),
            cache: Arc::new(TimedCache::new(config.cache_ttl)),
            snapshot_tx: Arc::new(snapshot_tx),
            error_tx: Arc::new(error_tx),
            page_size: config.page_size,
            event_loop_started: Arc::new(Mutex::new(false)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn last_error(&self) -> watch::Receiver<Option<SyncError>> {
        self.error_tx.subscribe()
    }

    pub fn clear_error(&self) {
        self.error_tx.send_replace(None);
    }

    /// The server exposes listings for all categories except genres, which
    /// it only surfaces through search.
    fn browse_command(category: LibraryCategory) -> Result<&'static str, SyncError> {
        match category {
            LibraryCategory::Artists => Ok("library/artists"),
            LibraryCategory::Albums => Ok("library/albums"),
            LibraryCategory::Playlists => Ok("library/playlists"),
            LibraryCategory::Radios => Ok("library/radios"),
            LibraryCategory::Genres => Err(SyncError::UnsupportedCategory(category)),
        }
    }

    // ========================================================================
    // Browsing
    // ========================================================================

    /// Make `category` active and load its first page (served from cache
    /// when a fresh copy exists).
    pub async fn browse(&self, category: LibraryCategory) -> Result<(), SyncError> {
        Self::browse_command(category)?;
        self.ensure_event_loop().await;
        let epoch = {
            let mut guard = self.inner.lock().await;
            guard.active = Some(category);
            let state = guard.category_mut(category, self.page_size);
            state.cursor.begin_first_page();
            state.epoch += 1;
            let epoch = state.epoch;
            self.snapshot_tx.send_replace(guard.snapshot());
            epoch
        };
        self.fetch_page(category, epoch).await
    }

    /// Load the next page of the active listing. A no-op unless the cursor
    /// is idle with more data available.
    pub async fn load_next_page(&self, category: LibraryCategory) -> Result<(), SyncError> {
        let epoch = {
            let mut guard = self.inner.lock().await;
            let state = guard.category_mut(category, self.page_size);
            if !state.cursor.begin_next_page() {
                return Ok(());
            }
            let epoch = state.epoch;
            self.snapshot_tx.send_replace(guard.snapshot());
            epoch
        };
        self.fetch_page(category, epoch).await
    }

    /// Change the sort order: discard accumulated results, reset the offset
    /// and load the first page of the new ordering.
    pub async fn select_sort(
        &self,
        category: LibraryCategory,
        sort: SortKey,
    ) -> Result<(), SyncError> {
        Self::browse_command(category)?;
        self.ensure_event_loop().await;
        let epoch = {
            let mut guard = self.inner.lock().await;
            guard.active = Some(category);
            let state = guard.category_mut(category, self.page_size);
            state.cursor.select_sort(sort);
            state.entries.clear();
            state.cursor.begin_first_page();
            state.epoch += 1;
            let epoch = state.epoch;
            self.snapshot_tx.send_replace(guard.snapshot());
            epoch
        };
        self.fetch_page(category, epoch).await
    }

    /// Change the filter: same reset semantics as a sort change.
    pub async fn select_filter(
        &self,
        category: LibraryCategory,
        filter: Option<String>,
    ) -> Result<(), SyncError> {
        Self::browse_command(category)?;
        self.ensure_event_loop().await;
        let epoch = {
            let mut guard = self.inner.lock().await;
            guard.active = Some(category);
            let state = guard.category_mut(category, self.page_size);
            state.cursor.select_filter(filter);
            state.entries.clear();
            state.cursor.begin_first_page();
            state.epoch += 1;
            let epoch = state.epoch;
            self.snapshot_tx.send_replace(guard.snapshot());
            epoch
        };
        self.fetch_page(category, epoch).await
    }

    /// Free-text search within one category. Bypasses the page cache and
    /// does not touch the browse state.
    pub async fn search(
        &self,
        category: LibraryCategory,
        query: &str,
    ) -> Result<Vec<LibraryEntry>, SyncError> {
        let args = json!({
            "category": category.as_str(),
            "query": query,
            "limit": self.page_size,
        });
        let payload = self
            .transport
            .fetch_query("library/search", args)
            .await
            .map_err(|err| {
                let err = SyncError::from_transport("library/search", err);
                self.error_tx.send_replace(Some(err.clone()));
                err
            })?;
        decode::decode_library_page(category, &payload).map_err(|err| {
            self.error_tx.send_replace(Some(err.clone()));
            err
        })
    }

    /// Drop cached pages of `category`, forcing the next browse to hit the
    /// network. Called after mutating commands that touch the category and
    /// on library-changed events.
    pub async fn invalidate(&self, category: LibraryCategory) {
        self.cache.remove_prefix(&format!("{category}:")).await;
    }

    // ========================================================================
    // Fetch plumbing
    // ========================================================================

    async fn fetch_page(&self, category: LibraryCategory, epoch: u64) -> Result<(), SyncError> {
        let (command, key, args) = {
            let mut guard = self.inner.lock().await;
            let state = guard.category_mut(category, self.page_size);
            let cursor = &state.cursor;
            let command = Self::browse_command(category)?;
            let key = cursor.cache_key(category.as_str());
            let args = json!({
                "offset": cursor.offset,
                "limit": cursor.page_size,
                "sort": cursor.sort.as_str(),
                "filter": cursor.filter.clone(),
            });
            (command, key, args)
        };

        let (entries, from_cache) = match self.cache.get(&key).await {
            Some(entries) => {
                tracing::debug!(%key, "Library page served from cache");
                (entries, true)
            }
            None => {
                let payload = self
                    .transport
                    .fetch_query(command, args)
                    .await
                    .map_err(|err| SyncError::from_transport(command, err));
                let entries = payload.and_then(|p| decode::decode_library_page(category, &p));
                match entries {
                    Ok(entries) => (entries, false),
                    Err(err) => {
                        let mut guard = self.inner.lock().await;
                        let state = guard.category_mut(category, self.page_size);
                        if state.epoch == epoch {
                            state.cursor.fail_page();
                            self.snapshot_tx.send_replace(guard.snapshot());
                        }
                        self.error_tx.send_replace(Some(err.clone()));
                        return Err(err);
                    }
                }
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.category_mut(category, self.page_size).epoch != epoch {
            tracing::debug!(%key, "Discarding stale page fetch");
            return Ok(());
        }
        if !from_cache {
            self.cache.set(key, entries.clone()).await;
        }
        let state = guard.category_mut(category, self.page_size);
        if state.cursor.complete_page(entries.len()) {
            state.entries = entries;
        } else {
            state.entries.extend(entries);
        }
        self.snapshot_tx.send_replace(guard.snapshot());
        Ok(())
    }

    /// Start the library event loop once; later calls are no-ops.
    async fn ensure_event_loop(&self) {
        let mut started = self.event_loop_started.lock().await;
        if *started {
            return;
        }
        *started = true;
        let mut events = self.transport.subscribe(EventDomain::Library);
        let container = self.clone();
        tokio::spawn(async move {
            tracing::debug!("Library event loop started");
            while let Some(event) = events.recv().await {
                match decode::decode_changed_category(&event.payload) {
                    Some(category) => {
                        tracing::debug!(%category, "Library changed, invalidating cached pages");
                        container.invalidate(category).await;
                    }
                    None => {
                        tracing::debug!("Library changed, invalidating all cached pages");
                        container.cache.clear().await;
                    }
                }
            }
            tracing::debug!("Library event loop ended");
        });
    }
}
