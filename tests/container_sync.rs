//! Integration tests for the domain containers against a scripted transport
//!
//! Time is paused in every test, so debounce windows and cache TTLs are
//! driven explicitly with `tokio::time::advance`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use tokio::time::{advance, sleep};

use maestro_sync::{
    EventDomain, LibraryCategory, LibraryContainer, LibraryEntry, PlaybackContainer,
    PlaybackState, Player, QueueContainer, ServerEvent, SortKey, SyncConfig, SyncError, Transport,
    TransportError,
};

#[derive(Default)]
struct MockTransport {
    commands: Mutex<Vec<(String, Value)>>,
    queries: Mutex<Vec<(String, Value)>>,
    responses: Mutex<HashMap<String, VecDeque<Value>>>,
    failing: Mutex<HashSet<String>>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
    disconnected: AtomicBool,
    subscribers: Mutex<HashMap<EventDomain, Vec<mpsc::Sender<ServerEvent>>>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail_command(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Park calls of `name` until the returned gate is notified, keeping the
    /// command in flight from the container's point of view.
    fn hold_command(&self, name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .insert(name.to_string(), gate.clone());
        gate
    }

    async fn wait_if_held(&self, name: &str) {
        let gate = self.held.lock().unwrap().get(name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    /// Queue a response for the next `fetch_query` call with this command.
    fn respond(&self, command: &str, payload: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(payload);
    }

    fn commands_named(&self, name: &str) -> Vec<Value> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    fn queries_named(&self, name: &str) -> Vec<Value> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    async fn push_event(&self, domain: EventDomain, target_id: Option<&str>, payload: Value) {
        let senders: Vec<_> = self
            .subscribers
            .lock()
            .unwrap()
            .get(&domain)
            .map(|s| s.to_vec())
            .unwrap_or_default();
        for sender in senders {
            let _ = sender
                .send(ServerEvent {
                    domain,
                    target_id: target_id.map(str::to_string),
                    payload: payload.clone(),
                })
                .await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn issue_command(&self, name: &str, args: Value) -> Result<(), TransportError> {
        self.wait_if_held(name).await;
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.failing.lock().unwrap().contains(name) {
            return Err(TransportError::Rejected("denied".to_string()));
        }
        self.commands.lock().unwrap().push((name.to_string(), args));
        Ok(())
    }

    async fn fetch_query(&self, command: &str, args: Value) -> Result<Value, TransportError> {
        self.wait_if_held(command).await;
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.queries.lock().unwrap().push((command.to_string(), args));
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| json!({})))
    }

    fn subscribe(&self, domain: EventDomain) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.subscribers
            .lock()
            .unwrap()
            .entry(domain)
            .or_default()
            .push(tx);
        rx
    }
}

fn player(id: &str) -> Player {
    Player {
        id: id.to_string(),
        name: format!("Player {id}"),
        is_active: true,
        ..Player::default()
    }
}

/// Let spawned tasks run and timers fire.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn config() -> SyncConfig {
    SyncConfig {
        page_size: 2,
        ..SyncConfig::default()
    }
}

// ============================================================================
// Playback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn volume_burst_sends_one_command_with_final_value() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();

    for volume in [10, 35, 60, 80] {
        playback.set_volume(volume).await.unwrap();
        advance(Duration::from_millis(50)).await;
    }
    // UI-visible value tracks every intent immediately.
    assert_eq!(playback.snapshot().volume, 80);
    assert!(transport.commands_named("player/volume").is_empty());

    advance(Duration::from_millis(400)).await;
    settle().await;

    let sent = transport.commands_named("player/volume");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["volume"], json!(80));
    assert_eq!(sent[0]["player_id"], json!("p1"));
}

#[tokio::test(start_paused = true)]
async fn volume_without_selection_fails_locally() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());

    let err = playback.set_volume(80).await.unwrap_err();
    assert_eq!(err, SyncError::NoActiveSelection("player"));

    advance(Duration::from_secs(1)).await;
    settle().await;
    assert!(transport.commands_named("player/volume").is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_shuffle_rolls_back_and_sets_error() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();
    transport.fail_command("player/shuffle");

    playback.set_shuffle(true).await.unwrap();
    assert!(playback.snapshot().shuffle);

    settle().await;
    assert!(!playback.snapshot().shuffle);
    assert_eq!(
        *playback.last_error().borrow(),
        Some(SyncError::CommandRejected {
            command: "player/shuffle".to_string(),
            reason: "denied".to_string(),
        })
    );

    playback.clear_error();
    assert_eq!(*playback.last_error().borrow(), None);
}

#[tokio::test(start_paused = true)]
async fn disconnected_play_rolls_back_to_stopped() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();
    transport.disconnect();

    playback.play().await.unwrap();
    assert_eq!(playback.snapshot().state, PlaybackState::Playing);

    settle().await;
    assert_eq!(playback.snapshot().state, PlaybackState::Stopped);
    assert_eq!(
        *playback.last_error().borrow(),
        Some(SyncError::TransportUnavailable)
    );
}

#[tokio::test(start_paused = true)]
async fn server_event_does_not_clobber_pending_mutation() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();

    // Pending: the debounced send has not fired yet.
    playback.set_volume(50).await.unwrap();
    transport
        .push_event(
            EventDomain::Player,
            Some("p1"),
            json!({"volume": 90, "state": "playing"}),
        )
        .await;
    settle().await;

    let snapshot = playback.snapshot();
    // The optimistic volume stands; the unrelated field merged in.
    assert_eq!(snapshot.volume, 50);
    assert_eq!(snapshot.state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn server_event_observed_mid_flight_wins_after_confirmation() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();
    let gate = transport.hold_command("player/shuffle");

    playback.set_shuffle(true).await.unwrap();
    settle().await;
    assert!(playback.snapshot().shuffle);

    transport
        .push_event(EventDomain::Player, Some("p1"), json!({"shuffle": false}))
        .await;
    settle().await;
    // While the command is in flight the optimistic value still shows.
    assert!(playback.snapshot().shuffle);

    gate.notify_one();
    settle().await;
    // The server spoke before the command resolved; its value stands.
    assert!(!playback.snapshot().shuffle);
    assert_eq!(*playback.last_error().borrow(), None);
}

#[tokio::test(start_paused = true)]
async fn events_for_other_players_are_filtered_out() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();

    transport
        .push_event(EventDomain::Player, Some("p2"), json!({"state": "playing"}))
        .await;
    settle().await;
    assert_eq!(playback.snapshot().state, PlaybackState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn reselecting_a_player_supersedes_the_old_subscription() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    playback.select_player(player("p1")).await.unwrap();
    playback.select_player(player("p2")).await.unwrap();

    transport
        .push_event(EventDomain::Player, Some("p1"), json!({"state": "playing"}))
        .await;
    settle().await;
    assert_eq!(playback.snapshot().state, PlaybackState::Stopped);

    transport
        .push_event(EventDomain::Player, Some("p2"), json!({"state": "playing"}))
        .await;
    settle().await;
    assert_eq!(playback.snapshot().state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn refresh_pulls_current_media_and_favorite() {
    let transport = MockTransport::new();
    let playback = PlaybackContainer::new(transport.clone(), config());
    transport.respond(
        "player/state",
        json!({
            "id": "p1",
            "state": "paused",
            "volume": 25,
            "favorite": true,
            "current_media": {"id": "t9", "title": "Song", "duration": 321}
        }),
    );

    playback.select_player(player("p1")).await.unwrap();
    let snapshot = playback.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Paused);
    assert_eq!(snapshot.volume, 25);
    assert!(snapshot.favorite);
    assert_eq!(snapshot.current_track.as_ref().unwrap().title, "Song");
    assert_eq!(snapshot.current_track.as_ref().unwrap().duration_secs, 321.0);
}

// ============================================================================
// Queue
// ============================================================================

fn queue_payload() -> Value {
    json!({
        "items": [
            {"queue_item_id": "q1", "position": 0, "track": {"id": "t1", "title": "A", "duration": 180}},
            {"queue_item_id": "q2", "position": 1, "track": {"id": "t2", "title": "B", "duration": 200}},
            {"queue_item_id": "q3", "position": 2, "track": {"id": "t3", "title": "C", "duration": 120}},
        ],
        "current_index": 0
    })
}

#[tokio::test(start_paused = true)]
async fn rejected_remove_restores_the_item_list() {
    let transport = MockTransport::new();
    let queue = QueueContainer::new(transport.clone());
    transport.respond("queue/items", queue_payload());
    queue.select_queue("z1".to_string()).await.unwrap();

    let before = queue.snapshot();
    assert_eq!(before.items.len(), 3);
    assert_eq!(before.total_duration_secs(), 500.0);

    transport.fail_command("queue/remove");
    queue.remove_item("q2").await.unwrap();
    assert_eq!(queue.snapshot().items.len(), 2);

    settle().await;
    let after = queue.snapshot();
    assert_eq!(after, before);
    assert!(matches!(
        *queue.last_error().borrow(),
        Some(SyncError::CommandRejected { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn queue_event_replaces_items_when_nothing_is_pending() {
    let transport = MockTransport::new();
    let queue = QueueContainer::new(transport.clone());
    transport.respond("queue/items", queue_payload());
    queue.select_queue("z1".to_string()).await.unwrap();

    transport
        .push_event(
            EventDomain::Queue,
            Some("z1"),
            json!({
                "items": [
                    {"queue_item_id": "q9", "track": {"id": "t9", "title": "New", "duration": 10}},
                ],
                "current_index": null
            }),
        )
        .await;
    settle().await;

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].queue_item_id, "q9");
    assert_eq!(snapshot.current_index, None);
}

#[tokio::test(start_paused = true)]
async fn queue_event_observed_mid_flight_wins_after_confirmation() {
    let transport = MockTransport::new();
    let queue = QueueContainer::new(transport.clone());
    transport.respond("queue/items", queue_payload());
    queue.select_queue("z1".to_string()).await.unwrap();
    let gate = transport.hold_command("queue/remove");

    queue.remove_item("q2").await.unwrap();
    settle().await;
    assert_eq!(queue.snapshot().items.len(), 2);

    transport
        .push_event(
            EventDomain::Queue,
            Some("z1"),
            json!({
                "items": [
                    {"queue_item_id": "q7", "track": {"id": "t7", "title": "Server", "duration": 30}},
                ]
            }),
        )
        .await;
    settle().await;
    assert_eq!(queue.snapshot().items.len(), 2);

    gate.notify_one();
    settle().await;
    let snapshot = queue.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].queue_item_id, "q7");
}

#[tokio::test(start_paused = true)]
async fn queue_commands_without_selection_fail_locally() {
    let transport = MockTransport::new();
    let queue = QueueContainer::new(transport.clone());
    let err = queue.clear_queue().await.unwrap_err();
    assert_eq!(err, SyncError::NoActiveSelection("queue"));
    settle().await;
    assert!(transport.commands_named("queue/clear").is_empty());
}

// ============================================================================
// Library
// ============================================================================

fn album(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "artist": "Artist", "track_count": 10})
}

#[tokio::test(start_paused = true)]
async fn pagination_appends_until_a_short_page() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    transport.respond("library/albums", json!([album("a1", "One"), album("a2", "Two")]));
    transport.respond("library/albums", json!([album("a3", "Three")]));

    library.browse(LibraryCategory::Albums).await.unwrap();
    let snapshot = library.snapshot();
    assert_eq!(snapshot.entries.len(), 2);
    assert!(snapshot.has_more);

    library.load_next_page(LibraryCategory::Albums).await.unwrap();
    let snapshot = library.snapshot();
    assert_eq!(snapshot.entries.len(), 3);
    assert!(!snapshot.has_more);

    // End of data: further requests never hit the network.
    library.load_next_page(LibraryCategory::Albums).await.unwrap();
    assert_eq!(transport.queries_named("library/albums").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sort_change_discards_results_and_restarts_at_offset_zero() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    transport.respond("library/albums", json!([album("a1", "One"), album("a2", "Two")]));
    transport.respond("library/albums", json!([album("a9", "Year One")]));

    library.browse(LibraryCategory::Albums).await.unwrap();
    library
        .select_sort(LibraryCategory::Albums, SortKey::Year)
        .await
        .unwrap();

    let snapshot = library.snapshot();
    assert_eq!(snapshot.sort, SortKey::Year);
    // No mixing: only entries of the new ordering remain.
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].id(), "a9");

    let queries = transport.queries_named("library/albums");
    assert_eq!(queries.last().unwrap()["offset"], json!(0));
    assert_eq!(queries.last().unwrap()["sort"], json!("year"));
}

#[tokio::test(start_paused = true)]
async fn cached_page_skips_the_network_until_ttl_expires() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(
        transport.clone(),
        SyncConfig {
            page_size: 2,
            cache_ttl: Duration::from_millis(100),
            ..SyncConfig::default()
        },
    );
    transport.respond("library/artists", json!([album("r1", "Artist")]));
    transport.respond("library/artists", json!([album("r1", "Artist")]));

    library.browse(LibraryCategory::Artists).await.unwrap();
    library.browse(LibraryCategory::Artists).await.unwrap();
    assert_eq!(transport.queries_named("library/artists").len(), 1);

    advance(Duration::from_millis(150)).await;
    library.browse(LibraryCategory::Artists).await.unwrap();
    assert_eq!(transport.queries_named("library/artists").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn library_changed_event_invalidates_cached_pages() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    transport.respond("library/playlists", json!([album("pl1", "Mix")]));
    transport.respond("library/playlists", json!([album("pl2", "Mix 2")]));

    library.browse(LibraryCategory::Playlists).await.unwrap();
    transport
        .push_event(EventDomain::Library, None, json!({"category": "playlists"}))
        .await;
    settle().await;

    library.browse(LibraryCategory::Playlists).await.unwrap();
    assert_eq!(transport.queries_named("library/playlists").len(), 2);
    assert_eq!(library.snapshot().entries[0].id(), "pl2");
}

#[tokio::test(start_paused = true)]
async fn concurrent_category_fetches_do_not_discard_each_other() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    transport.respond("library/albums", json!([album("a1", "One")]));
    transport.respond("library/artists", json!([album("r1", "Artist")]));
    let gate = transport.hold_command("library/albums");

    let albums_container = library.clone();
    let albums = tokio::spawn(async move {
        albums_container.browse(LibraryCategory::Albums).await
    });
    settle().await;

    // A different category's fetch runs while the albums page is in flight.
    library.browse(LibraryCategory::Artists).await.unwrap();
    assert_eq!(library.snapshot().entries[0].id(), "r1");

    gate.notify_one();
    albums.await.unwrap().unwrap();

    // The albums result landed: re-browsing serves it from cache instead of
    // refetching a wedged cursor.
    library.browse(LibraryCategory::Albums).await.unwrap();
    let snapshot = library.snapshot();
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].id(), "a1");
    assert_eq!(transport.queries_named("library/albums").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn genre_browsing_is_not_supported() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    let err = library.browse(LibraryCategory::Genres).await.unwrap_err();
    assert_eq!(err, SyncError::UnsupportedCategory(LibraryCategory::Genres));
    assert!(transport.queries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn search_returns_decoded_entries_without_caching() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    transport.respond(
        "library/search",
        json!({"items": [{"id": "ar1", "name": "Coltrane", "album_count": 12}]}),
    );

    let results = library.search(LibraryCategory::Artists, "coltrane").await.unwrap();
    assert_eq!(results.len(), 1);
    match &results[0] {
        LibraryEntry::Artist { name, album_count, .. } => {
            assert_eq!(name, "Coltrane");
            assert_eq!(*album_count, 12);
        }
        other => panic!("expected artist, got {other:?}"),
    }

    let queries = transport.queries_named("library/search");
    assert_eq!(queries[0]["query"], json!("coltrane"));
}

#[tokio::test(start_paused = true)]
async fn malformed_search_response_is_reported() {
    let transport = MockTransport::new();
    let library = LibraryContainer::new(transport.clone(), config());
    transport.respond("library/search", json!("garbage"));

    let err = library
        .search(LibraryCategory::Artists, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedResponse(_)));
    assert!(matches!(
        *library.last_error().borrow(),
        Some(SyncError::MalformedResponse(_))
    ));
}
