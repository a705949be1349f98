//! Optimistic state container for the playback domain
//!
//! Single owner of the selected player's current-truth state. Commands apply
//! locally first and roll back if the server rejects them; server events
//! merge in without clobbering fields that still have a pending local
//! mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::model::decode::{self, PlaybackDelta};
use crate::model::{PlaybackSnapshot, PlaybackState, Player, RepeatMode};
use crate::transport::{EventDomain, Transport};

use super::debounce::Debouncer;
use super::optimistic::{FieldLedger, Resolution};

/// Mutable fields of the playback snapshot that commands target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PlaybackField {
    State,
    Position,
    Volume,
    Mute,
    Shuffle,
    Repeat,
    Favorite,
}

/// A value for one playback field, used as rollback baseline.
#[derive(Clone, Debug, PartialEq)]
enum PlaybackValue {
    State(PlaybackState),
    Position(f64),
    Volume(u8),
    Mute(bool),
    Shuffle(bool),
    Repeat(RepeatMode),
    Favorite(bool),
}

struct Inner {
    snapshot: PlaybackSnapshot,
    ledger: FieldLedger<PlaybackField, PlaybackValue>,
    field_locks: HashMap<PlaybackField, Arc<Mutex<()>>>,
}

impl Inner {
    fn read_field(&self, field: PlaybackField) -> PlaybackValue {
        match field {
            PlaybackField::State => PlaybackValue::State(self.snapshot.state),
            PlaybackField::Position => PlaybackValue::Position(self.snapshot.position_secs),
            PlaybackField::Volume => PlaybackValue::Volume(self.snapshot.volume),
            PlaybackField::Mute => PlaybackValue::Mute(self.snapshot.muted),
            PlaybackField::Shuffle => PlaybackValue::Shuffle(self.snapshot.shuffle),
            PlaybackField::Repeat => PlaybackValue::Repeat(self.snapshot.repeat),
            PlaybackField::Favorite => PlaybackValue::Favorite(self.snapshot.favorite),
        }
    }

    fn write_field(&mut self, value: PlaybackValue) {
        match value {
            PlaybackValue::State(v) => self.snapshot.state = v,
            PlaybackValue::Position(v) => self.snapshot.position_secs = v,
            PlaybackValue::Volume(v) => self.snapshot.volume = v,
            PlaybackValue::Mute(v) => self.snapshot.muted = v,
            PlaybackValue::Shuffle(v) => self.snapshot.shuffle = v,
            PlaybackValue::Repeat(v) => self.snapshot.repeat = v,
            PlaybackValue::Favorite(v) => self.snapshot.favorite = v,
        }
    }

    /// Per-field lock serializing network issuance for one field.
    fn field_lock(&mut self, field: PlaybackField) -> Arc<Mutex<()>> {
        self.field_locks.entry(field).or_default().clone()
    }

    fn selected_player_id(&self) -> Option<String> {
        self.snapshot.player.as_ref().map(|p| p.id.clone())
    }
}

/// Owner of the playback domain's observable state.
#[derive(Clone)]
pub struct PlaybackContainer {
    transport: Arc<dyn Transport>,
    inner: Arc<Mutex<Inner>>,
    snapshot_tx: Arc<watch::Sender<PlaybackSnapshot>>,
    error_tx: Arc<watch::Sender<Option<SyncError>>>,
    volume_debounce: Arc<Debouncer>,
    seek_debounce: Arc<Debouncer>,
    /// Bumped on every player (re)selection; stale event loops observe the
    /// mismatch and exit.
    generation: Arc<AtomicU64>,
}

impl PlaybackContainer {
    pub fn new(transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(PlaybackSnapshot::default());
        let (error_tx, _) = watch::channel(None);
        Self {
            transport,
            inner: Arc::new(Mutex::new(Inner {
                snapshot: PlaybackSnapshot::default(),
                ledger: FieldLedger::default(),
                field_locks: HashMap::new(),
            })),
            snapshot_tx: Arc::new(snapshot_tx),
            error_tx: Arc::new(error_tx),
            volume_debounce: Arc::new(Debouncer::new(config.debounce)),
            seek_debounce: Arc::new(Debouncer::new(config.debounce)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    // ========================================================================
    // Observables
    // ========================================================================

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn last_error(&self) -> watch::Receiver<Option<SyncError>> {
        self.error_tx.subscribe()
    }

    pub fn clear_error(&self) {
        self.error_tx.send_replace(None);
    }

    // ========================================================================
    // Selection & server truth
    // ========================================================================

    /// Make `player` the container's target: replace all playback state,
    /// restart the event subscription and re-fetch the player's full state
    /// (favorite status included) from the server.
    pub async fn select_player(&self, player: Player) -> Result<(), SyncError> {
        tracing::info!(player_id = %player.id, player_name = %player.name, "Selecting player");
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let player_id = player.id.clone();
        {
            let mut guard = self.inner.lock().await;
            guard.snapshot = PlaybackSnapshot {
                player: Some(player),
                ..PlaybackSnapshot::default()
            };
            guard.ledger = FieldLedger::default();
            self.snapshot_tx.send_replace(guard.snapshot.clone());
        }
        self.spawn_event_loop(generation, player_id);
        self.refresh().await
    }

    /// Pull the selected player's full state and merge it in.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let player_id = {
            let guard = self.inner.lock().await;
            guard
                .selected_player_id()
                .ok_or(SyncError::NoActiveSelection("player"))?
        };
        match self
            .transport
            .fetch_query("player/state", json!({ "player_id": player_id }))
            .await
        {
            Ok(payload) => {
                let delta = decode::decode_playback_delta(&payload);
                let mut guard = self.inner.lock().await;
                Self::merge_delta(&mut guard, delta);
                self.snapshot_tx.send_replace(guard.snapshot.clone());
                Ok(())
            }
            Err(err) => {
                let err = SyncError::from_transport("player/state", err);
                self.error_tx.send_replace(Some(err.clone()));
                Err(err)
            }
        }
    }

    fn spawn_event_loop(&self, generation: u64, player_id: String) {
        let mut events = self.transport.subscribe(EventDomain::Player);
        let container = self.clone();
        tokio::spawn(async move {
            tracing::debug!(generation, player_id = %player_id, "Player event loop started");
            while let Some(event) = events.recv().await {
                if container.generation.load(Ordering::SeqCst) != generation {
                    tracing::debug!(generation, "Player event loop superseded");
                    break;
                }
                if event.target_id.as_deref() != Some(player_id.as_str()) {
                    continue;
                }
                let delta = decode::decode_playback_delta(&event.payload);
                let mut guard = container.inner.lock().await;
                // The subscription may have been replaced while decoding.
                if container.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                Self::merge_delta(&mut guard, delta);
                container.snapshot_tx.send_replace(guard.snapshot.clone());
            }
            tracing::debug!(generation, "Player event loop ended");
        });
    }

    /// Merge server truth into the snapshot. A field with a pending
    /// optimistic mutation keeps its local value for now, but the server
    /// value is recorded and takes over once the command confirms; fields
    /// without a pending mutation are replaced wholesale.
    fn merge_delta(inner: &mut Inner, delta: PlaybackDelta) {
        if let Some(player) = delta.player {
            let selected = inner
                .snapshot
                .player
                .as_ref()
                .is_some_and(|p| p.id == player.id);
            if selected {
                inner.snapshot.player = Some(player);
            }
        }
        if let Some(track) = delta.current_track {
            inner.snapshot.current_track = track;
        }
        let scalar_updates = [
            delta.state.map(PlaybackValue::State),
            delta.position_secs.map(PlaybackValue::Position),
            delta.volume.map(PlaybackValue::Volume),
            delta.muted.map(PlaybackValue::Mute),
            delta.shuffle.map(PlaybackValue::Shuffle),
            delta.repeat.map(PlaybackValue::Repeat),
            delta.favorite.map(PlaybackValue::Favorite),
        ];
        for value in scalar_updates.into_iter().flatten() {
            let field = match &value {
                PlaybackValue::State(_) => PlaybackField::State,
                PlaybackValue::Position(_) => PlaybackField::Position,
                PlaybackValue::Volume(_) => PlaybackField::Volume,
                PlaybackValue::Mute(_) => PlaybackField::Mute,
                PlaybackValue::Shuffle(_) => PlaybackField::Shuffle,
                PlaybackValue::Repeat(_) => PlaybackField::Repeat,
                PlaybackValue::Favorite(_) => PlaybackField::Favorite,
            };
            if inner.ledger.is_pending(field) {
                inner.ledger.observe(field, value);
            } else {
                inner.write_field(value);
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn play(&self) -> Result<(), SyncError> {
        self.apply_field(
            PlaybackField::State,
            PlaybackValue::State(PlaybackState::Playing),
            "player/play",
            json!({}),
        )
        .await
    }

    pub async fn pause(&self) -> Result<(), SyncError> {
        self.apply_field(
            PlaybackField::State,
            PlaybackValue::State(PlaybackState::Paused),
            "player/pause",
            json!({}),
        )
        .await
    }

    pub async fn stop(&self) -> Result<(), SyncError> {
        self.apply_field(
            PlaybackField::State,
            PlaybackValue::State(PlaybackState::Stopped),
            "player/stop",
            json!({}),
        )
        .await
    }

    /// Skip forward. No optimistic prediction: the next track is unknown
    /// until the server pushes it.
    pub async fn next_track(&self) -> Result<(), SyncError> {
        self.issue_plain("player/next").await
    }

    pub async fn previous_track(&self) -> Result<(), SyncError> {
        self.issue_plain("player/previous").await
    }

    /// Update the local volume immediately; the network command is debounced
    /// so a slider drag emits a single send carrying the final value.
    pub async fn set_volume(&self, volume: u8) -> Result<(), SyncError> {
        let volume = volume.min(100);
        self.apply_field_debounced(
            &self.volume_debounce,
            PlaybackField::Volume,
            PlaybackValue::Volume(volume),
            "player/volume",
            json!({ "volume": volume }),
        )
        .await
    }

    /// Debounced like volume: scrubbing emits one seek to the final position.
    pub async fn seek(&self, position_secs: f64) -> Result<(), SyncError> {
        let position_secs = position_secs.max(0.0);
        self.apply_field_debounced(
            &self.seek_debounce,
            PlaybackField::Position,
            PlaybackValue::Position(position_secs),
            "player/seek",
            json!({ "position": position_secs }),
        )
        .await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<(), SyncError> {
        self.apply_field(
            PlaybackField::Mute,
            PlaybackValue::Mute(muted),
            "player/mute",
            json!({ "muted": muted }),
        )
        .await
    }

    pub async fn set_shuffle(&self, shuffle: bool) -> Result<(), SyncError> {
        self.apply_field(
            PlaybackField::Shuffle,
            PlaybackValue::Shuffle(shuffle),
            "player/shuffle",
            json!({ "shuffle": shuffle }),
        )
        .await
    }

    pub async fn set_repeat(&self, repeat: RepeatMode) -> Result<(), SyncError> {
        self.apply_field(
            PlaybackField::Repeat,
            PlaybackValue::Repeat(repeat),
            "player/repeat",
            json!({ "repeat": repeat.as_wire() }),
        )
        .await
    }

    /// Toggle favorite status of the current track, optimistically.
    pub async fn set_favorite(&self, favorite: bool) -> Result<(), SyncError> {
        let track_id = {
            let guard = self.inner.lock().await;
            guard
                .snapshot
                .current_track
                .as_ref()
                .map(|t| t.id.clone())
                .ok_or(SyncError::NoActiveSelection("player"))?
        };
        self.apply_field(
            PlaybackField::Favorite,
            PlaybackValue::Favorite(favorite),
            "player/favorite",
            json!({ "track_id": track_id, "favorite": favorite }),
        )
        .await
    }

    // ========================================================================
    // Optimistic plumbing
    // ========================================================================

    /// Apply `value` locally, record the mutation, and send the command.
    async fn apply_field(
        &self,
        field: PlaybackField,
        value: PlaybackValue,
        command: &'static str,
        args: Value,
    ) -> Result<(), SyncError> {
        let (token, args) = self.begin_local(field, value, args).await?;
        let container = self.clone();
        tokio::spawn(async move {
            container.send_field_command(field, token, command, args).await;
        });
        Ok(())
    }

    /// Same as `apply_field` but the send is scheduled through `debouncer`.
    async fn apply_field_debounced(
        &self,
        debouncer: &Debouncer,
        field: PlaybackField,
        value: PlaybackValue,
        command: &'static str,
        args: Value,
    ) -> Result<(), SyncError> {
        let (token, args) = self.begin_local(field, value, args).await?;
        let container = self.clone();
        debouncer.call(move || async move {
            container.send_field_command(field, token, command, args).await;
        });
        Ok(())
    }

    /// Synchronous half of a command: requires a selection, records the
    /// mutation with its rollback baseline, applies the value locally and
    /// publishes the new snapshot.
    async fn begin_local(
        &self,
        field: PlaybackField,
        value: PlaybackValue,
        mut args: Value,
    ) -> Result<(u64, Value), SyncError> {
        let mut guard = self.inner.lock().await;
        let player_id = guard
            .selected_player_id()
            .ok_or(SyncError::NoActiveSelection("player"))?;
        let baseline = guard.read_field(field);
        let token = guard.ledger.begin(field, baseline);
        guard.write_field(value);
        self.snapshot_tx.send_replace(guard.snapshot.clone());
        args["player_id"] = Value::String(player_id);
        Ok((token, args))
    }

    /// Network half: serialize per field, skip if superseded, then resolve
    /// the mutation exactly once.
    async fn send_field_command(&self, field: PlaybackField, token: u64, command: &str, args: Value) {
        let lock = {
            let mut guard = self.inner.lock().await;
            guard.field_lock(field)
        };
        let _serialized = lock.lock().await;

        let proceed = {
            let mut guard = self.inner.lock().await;
            guard.ledger.mark_in_flight(field, token)
        };
        if !proceed {
            tracing::trace!(?field, token, "Command superseded before send");
            return;
        }

        let result = self.transport.issue_command(command, args).await;
        let mut guard = self.inner.lock().await;
        match result {
            Ok(()) => match guard.ledger.resolve_success(field, token) {
                Resolution::Observed(server) => {
                    tracing::debug!(?field, command, "Command confirmed, applying value observed mid-flight");
                    guard.write_field(server);
                    self.snapshot_tx.send_replace(guard.snapshot.clone());
                }
                Resolution::Confirmed => {
                    tracing::debug!(?field, command, "Command confirmed");
                }
                Resolution::Superseded => {}
            },
            Err(err) => {
                if let Some(baseline) = guard.ledger.resolve_failure(field, token) {
                    tracing::warn!(?field, command, error = %err, "Command failed, rolling back");
                    guard.write_field(baseline);
                    self.snapshot_tx.send_replace(guard.snapshot.clone());
                    self.error_tx
                        .send_replace(Some(SyncError::from_transport(command, err)));
                }
            }
        }
    }

    /// Non-optimistic command: nothing to roll back, but failures still land
    /// on the last-error observable.
    async fn issue_plain(&self, command: &'static str) -> Result<(), SyncError> {
        let player_id = {
            let guard = self.inner.lock().await;
            guard
                .selected_player_id()
                .ok_or(SyncError::NoActiveSelection("player"))?
        };
        let container = self.clone();
        tokio::spawn(async move {
            if let Err(err) = container
                .transport
                .issue_command(command, json!({ "player_id": player_id }))
                .await
            {
                tracing::warn!(command, error = %err, "Command failed");
                container
                    .error_tx
                    .send_replace(Some(SyncError::from_transport(command, err)));
            }
        });
        Ok(())
    }
}
