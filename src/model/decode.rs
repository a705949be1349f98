//! Defensive decoding of server payloads into domain types
//!
//! The server controls the payload shapes, so nothing here is allowed to
//! fail hard: every field degrades to a documented default and only a
//! top-level shape that is completely unusable becomes an error
//! (`SyncError::MalformedResponse`, raised by `decode_library_page`).
//! All speculative access to `serde_json::Value` lives in this module;
//! the containers only ever see well-formed domain values.

use serde_json::Value;
use url::Url;

use crate::error::SyncError;

use super::types::{
    LibraryCategory, LibraryEntry, PlaybackState, Player, QueueItem, RepeatMode, Track,
    UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE,
};

/// Key the server uses for the currently loaded media object.
const CURRENT_MEDIA_KEY: &str = "current_media";

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_or(value: &Value, key: &str, default: &str) -> String {
    string_field(value, key).unwrap_or_else(|| default.to_string())
}

/// Accepts integer or float wire representations; anything else (strings
/// included) is the documented default of 0.
fn seconds_or_zero(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(v) => v.as_f64().filter(|d| d.is_finite()).unwrap_or(0.0).max(0.0),
        None => 0.0,
    }
}

fn count_field(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u64)
        .unwrap_or(0)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key).and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// A locator that does not parse is no artwork at all, never a broken link.
fn artwork_field(value: &Value) -> Option<Url> {
    ["artwork", "image", "image_url"]
        .iter()
        .find_map(|key| string_field(value, key))
        .and_then(|raw| Url::parse(&raw).ok())
}

/// Decode one track object. Returns `None` only when the value is not a
/// mapping; inside a mapping every field has a fallback.
pub fn decode_track(value: &Value) -> Option<Track> {
    if !value.is_object() {
        return None;
    }
    let title = string_or(value, "title", UNKNOWN_TITLE);
    let artist = string_or(value, "artist", UNKNOWN_ARTIST);
    let album = string_or(value, "album", UNKNOWN_ALBUM);
    // Some servers omit track ids for transient media (radio streams); a
    // synthesized id keeps the value usable for session-local identity.
    let id = string_field(value, "id").unwrap_or_else(|| format!("{title}::{artist}"));
    Some(Track {
        id,
        title,
        artist,
        album,
        duration_secs: seconds_or_zero(value, "duration"),
        artwork: artwork_field(value),
    })
}

/// Decode the `current_media` sub-object of a player payload. Absent or
/// non-mapping means "no current track", never a partially filled one.
pub fn decode_current_track(payload: &Value) -> Option<Track> {
    payload.get(CURRENT_MEDIA_KEY).and_then(decode_track)
}

/// Unrecognized or missing state strings map to `Stopped`.
pub fn decode_playback_state(value: &Value) -> PlaybackState {
    match value.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("playing") | Some("play") => PlaybackState::Playing,
        Some("paused") | Some("pause") => PlaybackState::Paused,
        _ => PlaybackState::Stopped,
    }
}

/// Unrecognized or missing repeat strings map to `Off`.
pub fn decode_repeat_mode(value: &Value) -> RepeatMode {
    match value.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("all") | Some("playlist") => RepeatMode::All,
        Some("one") | Some("single") | Some("track") => RepeatMode::One,
        _ => RepeatMode::Off,
    }
}

/// A player without an id is unusable and decodes to `None`.
pub fn decode_player(value: &Value) -> Option<Player> {
    let id = string_field(value, "id")?;
    let name = string_or(value, "name", &id);
    Some(Player {
        is_active: bool_field(value, "is_active"),
        group_members: string_list(value, "group_members"),
        sync_target: string_field(value, "sync_target"),
        group_id: string_field(value, "group_id"),
        id,
        name,
    })
}

/// Decode a player list, skipping malformed elements. A non-list value
/// yields an empty list.
pub fn decode_players(value: &Value) -> Vec<Player> {
    match value.as_array() {
        Some(items) => items.iter().filter_map(decode_player).collect(),
        None => Vec::new(),
    }
}

fn decode_queue_item(value: &Value, fallback_position: usize) -> Option<QueueItem> {
    if !value.is_object() {
        return None;
    }
    let track = match value.get("track") {
        // A present-but-not-mapping track makes the element malformed.
        Some(embedded) => decode_track(embedded)?,
        // Flattened shape: the track fields live on the item itself.
        None => decode_track(value)?,
    };
    let position = value
        .get("position")
        .and_then(Value::as_u64)
        .map(|p| p as usize)
        .unwrap_or(fallback_position);
    let queue_item_id =
        string_field(value, "queue_item_id").unwrap_or_else(|| format!("{}#{}", track.id, position));
    Some(QueueItem {
        queue_item_id,
        position,
        track,
    })
}

/// Decode the items of a queue payload. Malformed elements are skipped
/// rather than discarding the whole list; a non-list `items` value yields an
/// empty queue.
pub fn decode_queue_items(payload: &Value) -> Vec<QueueItem> {
    let items = payload.get("items").unwrap_or(payload);
    match items.as_array() {
        Some(elements) => elements
            .iter()
            .enumerate()
            .filter_map(|(position, element)| decode_queue_item(element, position))
            .collect(),
        None => Vec::new(),
    }
}

/// Decode one library row for the given category. Rows without an id are
/// skipped by the caller.
pub fn decode_library_entry(category: LibraryCategory, value: &Value) -> Option<LibraryEntry> {
    let id = string_field(value, "id")?;
    let artwork = artwork_field(value);
    Some(match category {
        LibraryCategory::Artists => LibraryEntry::Artist {
            name: string_or(value, "name", UNKNOWN_ARTIST),
            album_count: count_field(value, "album_count"),
            id,
            artwork,
        },
        LibraryCategory::Albums => LibraryEntry::Album {
            name: string_or(value, "name", UNKNOWN_ALBUM),
            artist: string_or(value, "artist", UNKNOWN_ARTIST),
            year: value.get("year").and_then(Value::as_u64),
            track_count: count_field(value, "track_count"),
            id,
            artwork,
        },
        LibraryCategory::Playlists => LibraryEntry::Playlist {
            name: string_or(value, "name", &id),
            owner: string_or(value, "owner", ""),
            track_count: count_field(value, "track_count"),
            id,
            artwork,
        },
        LibraryCategory::Radios => LibraryEntry::Radio {
            name: string_or(value, "name", &id),
            id,
            artwork,
        },
        LibraryCategory::Genres => LibraryEntry::Genre {
            name: string_or(value, "name", &id),
            track_count: count_field(value, "track_count"),
            id,
        },
    })
}

/// Decode one page of library results. The payload may be a bare list or an
/// object with an `items` list; anything else is the one place the decoder
/// reports an error instead of defaulting.
pub fn decode_library_page(
    category: LibraryCategory,
    payload: &Value,
) -> Result<Vec<LibraryEntry>, SyncError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(_) => payload
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SyncError::MalformedResponse(format!("{category} page has no items list"))
            })?,
        other => {
            return Err(SyncError::MalformedResponse(format!(
                "{category} page is not a list or object ({other})"
            )));
        }
    };
    Ok(items
        .iter()
        .filter_map(|element| decode_library_entry(category, element))
        .collect())
}

/// Which category a library-changed event touched, if it named one.
pub fn decode_changed_category(payload: &Value) -> Option<LibraryCategory> {
    string_field(payload, "category").and_then(|c| LibraryCategory::from_wire(&c))
}

/// The per-field view of a queue payload. `None` means the payload did not
/// mention the field.
#[derive(Clone, Debug, Default)]
pub struct QueueDelta {
    pub items: Option<Vec<QueueItem>>,
    /// `Some(None)` when the payload explicitly cleared the current index.
    pub current_index: Option<Option<usize>>,
}

/// Decode the fields a queue event actually carries.
pub fn decode_queue_delta(payload: &Value) -> QueueDelta {
    if !payload.is_object() {
        return QueueDelta::default();
    }
    QueueDelta {
        items: payload.get("items").map(|_| decode_queue_items(payload)),
        current_index: payload
            .get("current_index")
            .map(|v| v.as_u64().map(|i| i as usize)),
    }
}

/// The per-field view of a player payload, used when merging server events
/// into playback state. `None` means the payload did not mention the field.
#[derive(Clone, Debug, Default)]
pub struct PlaybackDelta {
    pub player: Option<Player>,
    pub state: Option<PlaybackState>,
    /// `Some(None)` when the payload mentioned the media slot but carried
    /// nothing usable.
    pub current_track: Option<Option<Track>>,
    pub position_secs: Option<f64>,
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub shuffle: Option<bool>,
    pub repeat: Option<RepeatMode>,
    pub favorite: Option<bool>,
}

/// Decode the fields a player event or full player state actually carries.
pub fn decode_playback_delta(payload: &Value) -> PlaybackDelta {
    if !payload.is_object() {
        return PlaybackDelta::default();
    }
    PlaybackDelta {
        player: decode_player(payload),
        state: payload.get("state").map(decode_playback_state),
        current_track: payload
            .get(CURRENT_MEDIA_KEY)
            .map(|media| decode_track(media)),
        position_secs: payload
            .get("position")
            .map(|_| seconds_or_zero(payload, "position")),
        volume: payload
            .get("volume")
            .and_then(Value::as_f64)
            .map(|v| v.clamp(0.0, 100.0) as u8),
        muted: payload.get("muted").and_then(Value::as_bool),
        shuffle: payload.get("shuffle").and_then(Value::as_bool),
        repeat: payload.get("repeat").map(decode_repeat_mode),
        favorite: payload.get("favorite").and_then(Value::as_bool),
    }
}
