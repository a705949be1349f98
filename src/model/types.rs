//! Domain types mirrored from the server
//!
//! All of these are value types: every update decodes a fresh value and
//! replaces the previous one wholesale, so readers never observe a
//! partially-updated object.

use std::fmt;

/// Placeholder shown when the server omits a track title.
pub const UNKNOWN_TITLE: &str = "Unknown Track";
/// Placeholder shown when the server omits an artist name.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
/// Placeholder shown when the server omits an album name.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Metadata for one track.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// Server-assigned id, or synthesized from title/artist when absent.
    /// Stable within a session only.
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Seconds, never negative; 0.0 when the server sent nothing usable.
    pub duration_secs: f64,
    pub artwork: Option<url::Url>,
}

/// Transport state of a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// Repeat mode of a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn as_wire(self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }
}

/// A playback endpoint known to the server.
///
/// Group membership is a non-owning relation: members, sync target and group
/// are identifiers only, never embedded players.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub group_members: Vec<String>,
    pub sync_target: Option<String>,
    pub group_id: Option<String>,
}

/// A track's occurrence in a queue. The queue-scoped id is distinct from the
/// track id because the same track may appear several times.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueItem {
    pub queue_item_id: String,
    pub position: usize,
    pub track: Track,
}

/// Browsable library categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LibraryCategory {
    Artists,
    Albums,
    Playlists,
    Radios,
    Genres,
}

impl LibraryCategory {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "artists" => Some(LibraryCategory::Artists),
            "albums" => Some(LibraryCategory::Albums),
            "playlists" => Some(LibraryCategory::Playlists),
            "radios" => Some(LibraryCategory::Radios),
            "genres" => Some(LibraryCategory::Genres),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LibraryCategory::Artists => "artists",
            LibraryCategory::Albums => "albums",
            LibraryCategory::Playlists => "playlists",
            LibraryCategory::Radios => "radios",
            LibraryCategory::Genres => "genres",
        }
    }
}

impl fmt::Display for LibraryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a library listing.
#[derive(Clone, Debug, PartialEq)]
pub enum LibraryEntry {
    Artist {
        id: String,
        name: String,
        artwork: Option<url::Url>,
        album_count: u64,
    },
    Album {
        id: String,
        name: String,
        artist: String,
        year: Option<u64>,
        artwork: Option<url::Url>,
        track_count: u64,
    },
    Playlist {
        id: String,
        name: String,
        owner: String,
        artwork: Option<url::Url>,
        track_count: u64,
    },
    Radio {
        id: String,
        name: String,
        artwork: Option<url::Url>,
    },
    Genre {
        id: String,
        name: String,
        track_count: u64,
    },
}

impl LibraryEntry {
    pub fn id(&self) -> &str {
        match self {
            LibraryEntry::Artist { id, .. }
            | LibraryEntry::Album { id, .. }
            | LibraryEntry::Playlist { id, .. }
            | LibraryEntry::Radio { id, .. }
            | LibraryEntry::Genre { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LibraryEntry::Artist { name, .. }
            | LibraryEntry::Album { name, .. }
            | LibraryEntry::Playlist { name, .. }
            | LibraryEntry::Radio { name, .. }
            | LibraryEntry::Genre { name, .. } => name,
        }
    }
}

/// Sort orders offered for library listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortKey {
    #[default]
    Name,
    Recent,
    Year,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Recent => "recent",
            SortKey::Year => "year",
        }
    }
}

/// Read-only snapshot of the playback domain, published on every change.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub player: Option<Player>,
    pub state: PlaybackState,
    pub current_track: Option<Track>,
    /// Playhead position in seconds.
    pub position_secs: f64,
    /// 0..=100.
    pub volume: u8,
    pub muted: bool,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    /// Whether the current track is favorited.
    pub favorite: bool,
}

/// Read-only snapshot of the queue domain.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct QueueSnapshot {
    pub queue_id: Option<String>,
    pub items: Vec<QueueItem>,
    pub current_index: Option<usize>,
}

impl QueueSnapshot {
    /// Sum of all item durations, in seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.items.iter().map(|i| i.track.duration_secs).sum()
    }
}

/// Render a duration in seconds as `m:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(duration_secs: f64) -> Track {
        Track {
            id: "t".into(),
            title: "T".into(),
            artist: "A".into(),
            album: "B".into(),
            duration_secs,
            artwork: None,
        }
    }

    #[test]
    fn queue_aggregate_duration_formats() {
        let queue = QueueSnapshot {
            queue_id: Some("q1".into()),
            items: [180.0, 200.0, 120.0]
                .iter()
                .enumerate()
                .map(|(position, &d)| QueueItem {
                    queue_item_id: format!("qi{position}"),
                    position,
                    track: track(d),
                })
                .collect(),
            current_index: Some(0),
        };
        assert_eq!(queue.total_duration_secs(), 500.0);
        assert_eq!(format_duration(queue.total_duration_secs()), "8:20");
    }

    #[test]
    fn format_duration_handles_hours_and_negatives() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(-3.0), "0:00");
        assert_eq!(format_duration(59.9), "0:59");
        assert_eq!(format_duration(3723.0), "1:02:03");
    }
}
