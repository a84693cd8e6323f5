use std::time::Duration;

use crate::audio::{error::MediaError, track::TrackId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading(TrackId),
    Playing(TrackId),
    Errored(TrackId),
}

impl PlaybackState {
    /// The track the engine is working on, if any. Errored tracks are not
    /// current.
    pub fn current(&self) -> Option<&TrackId> {
        match self {
            PlaybackState::Loading(id) | PlaybackState::Playing(id) => Some(id),
            PlaybackState::Idle | PlaybackState::Errored(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackError {
    pub track_id: TrackId,
    pub error: MediaError,
}

/// Read-only view of the player for rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub currently_playing: Option<TrackId>,
    pub is_loading: bool,
    pub error: Option<TrackError>,
    pub position: Duration,
    /// Duration shown to the listener; capped for previews.
    pub duration: Option<Duration>,
    pub volume: u8,
    pub muted: bool,
}

impl PlaybackSnapshot {
    pub fn is_playing(&self, id: &str) -> bool {
        matches!(&self.state, PlaybackState::Playing(current) if current == id)
    }

    pub fn has_error(&self, id: &str) -> bool {
        self.error.as_ref().is_some_and(|e| e.track_id == id)
    }
}
