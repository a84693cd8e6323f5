use std::time::Duration;

use crate::audio::{
    error::MediaError,
    state::{PlaybackSnapshot, TrackError},
    track::{RequestId, TrackId},
};

/// Callback from the media engine, tagged with the load it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub request: RequestId,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(request: RequestId, kind: EngineEventKind) -> Self {
        Self { request, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    LoadStart,
    Ready { duration: Option<Duration> },
    Progress { position: Duration },
    Ended,
    Error(MediaError),
}

/// Notifications published by the player controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlaybackSnapshot),
    TrackStarted(TrackId),
    TrackEnded(TrackId),
    PreviewLimitReached(TrackId),
    PlaybackFailed(TrackError),
}
