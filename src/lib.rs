pub mod audio;
pub mod event;
pub mod http;
pub mod util;

pub use audio::{
    config::PlayerConfig,
    controller::{PlayerController, PlayerHandle, event_channel},
    coordinator::PlaybackCoordinator,
    error::{AudioError, MediaError, MediaErrorKind},
    state::{PlaybackSnapshot, PlaybackState, TrackError},
    system::AudioSystem,
    track::{RequestId, TrackId, TrackRef},
    traits::{MediaEngine, MediaPayload, MediaSource},
};
pub use event::events::{EngineEvent, EngineEventKind, PlayerEvent};
