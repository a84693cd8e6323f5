use std::time::Duration;

use crate::audio::track::TrackRef;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play(TrackRef),
    Pause,
    Seek(Duration),
    SetVolume(u8),
    ToggleMute,
    Shutdown,
}
