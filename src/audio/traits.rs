use async_trait::async_trait;
use std::time::Duration;

use crate::audio::{error::MediaError, track::RequestId};

/// Raw media fetched for a track, plus a decoder format hint when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub hint: Option<String>,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<MediaPayload, MediaError>;
}

/// The single audio output the coordinator drives.
///
/// `load` and `play` return immediately. Readiness, progress, end of track and
/// asynchronous failures come back as `EngineEvent`s tagged with the request
/// passed to `load`.
pub trait MediaEngine: Send {
    fn load(&mut self, request: RequestId, url: &str);

    /// Asks the engine to start `request` once it is ready. An `Err` is an
    /// immediate rejection (no output, engine disposed).
    fn play(&mut self, request: RequestId) -> Result<(), MediaError>;

    fn pause(&mut self);
    fn seek(&mut self, position: Duration);
    fn set_volume(&mut self, volume: f32);
    fn dispose(&mut self);
}
