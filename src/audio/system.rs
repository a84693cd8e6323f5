use flume::Sender;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    audio::{
        config::PlayerConfig,
        controller::{PlayerController, PlayerHandle},
        error::AudioError,
        playback::RodioEngine,
    },
    event::events::PlayerEvent,
    http::HttpSource,
};

/// The application's player: one HTTP source, one rodio engine and the
/// controller task that owns them.
pub struct AudioSystem {
    handle: PlayerHandle,
    task: JoinHandle<()>,
}

impl AudioSystem {
    /// Opens the output device and starts the controller. `event_tx` is
    /// normally the sender half of [`event_channel`](crate::audio::controller::event_channel).
    pub async fn new(
        config: &PlayerConfig,
        event_tx: Sender<PlayerEvent>,
    ) -> Result<Self, AudioError> {
        let source = Arc::new(HttpSource::new(config)?);
        let (engine_tx, engine_rx) = flume::unbounded();
        let engine = RodioEngine::new(config, source, engine_tx).await?;
        let (handle, task) = PlayerController::spawn(engine, engine_rx, config, event_tx);

        info!(
            preview_secs = config.preview_limit.as_secs(),
            load_timeout_secs = config.load_timeout.map(|t| t.as_secs()),
            "audio_system_started"
        );
        Ok(Self { handle, task })
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Stops playback, releases the output device and waits for the
    /// controller task to finish.
    pub async fn shutdown(self) -> Result<(), AudioError> {
        self.handle.shutdown();
        self.task
            .await
            .map_err(|e| AudioError::Task(e.to_string()))
    }
}
