use flume::{Receiver, Sender, TrySendError};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::{
    audio::{
        commands::PlayerCommand,
        config::PlayerConfig,
        coordinator::PlaybackCoordinator,
        state::PlaybackSnapshot,
        track::TrackRef,
        traits::MediaEngine,
    },
    event::events::{EngineEvent, PlayerEvent},
};

/// Room for bursts of notices between reads of the event channel.
pub const EVENT_CAPACITY: usize = 64;

/// Bounded channel for [`PlayerEvent`]s. The controller never waits on it:
/// when the receiver falls behind, events are dropped and
/// [`PlayerHandle::snapshot`] remains the source of truth.
pub fn event_channel() -> (Sender<PlayerEvent>, Receiver<PlayerEvent>) {
    flume::bounded(EVENT_CAPACITY)
}

/// Runs a [`PlaybackCoordinator`] on its own task. Commands and engine
/// events are applied one at a time, so the coordinator never needs a lock.
pub struct PlayerController<E: MediaEngine> {
    coordinator: PlaybackCoordinator<E>,
    cmd_rx: Receiver<PlayerCommand>,
    engine_rx: Receiver<EngineEvent>,
    publisher: Publisher,
    tick_interval: Duration,
}

impl<E: MediaEngine + 'static> PlayerController<E> {
    /// Starts the controller task. Events are offered to `event_tx` with
    /// `try_send`, so a full or abandoned receiver never stalls playback.
    pub fn spawn(
        engine: E,
        engine_rx: Receiver<EngineEvent>,
        config: &PlayerConfig,
        event_tx: Sender<PlayerEvent>,
    ) -> (PlayerHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let coordinator = PlaybackCoordinator::new(engine, config);
        let snapshot = Arc::new(RwLock::new(coordinator.snapshot()));

        let controller = Self {
            coordinator,
            cmd_rx,
            engine_rx,
            publisher: Publisher {
                snapshot: snapshot.clone(),
                event_tx,
            },
            tick_interval: config.progress_interval,
        };

        let task = tokio::spawn(controller.run());
        (PlayerHandle { cmd_tx, snapshot }, task)
    }

    async fn run(self) {
        let Self {
            mut coordinator,
            cmd_rx,
            engine_rx,
            publisher,
            tick_interval,
        } = self;

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut engine_open = true;

        info!("player_controller_started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv_async() => match cmd {
                    Ok(PlayerCommand::Shutdown) | Err(_) => break,
                    Ok(cmd) => apply_command(&mut coordinator, cmd),
                },
                event = engine_rx.recv_async(), if engine_open => match event {
                    Ok(event) => coordinator.handle_event(event),
                    Err(_) => {
                        warn!("player_engine_channel_closed");
                        engine_open = false;
                    }
                },
                _ = ticker.tick() => coordinator.tick(Instant::now()),
            }
            publisher.publish(&mut coordinator);
        }

        coordinator.dispose();
        publisher.publish(&mut coordinator);
        info!("player_controller_stopped");
    }
}

fn apply_command<E: MediaEngine>(coordinator: &mut PlaybackCoordinator<E>, cmd: PlayerCommand) {
    debug!(?cmd, "player_command");
    match cmd {
        PlayerCommand::Play(track) => coordinator.play(track),
        PlayerCommand::Pause => coordinator.pause(),
        PlayerCommand::Seek(position) => {
            coordinator.seek(position);
        }
        PlayerCommand::SetVolume(volume) => coordinator.set_volume(volume),
        PlayerCommand::ToggleMute => coordinator.toggle_mute(),
        PlayerCommand::Shutdown => {}
    }
}

struct Publisher {
    snapshot: Arc<RwLock<PlaybackSnapshot>>,
    event_tx: Sender<PlayerEvent>,
}

impl Publisher {
    fn publish<E: MediaEngine>(&self, coordinator: &mut PlaybackCoordinator<E>) {
        let snapshot = coordinator.snapshot();
        let changed = {
            let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            if *guard != snapshot {
                *guard = snapshot.clone();
                true
            } else {
                false
            }
        };

        if changed {
            self.offer(PlayerEvent::StateChanged(snapshot));
        }
        for notice in coordinator.drain_notices() {
            self.offer(notice);
        }
    }

    fn offer(&self, event: PlayerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(PlayerEvent::StateChanged(_))) => {
                trace!("player_state_event_dropped");
            }
            Err(TrySendError::Full(event)) => {
                warn!(?event, "player_event_dropped");
            }
        }
    }
}

/// Cheap, clonable access to the player for UI code. Every command is
/// fire-and-forget; results show up in [`PlayerHandle::snapshot`] and as
/// [`PlayerEvent`]s.
#[derive(Clone)]
pub struct PlayerHandle {
    cmd_tx: Sender<PlayerCommand>,
    snapshot: Arc<RwLock<PlaybackSnapshot>>,
}

impl PlayerHandle {
    pub fn play(&self, track: TrackRef) {
        self.send(PlayerCommand::Play(track));
    }

    pub fn pause(&self) {
        self.send(PlayerCommand::Pause);
    }

    pub fn seek(&self, position: Duration) {
        self.send(PlayerCommand::Seek(position));
    }

    pub fn set_volume(&self, volume: u8) {
        self.send(PlayerCommand::SetVolume(volume));
    }

    pub fn toggle_mute(&self) {
        self.send(PlayerCommand::ToggleMute);
    }

    pub fn shutdown(&self) {
        self.send(PlayerCommand::Shutdown);
    }

    fn send(&self, cmd: PlayerCommand) {
        if let Err(flume::SendError(cmd)) = self.cmd_tx.send(cmd) {
            warn!(?cmd, "player_command_dropped");
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_playing(&self, id: &str) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_playing(id)
    }

    pub fn has_error(&self, id: &str) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .has_error(id)
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_disconnected()
    }
}
