use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::{
    audio::{
        config::PlayerConfig,
        error::MediaError,
        preview::PreviewPolicy,
        state::{PlaybackSnapshot, PlaybackState, TrackError},
        track::{RequestId, TrackId, TrackRef},
        traits::MediaEngine,
    },
    event::events::{EngineEvent, EngineEventKind, PlayerEvent},
};

#[derive(Debug, Clone)]
struct LoadedTrack {
    track: TrackRef,
    media_duration: Option<Duration>,
    position: Duration,
}

impl LoadedTrack {
    fn new(track: TrackRef) -> Self {
        Self {
            track,
            media_duration: None,
            position: Duration::ZERO,
        }
    }
}

/// Owns the one media engine of the application and makes sure at most one
/// track plays at a time.
///
/// Every load gets a fresh [`RequestId`]; engine events for any other request
/// are dropped, so a slow load can never override a newer `play` or `pause`.
/// Failures are recorded as state and never returned to the caller.
pub struct PlaybackCoordinator<E: MediaEngine> {
    engine: E,
    preview: PreviewPolicy,
    load_timeout: Option<Duration>,
    state: PlaybackState,
    request: RequestId,
    loaded: Option<LoadedTrack>,
    loading_since: Option<Instant>,
    last_error: Option<TrackError>,
    volume: u8,
    muted: bool,
    notices: Vec<PlayerEvent>,
    disposed: bool,
}

impl<E: MediaEngine> PlaybackCoordinator<E> {
    pub fn new(engine: E, config: &PlayerConfig) -> Self {
        let mut coordinator = Self {
            engine,
            preview: PreviewPolicy::new(config.preview_limit),
            load_timeout: config.load_timeout,
            state: PlaybackState::Idle,
            request: RequestId::default(),
            loaded: None,
            loading_since: None,
            last_error: None,
            volume: config.volume.min(100),
            muted: false,
            notices: Vec::new(),
            disposed: false,
        };
        coordinator.apply_volume();
        coordinator
    }

    pub fn play(&mut self, track: TrackRef) {
        if self.disposed {
            warn!(id = track.id.as_str(), "coordinator_play_after_dispose");
            return;
        }
        if track.id.is_empty() {
            warn!(url = track.audio_url.as_str(), "coordinator_play_missing_id");
            return;
        }
        if self.state.current() == Some(&track.id) {
            debug!(id = track.id.as_str(), "coordinator_play_already_current");
            return;
        }

        if self
            .last_error
            .as_ref()
            .is_some_and(|e| e.track_id == track.id)
        {
            self.last_error = None;
        }

        if self.loaded.is_some() {
            self.engine.pause();
            self.engine.seek(Duration::ZERO);
        }

        self.request = self.request.next();
        let request = self.request;
        info!(
            id = track.id.as_str(),
            url = track.audio_url.as_str(),
            owned = track.owned,
            %request,
            "coordinator_play"
        );

        self.engine.load(request, &track.audio_url);
        self.state = PlaybackState::Loading(track.id.clone());
        self.loading_since = Some(Instant::now());
        self.loaded = Some(LoadedTrack::new(track));

        if let Err(err) = self.engine.play(request) {
            self.fail(request, err);
        }
    }

    pub fn pause(&mut self) {
        if self.disposed {
            return;
        }
        let Some(id) = self.state.current().cloned() else {
            trace!("coordinator_pause_idle");
            return;
        };

        self.engine.pause();
        self.request = self.request.next();
        self.state = PlaybackState::Idle;
        self.loading_since = None;
        info!(id = id.as_str(), "coordinator_pause");
    }

    /// Seeks the loaded track and returns the position actually applied.
    pub fn seek(&mut self, requested: Duration) -> Option<Duration> {
        if self.disposed {
            return None;
        }
        let loaded = self.loaded.as_mut()?;
        let target = self
            .preview
            .clamp_seek(loaded.track.owned, requested, loaded.media_duration);
        if target != requested {
            debug!(
                id = loaded.track.id.as_str(),
                requested_ms = requested.as_millis() as u64,
                applied_ms = target.as_millis() as u64,
                "coordinator_seek_clamped"
            );
        }

        self.engine.seek(target);
        loaded.position = target;
        Some(target)
    }

    pub fn set_volume(&mut self, volume: u8) {
        if self.disposed {
            warn!(volume, "coordinator_volume_after_dispose");
            return;
        }
        self.volume = volume.min(100);
        self.muted = false;
        self.apply_volume();
    }

    pub fn toggle_mute(&mut self) {
        if self.disposed {
            warn!("coordinator_mute_after_dispose");
            return;
        }
        self.muted = !self.muted;
        self.apply_volume();
    }

    fn apply_volume(&mut self) {
        let volume = if self.muted {
            0.0
        } else {
            self.volume as f32 / 100.0
        };
        self.engine.set_volume(volume);
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        if self.disposed {
            return;
        }
        if event.request != self.request {
            trace!(
                request = %event.request,
                current = %self.request,
                "coordinator_stale_event"
            );
            return;
        }

        match event.kind {
            EngineEventKind::LoadStart => {
                debug!(request = %event.request, "coordinator_load_started");
            }
            EngineEventKind::Ready { duration } => self.on_ready(duration),
            EngineEventKind::Progress { position } => self.on_progress(position),
            EngineEventKind::Ended => self.on_ended(),
            EngineEventKind::Error(err) => self.fail(event.request, err),
        }
    }

    fn on_ready(&mut self, duration: Option<Duration>) {
        let PlaybackState::Loading(id) = &self.state else {
            return;
        };
        let id = id.clone();

        if let Some(loaded) = self.loaded.as_mut() {
            loaded.media_duration = duration;
        }
        self.state = PlaybackState::Playing(id.clone());
        self.loading_since = None;
        info!(
            id = id.as_str(),
            duration_ms = duration.map(|d| d.as_millis() as u64),
            "coordinator_playing"
        );
        self.notices.push(PlayerEvent::TrackStarted(id));
    }

    fn on_progress(&mut self, position: Duration) {
        if !matches!(self.state, PlaybackState::Playing(_)) {
            return;
        }
        let Some(loaded) = self.loaded.as_mut() else {
            return;
        };
        loaded.position = position;

        if !self.preview.limit_reached(loaded.track.owned, position) {
            return;
        }

        let limit = self.preview.limit();
        self.engine.pause();
        self.engine.seek(limit);
        loaded.position = limit;
        let id = loaded.track.id.clone();

        self.request = self.request.next();
        self.state = PlaybackState::Idle;
        info!(
            id = id.as_str(),
            limit_secs = limit.as_secs(),
            "coordinator_preview_limit_reached"
        );
        self.notices.push(PlayerEvent::PreviewLimitReached(id));
    }

    fn on_ended(&mut self) {
        let Some(id) = self.state.current().cloned() else {
            return;
        };
        self.state = PlaybackState::Idle;
        self.loaded = None;
        self.loading_since = None;
        info!(id = id.as_str(), "coordinator_track_ended");
        self.notices.push(PlayerEvent::TrackEnded(id));
    }

    fn fail(&mut self, request: RequestId, error: MediaError) {
        if request != self.request {
            return;
        }
        let Some(id) = self.state.current().cloned() else {
            return;
        };

        warn!(
            id = id.as_str(),
            kind = %error.kind,
            message = error.message.as_str(),
            "coordinator_playback_failed"
        );
        self.state = PlaybackState::Errored(id.clone());
        self.loaded = None;
        self.loading_since = None;

        let failure = TrackError {
            track_id: id,
            error,
        };
        self.last_error = Some(failure.clone());
        self.notices.push(PlayerEvent::PlaybackFailed(failure));
    }

    /// Fails a load that has been pending longer than the configured timeout.
    pub fn tick(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        let (Some(timeout), Some(since)) = (self.load_timeout, self.loading_since) else {
            return;
        };
        if !matches!(self.state, PlaybackState::Loading(_)) {
            return;
        }
        if now.duration_since(since) < timeout {
            return;
        }

        self.engine.pause();
        let request = self.request;
        self.fail(request, MediaError::timeout(timeout));
    }

    pub fn is_playing(&self, id: &str) -> bool {
        matches!(&self.state, PlaybackState::Playing(current) if current == id)
    }

    pub fn has_error(&self, id: &str) -> bool {
        self.last_error.as_ref().is_some_and(|e| e.track_id == id)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn current_track_id(&self) -> Option<&TrackId> {
        self.state.current()
    }

    pub fn current_request(&self) -> RequestId {
        self.request
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state.clone(),
            currently_playing: self.state.current().cloned(),
            is_loading: matches!(self.state, PlaybackState::Loading(_)),
            error: self.last_error.clone(),
            position: self.loaded.as_ref().map_or(Duration::ZERO, |l| l.position),
            duration: self.loaded.as_ref().and_then(|l| {
                self.preview
                    .displayed_duration(l.track.owned, l.media_duration)
            }),
            volume: self.volume,
            muted: self.muted,
        }
    }

    pub fn drain_notices(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.notices)
    }

    /// Stops playback and releases the engine. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("coordinator_dispose");
        self.engine.pause();
        self.engine.dispose();
        self.request = self.request.next();
        self.state = PlaybackState::Idle;
        self.loaded = None;
        self.loading_since = None;
        self.disposed = true;
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E: MediaEngine> Drop for PlaybackCoordinator<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}
