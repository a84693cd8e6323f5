use flume::Sender;
use rodio::{Decoder, Sink, Source};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        config::PlayerConfig,
        error::{AudioError, MediaError},
        track::RequestId,
        traits::{MediaEngine, MediaPayload, MediaSource},
        util::OutputThread,
    },
    event::events::{EngineEvent, EngineEventKind},
};

type DecodedSource = Decoder<Cursor<Vec<u8>>>;

/// The operations the engine needs from an audio sink.
pub(crate) trait OutputSink: Send + Sync + 'static {
    type Source: Send + 'static;

    fn append(&self, source: Self::Source);
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn is_paused(&self) -> bool;
    fn empty(&self) -> bool;
    fn position(&self) -> Duration;
    fn seek(&self, position: Duration) -> Result<(), String>;
    fn set_volume(&self, volume: f32);
}

impl OutputSink for Sink {
    type Source = DecodedSource;

    fn append(&self, source: DecodedSource) {
        Sink::append(self, source);
    }

    fn play(&self) {
        Sink::play(self);
    }

    fn pause(&self) {
        Sink::pause(self);
    }

    fn stop(&self) {
        Sink::stop(self);
    }

    fn is_paused(&self) -> bool {
        Sink::is_paused(self)
    }

    fn empty(&self) -> bool {
        Sink::empty(self)
    }

    fn position(&self) -> Duration {
        self.get_pos()
    }

    fn seek(&self, position: Duration) -> Result<(), String> {
        self.try_seek(position).map_err(|e| e.to_string())
    }

    fn set_volume(&self, volume: f32) {
        Sink::set_volume(self, volume);
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// Latest request passed to `load`.
    generation: RequestId,
    /// Request whose source is currently in the sink.
    queued: Option<RequestId>,
    autoplay: bool,
}

/// A sink plus the bookkeeping for which request owns it.
///
/// Every operation that reads the slot and then touches the sink does both
/// under the slot lock, so a load, an append and the end-of-track check can
/// never interleave.
pub(crate) struct Playhead<S: OutputSink> {
    sink: Arc<S>,
    slot: Mutex<Slot>,
}

impl<S: OutputSink> Playhead<S> {
    pub(crate) fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands the sink to `request`, dropping whatever was queued before.
    pub(crate) fn begin_load(&self, request: RequestId) {
        let mut slot = self.slot();
        slot.generation = request;
        slot.queued = None;
        slot.autoplay = false;
        self.sink.stop();
    }

    /// Appends a decoded source if `request` still owns the sink. Returns
    /// `false` when a newer load has taken over.
    pub(crate) fn queue(&self, request: RequestId, source: S::Source) -> bool {
        let mut slot = self.slot();
        if slot.generation != request {
            return false;
        }

        self.sink.append(source);
        if slot.autoplay {
            self.sink.play();
        } else {
            self.sink.pause();
        }
        slot.queued = Some(request);
        true
    }

    /// Starts `request` now if it is queued, or as soon as it is. Returns
    /// `false` for a superseded request.
    pub(crate) fn start(&self, request: RequestId) -> bool {
        let mut slot = self.slot();
        if slot.generation != request {
            return false;
        }

        slot.autoplay = true;
        if slot.queued == Some(request) {
            self.sink.play();
        }
        true
    }

    pub(crate) fn pause(&self) {
        let mut slot = self.slot();
        slot.autoplay = false;
        self.sink.pause();
    }

    pub(crate) fn seek(&self, position: Duration) {
        let slot = self.slot();
        if slot.queued.is_none() {
            return;
        }
        if let Err(err) = self.sink.seek(position) {
            debug!(
                position_ms = position.as_millis() as u64,
                error = err.as_str(),
                "engine_seek_failed"
            );
        }
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume);
    }

    /// Progress or end-of-track for the queued request, if it is playing.
    /// An ended request is released in the same step.
    pub(crate) fn poll(&self) -> Option<EngineEvent> {
        let mut slot = self.slot();
        let request = slot.queued?;
        if self.sink.is_paused() {
            return None;
        }

        if self.sink.empty() {
            slot.queued = None;
            return Some(EngineEvent::new(request, EngineEventKind::Ended));
        }
        Some(EngineEvent::new(
            request,
            EngineEventKind::Progress {
                position: self.sink.position(),
            },
        ))
    }

    pub(crate) fn release(&self) {
        let mut slot = self.slot();
        slot.queued = None;
        slot.autoplay = false;
        self.sink.stop();
    }
}

enum Queued {
    Ready(Option<Duration>),
    Stale,
}

/// [`MediaEngine`] backed by a single rodio sink.
pub struct RodioEngine {
    playhead: Arc<Playhead<Sink>>,
    output: OutputThread,
    source: Arc<dyn MediaSource>,
    events: Sender<EngineEvent>,
    runtime: Handle,
    load_task: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    disposed: bool,
}

impl RodioEngine {
    /// Opens the default output device. Must be called from within a tokio
    /// runtime.
    pub async fn new(
        config: &PlayerConfig,
        source: Arc<dyn MediaSource>,
        events: Sender<EngineEvent>,
    ) -> Result<Self, AudioError> {
        let runtime = Handle::try_current().map_err(|e| AudioError::Runtime(e.to_string()))?;
        let (sink, output) = OutputThread::spawn(config.buffer_frames).await?;

        let playhead = Arc::new(Playhead::new(sink));
        let monitor = start_monitor(
            &runtime,
            playhead.clone(),
            events.clone(),
            config.progress_interval,
        );

        Ok(Self {
            playhead,
            output,
            source,
            events,
            runtime,
            load_task: None,
            monitor: Some(monitor),
            disposed: false,
        })
    }

    fn emit(&self, request: RequestId, kind: EngineEventKind) {
        let _ = self.events.send(EngineEvent::new(request, kind));
    }
}

fn start_monitor<S: OutputSink>(
    runtime: &Handle,
    playhead: Arc<Playhead<S>>,
    events: Sender<EngineEvent>,
    interval: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Some(event) = playhead.poll() {
                let _ = events.send(event);
            }
        }
    })
}

fn decode(payload: MediaPayload) -> Result<DecodedSource, MediaError> {
    let byte_len = payload.bytes.len() as u64;
    let mut builder = Decoder::builder()
        .with_data(Cursor::new(payload.bytes))
        .with_byte_len(byte_len)
        .with_coarse_seek(true)
        .with_gapless(true);
    if let Some(hint) = payload.hint.as_deref() {
        builder = builder.with_hint(hint);
    }
    Ok(builder.build()?)
}

fn decode_and_queue(
    playhead: &Playhead<Sink>,
    request: RequestId,
    payload: MediaPayload,
) -> Result<Queued, MediaError> {
    let decoder = decode(payload)?;
    let duration = decoder.total_duration();

    if playhead.queue(request, decoder) {
        Ok(Queued::Ready(duration))
    } else {
        Ok(Queued::Stale)
    }
}

impl MediaEngine for RodioEngine {
    fn load(&mut self, request: RequestId, url: &str) {
        if self.disposed {
            self.emit(
                request,
                EngineEventKind::Error(MediaError::generic("audio output has been released")),
            );
            return;
        }

        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        self.playhead.begin_load(request);
        self.emit(request, EngineEventKind::LoadStart);

        let playhead = self.playhead.clone();
        let source = self.source.clone();
        let events = self.events.clone();
        let url = url.to_string();

        self.load_task = Some(self.runtime.spawn(async move {
            let start = Instant::now();
            let payload = match source.fetch(&url).await {
                Ok(payload) => payload,
                Err(err) => {
                    let _ = events.send(EngineEvent::new(request, EngineEventKind::Error(err)));
                    return;
                }
            };
            let bytes = payload.bytes.len();

            let outcome = tokio::task::spawn_blocking(move || {
                decode_and_queue(&playhead, request, payload)
            })
            .await
            .map_err(MediaError::from)
            .and_then(|decoded| decoded);

            let kind = match outcome {
                Ok(Queued::Ready(duration)) => {
                    info!(
                        %request,
                        url = url.as_str(),
                        bytes,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "engine_source_ready"
                    );
                    EngineEventKind::Ready { duration }
                }
                Ok(Queued::Stale) => {
                    debug!(%request, "engine_source_stale");
                    return;
                }
                Err(err) => EngineEventKind::Error(err),
            };
            let _ = events.send(EngineEvent::new(request, kind));
        }));
    }

    fn play(&mut self, request: RequestId) -> Result<(), MediaError> {
        if self.disposed {
            return Err(MediaError::generic("audio output has been released"));
        }
        if !self.output.is_alive() {
            return Err(MediaError::generic("audio output is not available"));
        }
        if !self.playhead.start(request) {
            debug!(%request, "engine_play_stale_request");
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.playhead.pause();
    }

    fn seek(&mut self, position: Duration) {
        self.playhead.seek(position);
    }

    fn set_volume(&mut self, volume: f32) {
        self.playhead.set_volume(volume);
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        self.playhead.release();
        self.output.shutdown();
        info!("engine_disposed");
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        if !self.disposed {
            warn!("engine_dropped_without_dispose");
            self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum SinkCall {
        Append(RequestId),
        Play,
        Pause,
        Stop,
        Seek(Duration),
    }

    /// Sink whose "source" is just the request that produced it.
    #[derive(Default)]
    struct FakeSink {
        calls: Mutex<Vec<SinkCall>>,
        contents: Mutex<Vec<RequestId>>,
        paused: Mutex<bool>,
        position: Mutex<Duration>,
    }

    impl FakeSink {
        fn take_calls(&self) -> Vec<SinkCall> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn record(&self, call: SinkCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn contents(&self) -> Vec<RequestId> {
            self.contents.lock().unwrap().clone()
        }

        fn finish_current(&self) {
            self.contents.lock().unwrap().clear();
        }
    }

    impl OutputSink for FakeSink {
        type Source = RequestId;

        fn append(&self, source: RequestId) {
            self.record(SinkCall::Append(source));
            self.contents.lock().unwrap().push(source);
        }

        fn play(&self) {
            self.record(SinkCall::Play);
            *self.paused.lock().unwrap() = false;
        }

        fn pause(&self) {
            self.record(SinkCall::Pause);
            *self.paused.lock().unwrap() = true;
        }

        fn stop(&self) {
            self.record(SinkCall::Stop);
            self.contents.lock().unwrap().clear();
        }

        fn is_paused(&self) -> bool {
            *self.paused.lock().unwrap()
        }

        fn empty(&self) -> bool {
            self.contents.lock().unwrap().is_empty()
        }

        fn position(&self) -> Duration {
            *self.position.lock().unwrap()
        }

        fn seek(&self, position: Duration) -> Result<(), String> {
            self.record(SinkCall::Seek(position));
            Ok(())
        }

        fn set_volume(&self, _volume: f32) {}
    }

    fn playhead() -> (Arc<FakeSink>, Playhead<FakeSink>) {
        let sink = Arc::new(FakeSink::default());
        (sink.clone(), Playhead::new(sink))
    }

    #[test]
    fn superseded_source_is_never_appended() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        playhead.begin_load(RequestId(2));
        sink.take_calls();

        assert!(!playhead.queue(RequestId(1), RequestId(1)));
        assert!(sink.take_calls().is_empty());

        assert!(playhead.queue(RequestId(2), RequestId(2)));
        assert_eq!(
            sink.take_calls(),
            vec![SinkCall::Append(RequestId(2)), SinkCall::Pause]
        );
        assert_eq!(sink.contents(), vec![RequestId(2)]);
    }

    #[test]
    fn queued_source_waits_for_start() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        playhead.queue(RequestId(1), RequestId(1));
        sink.take_calls();

        assert!(playhead.start(RequestId(1)));
        assert_eq!(sink.take_calls(), vec![SinkCall::Play]);
    }

    #[test]
    fn start_before_decode_plays_on_append() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        assert!(playhead.start(RequestId(1)));
        sink.take_calls();

        playhead.queue(RequestId(1), RequestId(1));
        assert_eq!(
            sink.take_calls(),
            vec![SinkCall::Append(RequestId(1)), SinkCall::Play]
        );
        assert!(!playhead.start(RequestId(0)));
    }

    #[test]
    fn poll_reports_progress_then_end_once() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        playhead.start(RequestId(1));
        playhead.queue(RequestId(1), RequestId(1));
        *sink.position.lock().unwrap() = Duration::from_secs(4);

        assert_eq!(
            playhead.poll(),
            Some(EngineEvent::new(
                RequestId(1),
                EngineEventKind::Progress {
                    position: Duration::from_secs(4)
                }
            ))
        );

        sink.finish_current();
        assert_eq!(
            playhead.poll(),
            Some(EngineEvent::new(RequestId(1), EngineEventKind::Ended))
        );
        assert_eq!(playhead.poll(), None);
    }

    #[test]
    fn poll_is_silent_while_paused_or_empty_slot() {
        let (_sink, playhead) = playhead();
        assert_eq!(playhead.poll(), None);

        playhead.begin_load(RequestId(1));
        playhead.queue(RequestId(1), RequestId(1));
        assert_eq!(playhead.poll(), None);
    }

    #[test]
    fn newer_track_is_not_reported_as_ended() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        playhead.start(RequestId(1));
        playhead.queue(RequestId(1), RequestId(1));

        playhead.begin_load(RequestId(2));
        playhead.start(RequestId(2));
        playhead.queue(RequestId(2), RequestId(2));

        let event = playhead.poll().unwrap();
        assert_eq!(event.request, RequestId(2));
        assert!(matches!(event.kind, EngineEventKind::Progress { .. }));
        assert_eq!(sink.contents(), vec![RequestId(2)]);
    }

    #[test]
    fn seek_needs_a_queued_source() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        sink.take_calls();
        playhead.seek(Duration::from_secs(10));
        assert!(sink.take_calls().is_empty());

        playhead.queue(RequestId(1), RequestId(1));
        sink.take_calls();
        playhead.seek(Duration::from_secs(10));
        assert_eq!(sink.take_calls(), vec![SinkCall::Seek(Duration::from_secs(10))]);
    }

    #[test]
    fn release_clears_the_sink() {
        let (sink, playhead) = playhead();
        playhead.begin_load(RequestId(1));
        playhead.start(RequestId(1));
        playhead.queue(RequestId(1), RequestId(1));

        playhead.release();
        assert!(sink.contents().is_empty());
        assert_eq!(playhead.poll(), None);
    }

    #[test]
    fn concurrent_loads_leave_only_the_latest_source() {
        const LOADS: u64 = 500;

        for _ in 0..20 {
            let (sink, playhead) = playhead();
            let playhead = Arc::new(playhead);

            let decoder = {
                let playhead = playhead.clone();
                thread::spawn(move || {
                    for n in 1..=LOADS {
                        playhead.queue(RequestId(n), RequestId(n));
                    }
                })
            };
            for n in 1..=LOADS {
                playhead.begin_load(RequestId(n));
            }
            decoder.join().unwrap();

            assert!(
                sink.contents().iter().all(|r| *r == RequestId(LOADS)),
                "stale source left in sink: {:?}",
                sink.contents()
            );
        }
    }
}
