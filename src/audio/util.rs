use rodio::{
    Device, DeviceTrait, OutputStream, OutputStreamBuilder, Sink,
    cpal::{
        BufferSize, SampleFormat, SampleRate, StreamConfig, default_host,
        traits::HostTrait,
    },
};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::audio::error::AudioError;

fn setup_device_config(buffer_frames: u32) -> Result<(Device, StreamConfig, SampleFormat), AudioError> {
    let host = default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceError("no default output device".to_string()))?;

    let preferred = device
        .supported_output_configs()
        .ok()
        .and_then(|configs| configs.max_by_key(|cfg| cfg.max_sample_rate().0));

    let (config, sample_format) = match preferred {
        Some(default_config) => (
            StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.max_sample_rate(),
                buffer_size: BufferSize::Fixed(buffer_frames),
            },
            default_config.sample_format(),
        ),
        None => {
            warn!("output_device_config_fallback");
            (
                StreamConfig {
                    channels: 2,
                    sample_rate: SampleRate(48000),
                    buffer_size: BufferSize::Fixed(buffer_frames),
                },
                SampleFormat::F32,
            )
        }
    };

    Ok((device, config, sample_format))
}

fn construct_sink(buffer_frames: u32) -> Result<(OutputStream, Sink), AudioError> {
    let (device, config, sample_format) = setup_device_config(buffer_frames)?;
    let device_name = device.name().unwrap_or_else(|_| "(unknown)".to_string());

    let stream = OutputStreamBuilder::default()
        .with_buffer_size(config.buffer_size)
        .with_sample_rate(config.sample_rate.0)
        .with_device(device)
        .with_sample_format(sample_format)
        .open_stream_or_fallback()
        .map_err(|e| AudioError::DeviceError(e.to_string()))?;
    let mixer = stream.mixer();
    let sink = Sink::connect_new(mixer);

    info!(
        device = device_name.as_str(),
        sample_rate = config.sample_rate.0,
        "output_stream_opened"
    );
    Ok((stream, sink))
}

/// Keeps the output stream alive on a dedicated thread; only the sink is
/// shared with the rest of the player.
pub struct OutputThread {
    stop_tx: Option<flume::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OutputThread {
    pub async fn spawn(buffer_frames: u32) -> Result<(Arc<Sink>, Self), AudioError> {
        Self::spawn_with(move || {
            construct_sink(buffer_frames).map(|(stream, sink)| (stream, Arc::new(sink)))
        })
        .await
    }

    /// Runs `open` on the output thread. Whatever it keeps stays on that
    /// thread until shutdown; the shared half is handed back.
    async fn spawn_with<K, T, F>(open: F) -> Result<(T, Self), AudioError>
    where
        F: FnOnce() -> Result<(K, T), AudioError> + Send + 'static,
        K: 'static,
        T: Send + 'static,
    {
        let (ready_tx, ready_rx) = flume::bounded::<Result<T, AudioError>>(1);
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("beatbazaar-output".to_string())
            .spawn(move || match open() {
                Ok((keep, shared)) => {
                    let _ = ready_tx.send(Ok(shared));
                    let _ = stop_rx.recv();
                    drop(keep);
                    info!("output_stream_closed");
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| AudioError::DeviceError(e.to_string()))?;

        let shared = ready_rx
            .recv_async()
            .await
            .map_err(|_| AudioError::DeviceError("output thread exited early".to_string()))??;

        Ok((
            shared,
            Self {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            },
        ))
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the output thread to close the stream. Inside a tokio runtime
    /// the join happens on the blocking pool, so async callers never wait on
    /// the device.
    pub fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || join_output(handle));
            }
            Err(_) => join_output(handle),
        }
    }
}

fn join_output(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("output_thread_panicked");
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
