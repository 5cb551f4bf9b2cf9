//! Output sink: the process-wide audio device.
//!
//! The rodio implementation keeps the `OutputStream` alive on its own
//! thread for the lifetime of the process (the stream handle is not `Send`
//! on every platform) and plays each request through a fresh `Sink` on the
//! stream's mixer. Rendering is paced by the device, not by the caller.
//! Requests are decoded ahead on their own thread, so the device callback
//! never reads from the network.

use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use rodio::mixer::Mixer;
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::{debug, warn};

use crate::config::OutputSettings;
use crate::error::{PlayerError, Result};

use super::source::PlayRequest;

/// Decoded packets kept ready between the decoder and the device.
const DECODE_AHEAD_PACKETS: usize = 16;

/// Audio output device abstraction driven by the engine.
///
/// The engine calls `clear` before every `play`, so at most one request is
/// active at a time.
pub trait OutputSink: Send + Sync {
    /// Start rendering `request` on the device's own cadence.
    fn play(&self, request: PlayRequest) -> Result<()>;
    /// Suspend rendering without losing position.
    fn pause(&self);
    /// Continue a paused request.
    fn resume(&self);
    /// Stop rendering and drop the active request without signalling completion.
    fn clear(&self);
    /// Release the device. Only called at process shutdown.
    fn close(&self);
}

/// rodio-backed output sink.
pub struct RodioSink {
    mixer: Mixer,
    active: Mutex<Option<Sink>>,
    shutdown: Mutex<Option<Sender<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl RodioSink {
    /// Open the default output device with the configured rate and buffer size.
    pub fn init(settings: &OutputSettings) -> Result<Self> {
        let settings = settings.clone();
        let (ready_tx, ready_rx) = bounded::<Result<Mixer>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread_settings = settings.clone();
        let join = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let mut stream = match open_stream(&thread_settings) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // rodio logs to stderr when the stream is dropped; too noisy for a terminal client.
                stream.log_on_drop(false);
                let _ = ready_tx.send(Ok(stream.mixer().clone()));

                // Park until shutdown (or until the sink itself is dropped).
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("audio output closed");
            })
            .map_err(|e| PlayerError::Output(format!("failed to spawn output thread: {e}")))?;

        let mixer = ready_rx
            .recv()
            .map_err(|_| PlayerError::Output("output thread exited during init".to_string()))??;

        debug!(
            sample_rate = settings.sample_rate,
            buffer_frames = settings.buffer_frames,
            "audio output ready"
        );

        Ok(Self {
            mixer,
            active: Mutex::new(None),
            shutdown: Mutex::new(Some(shutdown_tx)),
            join: Mutex::new(Some(join)),
        })
    }

    fn active(&self) -> std::sync::MutexGuard<'_, Option<Sink>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_stream(settings: &OutputSettings) -> Result<OutputStream> {
    OutputStreamBuilder::from_default_device()
        .map_err(|e| PlayerError::Output(format!("no audio output device: {e}")))?
        .with_sample_rate(settings.sample_rate)
        .with_buffer_size(rodio::cpal::BufferSize::Fixed(settings.buffer_frames))
        .open_stream_or_fallback()
        .map_err(|e| PlayerError::Output(format!("failed to open audio output: {e}")))
}

impl OutputSink for RodioSink {
    fn play(&self, request: PlayRequest) -> Result<()> {
        let request = request.decode_ahead(DECODE_AHEAD_PACKETS)?;
        let mut active = self.active();
        if active.as_ref().is_some_and(|s| !s.empty()) {
            warn!("play requested while a source is still attached; replacing it");
        }
        if let Some(old) = active.take() {
            old.stop();
        }

        let sink = Sink::connect_new(&self.mixer);
        sink.append(RenderSource { request });
        sink.play();
        *active = Some(sink);
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = self.active().as_ref() {
            sink.pause();
        }
    }

    fn resume(&self) {
        if let Some(sink) = self.active().as_ref() {
            sink.play();
        }
    }

    fn clear(&self) {
        if let Some(sink) = self.active().take() {
            sink.stop();
        }
    }

    fn close(&self) {
        self.clear();
        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }
        if let Some(handle) = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
    }
}

/// Adapts a `PlayRequest` to rodio's `Source`.
struct RenderSource {
    request: PlayRequest,
}

impl Iterator for RenderSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        self.request.next()
    }
}

impl Source for RenderSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.request.format().channels
    }

    fn sample_rate(&self) -> u32 {
        self.request.format().sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.request.format().total_duration()
    }
}
