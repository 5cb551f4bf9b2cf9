//! The playback state machine.
//!
//! All mutable engine state sits behind one mutex. The lock is never held
//! across network or decoder setup: a load first detaches the old session,
//! then opens the stream and decoder unlocked, then locks again only to
//! install the finished session. Observer callbacks run after the lock is
//! released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, info, warn};

use crate::catalog::Track;
use crate::config::{NetworkSettings, PlaybackSettings};
use crate::error::{PlayerError, Result};

use super::decoder::{DecoderAdapter, SymphoniaAdapter};
use super::monitor::{MonitorHandle, MonitorTarget, spawn_monitor};
use super::observer::Observers;
use super::queue::TrackQueue;
use super::sink::OutputSink;
use super::source::{PlayRequest, PlaybackCursor, TrackSource};
use super::stream::{HttpStreamOpener, StreamOpener};
use super::types::{PlaybackSnapshot, SinkEvent, TransportState};

/// Handle to the playback engine. Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    me: Weak<EngineInner>,
    state: Mutex<EngineState>,
    sink: Arc<dyn OutputSink>,
    opener: Arc<dyn StreamOpener>,
    decoder: Arc<dyn DecoderAdapter>,
    observers: Observers,
    settings: PlaybackSettings,
    next_session: AtomicU64,
}

#[derive(Default)]
struct EngineState {
    transport: TransportState,
    queue: TrackQueue,
    session: Option<LoadedSession>,
    /// Last successfully loaded track. Survives `stop` so the UI can keep showing it.
    current: Option<Track>,
    /// Bumped by every call that discards the loaded session. A background
    /// auto-advance only installs its track if nothing bumped it meanwhile.
    generation: u64,
    closed: bool,
}

/// Live resources of the loaded track.
struct LoadedSession {
    id: u64,
    track: Track,
    cursor: Arc<PlaybackCursor>,
    /// Handed to the sink on the first `play`.
    request: Option<PlayRequest>,
    events: Option<Receiver<SinkEvent>>,
    attached: bool,
    monitor: Option<MonitorHandle>,
}

impl LoadedSession {
    fn duration(&self) -> Duration {
        self.cursor.total().unwrap_or(self.track.duration)
    }
}

/// Stream and decoder opened for a track, not yet installed.
struct Prepared {
    cursor: Arc<PlaybackCursor>,
    source: TrackSource,
}

impl PlaybackEngine {
    /// Build an engine over an already initialised output sink.
    pub fn new(
        sink: Arc<dyn OutputSink>,
        opener: Arc<dyn StreamOpener>,
        decoder: Arc<dyn DecoderAdapter>,
        settings: PlaybackSettings,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| EngineInner {
            me: me.clone(),
            state: Mutex::new(EngineState::default()),
            sink,
            opener,
            decoder,
            observers: Observers::default(),
            settings,
            next_session: AtomicU64::new(1),
        });
        Self { inner }
    }

    /// Engine streaming over HTTP and decoding with Symphonia.
    pub fn with_network(
        sink: Arc<dyn OutputSink>,
        network: &NetworkSettings,
        playback: PlaybackSettings,
    ) -> Self {
        Self::new(
            sink,
            Arc::new(HttpStreamOpener::new(network)),
            Arc::new(SymphoniaAdapter),
            playback,
        )
    }

    pub fn on_state_change<F>(&self, f: F)
    where
        F: Fn(TransportState) + Send + Sync + 'static,
    {
        self.inner.observers.set_state(Arc::new(f));
    }

    pub fn on_track_change<F>(&self, f: F)
    where
        F: Fn(&Track) + Send + Sync + 'static,
    {
        self.inner.observers.set_track(Arc::new(f));
    }

    /// Called with `(position, duration)` on the progress cadence while playing.
    pub fn on_progress<F>(&self, f: F)
    where
        F: Fn(Duration, Duration) + Send + Sync + 'static,
    {
        self.inner.observers.set_progress(Arc::new(f));
    }

    /// Called for failures that have no synchronous caller: mid-stream decode
    /// errors and failed auto-advance loads.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&PlayerError) + Send + Sync + 'static,
    {
        self.inner.observers.set_error(Arc::new(f));
    }

    /// Replace the queue. The cursor resets; current playback is untouched.
    pub fn set_queue(&self, tracks: Vec<Track>) -> Result<()> {
        let mut st = self.inner.lock_open()?;
        debug!(len = tracks.len(), "queue replaced");
        st.queue.set(tracks);
        Ok(())
    }

    /// Open `track` and make it the loaded session, in the `Stopped` state.
    ///
    /// Blocks on the network and the decoder; call it off the UI thread.
    pub fn load_track(&self, track: Track) -> Result<()> {
        self.inner.load_track(track)
    }

    pub fn play(&self) -> Result<()> {
        self.inner.play(None)
    }

    pub fn pause(&self) -> Result<()> {
        self.inner.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.inner.resume()
    }

    pub fn toggle_play_pause(&self) -> Result<()> {
        let (transport, loaded) = {
            let st = self.inner.lock_open()?;
            (st.transport, st.session.is_some())
        };
        match transport {
            TransportState::Playing => self.pause(),
            TransportState::Paused => self.resume(),
            TransportState::Stopped if loaded => self.play(),
            TransportState::Stopped => Ok(()),
        }
    }

    pub fn stop(&self) -> Result<()> {
        self.inner.stop()
    }

    /// Select `index` in the queue, load it and start playing.
    ///
    /// An out-of-range index is ignored.
    pub fn play_from_queue(&self, index: usize) -> Result<()> {
        self.inner.play_from_queue(index)
    }

    pub fn next(&self) -> Result<()> {
        let target = {
            let st = self.inner.lock_open()?;
            st.queue.next_index(st.queue.current_index())
        };
        match target {
            Some(index) => self.play_from_queue(index),
            None => Ok(()),
        }
    }

    pub fn previous(&self) -> Result<()> {
        let target = {
            let st = self.inner.lock_open()?;
            st.queue.previous_index(st.queue.current_index())
        };
        match target {
            Some(index) => self.play_from_queue(index),
            None => Ok(()),
        }
    }

    /// Stop playback and release the output device. Every later call fails
    /// with `PlayerError::EngineClosed`.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown()
    }

    pub fn state(&self) -> TransportState {
        self.inner.lock().transport
    }

    pub fn current_track(&self) -> Option<Track> {
        self.inner.lock().current.clone()
    }

    pub fn queue_index(&self) -> Option<usize> {
        self.inner.lock().queue.current_index()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn queue(&self) -> Vec<Track> {
        self.inner.lock().queue.tracks().to_vec()
    }

    /// Elapsed time in the loaded track; zero while stopped.
    pub fn position(&self) -> Duration {
        self.snapshot().position
    }

    /// Length of the loaded track; zero while stopped.
    pub fn duration(&self) -> Duration {
        self.snapshot().duration
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let st = self.inner.lock();
        let (position, duration) = match (&st.session, st.transport) {
            (Some(session), TransportState::Playing | TransportState::Paused) => {
                (session.cursor.position(), session.duration())
            }
            _ => (Duration::ZERO, Duration::ZERO),
        };
        PlaybackSnapshot {
            state: st.transport,
            track: st.current.clone(),
            queue_index: st.queue.current_index(),
            position,
            duration,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, EngineState>> {
        let st = self.lock();
        if st.closed {
            return Err(PlayerError::EngineClosed);
        }
        Ok(st)
    }

    /// Take the loaded session out of `st`, silence the sink and close the
    /// decoder. The session is returned so it is dropped after unlocking.
    fn detach(&self, st: &mut EngineState) -> Option<LoadedSession> {
        let session = st.session.take()?;
        if session.attached {
            self.sink.clear();
        }
        if session.cursor.close() {
            debug!(session = session.id, "session closed");
        }
        st.transport = TransportState::Stopped;
        Some(session)
    }

    fn prepare(&self, track: &Track) -> Result<Prepared> {
        let stream = self.opener.open(&track.url)?;
        let cancel = stream.cancel_handle();
        let decoded = self.decoder.open(stream)?;
        let cursor = Arc::new(PlaybackCursor::new(decoded.format, cancel));
        let source = TrackSource::new(decoded.frames, cursor.clone());
        Ok(Prepared { cursor, source })
    }

    fn load_track(&self, track: Track) -> Result<()> {
        let (old, was_active) = {
            let mut st = self.lock_open()?;
            st.generation += 1;
            let was_active = st.transport != TransportState::Stopped;
            (self.detach(&mut st), was_active)
        };
        drop(old);
        self.observers.wait_for_progress();

        let result = self.install(track, None).map(|_| ());
        if let Err(e) = &result {
            // The old session is gone; a listener that last heard Playing or Paused must learn so.
            let stopped = self.lock().transport == TransportState::Stopped;
            if was_active && stopped && *e != PlayerError::EngineClosed {
                self.observers.state_changed(TransportState::Stopped);
            }
        }
        result
    }

    /// Open `track` and install it. With `expected` set, the install is
    /// abandoned (returning `Ok(false)`) if the generation moved on.
    fn install(&self, track: Track, expected: Option<u64>) -> Result<bool> {
        let prepared = match self.prepare(&track) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(track = %track.name, error = %e, "failed to load track");
                return Err(e);
            }
        };

        let replaced = {
            let mut st = self.lock_open()?;
            if expected.is_some_and(|g| g != st.generation) {
                debug!(track = %track.name, "load superseded, discarding");
                return Ok(false);
            }

            // A concurrent load may have installed a session while we were unlocked.
            let replaced = self.detach(&mut st);

            let id = self.next_session.fetch_add(1, Ordering::Relaxed);
            let (done_tx, done_rx) = bounded::<SinkEvent>(1);
            st.session = Some(LoadedSession {
                id,
                track: track.clone(),
                cursor: prepared.cursor,
                request: Some(PlayRequest::new(id, prepared.source, done_tx)),
                events: Some(done_rx),
                attached: false,
                monitor: None,
            });
            st.transport = TransportState::Stopped;
            st.current = Some(track.clone());
            replaced
        };
        drop(replaced);

        info!(track = %track.name, url = %track.url, "track loaded");
        self.observers.track_changed(&track);
        Ok(true)
    }

    fn play(&self, expected: Option<u64>) -> Result<()> {
        let mut st = self.lock_open()?;
        if expected.is_some_and(|g| g != st.generation) {
            return Ok(());
        }
        match st.transport {
            TransportState::Playing => return Ok(()),
            TransportState::Paused => {
                drop(st);
                return self.resume();
            }
            TransportState::Stopped => {}
        }

        let interval = self.settings.progress_interval();
        let Some(session) = st.session.as_mut() else {
            return Ok(());
        };

        if session.monitor.is_none() {
            if let Some(events) = session.events.take() {
                let target: Weak<dyn MonitorTarget> = self.me.clone();
                session.monitor = Some(spawn_monitor(target, session.id, events, interval)?);
            }
        }

        let Some(request) = session.request.take() else {
            return Ok(());
        };
        let id = session.id;
        match self.sink.play(request) {
            Ok(()) => session.attached = true,
            Err(e) => {
                let old = self.detach(&mut st);
                drop(st);
                drop(old);
                warn!(session = id, error = %e, "output refused the track");
                return Err(e);
            }
        }

        st.transport = TransportState::Playing;
        drop(st);

        debug!(session = id, "playing");
        self.observers.state_changed(TransportState::Playing);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        let mut st = self.lock_open()?;
        if st.transport != TransportState::Playing || st.session.is_none() {
            return Ok(());
        }
        self.sink.pause();
        st.transport = TransportState::Paused;
        drop(st);

        debug!("paused");
        self.observers.state_changed(TransportState::Paused);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        let mut st = self.lock_open()?;
        if st.transport != TransportState::Paused || st.session.is_none() {
            return Ok(());
        }
        self.sink.resume();
        st.transport = TransportState::Playing;
        drop(st);

        debug!("resumed");
        self.observers.state_changed(TransportState::Playing);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let old = {
            let mut st = self.lock_open()?;
            st.generation += 1;
            let old = self.detach(&mut st);
            st.transport = TransportState::Stopped;
            old
        };
        drop(old);
        self.observers.wait_for_progress();

        debug!("stopped");
        self.observers.state_changed(TransportState::Stopped);
        Ok(())
    }

    fn play_from_queue(&self, index: usize) -> Result<()> {
        let track = {
            let mut st = self.lock_open()?;
            match st.queue.select(index) {
                Some(track) => track.clone(),
                None => {
                    debug!(index, len = st.queue.len(), "queue index out of range, ignoring");
                    return Ok(());
                }
            }
        };
        self.load_track(track)?;
        self.play(None)
    }

    fn shutdown(&self) -> Result<()> {
        let old = {
            let mut st = self.lock_open()?;
            st.generation += 1;
            st.closed = true;
            let old = self.detach(&mut st);
            st.transport = TransportState::Stopped;
            old
        };
        drop(old);
        self.observers.wait_for_progress();

        self.sink.close();
        info!("playback engine shut down");
        self.observers.state_changed(TransportState::Stopped);
        Ok(())
    }
}

impl MonitorTarget for EngineInner {
    fn tick(&self, session: u64) -> bool {
        let (position, duration, delivery) = {
            let st = self.lock();
            let Some(loaded) = st.session.as_ref().filter(|s| s.id == session) else {
                return false;
            };
            if st.closed {
                return false;
            }
            if st.transport != TransportState::Playing {
                return true;
            }
            // Claimed under the lock: a teardown racing this tick waits for the delivery.
            (
                loaded.cursor.position(),
                loaded.duration(),
                self.observers.claim_progress(),
            )
        };

        delivery.send(position, duration);
        true
    }

    fn complete(&self, event: SinkEvent) {
        let session = event.session();
        let failure = match &event {
            SinkEvent::Finished { .. } => None,
            SinkEvent::Failed { reason, .. } => Some(PlayerError::Decode(reason.clone())),
        };

        let (old, next, generation) = {
            let mut st = self.lock();
            if st.closed || st.session.as_ref().map(|s| s.id) != Some(session) {
                warn!(session, "completion for a replaced session, ignoring");
                return;
            }

            st.generation += 1;
            let generation = st.generation;
            let old = self.detach(&mut st);

            let advance = failure.is_none() || self.settings.advance_on_decode_error;
            let next = if advance {
                let from = st.queue.current_index();
                st.queue
                    .next_index(from)
                    .and_then(|i| st.queue.select(i).cloned())
            } else {
                None
            };
            (old, next, generation)
        };
        drop(old);

        if let Some(err) = &failure {
            warn!(session, error = %err, "playback failed mid-stream");
            self.observers.error(err);
        } else {
            debug!(session, "track finished");
        }

        let Some(track) = next else {
            self.observers.state_changed(TransportState::Stopped);
            return;
        };

        let result = self
            .install(track, Some(generation))
            .and_then(|installed| match installed {
                true => self.play(Some(generation)),
                false => Ok(()),
            });
        if let Err(e) = result {
            if e != PlayerError::EngineClosed {
                self.observers.error(&e);
                self.observers.state_changed(TransportState::Stopped);
            }
        }
    }
}
