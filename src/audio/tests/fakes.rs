//! In-process stand-ins for the network, the decoder and the audio device.
//!
//! Track URLs carry their own decoder script after the `?`:
//! `frames:N` decodes N packets, `stream:N` does the same without announcing
//! a length, `fail-after:N` breaks after N packets, anything else is not audio.
//! A URL on host `down` cannot be opened.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::audio::{
    ByteStream, DecodedStream, DecoderAdapter, Frame, FrameSource, OutputSink, PlayRequest,
    PlaybackEngine, StreamFormat, StreamOpener, TransportState,
};
use crate::catalog::Track;
use crate::config::PlaybackSettings;
use crate::error::{PlayerError, Result};

pub const RATE: u32 = 1_000;
pub const CHANNELS: u16 = 2;
/// Frames per decoded packet: 100 ms at `RATE`.
pub const PACKET_FRAMES: u64 = 100;
pub const PACKET_SAMPLES: usize = PACKET_FRAMES as usize * CHANNELS as usize;

pub fn track(name: &str, script: &str) -> Track {
    track_on("server", name, script)
}

pub fn track_on(host: &str, name: &str, script: &str) -> Track {
    Track {
        id: name.to_string(),
        name: name.to_string(),
        artist: None,
        album: None,
        duration: Duration::from_secs(180),
        url: format!("fake://{host}/{name}?{script}"),
    }
}

pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[derive(Default)]
pub struct FakeOpener {
    opened: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Receiver<()>>>,
}

impl FakeOpener {
    /// Make the next open of `url` block until the returned sender fires or is dropped.
    pub fn gate(&self, url: &str) -> Sender<()> {
        let (tx, rx) = bounded(1);
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl StreamOpener for FakeOpener {
    fn open(&self, url: &str) -> Result<ByteStream> {
        self.opened.lock().unwrap().push(url.to_string());

        let gate = self.gates.lock().unwrap().remove(url);
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        let rest = url
            .strip_prefix("fake://")
            .ok_or_else(|| PlayerError::StreamUnavailable(format!("unsupported url {url}")))?;
        if rest.starts_with("down/") {
            return Err(PlayerError::StreamUnavailable(format!("{url}: connection refused")));
        }
        let script = rest.split_once('?').map_or("", |(_, s)| s).to_string();
        Ok(ByteStream::new(Cursor::new(script.into_bytes())))
    }
}

#[derive(Default)]
pub struct FakeDecoder {
    opened: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Total `FrameSource::close` calls across every decoder handed out.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl DecoderAdapter for FakeDecoder {
    fn open(&self, stream: ByteStream) -> Result<DecodedStream> {
        let mut script = String::new();
        stream
            .into_reader()
            .read_to_string(&mut script)
            .map_err(|e| PlayerError::StreamUnavailable(e.to_string()))?;

        let (kind, count) = script.split_once(':').unwrap_or((script.as_str(), ""));
        let packets: u64 = count.parse().unwrap_or(0);
        let (known_length, fail) = match kind {
            "frames" => (true, false),
            "stream" => (false, false),
            "fail-after" => (true, true),
            _ => return Err(PlayerError::Decode(format!("not audio: {script:?}"))),
        };
        if packets == 0 {
            return Err(PlayerError::Decode("stream contains no audio frames".to_string()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(DecodedStream {
            format: StreamFormat {
                sample_rate: RATE,
                channels: CHANNELS,
                total_frames: known_length.then_some(packets * PACKET_FRAMES),
            },
            frames: Box::new(ScriptFrames::new(packets, fail, self.closes.clone())),
        })
    }
}

pub struct ScriptFrames {
    remaining: u64,
    fail: bool,
    closes: Arc<AtomicUsize>,
}

impl ScriptFrames {
    pub fn new(packets: u64, fail: bool, closes: Arc<AtomicUsize>) -> Self {
        Self {
            remaining: packets,
            fail,
            closes,
        }
    }
}

impl FrameSource for ScriptFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(Some(Frame {
                samples: vec![0.25; PACKET_SAMPLES],
                channels: CHANNELS,
            }));
        }
        if self.fail {
            return Err(PlayerError::Decode("corrupt packet".to_string()));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Play(u64),
    Pause,
    Resume,
    Clear,
    Close,
}

/// Records every call and holds the active request so tests can render it by hand.
#[derive(Default)]
pub struct FakeSink {
    calls: Mutex<Vec<SinkCall>>,
    active: Mutex<Option<PlayRequest>>,
}

impl FakeSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn plays(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Play(_)))
            .count()
    }

    /// Pull up to `samples` interleaved samples from the active request.
    pub fn render(&self, samples: usize) -> usize {
        let mut active = self.active.lock().unwrap();
        match active.as_mut() {
            Some(request) => request.by_ref().take(samples).count(),
            None => 0,
        }
    }

    /// Drain the active request to its end, as the device does when a track runs out.
    pub fn finish(&self) -> bool {
        match self.take_active() {
            Some(mut request) => {
                request.by_ref().for_each(drop);
                true
            }
            None => false,
        }
    }

    pub fn take_active(&self) -> Option<PlayRequest> {
        self.active.lock().unwrap().take()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl OutputSink for FakeSink {
    fn play(&self, request: PlayRequest) -> Result<()> {
        self.record(SinkCall::Play(request.session()));
        let old = self.active.lock().unwrap().replace(request);
        drop(old);
        Ok(())
    }

    fn pause(&self) {
        self.record(SinkCall::Pause);
    }

    fn resume(&self) {
        self.record(SinkCall::Resume);
    }

    fn clear(&self) {
        self.record(SinkCall::Clear);
        let old = self.active.lock().unwrap().take();
        drop(old);
    }

    fn close(&self) {
        self.record(SinkCall::Close);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    State(TransportState),
    Track(String),
    Progress(Duration, Duration),
    Error(PlayerError),
}

/// Collects every observer notification in arrival order.
#[derive(Clone, Default)]
pub struct Recorder {
    notes: Arc<Mutex<Vec<Note>>>,
}

impl Recorder {
    pub fn attach(engine: &PlaybackEngine) -> Self {
        let recorder = Self::default();

        let notes = recorder.notes.clone();
        engine.on_state_change(move |s| notes.lock().unwrap().push(Note::State(s)));
        let notes = recorder.notes.clone();
        engine.on_track_change(move |t| notes.lock().unwrap().push(Note::Track(t.name.clone())));
        let notes = recorder.notes.clone();
        engine.on_progress(move |p, d| notes.lock().unwrap().push(Note::Progress(p, d)));
        let notes = recorder.notes.clone();
        engine.on_error(move |e| notes.lock().unwrap().push(Note::Error(e.clone())));

        recorder
    }

    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<TransportState> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn tracks(&self) -> Vec<String> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::Track(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<(Duration, Duration)> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::Progress(p, d) => Some((p, d)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<PlayerError> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub sink: Arc<FakeSink>,
    pub opener: Arc<FakeOpener>,
    pub decoder: Arc<FakeDecoder>,
    pub notes: Recorder,
}

pub fn harness() -> Harness {
    harness_with(PlaybackSettings {
        progress_interval_ms: 10,
        ..PlaybackSettings::default()
    })
}

pub fn harness_with(settings: PlaybackSettings) -> Harness {
    let sink = Arc::new(FakeSink::default());
    let opener = Arc::new(FakeOpener::default());
    let decoder = Arc::new(FakeDecoder::default());
    let engine = PlaybackEngine::new(sink.clone(), opener.clone(), decoder.clone(), settings);
    let notes = Recorder::attach(&engine);
    Harness {
        engine,
        sink,
        opener,
        decoder,
        notes,
    }
}
