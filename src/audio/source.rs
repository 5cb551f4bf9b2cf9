//! Decoded audio on its way to the output sink.
//!
//! A loaded track is split in two: the `TrackSource` that the sink consumes
//! and the `PlaybackCursor` that stays with the engine. The cursor is the
//! engine's window into the source (frames played, total length) and the
//! switch that shuts it down without touching the rendering thread.
//!
//! A source can decode inline, on whatever thread pulls samples, or ahead
//! on its own thread. The second mode is for real devices: the render
//! callback then only drains a bounded queue and renders silence while the
//! decoder catches up, so it never waits on the network.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError, bounded};

use crate::error::{PlayerError, Result};

use super::decoder::FrameSource;
use super::stream::CancelHandle;
use super::types::{Frame, SinkEvent, StreamFormat};

/// How often a decode thread blocked on a full queue rechecks for close.
const CLOSE_POLL: Duration = Duration::from_millis(50);

/// Shared position and lifetime state for a loaded track.
#[derive(Debug)]
pub struct PlaybackCursor {
    format: StreamFormat,
    frames_played: AtomicU64,
    closed: AtomicBool,
    stream_cancel: CancelHandle,
}

impl PlaybackCursor {
    pub fn new(format: StreamFormat, stream_cancel: CancelHandle) -> Self {
        Self {
            format,
            frames_played: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            stream_cancel,
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    pub fn position(&self) -> Duration {
        self.format.frames_to_duration(self.frames_played())
    }

    /// Total length as reported by the decoder, if it knows it.
    pub fn total(&self) -> Option<Duration> {
        self.format.total_duration()
    }

    /// Stop the source and cut the network stream. Returns `true` only for
    /// the call that actually closed it.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.stream_cancel.cancel();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn advance(&self, frames: u64) {
        self.frames_played.fetch_add(frames, Ordering::AcqRel);
    }
}

/// Where a `TrackSource` gets its packets from.
enum Feed {
    Inline(Box<dyn FrameSource>),
    /// Packets decoded ahead by a `decode` thread. That thread owns and closes the decoder.
    Ahead(Receiver<Result<Frame>>),
    Released,
}

/// Sample-by-sample view over a `FrameSource`, accounting played frames on the cursor.
pub struct TrackSource {
    feed: Feed,
    cursor: Arc<PlaybackCursor>,
    buf: Vec<f32>,
    idx: usize,
    buf_frames: u64,
}

impl TrackSource {
    pub fn new(frames: Box<dyn FrameSource>, cursor: Arc<PlaybackCursor>) -> Self {
        Self {
            feed: Feed::Inline(frames),
            cursor,
            buf: Vec::new(),
            idx: 0,
            buf_frames: 0,
        }
    }

    pub fn cursor(&self) -> &Arc<PlaybackCursor> {
        &self.cursor
    }

    /// Decode on a dedicated thread from now on. While that thread is behind,
    /// `next_sample` yields silence, one whole frame at a time, without
    /// moving the cursor.
    pub fn decode_ahead(mut self, frames: usize) -> Result<Self> {
        self.feed = match mem::replace(&mut self.feed, Feed::Released) {
            Feed::Inline(source) => {
                Feed::Ahead(spawn_decoder(source, self.cursor.clone(), frames)?)
            }
            other => other,
        };
        Ok(self)
    }

    /// Next interleaved sample, `Ok(None)` once the stream ended or was closed.
    pub fn next_sample(&mut self) -> Result<Option<f32>> {
        loop {
            if self.cursor.is_closed() {
                self.release();
                return Ok(None);
            }

            if let Some(&sample) = self.buf.get(self.idx) {
                self.idx += 1;
                return Ok(Some(sample));
            }

            // Current frame fully rendered.
            if self.buf_frames > 0 {
                self.cursor.advance(self.buf_frames);
                self.buf_frames = 0;
            }

            let pulled = match &mut self.feed {
                Feed::Inline(frames) => Some(frames.next_frame()),
                Feed::Ahead(rx) => match rx.try_recv() {
                    Ok(item) => Some(item.map(Some)),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => Some(Ok(None)),
                },
                Feed::Released => return Ok(None),
            };

            match pulled {
                Some(Ok(Some(frame))) => {
                    self.buf_frames = frame.frame_count();
                    self.buf = frame.samples;
                    self.idx = 0;
                }
                Some(Ok(None)) => {
                    self.release();
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.release();
                    return Err(e);
                }
                None => {
                    // Underrun.
                    let channels = usize::from(self.cursor.format().channels.max(1));
                    self.buf.clear();
                    self.buf.resize(channels, 0.0);
                    self.idx = 0;
                }
            }
        }
    }

    fn release(&mut self) {
        // Dropping the receiver of an `Ahead` feed stops its thread, which closes the decoder.
        if let Feed::Inline(mut frames) = mem::replace(&mut self.feed, Feed::Released) {
            frames.close();
        }
        self.buf.clear();
        self.idx = 0;
    }
}

impl Drop for TrackSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn spawn_decoder(
    mut frames: Box<dyn FrameSource>,
    cursor: Arc<PlaybackCursor>,
    capacity: usize,
) -> Result<Receiver<Result<Frame>>> {
    let (tx, rx) = bounded(capacity.max(1));
    thread::Builder::new()
        .name("decode".to_string())
        .spawn(move || {
            while !cursor.is_closed() {
                let item = match frames.next_frame() {
                    Ok(Some(frame)) => Ok(frame),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if !offer(&tx, item, &cursor) || failed {
                    break;
                }
            }
            frames.close();
        })
        .map_err(|e| PlayerError::Output(format!("failed to spawn decoder thread: {e}")))?;
    Ok(rx)
}

/// Queue `item` for the render side. Gives up once the cursor is closed or
/// the render side has dropped the queue.
fn offer(tx: &Sender<Result<Frame>>, mut item: Result<Frame>, cursor: &PlaybackCursor) -> bool {
    loop {
        match tx.send_timeout(item, CLOSE_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) if !cursor.is_closed() => item = back,
            Err(_) => return false,
        }
    }
}

/// A source handed to the output sink together with its one-shot completion signal.
///
/// Iterating it yields samples; when the source runs dry on its own the
/// signal fires exactly once, with `Finished` or `Failed`. A source that was
/// closed by the engine ends silently.
pub struct PlayRequest {
    session: u64,
    source: TrackSource,
    done: Option<Sender<SinkEvent>>,
}

impl PlayRequest {
    pub fn new(session: u64, source: TrackSource, done: Sender<SinkEvent>) -> Self {
        Self {
            session,
            source,
            done: Some(done),
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn format(&self) -> StreamFormat {
        self.source.cursor().format()
    }

    /// Move decoding onto its own thread, keeping up to `frames` packets ready.
    pub fn decode_ahead(mut self, frames: usize) -> Result<Self> {
        self.source = self.source.decode_ahead(frames)?;
        Ok(self)
    }

    fn notify(&mut self, event: SinkEvent) {
        if let Some(tx) = self.done.take() {
            // Bounded(1) and sent at most once: never blocks.
            let _ = tx.try_send(event);
        }
    }
}

impl Iterator for PlayRequest {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        match self.source.next_sample() {
            Ok(Some(sample)) => Some(sample),
            Ok(None) => {
                if !self.source.cursor().is_closed() {
                    self.notify(SinkEvent::Finished {
                        session: self.session,
                    });
                }
                None
            }
            Err(e) => {
                self.notify(SinkEvent::Failed {
                    session: self.session,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}
