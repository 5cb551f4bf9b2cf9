//! Playback engine: queue, network stream, decoder, output and the state
//! machine tying them together.

mod decoder;
mod engine;
mod monitor;
mod observer;
mod queue;
mod sink;
mod source;
mod stream;
mod types;

pub use decoder::{DecodedStream, DecoderAdapter, FrameSource, SymphoniaAdapter};
pub use engine::PlaybackEngine;
pub use observer::{ErrorCallback, ProgressCallback, StateCallback, TrackCallback};
pub use queue::TrackQueue;
pub use sink::{OutputSink, RodioSink};
pub use source::{PlayRequest, PlaybackCursor, TrackSource};
pub use stream::{ByteStream, CancelHandle, HttpStreamOpener, StreamOpener, StreamReader};
pub use types::{Frame, PlaybackSnapshot, SinkEvent, StreamFormat, TransportState};
