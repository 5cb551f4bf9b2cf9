//! Decoder adapter: turns a byte stream into a sequence of decoded frames.
//!
//! `DecoderAdapter` is the seam the engine decodes through; the shipped
//! implementation is backed by Symphonia and works on forward-only streams.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

use crate::error::{PlayerError, Result};

use super::stream::ByteStream;
use super::types::{Frame, StreamFormat};

// A corrupt packet is skipped; this many in a row ends the stream with an error.
const MAX_DECODE_RETRIES: usize = 3;

/// Pull-based source of decoded frames for one track.
pub trait FrameSource: Send {
    /// Next decoded frame, `Ok(None)` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the decoder and the underlying stream. Must be safe to call twice.
    fn close(&mut self);
}

/// A freshly opened decoder plus the format it discovered.
pub struct DecodedStream {
    pub format: StreamFormat,
    pub frames: Box<dyn FrameSource>,
}

/// Opens a decoder over a byte stream.
///
/// Implementations must decode far enough to know the format; a stream whose
/// first frame cannot be decoded is rejected with `PlayerError::Decode`.
pub trait DecoderAdapter: Send + Sync {
    fn open(&self, stream: ByteStream) -> Result<DecodedStream>;
}

/// Symphonia-backed decoder for mp3, aac, flac, vorbis, wav and mp4 audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaAdapter;

impl DecoderAdapter for SymphoniaAdapter {
    fn open(&self, stream: ByteStream) -> Result<DecodedStream> {
        let mut hint = Hint::new();
        if let Some(mime) = stream.content_type.as_deref() {
            // Strip parameters such as "; charset=binary".
            let mime = mime.split(';').next().unwrap_or(mime).trim();
            hint.mime_type(mime);
        }
        if let Some(ext) = stream.extension.as_deref() {
            hint.with_extension(ext);
        }

        let source = ReadOnlySource::new(stream.into_reader());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(open_error)?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlayerError::Decode("no audio track found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| PlayerError::Decode(format!("unsupported codec: {e}")))?;

        let mut frames = SymphoniaFrames {
            inner: Some(DecoderState {
                format,
                decoder,
                track_id,
                sample_buf: None,
                spec_rate: None,
            }),
            pending: None,
        };

        // Decode the first frame up front: it proves the content is audio and
        // carries the real output rate and channel layout.
        let first = frames
            .decode_next()?
            .ok_or_else(|| PlayerError::Decode("stream contains no audio frames".to_string()))?;

        let format = StreamFormat {
            sample_rate: frames
                .output_rate()
                .or(params.sample_rate)
                .unwrap_or(44_100),
            channels: first.channels,
            total_frames: params.n_frames,
        };
        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            total_frames = ?format.total_frames,
            "decoder opened"
        );

        frames.pending = Some(first);
        Ok(DecodedStream {
            format,
            frames: Box::new(frames),
        })
    }
}

fn open_error(e: SymphoniaError) -> PlayerError {
    match e {
        SymphoniaError::IoError(e) => {
            PlayerError::StreamUnavailable(format!("stream ended while probing: {e}"))
        }
        SymphoniaError::Unsupported(what) => {
            PlayerError::Decode(format!("unsupported format: {what}"))
        }
        other => PlayerError::Decode(other.to_string()),
    }
}

struct DecoderState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<f32>>,
    spec_rate: Option<u32>,
}

struct SymphoniaFrames {
    inner: Option<DecoderState>,
    pending: Option<Frame>,
}

impl SymphoniaFrames {
    /// Rate of the last decoded packet, which may differ from the container's claim.
    fn output_rate(&self) -> Option<u32> {
        self.inner.as_ref().and_then(|s| s.spec_rate)
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(None);
        };

        let mut decode_errors = 0;
        loop {
            let packet = match state.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(PlayerError::Decode(format!("read failed: {e}"))),
            };

            if packet.track_id() != state.track_id {
                continue;
            }

            match state.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity();
                    let channels = spec.channels.count() as u16;
                    state.spec_rate = Some(spec.rate);

                    let reuse = state
                        .sample_buf
                        .as_ref()
                        .is_some_and(|buf| buf.capacity() >= capacity * usize::from(channels));
                    if !reuse {
                        state.sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
                    }

                    let Some(buf) = state.sample_buf.as_mut() else {
                        continue;
                    };
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(Frame {
                        samples: buf.samples().to_vec(),
                        channels,
                    }));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    decode_errors += 1;
                    trace!(error = e, decode_errors, "skipping corrupt packet");
                    if decode_errors > MAX_DECODE_RETRIES {
                        return Err(PlayerError::Decode(format!("corrupt stream: {e}")));
                    }
                }
                Err(e) => return Err(PlayerError::Decode(e.to_string())),
            }
        }
    }
}

impl FrameSource for SymphoniaFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.decode_next()
    }

    fn close(&mut self) {
        // Dropping the format reader drops the media source and with it the connection.
        self.pending = None;
        self.inner = None;
    }
}
