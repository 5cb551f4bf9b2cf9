//! Network byte streams feeding the decoder.
//!
//! `StreamOpener` is the seam between the engine and the network. The HTTP
//! implementation issues a single GET and hands the response body over as a
//! forward-only reader.
//!
//! The body itself is read on a small pump thread into a bounded chunk
//! queue. The consuming side waits on that queue together with the cancel
//! signal and an optional stall timer, so a server that stops sending can
//! neither hang the decoder nor outlive a cancel.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, after, bounded, never, select};
use tracing::{debug, warn};

use crate::config::NetworkSettings;
use crate::error::{PlayerError, Result};

/// Bytes requested from the body per pump read.
const CHUNK_BYTES: usize = 16 * 1024;
/// Chunks the pump may read ahead of the decoder.
const READ_AHEAD_CHUNKS: usize = 8;

/// An open, forward-only byte stream plus the hints needed to probe it.
pub struct ByteStream {
    reader: StreamReader,
    /// MIME type announced by the server, if any.
    pub content_type: Option<String>,
    /// File extension taken from the URL path, if any.
    pub extension: Option<String>,
}

impl ByteStream {
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        let (cancel, cancelled) = CancelHandle::new();
        Self {
            reader: StreamReader {
                body: Mutex::new(Some(Box::new(reader))),
                chunks: None,
                pending: Vec::new(),
                pos: 0,
                cancel,
                cancelled,
                stall_timeout: None,
            },
            content_type: None,
            extension: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    /// Fail a read with `TimedOut` when no bytes arrive for `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reader.stall_timeout = timeout;
        self
    }

    /// Handle that makes every further read report end-of-stream.
    ///
    /// Cancelling never blocks and wakes a read that is already waiting.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.reader.cancel.clone()
    }

    pub fn into_reader(self) -> StreamReader {
        self.reader
    }
}

/// Cancels a `ByteStream` from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug)]
struct CancelState {
    cancelled: AtomicBool,
    /// Dropped on cancel; readers wait on the matching receiver disconnecting.
    wake: Mutex<Option<Sender<()>>>,
}

impl CancelHandle {
    fn new() -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(0);
        let handle = Self {
            inner: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                wake: Mutex::new(Some(tx)),
            }),
        };
        (handle, rx)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner
            .wake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

type Chunk = io::Result<Vec<u8>>;

/// `Read` adapter over the network body.
///
/// The raw body waits behind a mutex until the first read starts the pump;
/// every field is `Sync`, which the decoder's media source requires.
pub struct StreamReader {
    body: Mutex<Option<Box<dyn Read + Send>>>,
    chunks: Option<Receiver<Chunk>>,
    pending: Vec<u8>,
    pos: usize,
    cancel: CancelHandle,
    cancelled: Receiver<()>,
    stall_timeout: Option<Duration>,
}

impl StreamReader {
    fn start_pump(&mut self) -> io::Result<Receiver<Chunk>> {
        let (tx, rx) = bounded(READ_AHEAD_CHUNKS);
        let body = self
            .body
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // A body that was already handed to a pump leaves `rx` disconnected: end of stream.
        if let Some(body) = body {
            thread::Builder::new()
                .name("stream-pump".to_string())
                .spawn(move || pump(body, tx))?;
        }
        Ok(rx)
    }

    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.chunks.is_none() {
            self.chunks = Some(self.start_pump()?);
        }
        let Some(chunks) = self.chunks.as_ref() else {
            return Ok(None);
        };
        let stall = self.stall_timeout.map_or_else(never, after);

        select! {
            recv(chunks) -> msg => match msg {
                Ok(Ok(chunk)) => Ok(Some(chunk)),
                Ok(Err(e)) => Err(e),
                Err(_) => Ok(None),
            },
            recv(self.cancelled) -> _ => Ok(None),
            recv(stall) -> _ => {
                warn!(timeout = ?self.stall_timeout, "stream stalled");
                Err(io::Error::new(io::ErrorKind::TimedOut, "no data from server"))
            }
        }
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.cancel.is_cancelled() {
            return Ok(0);
        }
        if self.pos >= self.pending.len() {
            match self.next_chunk()? {
                Some(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Copy `body` into `tx` until it ends, fails, or nobody is listening any more.
fn pump(mut body: Box<dyn Read + Send>, tx: Sender<Chunk>) {
    loop {
        let mut chunk = vec![0u8; CHUNK_BYTES];
        match body.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                chunk.truncate(n);
                if tx.send(Ok(chunk)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

/// Opens a byte stream for a track URL.
pub trait StreamOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<ByteStream>;
}

/// Streams track bodies over HTTP(S).
pub struct HttpStreamOpener {
    agent: ureq::Agent,
    user_agent: String,
    stall_timeout: Option<Duration>,
}

impl HttpStreamOpener {
    pub fn new(settings: &NetworkSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(settings.connect_timeout()))
            .timeout_recv_response(Some(settings.response_timeout()))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            user_agent: settings.user_agent.clone(),
            stall_timeout: settings.stall_timeout(),
        }
    }
}

impl StreamOpener for HttpStreamOpener {
    fn open(&self, url: &str) -> Result<ByteStream> {
        debug!(url, "opening stream");

        let resp = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| PlayerError::StreamUnavailable(format!("{url}: {e}")))?;

        let content_type = resp
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let (_, body) = resp.into_parts();
        Ok(ByteStream::new(body.into_reader())
            .with_content_type(content_type)
            .with_extension(url_extension(url))
            .with_stall_timeout(self.stall_timeout))
    }
}

/// Extension of the last path segment of `url`, lowercased.
pub(crate) fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_host, path) = without_scheme.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
