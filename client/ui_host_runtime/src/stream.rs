use crate::error::Result;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum StreamItem {
    Chunk(String),
    End,
}

/// Lazy chunk sequence handed to the host's streaming writer.
///
/// `next` blocks until a chunk arrives. An idle timeout is logged and the
/// wait resumes; only the end marker (or a dropped producer) finishes it.
#[derive(Debug)]
pub struct ChunkStream {
    key: String,
    receiver: Receiver<StreamItem>,
    idle_timeout: Duration,
    finished: bool,
}

impl ChunkStream {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Iterator for ChunkStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        loop {
            match self.receiver.recv_timeout(self.idle_timeout) {
                Ok(StreamItem::Chunk(chunk)) => return Some(chunk),
                Ok(StreamItem::End) => {
                    debug!(key = %self.key, "stream ended");
                    self.finished = true;
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(key = %self.key, timeout = ?self.idle_timeout, "stream idle; still waiting for chunks");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(key = %self.key, "stream producer dropped");
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

/// Registry of open streams keyed by stream key.
#[derive(Debug)]
pub struct StreamRelay {
    streams: HashMap<String, Sender<StreamItem>>,
    idle_timeout: Duration,
}

impl Default for StreamRelay {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_IDLE_TIMEOUT)
    }
}

impl StreamRelay {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            streams: HashMap::new(),
            idle_timeout,
        }
    }

    /// Pushes one chunk. On the first chunk for `key`, `open` receives the
    /// new stream before anything is queued on it.
    pub fn push<F>(&mut self, key: &str, body: String, is_last: bool, open: F) -> Result<()>
    where
        F: FnOnce(ChunkStream) -> Result<()>,
    {
        if !self.streams.contains_key(key) {
            let (sender, receiver) = mpsc::channel();
            debug!(key, "starting stream");
            open(ChunkStream {
                key: key.to_string(),
                receiver,
                idle_timeout: self.idle_timeout,
                finished: false,
            })?;
            self.streams.insert(key.to_string(), sender);
        }

        if let Some(sender) = self.streams.get(key) {
            // A consumer that already hung up just misses the chunk.
            let _ = sender.send(StreamItem::Chunk(body));
            if is_last {
                let _ = sender.send(StreamItem::End);
            }
        }

        if is_last {
            self.streams.remove(key);
            debug!(key, "last chunk queued; stream key released");
        }

        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.streams.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drops every open stream without draining it.
    pub fn clear(&mut self) {
        self.streams.clear();
    }
}
