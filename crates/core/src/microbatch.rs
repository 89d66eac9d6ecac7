//! Per-request micro-batcher: coalesces content tokens to cut write
//! overhead without harming time-to-first-token.

use std::time::Duration;

pub const DEFAULT_BATCH_CHARS: usize = 256;
pub const DEFAULT_BATCH_MS: u64 = 16;

/// Reads the `OSU_STREAM_BATCH_CHARS` / `OSU_STREAM_BATCH_MS` overrides.
pub fn batch_chars_from_env() -> usize {
    std::env::var("OSU_STREAM_BATCH_CHARS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_BATCH_CHARS)
}

pub fn batch_interval_from_env() -> Duration {
    let ms = std::env::var("OSU_STREAM_BATCH_MS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_BATCH_MS);
    Duration::from_millis(ms)
}

/// Decides when pending content should be flushed. Does not own a timer itself;
/// the stream loop asks `should_flush` after every append and additionally flushes
/// whenever its own one-shot timer fires.
pub struct MicroBatcher {
    max_chars: usize,
    interval: Duration,
    pending: String,
    flushed_any: bool,
}

impl MicroBatcher {
    pub fn new(max_chars: usize, interval: Duration) -> Self {
        Self {
            max_chars,
            interval,
            pending: String::new(),
            flushed_any: false,
        }
    }

    pub fn from_env() -> Self {
        Self::new(batch_chars_from_env(), batch_interval_from_env())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pending_char_count(&self) -> usize {
        self.pending.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a chunk of generated text. Returns the text that should be flushed
    /// immediately (first token, or size threshold), `None` otherwise.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        if !self.flushed_any {
            // TTFT preservation: the first post-prelude token bypasses batching.
            self.flushed_any = true;
            return Some(chunk.to_string());
        }
        self.pending.push_str(chunk);
        if self.pending_char_count() >= self.max_chars {
            return self.take_pending();
        }
        None
    }

    /// Drain and return whatever is pending, if anything (size/time-threshold flush
    /// or the final synchronous flush on loop termination).
    pub fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_flushes_immediately() {
        let mut b = MicroBatcher::new(256, Duration::from_millis(16));
        assert_eq!(b.push("hi").as_deref(), Some("hi"));
    }

    #[test]
    fn subsequent_chunks_batch_until_char_threshold() {
        let mut b = MicroBatcher::new(4, Duration::from_secs(1));
        b.push("first"); // immediate
        assert_eq!(b.push("ab"), None);
        assert_eq!(b.push("cd").as_deref(), Some("abcd"));
    }

    #[test]
    fn take_pending_drains_remainder() {
        let mut b = MicroBatcher::new(999, Duration::from_secs(1));
        b.push("first");
        b.push("rest");
        assert_eq!(b.take_pending().as_deref(), Some("rest"));
        assert_eq!(b.take_pending(), None);
    }
}
