//! Stop-sequence detection via a rolling tail buffer, O(L*k) per chunk.

/// Tracks a bounded suffix of emitted text and scans it for configured stop sequences.
pub struct StopTail {
    stops: Vec<String>,
    max_len: usize,
    tail: String,
}

impl StopTail {
    pub fn new(stops: Vec<String>) -> Self {
        let max_len = stops.iter().map(|s| s.len()).max().unwrap_or(0);
        Self {
            stops,
            max_len,
            tail: String::new(),
        }
    }

    /// Append `chunk` and return the stop sequence found (if any) plus the content
    /// to keep — content up to but excluding the match. The match is searched for
    /// in the full pre-trim tail (prior carry-over plus this chunk) so a stop
    /// sequence spanning a chunk boundary is still found; the tail is only trimmed
    /// down to `max_len` afterward, once the search has had the full picture.
    pub fn append_and_check(&mut self, chunk: &str) -> StopOutcome {
        if self.stops.is_empty() {
            return StopOutcome {
                matched: None,
                keep: chunk.to_string(),
            };
        }

        let prior_tail_len = self.tail.len();
        self.tail.push_str(chunk);

        let mut earliest: Option<(usize, &str)> = None;
        for stop in &self.stops {
            if stop.is_empty() {
                continue;
            }
            if let Some(pos) = self.tail.find(stop.as_str()) {
                if earliest.map_or(true, |(best, _)| pos < best) {
                    earliest = Some((pos, stop.as_str()));
                }
            }
        }

        if let Some((pos, stop)) = earliest {
            let matched = stop.to_string();
            let keep = if pos > prior_tail_len {
                self.tail[prior_tail_len..pos].to_string()
            } else {
                String::new()
            };
            self.tail.clear();
            return StopOutcome {
                matched: Some(matched),
                keep,
            };
        }

        if self.tail.len() > self.max_len {
            let excess = self.tail.len() - self.max_len;
            self.tail = self.tail[excess..].to_string();
        }

        StopOutcome {
            matched: None,
            keep: chunk.to_string(),
        }
    }
}

pub struct StopOutcome {
    pub matched: Option<String>,
    pub keep: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_stops_passes_chunks_through() {
        let mut tail = StopTail::new(vec![]);
        let out = tail.append_and_check("hello");
        assert!(out.matched.is_none());
        assert_eq!(out.keep, "hello");
    }

    #[test]
    fn detects_stop_within_single_chunk() {
        let mut tail = StopTail::new(vec!["STOP".to_string()]);
        let out = tail.append_and_check("helloSTOPworld");
        assert_eq!(out.matched.as_deref(), Some("STOP"));
        assert_eq!(out.keep, "hello");
    }

    #[test]
    fn detects_stop_across_chunk_boundary() {
        let mut tail = StopTail::new(vec!["STOP".to_string()]);
        assert!(tail.append_and_check("heSTO").matched.is_none());
        let out = tail.append_and_check("Pworld");
        assert_eq!(out.matched.as_deref(), Some("STOP"));
    }
}
