use serde::Deserialize;

/// Out-of-band delimiter the instrumented program wraps around the JSON
/// `{"prompt": …}` payload it prints before blocking on stdin.
pub const INPUT_REQUEST_DELIMITER: &str = "__INPUT_REQUEST__";

const DELIM: &[u8] = INPUT_REQUEST_DELIMITER.as_bytes();

/// One classified piece of a subprocess stdout stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Output(Vec<u8>),
    InputRequest(String),
}

#[derive(Debug, Deserialize)]
struct MarkerPayload {
    prompt: String,
}

/// Streaming extractor for `DELIM…DELIM` marker spans.
///
/// Chunk boundaries carry no meaning: a marker split across any number of
/// reads is reassembled before it is reported. Bytes are only held back while
/// they could still be part of a marker, and an unterminated span is bounded
/// by `budget`; past that it is forwarded verbatim as ordinary output rather
/// than buffered indefinitely.
#[derive(Debug)]
pub struct MarkerScanner {
    /// Held-back bytes: a possible delimiter prefix, or an unterminated span
    /// still waiting for its closing delimiter.
    pending: Vec<u8>,
    budget: usize,
}

impl MarkerScanner {
    pub fn new(budget: usize) -> Self {
        Self {
            pending: Vec::new(),
            budget,
        }
    }

    /// Consumes one stdout chunk and returns the classified items in stream
    /// order. `InputRequest` items sort strictly before any output bytes that
    /// followed their marker in the underlying stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ScanItem> {
        self.pending.extend_from_slice(chunk);
        let mut items = Vec::new();
        loop {
            let Some(start) = find(&self.pending, DELIM) else {
                // No opener. Forward everything except a tail that could
                // still grow into one.
                let keep = delimiter_prefix_len(&self.pending);
                let cut = self.pending.len() - keep;
                if cut > 0 {
                    items.push(ScanItem::Output(self.pending.drain(..cut).collect()));
                }
                break;
            };

            if start > 0 {
                items.push(ScanItem::Output(self.pending.drain(..start).collect()));
            }

            let body_start = DELIM.len();
            match find(&self.pending[body_start..], DELIM) {
                Some(rel) => {
                    let payload = &self.pending[body_start..body_start + rel];
                    match serde_json::from_slice::<MarkerPayload>(payload) {
                        Ok(MarkerPayload { prompt }) => {
                            items.push(ScanItem::InputRequest(prompt));
                        }
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                "dropping input-request marker with malformed payload"
                            );
                        }
                    }
                    self.pending.drain(..body_start + rel + DELIM.len());
                }
                None => {
                    // Unterminated span: wait for the closing delimiter, but
                    // never past the byte budget. Overflow is forwarded
                    // verbatim, best effort over strict correctness.
                    if self.pending.len() > self.budget {
                        items.push(ScanItem::Output(std::mem::take(&mut self.pending)));
                    }
                    break;
                }
            }
        }
        items
    }

    /// Flushes whatever is still held back, used when the stream closes.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Length of the longest proper delimiter prefix that `tail` ends with.
fn delimiter_prefix_len(tail: &[u8]) -> usize {
    let max = (DELIM.len() - 1).min(tail.len());
    (1..=max)
        .rev()
        .find(|&k| tail[tail.len() - k..] == DELIM[..k])
        .unwrap_or(0)
}
