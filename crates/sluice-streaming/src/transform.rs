//! Sentinel-aware chunk transform.
//!
//! The renderer knows nothing about the shell wrapped around its output.
//! This filter passes rendered chunks through until the end-of-render
//! sentinel shows up, strips it, and appends the template tail exactly once.

use bytes::Bytes;

/// Output of a single `push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Bytes safe to send now. May be empty while a possible sentinel prefix
    /// is held back.
    Forward(Bytes),
    /// Sentinel found: `output` ends with the tail and nothing else may follow.
    Complete {
        output: Bytes,
        /// Bytes that followed the sentinel in the same chunk and were dropped.
        discarded: usize,
    },
}

/// Transform misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("Chunk received after the end-of-render sentinel")]
    AlreadyComplete,
}

/// Streaming filter that re-attaches the template tail at the sentinel.
#[derive(Debug)]
pub struct SentinelTransform {
    sentinel: Bytes,
    tail: Bytes,
    /// Trailing bytes that could be the start of a split sentinel.
    carry: Vec<u8>,
    complete: bool,
    forwarded: usize,
}

impl SentinelTransform {
    /// Create a transform. `sentinel` must not be empty.
    pub fn new(sentinel: impl Into<Bytes>, tail: impl Into<Bytes>) -> Self {
        let sentinel = sentinel.into();
        debug_assert!(!sentinel.is_empty(), "sentinel must not be empty");
        Self {
            sentinel,
            tail: tail.into(),
            carry: Vec::new(),
            complete: false,
            forwarded: 0,
        }
    }

    /// Feed one rendered chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Step, TransformError> {
        if self.complete {
            return Err(TransformError::AlreadyComplete);
        }

        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(chunk);

        if let Some(idx) = find(&buf, &self.sentinel) {
            let discarded = buf.len() - idx - self.sentinel.len();
            buf.truncate(idx);
            buf.extend_from_slice(&self.tail);
            return Ok(self.complete_with(buf, discarded));
        }

        let keep = partial_suffix(&buf, &self.sentinel);
        self.carry = buf.split_off(buf.len() - keep);
        self.forwarded += buf.len();
        Ok(Step::Forward(Bytes::from(buf)))
    }

    /// Signal end of input. Flushes any held-back bytes and appends the tail
    /// if the sentinel never arrived. Returns `None` once the tail is out.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.complete {
            return None;
        }
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(&self.tail);
        match self.complete_with(buf, 0) {
            Step::Complete { output, .. } => Some(output),
            Step::Forward(_) => None,
        }
    }

    /// Whether the tail has been appended.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Total bytes emitted so far, tail included.
    pub fn bytes_forwarded(&self) -> usize {
        self.forwarded
    }

    fn complete_with(&mut self, buf: Vec<u8>, discarded: usize) -> Step {
        self.complete = true;
        self.forwarded += buf.len();
        Step::Complete {
            output: Bytes::from(buf),
            discarded,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Length of the longest suffix of `buf` that is a proper prefix of `needle`.
fn partial_suffix(buf: &[u8], needle: &[u8]) -> usize {
    let max = needle.len().saturating_sub(1).min(buf.len());
    (1..=max)
        .rev()
        .find(|&k| buf.ends_with(&needle[..k]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTINEL: &str = "<vite-streaming-end></vite-streaming-end>";
    const TAIL: &str = "</div></body></html>";

    fn run(transform: &mut SentinelTransform, chunks: &[&[u8]]) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut discarded_total = 0;
        for chunk in chunks {
            match transform.push(chunk).unwrap() {
                Step::Forward(bytes) => out.extend_from_slice(&bytes),
                Step::Complete { output, discarded } => {
                    out.extend_from_slice(&output);
                    discarded_total += discarded;
                    break;
                }
            }
        }
        if let Some(rest) = transform.finish() {
            out.extend_from_slice(&rest);
        }
        (out, discarded_total)
    }

    // === Basic forwarding ===

    #[test]
    fn test_forwards_plain_chunks() {
        let mut transform = SentinelTransform::new(SENTINEL, TAIL);
        let step = transform.push(b"<div>hello</div>").unwrap();
        assert_eq!(step, Step::Forward(Bytes::from_static(b"<div>hello</div>")));
    }

    #[test]
    fn test_short_marker_example() {
        let mut transform = SentinelTransform::new("<marker>", "</html>");
        let (out, discarded) = run(&mut transform, &[b"<div>A", b"B</div><marker>"]);

        assert_eq!(out, b"<div>AB</div></html>");
        assert_eq!(discarded, 0);
    }

    #[test]
    fn test_sentinel_in_single_chunk() {
        let mut transform = SentinelTransform::new(SENTINEL, TAIL);
        let chunk = format!("<p>done</p>{}", SENTINEL);
        let step = transform.push(chunk.as_bytes()).unwrap();

        assert_eq!(
            step,
            Step::Complete {
                output: Bytes::from(format!("<p>done</p>{}", TAIL)),
                discarded: 0,
            }
        );
        assert!(transform.is_complete());
    }

    // === Chunk boundaries ===

    #[test]
    fn test_sentinel_split_at_every_boundary() {
        let document = format!("<main>content</main>{}", SENTINEL);
        let bytes = document.as_bytes();

        for split in 1..bytes.len() {
            let mut transform = SentinelTransform::new(SENTINEL, TAIL);
            let (out, _) = run(&mut transform, &[&bytes[..split], &bytes[split..]]);
            let out = String::from_utf8(out).unwrap();

            assert_eq!(out, format!("<main>content</main>{}", TAIL), "split at {}", split);
            assert!(!out.contains("vite-streaming-end"));
        }
    }

    #[test]
    fn test_sentinel_split_byte_by_byte() {
        let document = format!("<i>x</i>{}", SENTINEL);
        let chunks: Vec<&[u8]> = document.as_bytes().chunks(1).collect();

        let mut transform = SentinelTransform::new(SENTINEL, TAIL);
        let (out, _) = run(&mut transform, &chunks);

        assert_eq!(String::from_utf8(out).unwrap(), format!("<i>x</i>{}", TAIL));
    }

    #[test]
    fn test_false_prefix_is_released() {
        let mut transform = SentinelTransform::new(SENTINEL, TAIL);

        let first = transform.push(b"<p>a</p><vite").unwrap();
        assert_eq!(first, Step::Forward(Bytes::from_static(b"<p>a</p>")));

        let second = transform.push(b"-other>").unwrap();
        assert_eq!(second, Step::Forward(Bytes::from_static(b"<vite-other>")));
    }

    // === Completion ===

    #[test]
    fn test_trailing_bytes_are_discarded() {
        let mut transform = SentinelTransform::new("<end>", "</html>");
        let step = transform.push(b"a<end>junk").unwrap();

        assert_eq!(
            step,
            Step::Complete {
                output: Bytes::from_static(b"a</html>"),
                discarded: 4,
            }
        );
    }

    #[test]
    fn test_push_after_complete_fails() {
        let mut transform = SentinelTransform::new("<end>", "</html>");
        transform.push(b"<end>").unwrap();

        assert_eq!(transform.push(b"more"), Err(TransformError::AlreadyComplete));
        assert_eq!(transform.finish(), None);
    }

    #[test]
    fn test_finish_without_sentinel_appends_tail_once() {
        let mut transform = SentinelTransform::new("<end>", "</html>");
        assert_eq!(
            transform.push(b"partial<e").unwrap(),
            Step::Forward(Bytes::from_static(b"partial"))
        );

        assert_eq!(transform.finish(), Some(Bytes::from_static(b"<e</html>")));
        assert_eq!(transform.finish(), None);
    }

    #[test]
    fn test_bytes_forwarded_counts_tail() {
        let mut transform = SentinelTransform::new("<end>", "TAIL");
        run(&mut transform, &[b"abc", b"<end>"]);
        assert_eq!(transform.bytes_forwarded(), 7);
    }

    #[test]
    fn test_partial_suffix() {
        assert_eq!(partial_suffix(b"abc<en", b"<end>"), 3);
        assert_eq!(partial_suffix(b"abc", b"<end>"), 0);
        assert_eq!(partial_suffix(b"<", b"<end>"), 1);
        assert_eq!(partial_suffix(b"", b"<end>"), 0);
    }
}
