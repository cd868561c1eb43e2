//! Bounded scrollback for replay to late-joining subscribers.

use std::collections::VecDeque;
use std::sync::RwLock;

/// FIFO of output chunks with a total-byte cap.
///
/// When the cap is exceeded, whole chunks drop from the head until the
/// buffer fits again. A limit of zero disables buffering entirely.
pub struct Scrollback {
    inner: RwLock<ScrollbackState>,
    limit: usize,
}

#[derive(Default)]
struct ScrollbackState {
    chunks: VecDeque<Vec<u8>>,
    size: usize,
}

impl Scrollback {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: RwLock::new(ScrollbackState::default()),
            limit,
        }
    }

    /// Store a copy of the chunk, evicting from the head as needed.
    pub fn append(&self, chunk: &[u8]) {
        if chunk.is_empty() || self.limit == 0 {
            return;
        }

        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.chunks.push_back(chunk.to_vec());
        state.size += chunk.len();
        while state.size > self.limit {
            match state.chunks.pop_front() {
                Some(evicted) => state.size -= evicted.len(),
                None => break,
            }
        }
    }

    /// Deep copy of the buffered chunks, oldest first.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        state.chunks.iter().cloned().collect()
    }

    /// Total buffered bytes.
    pub fn size(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_within_limit() {
        let scrollback = Scrollback::new(100);
        scrollback.append(b"hello ");
        scrollback.append(b"world");
        assert_eq!(scrollback.size(), 11);
        assert_eq!(scrollback.snapshot(), vec![b"hello ".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn test_evicts_whole_chunks_from_head() {
        let scrollback = Scrollback::new(100);
        for tag in [b"aaaa", b"bbbb", b"cccc", b"dddd"] {
            scrollback.append(&tag.repeat(10)); // 40 bytes each
        }

        // 4 * 40 = 160 bytes written; the two oldest chunks must be gone
        assert!(scrollback.size() <= 100);
        let chunks = scrollback.snapshot();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], b"cccc".repeat(10));
        assert_eq!(chunks[1], b"dddd".repeat(10));
    }

    #[test]
    fn test_oversized_single_chunk() {
        let scrollback = Scrollback::new(10);
        scrollback.append(&[0u8; 64]);
        // A chunk larger than the limit cannot satisfy the invariant; it is
        // evicted immediately and the buffer ends empty.
        assert_eq!(scrollback.size(), 0);
        assert!(scrollback.snapshot().is_empty());
    }

    #[test]
    fn test_zero_limit_disables_buffering() {
        let scrollback = Scrollback::new(0);
        scrollback.append(b"data");
        assert_eq!(scrollback.size(), 0);
        assert!(scrollback.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let scrollback = Scrollback::new(100);
        scrollback.append(b"abc");
        let mut snapshot = scrollback.snapshot();
        snapshot[0][0] = b'z';
        assert_eq!(scrollback.snapshot()[0], b"abc");
    }
}
