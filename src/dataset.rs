//! Windowed sequence source for next-byte prediction.
//!
//! Turns a raw byte buffer into fixed-length overlapping (input, target)
//! windows, where the target sequence is the input shifted forward by one
//! byte. The windows are raw, unmodified source bytes; any shuffling is a
//! policy of the consumer, not a property of this source.

use crate::error::{Error, Result};

/// Overlapping (input, target) windows over a byte buffer.
///
/// For a buffer of length `N` and window length `L < N` there are exactly
/// `N - L` valid windows: window `i` is `(buffer[i..i+L], buffer[i+1..i+L+1])`.
pub struct ByteWindows<'a> {
    data: &'a [u8],
    window: usize,
}

impl<'a> ByteWindows<'a> {
    /// Create a window source over `data`.
    ///
    /// Fails with `InsufficientData` when the buffer cannot produce at least
    /// one full window, i.e. when `data.len() <= window`.
    pub fn new(data: &'a [u8], window: usize) -> Result<Self> {
        if window == 0 || data.len() <= window {
            return Err(Error::InsufficientData {
                len: data.len(),
                window,
            });
        }
        Ok(Self { data, window })
    }

    /// Number of valid windows.
    pub fn len(&self) -> usize {
        self.data.len() - self.window
    }

    /// Always false: construction guarantees at least one window.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Window length.
    pub fn window(&self) -> usize {
        self.window
    }

    /// The (input, target) pair starting at offset `idx`, if in range.
    pub fn get(&self, idx: usize) -> Option<(&'a [u8], &'a [u8])> {
        if idx >= self.len() {
            return None;
        }
        let input = &self.data[idx..idx + self.window];
        let target = &self.data[idx + 1..idx + self.window + 1];
        Some((input, target))
    }

    /// Lazy, restartable iteration over all windows in buffer order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + '_ {
        let data = self.data;
        let window = self.window;
        (0..self.len()).map(move |i| (&data[i..i + window], &data[i + 1..i + window + 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_count_matches_buffer() {
        let data = b"abcdefghij";
        let ws = ByteWindows::new(data, 4).unwrap();
        assert_eq!(ws.len(), data.len() - 4);
        assert_eq!(ws.iter().count(), data.len() - 4);
    }

    #[test]
    fn target_is_input_shifted_by_one() {
        let data = b"the quick brown fox";
        let ws = ByteWindows::new(data, 5).unwrap();
        for (input, target) in ws.iter() {
            assert_eq!(input.len(), 5);
            assert_eq!(target.len(), 5);
            for t in 0..4 {
                assert_eq!(target[t], input[t + 1]);
            }
        }
    }

    #[test]
    fn adjacent_windows_overlap() {
        let data = b"0123456789";
        let ws = ByteWindows::new(data, 3).unwrap();
        for k in 0..ws.len() - 1 {
            let (cur, _) = ws.get(k).unwrap();
            let (next, _) = ws.get(k + 1).unwrap();
            assert_eq!(next[0], cur[1]);
        }
    }

    #[test]
    fn short_buffer_is_rejected() {
        let data = b"abc";
        match ByteWindows::new(data, 3) {
            Err(Error::InsufficientData { len, window }) => {
                assert_eq!(len, 3);
                assert_eq!(window, 3);
            }
            other => panic!("expected InsufficientData, got {:?}", other.map(|_| ())),
        }
        assert!(ByteWindows::new(data, 8).is_err());
    }

    #[test]
    fn out_of_range_get_is_none() {
        let data = b"abcdef";
        let ws = ByteWindows::new(data, 2).unwrap();
        assert!(ws.get(ws.len()).is_none());
        assert!(ws.get(0).is_some());
    }
}
