//! Fixed-capacity storage for one input line.

/// Owned, bounded byte buffer holding a single line.
///
/// The capacity is fixed at construction and never grows; pushes beyond it
/// are refused. The tokenizer mutates the stored bytes in place.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl LineBuffer {
    /// Create an empty buffer that holds at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Append a byte. Returns `false` (and stores nothing) when full.
    pub fn try_push(&mut self, byte: u8) -> bool {
        if self.len < self.buf.len() {
            self.buf[self.len] = byte;
            self.len += 1;
            true
        } else {
            false
        }
    }

    /// Remove the last byte. Returns `false` if there was nothing to remove.
    pub fn backspace(&mut self) -> bool {
        if self.len > 0 {
            self.len -= 1;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Clear and zero the whole storage, e.g. after holding a password.
    pub fn wipe(&mut self) {
        self.buf.fill(0);
        self.len = 0;
    }

    /// Replace the contents, truncating to the capacity.
    pub fn set(&mut self, bytes: &[u8]) {
        let copy_len = bytes.len().min(self.buf.len());
        self.buf[..copy_len].copy_from_slice(&bytes[..copy_len]);
        self.len = copy_len;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Stored bytes, writable in place.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_backspace() {
        let mut buf = LineBuffer::with_capacity(8);
        for b in b"help" {
            assert!(buf.try_push(*b));
        }
        assert!(buf.backspace());
        assert!(buf.backspace());
        assert_eq!(buf.as_bytes(), b"he");
    }

    #[test]
    fn test_backspace_on_empty_is_noop() {
        let mut buf = LineBuffer::with_capacity(4);
        assert!(!buf.backspace());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_push_refused_when_full() {
        let mut buf = LineBuffer::with_capacity(3);
        assert!(buf.try_push(b'a'));
        assert!(buf.try_push(b'b'));
        assert!(buf.try_push(b'c'));
        assert!(buf.is_full());
        assert!(!buf.try_push(b'd'));
        assert_eq!(buf.as_bytes(), b"abc");
        assert_eq!(buf.capacity(), 3);
    }

    #[test]
    fn test_set_truncates_to_capacity() {
        let mut buf = LineBuffer::with_capacity(4);
        buf.set(b"show wpm");
        assert_eq!(buf.as_bytes(), b"show");
        buf.clear();
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_wipe_zeroes_storage() {
        let mut buf = LineBuffer::with_capacity(4);
        buf.set(b"pass");
        buf.wipe();
        assert!(buf.is_empty());
        buf.set(&[]);
        assert!(buf.buf.iter().all(|&b| b == 0));
    }
}
