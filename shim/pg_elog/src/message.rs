//! Fixed-capacity, NUL-terminated message buffer.
//!
//! [`MessageBuf`] behaves like the destination of `snprintf`: content is
//! capped at `N - 1` bytes, the byte after the content is always `0`, and
//! every write reports itself as complete so a formatter keeps running after
//! the buffer fills up. Excess bytes are dropped and the buffer remembers
//! that it truncated.
//!
//! Readers see the buffer the way C code would: content ends at the first
//! NUL byte, even if a `%c` of `'\0'` placed one in the middle.

use std::borrow::Cow;
use std::ffi::CStr;
use std::{fmt, io};

/// Capacity of the error message buffer, terminator included.
pub const MESSAGE_CAPACITY: usize = 512;

/// A bounded byte buffer that is always NUL-terminated within `N` bytes.
#[derive(Clone)]
pub struct MessageBuf<const N: usize = MESSAGE_CAPACITY> {
    bytes: [u8; N],
    /// Bytes written, excluding the terminator. Always `< N`.
    end: usize,
    truncated: bool,
}

impl<const N: usize> MessageBuf<N> {
    const HAS_TERMINATOR_ROOM: () = assert!(N > 0, "MessageBuf needs room for the terminator");

    /// Total capacity in bytes, terminator included.
    pub const CAPACITY: usize = N;

    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        let () = Self::HAS_TERMINATOR_ROOM;
        MessageBuf {
            bytes: [0; N],
            end: 0,
            truncated: false,
        }
    }

    /// Reset to the empty string.
    pub fn clear(&mut self) {
        self.bytes[0] = 0;
        self.end = 0;
        self.truncated = false;
    }

    /// Replace the content with `data`, truncating at capacity.
    pub fn set(&mut self, data: &[u8]) {
        self.clear();
        self.push_bytes(data);
    }

    /// Append as much of `data` as fits. Returns the number of bytes kept.
    pub fn push_bytes(&mut self, data: &[u8]) -> usize {
        let room = N - 1 - self.end;
        let take = data.len().min(room);
        self.bytes[self.end..self.end + take].copy_from_slice(&data[..take]);
        self.end += take;
        self.bytes[self.end] = 0;
        if take < data.len() {
            self.truncated = true;
        }
        take
    }

    /// The content as C sees it: everything before the first NUL.
    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(&self.bytes[..=self.end]).unwrap_or_default()
    }

    /// Content bytes without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        self.as_c_str().to_bytes()
    }

    /// Content decoded as UTF-8, with invalid sequences replaced.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// Whether any write since the last `clear` was cut short.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> Default for MessageBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> io::Write for MessageBuf<N> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<const N: usize> fmt::Write for MessageBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

impl<const N: usize> fmt::Display for MessageBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> fmt::Debug for MessageBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuf")
            .field("content", &self.to_string_lossy())
            .field("truncated", &self.truncated)
            .finish()
    }
}
