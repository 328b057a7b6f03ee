//! Multi-frame messages.
//!
//! Every message on the wire follows the same layout:
//!
//! ```text
//! +--------------------+
//! | 0: destination id  |
//! +--------------------+
//! | 1: command         |
//! +--------------------+
//! | 2: source id       |
//! +--------------------+
//! | 3+: arguments      |
//! +--------------------+
//! ```
//!
//! On receipt, the transport replaces frame 0 with the identity of the peer
//! the message came from.

use std::collections::VecDeque;
use std::fmt;

/// A single opaque frame.
pub type Frame = Vec<u8>;

/// Ordered sequence of frames.
///
/// A `Message` is owned by exactly one function at a time: consuming it
/// (sending, replying) takes it by value, so its frames are released when that
/// scope ends on every path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    frames: VecDeque<Frame>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame at the end.
    pub fn push_back(&mut self, frame: impl Into<Frame>) {
        self.frames.push_back(frame.into());
    }

    /// Prepends a frame (e.g. a routing identity).
    pub fn push_front(&mut self, frame: impl Into<Frame>) {
        self.frames.push_front(frame.into());
    }

    /// Builder-style variant of [`push_back`](Self::push_back).
    pub fn with(mut self, frame: impl Into<Frame>) -> Self {
        self.push_back(frame);
        self
    }

    pub fn pop_front(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Pops the first frame and decodes it as UTF-8 (lossily).
    pub fn pop_string(&mut self) -> Option<String> {
        self.pop_front()
            .map(|frame| String::from_utf8_lossy(&frame).into_owned())
    }

    pub fn peek(&self) -> Option<&[u8]> {
        self.frames.front().map(Vec::as_slice)
    }

    /// First frame as UTF-8, if present and valid.
    pub fn peek_str(&self) -> Option<&str> {
        self.peek().and_then(|frame| std::str::from_utf8(frame).ok())
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.frames.back().map(Vec::as_slice)
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    /// Frame at `index` as UTF-8, if present and valid.
    pub fn get_str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|frame| std::str::from_utf8(frame).ok())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = &[u8]> {
        self.frames.iter().map(Vec::as_slice)
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames.into()
    }
}

impl From<Vec<Frame>> for Message {
    fn from(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl<const N: usize> From<[&str; N]> for Message {
    fn from(frames: [&str; N]) -> Self {
        frames.into_iter().map(|f| f.as_bytes().to_vec()).collect()
    }
}

impl FromIterator<Frame> for Message {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

/// Debug dump: one bracketed frame per entry, printable frames as text and
/// binary frames as upper-case hex.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if frame.iter().all(|b| (0x20..0x7f).contains(b)) {
                write!(f, "[{:03}] {}", frame.len(), String::from_utf8_lossy(frame))?;
            } else {
                write!(f, "[{:03}] ", frame.len())?;
                for b in frame {
                    write!(f, "{:02X}", b)?;
                }
            }
        }
        Ok(())
    }
}
