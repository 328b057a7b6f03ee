use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{FreelanceError, Result};
use crate::protocol::{Frame, Message};

/// Maximum encoded message size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const HEADER_SIZE: usize = 4;

/// Codec for multi-frame messages.
///
/// # Wire Format
///
/// ```text
/// [frame count: u32 BE] ([frame length: u32 BE] [frame bytes])*
/// ```
///
/// The whole encoded message, headers included, may not exceed
/// [`MAX_MESSAGE_SIZE`].
///
/// # Example
///
/// ```
/// use freelance_common::protocol::Message;
/// use freelance_common::transport::FrameCodec;
///
/// let message = Message::from(["server", "PING", "client"]);
///
/// let encoded = FrameCodec::encode(&message).unwrap();
/// let decoded = FrameCodec::decode(&encoded).unwrap();
///
/// assert_eq!(message, decoded);
/// ```
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a message into a single buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if the encoded size would exceed
    /// [`MAX_MESSAGE_SIZE`].
    pub fn encode(message: &Message) -> Result<Vec<u8>> {
        let size = HEADER_SIZE
            + message
                .frames()
                .map(|frame| HEADER_SIZE + frame.len())
                .sum::<usize>();
        check_size(size)?;

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&(message.len() as u32).to_be_bytes());
        for frame in message.frames() {
            buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
            buf.extend_from_slice(frame);
        }
        Ok(buf)
    }

    /// Decodes a buffer holding exactly one encoded message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if the buffer is truncated, has trailing
    /// bytes, or is larger than [`MAX_MESSAGE_SIZE`].
    pub fn decode(data: &[u8]) -> Result<Message> {
        check_size(data.len())?;

        let mut cursor = data;
        let count = take_u32(&mut cursor, "frame count")?;
        let mut frames = Vec::new();
        for index in 0..count {
            let len = take_u32(&mut cursor, "frame length")? as usize;
            if cursor.len() < len {
                return Err(FreelanceError::InvalidMessage(format!(
                    "Frame {} truncated: expected {} bytes, got {}",
                    index,
                    len,
                    cursor.len()
                )));
            }
            let (frame, rest) = cursor.split_at(len);
            frames.push(frame.to_vec());
            cursor = rest;
        }

        if !cursor.is_empty() {
            return Err(FreelanceError::InvalidMessage(format!(
                "{} trailing bytes after last frame",
                cursor.len()
            )));
        }

        Ok(Message::from(frames))
    }

    /// Writes one message to a stream and flushes it.
    pub async fn write_message<W>(stream: &mut W, message: &Message) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let encoded = Self::encode(message)?;

        stream
            .write_all(&encoded)
            .await
            .map_err(|e| map_io_error(e, "writing message"))?;

        stream
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one message from a stream.
    ///
    /// Returns `Ok(None)` if the peer closed the stream cleanly before the
    /// first byte of a new message.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The stream ends in the middle of a message
    /// - The message exceeds the maximum size (100 MB)
    /// - Reading from the stream fails
    pub async fn read_message<R>(stream: &mut R) -> Result<Option<Message>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_SIZE];
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(map_io_error(e, "reading frame count")),
        }

        let count = u32::from_be_bytes(header) as usize;
        let mut size = HEADER_SIZE + count.saturating_mul(HEADER_SIZE);
        check_size(size)?;

        // the count is peer-supplied; frames grow as their bodies arrive
        let mut frames: Vec<Frame> = Vec::with_capacity(count.min(PREALLOCATED_FRAMES));
        for _ in 0..count {
            stream
                .read_exact(&mut header)
                .await
                .map_err(|e| map_io_error(e, "reading frame length"))?;

            let len = u32::from_be_bytes(header) as usize;
            size += len;
            check_size(size)?;

            let mut frame = vec![0u8; len];
            stream
                .read_exact(&mut frame)
                .await
                .map_err(|e| map_io_error(e, "reading frame"))?;
            frames.push(frame);
        }

        Ok(Some(Message::from(frames)))
    }
}

/// Upper bound on frames reserved up front when reading a message
const PREALLOCATED_FRAMES: usize = 64;

fn take_u32(cursor: &mut &[u8], what: &str) -> Result<u32> {
    if cursor.len() < HEADER_SIZE {
        return Err(FreelanceError::InvalidMessage(format!(
            "Truncated {}",
            what
        )));
    }
    let (head, rest) = cursor.split_at(HEADER_SIZE);
    *cursor = rest;
    Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
}

fn check_size(size: usize) -> Result<()> {
    if size > MAX_MESSAGE_SIZE {
        return Err(FreelanceError::InvalidMessage(format!(
            "Message too large: {} bytes (max {} bytes)",
            size, MAX_MESSAGE_SIZE
        )));
    }
    Ok(())
}

/// Map IO errors to appropriate FreelanceError variants
///
/// - Connection errors -> `Connection`
/// - Unexpected end of stream -> `InvalidMessage`
/// - Other IO errors -> `Io`
pub(crate) fn map_io_error(err: std::io::Error, context: &str) -> FreelanceError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe => {
            FreelanceError::Connection(format!("{}: Connection lost", context))
        }
        std::io::ErrorKind::UnexpectedEof => {
            FreelanceError::InvalidMessage(format!("{}: Stream ended mid-message", context))
        }
        _ => FreelanceError::Io(err),
    }
}
