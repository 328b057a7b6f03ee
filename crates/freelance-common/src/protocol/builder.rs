//! Message construction and the server-side reply dispatch.

use tracing::{debug, warn};
use uuid::Uuid;

use super::command::Command;
use super::error::{FreelanceError, Result};
use super::message::{Frame, Message};

/// Builds and answers wire messages on behalf of one local identity.
///
/// `Protocol` never blocks and keeps no state besides the source identity it
/// stamps into frame 2 of every message it creates.
///
/// # Example
///
/// ```
/// use freelance_common::protocol::Protocol;
/// use uuid::Uuid;
///
/// let protocol = Protocol::new("10.0.0.1").unwrap();
/// let key = Uuid::new_v4();
///
/// let request = protocol.request("tcp://10.0.0.2:5555", &key).unwrap();
/// assert_eq!(request.len(), 4);
/// assert_eq!(request.get_str(1), Some("REQUEST"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    source: String,
}

impl Protocol {
    /// Creates a protocol stamping `source` as the sender identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `source` is empty.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = validate(source.into(), "Source's identity")?;
        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `[destination, CONNECT, source]`
    pub fn connect(&self, destination: &str) -> Result<Message> {
        self.create_checked(Command::Connect, destination)
    }

    /// `[destination, PING, source]`
    pub fn ping(&self, destination: &str) -> Result<Message> {
        self.create_checked(Command::Ping, destination)
    }

    /// `[destination, PONG, source]`
    pub fn pong(&self, destination: &str) -> Result<Message> {
        self.create_checked(Command::Pong, destination)
    }

    /// `[destination, REQUEST, source, key]`
    pub fn request(&self, destination: &str, key: &Uuid) -> Result<Message> {
        Ok(self
            .create_checked(Command::Request, destination)?
            .with(key.to_string()))
    }

    /// `[destination, sequence number, source, key]`
    ///
    /// Used once a request has been admitted and numbered, so that replies can
    /// be correlated with it.
    pub fn request_with_sequence(
        &self,
        destination: &str,
        key: &Uuid,
        sequence_number: u64,
    ) -> Result<Message> {
        validate_destination(destination)?;
        Ok(self
            .create(sequence_number.to_string(), destination)
            .with(key.to_string()))
    }

    /// `[destination, ERROR, source, message]`
    pub fn error(&self, destination: &str, message: &str) -> Result<Message> {
        Ok(self
            .create_checked(Command::Error, destination)?
            .with(message))
    }

    /// Answers a received message.
    ///
    /// Pops destination, command and source, then:
    ///
    /// - `PING` gets a `PONG` back to the sender.
    /// - `REQUEST` or a sequence number gets
    ///   `[sender, OK | sequence number, source, key, provider(key)]`.
    /// - Anything else (including a request with a missing or malformed key)
    ///   gets `[sender, UNKNOWN, source, original token, ""]`.
    ///
    /// The received message is consumed on every path.
    pub fn reply<F>(&self, mut request: Message, provider: F) -> Message
    where
        F: FnOnce(&Uuid) -> Vec<u8>,
    {
        debug!(message = %request, "Replying to message");

        let destination = request.pop_front().unwrap_or_default();
        let token = request.pop_string().unwrap_or_default();
        let command = Command::parse(&token);
        let source = request.pop_string().unwrap_or_default();

        let reply = match command {
            Command::Ping => self.create(Command::Pong.as_str(), destination),
            Command::Request | Command::SequenceNumber => {
                match request.pop_string().and_then(|key| Uuid::parse_str(&key).ok()) {
                    Some(key) => {
                        let tag = if command == Command::Request {
                            Command::Ok.as_str().to_string()
                        } else {
                            token
                        };
                        let payload = provider(&key);
                        self.create(tag, destination)
                            .with(key.to_string())
                            .with(payload)
                    }
                    None => self.unknown(&token, destination, &source),
                }
            }
            _ => self.unknown(&token, destination, &source),
        };

        debug!(message = %reply, "Reply built");
        reply
    }

    fn unknown(&self, token: &str, destination: Frame, source: &str) -> Message {
        warn!(
            "Failed to handle [{}] request from [{}]: replying with [{}]",
            token,
            source,
            Command::Unknown
        );
        self.create(Command::Unknown.as_str(), destination)
            .with(token)
            .with(Vec::new())
    }

    fn create_checked(&self, command: Command, destination: &str) -> Result<Message> {
        validate_destination(destination)?;
        Ok(self.create(command.as_str(), destination))
    }

    fn create(&self, command: impl Into<Frame>, destination: impl Into<Frame>) -> Message {
        Message::new()
            .with(destination)
            .with(command)
            .with(self.source.as_str())
    }
}

fn validate(value: String, name: &str) -> Result<String> {
    if value.is_empty() {
        return Err(FreelanceError::InvalidArgument(format!(
            "{} must NOT be empty",
            name
        )));
    }
    Ok(value)
}

fn validate_destination(destination: &str) -> Result<()> {
    if destination.is_empty() {
        return Err(FreelanceError::InvalidArgument(
            "Destination's endpoint must NOT be empty".to_string(),
        ));
    }
    Ok(())
}
