//! Command vocabulary carried in frame 1 of every message.

use std::fmt;

/// Control token of a message.
///
/// `SequenceNumber` is not a literal token on the wire: any all-digit token
/// parses to it, and the numeric value stays in the original frame. Callers
/// that need the number keep the raw token next to the parsed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Ping,
    Pong,
    Request,
    SequenceNumber,
    Ok,
    Error,
    Unknown,
}

impl Command {
    /// Every variant, in declaration order.
    pub const ALL: [Command; 8] = [
        Command::Connect,
        Command::Ping,
        Command::Pong,
        Command::Request,
        Command::SequenceNumber,
        Command::Ok,
        Command::Error,
        Command::Unknown,
    ];

    /// Parses a token. Total: anything unrecognised is `Unknown`.
    ///
    /// # Example
    ///
    /// ```
    /// use freelance_common::protocol::Command;
    ///
    /// assert_eq!(Command::parse("PING"), Command::Ping);
    /// assert_eq!(Command::parse("123"), Command::SequenceNumber);
    /// assert_eq!(Command::parse(""), Command::Unknown);
    /// assert_eq!(Command::parse("ping"), Command::Unknown);
    /// ```
    pub fn parse(token: &str) -> Command {
        if token.is_empty() {
            return Command::Unknown;
        }

        if is_numeric(token) {
            return Command::SequenceNumber;
        }

        Command::ALL
            .into_iter()
            .find(|command| command.as_str() == token)
            .unwrap_or(Command::Unknown)
    }

    /// Parses a token that may be absent (missing frame).
    pub fn parse_opt(token: Option<&str>) -> Command {
        token.map(Command::parse).unwrap_or(Command::Unknown)
    }

    /// Literal wire token of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::Request => "REQUEST",
            Command::SequenceNumber => "SEQUENCE_NUMBER",
            Command::Ok => "OK",
            Command::Error => "ERROR",
            Command::Unknown => "UNKNOWN",
        }
    }
}

fn is_numeric(token: &str) -> bool {
    token.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Command {
    fn from(token: &str) -> Self {
        Command::parse(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_token_is_sequence_number() {
        assert_eq!(Command::parse("123"), Command::SequenceNumber);
        assert_eq!(Command::parse("0"), Command::SequenceNumber);
        assert_eq!(Command::parse("18446744073709551616999"), Command::SequenceNumber);
    }

    #[test]
    fn test_empty_or_absent_token_is_unknown() {
        assert_eq!(Command::parse(""), Command::Unknown);
        assert_eq!(Command::parse_opt(None), Command::Unknown);
    }

    #[test]
    fn test_literal_tokens_round_trip() {
        for command in Command::ALL {
            assert_eq!(Command::parse(command.as_str()), command);
        }
    }

    #[test]
    fn test_garbage_is_unknown() {
        assert_eq!(Command::parse("WTF is that?!"), Command::Unknown);
        assert_eq!(Command::parse("12a"), Command::Unknown);
        assert_eq!(Command::parse("-12"), Command::Unknown);
        assert_eq!(Command::parse(" PING"), Command::Unknown);
    }
}
