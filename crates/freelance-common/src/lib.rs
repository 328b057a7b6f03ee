//! Freelance Common Types and Transport
//!
//! This crate provides the wire protocol, the time source and the TCP
//! transport shared by the Freelance client runtime and reply server.
//!
//! # Overview
//!
//! Freelance is a broker-less request/reply pattern: a client connects to
//! several independent servers, routes each request to whichever server
//! currently looks healthy, and fails over on its own. This crate contains the
//! pieces both sides need:
//!
//! - **Protocol Layer**: command vocabulary, multi-frame messages, message
//!   construction and the server-side reply dispatch
//! - **Clock**: injectable monotonic time for every deadline in the runtime
//! - **Transport Layer**: identity-routing TCP transport
//!
//! # Architecture
//!
//! Every message is a sequence of frames:
//! - **Frame 0**: destination identity (replaced by the sender's identity on
//!   receipt)
//! - **Frame 1**: command token, or a decimal sequence number once a request
//!   has been admitted
//! - **Frame 2**: source identity
//! - **Frames 3+**: request key (UUID string) and reply payload
//!
//! # Components
//!
//! - [`protocol`] - `Command`, `Message`, `Protocol`, `FreelanceError`
//! - [`clock`] - `Clock`, `MonotonicClock`, `ManualClock`
//! - [`transport`] - `Router` trait, frame codec and `TcpRouter`
//!
//! # Example
//!
//! ```
//! use freelance_common::{Command, Protocol};
//! use uuid::Uuid;
//!
//! let client = Protocol::new("client-1").unwrap();
//! let server = Protocol::new("server-1").unwrap();
//!
//! let key = Uuid::new_v4();
//! let request = client.request("server-1", &key).unwrap();
//!
//! // the server sees its peer's identity in frame 0
//! let reply = server.reply(request, |key| key.as_bytes().to_vec());
//! assert_eq!(Command::parse_opt(reply.get_str(1)), Command::Ok);
//! ```

pub mod clock;
pub mod protocol;
pub mod transport;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use protocol::*;
