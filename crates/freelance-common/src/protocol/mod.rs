pub mod builder;
pub mod command;
pub mod error;
pub mod message;


pub use builder::Protocol;
pub use command::Command;
pub use error::{FreelanceError, Result};
pub use message::{Frame, Message};
