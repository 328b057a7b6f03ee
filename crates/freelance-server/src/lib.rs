//! Freelance Server
//!
//! This crate provides the reply side of the Freelance pattern: a server that
//! answers PINGs and keyed requests from any number of clients.

pub mod provider;
pub mod server;

pub use provider::{hash_provider, Provider};
pub use server::ReplyServer;
