//! # freelance-client
//!
//! Client runtime of the Freelance pattern: one client, many equivalent
//! servers, no broker in between.
//!
//! The client sends each request to the first server it believes alive and
//! keeps resending it to live servers until a reply arrives or the request
//! times out. Servers are pinged while idle so that liveness is known before a
//! request needs it.
//!
//! - [`Client`] is the application-facing facade
//! - [`Pipeline`] is the event loop behind it
//! - [`Manager`] holds the server rotation and the in-flight request
//! - [`HeartBeater`] is a standalone liveness monitor sharing the same
//!   [`ServerHealthState`] model

pub mod client;
pub mod config;
pub mod health;
pub mod heartbeater;
pub mod manager;
pub mod pipeline;

#[cfg(test)]
mod mock;

pub use client::{Client, Reply};
pub use config::{ClientConfig, HealthSettings, HeartBeatConfig};
pub use health::{ServerHealthState, ServerRegistry};
pub use heartbeater::HeartBeater;
pub use manager::Manager;
pub use pipeline::Pipeline;
