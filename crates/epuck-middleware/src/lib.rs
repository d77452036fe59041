//! `epuck-middleware` – Telemetry plumbing.
//!
//! Routes events between the explorer, the motor serializer and whoever is
//! watching (the CLI, a test) without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus on Tokio broadcast
//!   channels, with the best-effort `write_message` sink.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
