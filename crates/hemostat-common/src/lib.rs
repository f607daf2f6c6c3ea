//! Shared schema for the HemoStat control pipeline.
//!
//! The four agents exchange messages exclusively through the broker;
//! this crate holds the message shapes, the envelope, and the
//! channel/key layout so no agent needs another agent's crate.

pub mod envelope;
pub mod id;
pub mod keys;
pub mod types;

pub use envelope::Envelope;
pub use keys::{channels, keys as store_keys, kinds};
