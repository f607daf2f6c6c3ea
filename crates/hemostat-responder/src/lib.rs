//! Responder agent: bounded, auditable remediation.
//!
//! Every request runs the same guard ladder (existence, dry-run,
//! cooldown, circuit breaker, single-writer lock) before the runtime
//! is touched, and produces exactly one outcome either way. Failed
//! attempts count against the circuit breaker; that property is what
//! prevents restart loops.

pub mod actions;
pub mod config;
pub mod responder;
pub mod safety;

pub use config::ResponderConfig;
pub use responder::ResponderAgent;
