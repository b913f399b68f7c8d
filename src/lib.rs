//! Reconciles a provisioning registry against cloud VM lifecycle events.
//!
//! This crate consumes "VM created" and "VM deleted" notifications from a
//! message queue and drives the multi-step, order-dependent work needed to
//! make the registry match the control plane's view of the world. The
//! registry exposes no conditional or cascading operations, so the core of
//! the crate is an idempotent probe-then-act teardown sequence that tolerates
//! partial state from earlier failed runs and duplicate message delivery.

pub mod adapters;
pub mod clients;
pub mod consumer;
pub mod domain;
pub mod errors;
pub mod events;
pub mod reconciler;
pub mod transport;

// Re-export commonly used types
pub use consumer::{EventConsumer, Outcome, SkipReason};
pub use errors::{ReconcilerError, ReconcilerResult};
pub use events::{decode_message, DecodedMessage, EventKind, LifecycleEvent};
pub use reconciler::{Reconciler, TeardownReport, TeardownStep};
