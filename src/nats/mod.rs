//! NATS messaging: cycle triggers from the API to the worker

pub mod client;
pub mod messages;

pub use client::NatsClient;
pub use messages::{CycleKind, CycleTrigger, SUBJECT_CYCLE_COMPOST, SUBJECT_CYCLE_REDISTRIBUTE};
