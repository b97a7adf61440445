//! Scheduled cycle worker

pub mod processor;

pub use processor::{CycleWorker, WorkerConfig};
