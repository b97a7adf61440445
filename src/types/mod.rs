//! Shared types for Granary

pub mod error;

pub use error::{GranaryError, Result};
