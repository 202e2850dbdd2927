//! Shared CLI helpers for the training binaries.

pub mod common;

pub use common::{configure_threads, init_tracing, BackendKind, RuntimeArgs};
