//! Structured logging setup. See [`tracing_init::init_tracing`].

mod tracing_init;

pub use tracing_init::init_tracing;
