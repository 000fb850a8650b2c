pub mod client;

pub use client::{ClientFactory, ProxyCredentials, TlsMode};
