//! Consolidated test modules.
//!
//! This module contains end-to-end tests exercising the full route tree
//! against a real (temp-file) SQLite database and a stubbed upstream
//! provider.

#[cfg(feature = "database-sqlite")]
mod support;

#[cfg(all(test, feature = "database-sqlite"))]
mod gateway_e2e;
