//! Shared test utilities for delegated-crypto.
//!
//! This crate provides:
//! - A simulated key service performing real AES and RSA block transforms
//! - Scripted primitives and listeners for queue tests
//! - Known-answer fixtures
//! - Proptest generators
//! - Log capture for test runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;

use delegated_crypto::{LogFormat, TracingConfig, init_tracing};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Route the crate's logs into the test harness output.
///
/// Levels come from `DELEGATION_LOG_LEVEL` or `RUST_LOG`. Safe to call from
/// every test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        init_tracing(&TracingConfig::from_env().with_format(LogFormat::Test));
    });
}
