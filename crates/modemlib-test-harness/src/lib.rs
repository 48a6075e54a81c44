//! modemlib-test-harness: Test utilities and mock transports for modemlib.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the AT engine without a real modem. A [`MockHandle`] stays with the test
//! after the transport has been moved into the engine, so the test can
//! inject unsolicited modem output and inspect what the engine wrote.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport};
