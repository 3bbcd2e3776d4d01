//! Port allocation utilities for tests
//!
//! This module provides utilities for dynamically allocating unique ports
//! to prevent conflicts when tests run in parallel.

use std::sync::atomic::{AtomicU16, Ordering};

/// Global port counter to prevent port conflicts in parallel tests
/// Starts at 50000 to avoid conflicts with system ports and common development ports
static PORT_COUNTER: AtomicU16 = AtomicU16::new(50000);

/// Helper function to get a unique port for testing
///
/// This function uses an atomic counter to ensure each test gets a unique port,
/// preventing conflicts when tests run in parallel.
pub fn get_unique_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Helper function to get a unique unreachable address for testing failures
///
/// This is useful for testing connection errors: nothing listens on the
/// returned port.
pub fn get_unreachable_address() -> (String, u16) {
    ("127.0.0.1".to_string(), get_unique_test_port())
}
