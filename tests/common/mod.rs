#![allow(dead_code)]
//! Shared integration test utilities.

use proptest::prelude::ProptestConfig;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Routes the crate's lifecycle logs to the test harness output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_thread_names(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Few cases: every case spins up real OS threads.
pub fn thread_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}
