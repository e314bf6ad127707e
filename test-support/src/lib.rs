pub mod fake_postmark;
pub mod fake_turnstile;

use simplelog::{Config, LevelFilter, TestLogger};

/// Routes `tracing` events (through their `log` records) to the test output.
pub fn setup_logging() {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}
