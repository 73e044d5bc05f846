//! Injected dependencies for the model layer.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Sagas stamp `fetch_time` on terminal actions through the model's clock;
/// tests inject a fixed clock to make cache staleness deterministic.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
