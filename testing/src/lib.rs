//! # Saga Models Testing
//!
//! Test utilities for saga-models: deterministic mocks of the environment
//! traits so model behavior can be asserted without real time or a real
//! transport.

use chrono::{DateTime, Utc};
use saga_models_core::environment::Clock;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use saga_models_core::api::{Fetch, FetchRequest};
    use saga_models_core::error::MethodError;
    use saga_models_core::methods::MethodFuture;
    use serde_json::Value;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making `fetchTime` assertions
    /// reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use saga_models_testing::mocks::FixedClock;
    /// use saga_models_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    type FetchHandler =
        dyn Fn(&str, &FetchRequest) -> Result<Value, MethodError> + Send + Sync;
    type Seen = Arc<Mutex<Vec<(String, FetchRequest)>>>;

    /// Programmable transport for endpoint-backed methods.
    ///
    /// Records every request and answers from a handler closure keyed on the
    /// resolved path and request, so CRUD flows can be exercised end to end
    /// without a server.
    ///
    /// # Example
    ///
    /// ```
    /// use saga_models_testing::mocks::MockFetch;
    /// use serde_json::json;
    ///
    /// let fetch = MockFetch::replying(|path, _request| {
    ///     Ok(json!([{"id": "u1", "path": path}]))
    /// });
    /// ```
    pub struct MockFetch {
        handler: Box<FetchHandler>,
        seen: Seen,
    }

    impl MockFetch {
        /// A transport answering every request from `handler`.
        pub fn replying<F>(handler: F) -> Arc<Self>
        where
            F: Fn(&str, &FetchRequest) -> Result<Value, MethodError> + Send + Sync + 'static,
        {
            Arc::new(Self {
                handler: Box::new(handler),
                seen: Arc::new(Mutex::new(Vec::new())),
            })
        }

        /// Paths requested so far, in arrival order.
        #[must_use]
        pub fn requested_paths(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(path, _)| path.clone())
                .collect()
        }

        /// Number of requests made so far.
        #[must_use]
        pub fn request_count(&self) -> usize {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl Fetch for MockFetch {
        fn fetch(&self, path: String, request: FetchRequest) -> MethodFuture {
            let reply = (self.handler)(&path, &request);
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((path, request));
            Box::pin(async move { reply })
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Initialize tracing for a test binary, once.
    ///
    /// Respects `RUST_LOG`; defaults to `warn` so passing tests stay quiet.
    pub fn init_tracing() {
        INIT.call_once(|| {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .try_init();
        });
    }
}

// Re-export commonly used items
pub use helpers::init_tracing;
pub use mocks::{FixedClock, MockFetch, test_clock};
