//! # Bakery Sync Testing
//!
//! Testing utilities for the order sync core.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits
//! - A Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use bakery_sync_testing::{test_clock, SequentialOrderIds, ReducerTest};
//!
//! ReducerTest::new(OrderStoreReducer::new())
//!     .with_env(OrderEnvironment::new(
//!         Arc::new(test_clock()),
//!         Arc::new(SequentialOrderIds::default()),
//!         catalog,
//!         shipping,
//!     ))
//!     .given_state(OrderStoreState::default())
//!     .when_action(place_order)
//!     .then_state(|s| assert_eq!(s.len(), 1))
//!     .run();
//! ```

use bakery_sync_core::environment::{Clock, OrderIdGenerator, MAX_ORDER_ID, MIN_ORDER_ID};
use chrono::{DateTime, Utc};


/// Deterministic environment implementations.
pub mod mocks {
    use super::{Clock, DateTime, OrderIdGenerator, Utc, MAX_ORDER_ID, MIN_ORDER_ID};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use bakery_sync_testing::mocks::FixedClock;
    /// use bakery_sync_core::environment::Clock;
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
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Hands out `100000, 100001, ...`, wrapping back to the start of the
    /// six-digit range after `999999`.
    #[derive(Debug)]
    pub struct SequentialOrderIds {
        next: AtomicU64,
    }

    impl SequentialOrderIds {
        /// Start the sequence at `first`.
        #[must_use]
        pub const fn starting_at(first: u64) -> Self {
            Self {
                next: AtomicU64::new(first),
            }
        }
    }

    impl Default for SequentialOrderIds {
        fn default() -> Self {
            Self::starting_at(MIN_ORDER_ID)
        }
    }

    impl OrderIdGenerator for SequentialOrderIds {
        fn next_id(&self) -> u64 {
            let id = self.next.fetch_add(1, Ordering::SeqCst);
            MIN_ORDER_ID + (id.saturating_sub(MIN_ORDER_ID)) % (MAX_ORDER_ID - MIN_ORDER_ID + 1)
        }
    }

    /// Replays a fixed list of candidate ids in a loop.
    ///
    /// Useful for forcing collisions: `ScriptedOrderIds::new(vec![123456])`
    /// proposes the same id forever.
    #[derive(Debug)]
    pub struct ScriptedOrderIds {
        ids: Vec<u64>,
        cursor: AtomicUsize,
    }

    impl ScriptedOrderIds {
        /// Create a generator cycling through `ids`.
        ///
        /// An empty list behaves like `vec![MIN_ORDER_ID]`.
        #[must_use]
        pub fn new(ids: Vec<u64>) -> Self {
            let ids = if ids.is_empty() { vec![MIN_ORDER_ID] } else { ids };
            Self {
                ids,
                cursor: AtomicUsize::new(0),
            }
        }
    }

    impl OrderIdGenerator for ScriptedOrderIds {
        fn next_id(&self) -> u64 {
            let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.ids.len();
            self.ids[index]
        }
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, ScriptedOrderIds, SequentialOrderIds};
pub use reducer_test::{assertions, ReducerTest};
