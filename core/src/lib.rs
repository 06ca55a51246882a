//! # Bakery Sync Core
//!
//! Core traits and types for the order synchronization core.
//!
//! Every stateful component in the workspace (the authoritative order store on
//! the server, the per-client projection in the browser-facing client) is
//! written as a reducer:
//!
//! - **State**: owned data for one component (orders map, projection)
//! - **Action**: every input the component reacts to (local commands, wire events)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of I/O for the runtime to perform
//! - **Environment**: injected dependencies (clock, id generator, promo catalog)
//!
//! Reducers never perform I/O themselves, so the store's business rules can be
//! exercised at memory speed in unit tests.
//!
//! ## Example
//!
//! ```ignore
//! use bakery_sync_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! impl Reducer for OrderStoreReducer {
//!     type State = OrderStoreState;
//!     type Action = OrderAction;
//!     type Environment = OrderEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut OrderStoreState,
//!         action: OrderAction,
//!         env: &OrderEnvironment,
//!     ) -> SmallVec<[Effect<OrderAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - the trait every stateful component implements.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business logic as a function of state, action and environment.
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer owns
    /// - `Action`: Everything that can happen to that state
    /// - `Environment`: Injected dependencies
    ///
    /// Reducers mutate `state` in place and return the effects the runtime
    /// should execute afterwards. They must not block or perform I/O.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effect descriptions to be executed by the runtime, in order
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions.
///
/// Effects are values. The runtime decides how and when to run them.
pub mod effect {
    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type carried by broadcasts
    #[derive(Debug, Clone, PartialEq)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Publish an action to every subscriber of the store.
        ///
        /// The runtime emits broadcasts while the state lock taken for the
        /// reduction is still held, so subscribers observe broadcasts in
        /// exactly the order the reducer processed the causing actions.
        /// Broadcast actions are not fed back into the reducer.
        Broadcast(Action),
    }

    impl<Action> Effect<Action> {
        /// Returns the broadcast payload, if this is a broadcast effect.
        #[must_use]
        pub const fn as_broadcast(&self) -> Option<&Action> {
            match self {
                Effect::Broadcast(action) => Some(action),
                Effect::None => None,
            }
        }
    }
}

/// Environment module - dependency injection traits.
///
/// All non-deterministic inputs (time, random ids) are abstracted behind
/// traits so that tests can pin them down.
pub mod environment {
    use chrono::{DateTime, Utc};
    use rand::Rng;

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of candidate order ids.
    ///
    /// Generators only propose ids; the order store is responsible for
    /// rejecting candidates that are already taken.
    pub trait OrderIdGenerator: Send + Sync {
        /// Propose the next order id.
        fn next_id(&self) -> u64;
    }

    /// Lowest six-digit order id.
    pub const MIN_ORDER_ID: u64 = 100_000;

    /// Highest six-digit order id.
    pub const MAX_ORDER_ID: u64 = 999_999;

    /// Uniformly random six-digit ids, the format customers see on receipts.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomOrderIds;

    impl OrderIdGenerator for RandomOrderIds {
        fn next_id(&self) -> u64 {
            rand::thread_rng().gen_range(MIN_ORDER_ID..=MAX_ORDER_ID)
        }
    }
}
