//! Channels for state management with different update strategies.
//!
//! Channels provide different ways to aggregate and manage state updates in a graph.
//! Each channel type implements a specific update strategy:
//!
//! - `LastValue`: keeps only the last written value
//! - `EphemeralValue`: value is cleared after reading
//! - `BinaryOperatorAggregate`: aggregates values using a binary operator
//! - `Topic`: accumulates values into a list (for message history, etc.)
//! - `NamedBarrierValue`: waits until all named values are received
//!
//! `StateUpdater` customizes how node outputs are merged into the graph state:
//! `ReplaceUpdater` (default, replaces entire state) or `FieldBasedUpdater` (per-field logic).

mod binop;
mod ephemeral_value;
mod error;
mod last_value;
mod named_barrier;
mod topic;
mod updater;

pub use binop::BinaryOperatorAggregate;
pub use ephemeral_value::EphemeralValue;
pub use error::ChannelError;
pub use last_value::LastValue;
pub use named_barrier::{NamedBarrierUpdate, NamedBarrierValue};
pub use topic::{Topic, TopicSingleWrite};
pub use updater::{
    boxed_updater, BoxedStateUpdater, FieldBasedUpdater, ReplaceUpdater, StateUpdater,
};

use std::fmt::Debug;

/// Channel trait for state management with different update strategies.
///
/// Channels are used to manage how state values are updated when multiple nodes
/// write to the same state field. Each channel type implements a specific aggregation strategy.
pub trait Channel<T>: Send + Sync + Debug
where
    T: Clone + Send + Sync + Debug + 'static,
{
    /// Reads the current value from the channel. `None` if the channel has no value.
    fn read(&self) -> Option<T>;

    /// Writes a new value to the channel; behavior depends on the channel type.
    fn write(&mut self, value: T);

    /// Updates the channel with multiple values using the channel's aggregation strategy.
    fn update(&mut self, updates: Vec<T>) -> Result<(), ChannelError>;

    /// Returns the channel type name for debugging and introspection.
    fn channel_type(&self) -> &'static str;
}
