//! Bounded concurrent execution
//!
//! Provides the executor that turns many long-latency operations into one
//! bounded, cancellable, backpressured stream, and the eager adapter that
//! starts slow producers ahead of their consumer.

mod eager;
mod executor;
mod slots;

pub use eager::{eager, EagerStream};
pub use executor::*;
pub use slots::{Slot, SlotPool, SlotWaiter};
