#![doc = "Cycle timing and performance budgeting for the block production kernel."]

pub mod clock;
pub mod kernel;
pub mod metrics;

pub use clock::*;
pub use kernel::*;
pub use metrics::*;
