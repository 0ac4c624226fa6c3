#![doc = "Common types shared across the cycle kernel workspace."]

pub mod config;
pub mod error;
pub mod movavg;

pub use config::*;
pub use error::*;
pub use movavg::*;
