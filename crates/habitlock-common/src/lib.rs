pub mod config;
pub mod domain;
pub mod error;
pub mod schedule;
pub mod types;

pub use error::{Error, Result};
pub use schedule::{evaluate, Evaluation};
pub use types::*;
