pub mod config;
pub mod daemon;
pub mod error;
pub mod hosts;
pub mod ipc;
pub mod store;
pub mod trigger;

pub use daemon::{CycleAction, CycleReport, DaemonLoop, StatusHandle};
pub use error::{DaemonError, HostsError};
pub use hosts::{HostsChange, HostsFileManager};
pub use store::{HabitStore, MemoryHabitStore, SqliteHabitStore};
pub use trigger::{RefreshSignal, Wake};
