use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    #[error("Invalid weekday index: {0} (expected 0-6)")]
    InvalidWeekday(u8),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid log status: {0}")]
    InvalidStatus(String),
}
