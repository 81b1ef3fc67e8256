pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod server;
pub mod types;

pub use error::{ErrorKind, RelayError};
pub type Result<T> = std::result::Result<T, RelayError>;
