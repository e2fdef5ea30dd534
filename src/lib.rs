pub mod api;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod probe;
pub mod retry;
pub mod thingsboard;

pub use config::Config;
pub use error::{AppError, Result};
