pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use error::{FluxError, Result};
