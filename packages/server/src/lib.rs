//! vCon job queue server process.

pub mod app;
pub mod handlers;
pub mod settings;

pub use app::{App, AppError};
pub use handlers::default_handlers;
pub use settings::{ConfigError, Settings};
