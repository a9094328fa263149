// Courier Core - In-process notification broker, domain & ports
// NO transport or storage dependencies (hexagonal)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
