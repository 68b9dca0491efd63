//! Configuration loading and management

mod loader;

pub use loader::{StockroomConfig, CONFIG_FILE_NAMES};
