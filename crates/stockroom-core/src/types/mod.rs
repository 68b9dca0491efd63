//! Type definitions for Stockroom configuration, inventory data and restore runs

mod config_types;
mod entity_types;
mod restore_types;
mod validation;

pub use config_types::*;
pub use entity_types::*;
pub use restore_types::*;
pub use validation::*;
