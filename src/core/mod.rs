/*!
 * Core Module
 * Project model, configuration, events, and error handling
 */

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod limits;
pub mod serde;
pub mod types;

// Re-export for convenience
pub use catalog::{ProjectCatalog, StaticCatalog};
pub use config::{DevfleetConfig, OrchestratorConfig, SupervisorConfig};
pub use errors::*;
pub use events::{EventCallback, EventSink};
pub use types::*;
