pub mod loader;
pub mod migrate;
pub mod models;
pub mod secrets;
pub mod validation;

pub use loader::{load_config, load_config_sync, save_config};
pub use migrate::{MigrationError, migrate};
pub use models::*;
pub use validation::{DomainConfigValidator, ValidationError, ValidationResult};
