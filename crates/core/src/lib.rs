pub mod config;
pub mod domain;
pub mod schema;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::{Message, QueryResult, Role, ValidationOutcome};
pub use schema::SchemaCatalog;
