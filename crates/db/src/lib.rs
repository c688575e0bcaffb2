pub mod connection;
pub mod executor;

pub use connection::{connect, connect_with_settings, DbPool, PoolSettings};
pub use executor::PgQueryExecutor;
