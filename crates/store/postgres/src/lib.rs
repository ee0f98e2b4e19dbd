//! PostgreSQL implementation of the Argus [`argus_store::LedgerStore`].

pub mod config;
pub mod migrations;
pub mod store;

pub use config::PostgresConfig;
pub use store::PostgresLedgerStore;
