pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use errors::{QuestEngineError, Result};
pub use services::QuestService;
pub use store::{LedgerStore, LedgerTransaction};
