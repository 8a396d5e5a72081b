//! CLI commands module

pub mod cache;
pub mod ingest;
pub mod providers;
pub mod worker;

pub use cache::{CacheArgs, CacheCommand};
pub use ingest::IngestArgs;
pub use providers::ProvidersArgs;
pub use worker::WorkerArgs;
