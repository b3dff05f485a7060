pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod schedule;
pub mod scrapers;
pub mod store;
pub mod sync;

pub use config::Config;
pub use models::{CrawlOutcome, CrawlStatus, Reservation};
pub use pipeline::Orchestrator;
