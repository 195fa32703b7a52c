//! The analytics engine and health scorer: the columnar-store client,
//! every analytical query, and the composite health score.
//!
//! [`engine::AnalyticsEngine`] is the public surface every HTTP handler
//! calls through; it owns tenant validation, pagination/limit caps, and KQL
//! parsing/fallback, then delegates to a [`store::StoreClient`]
//! implementation — [`store::ClickHouseStore`] in production,
//! [`testing::InMemoryStore`] in tests.

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod histogram;
pub mod matcher;
pub mod rows;
pub mod sanitize;
pub mod store;
pub mod testing;
pub mod types;
pub mod whitelist;

pub use config::AnalyticsConfig;
pub use engine::{AnalyticsEngine, SearchParams};
pub use error::AnalyticsError;
pub use store::{ClickHouseStore, StoreClient, TransactionFilter};
