//! TrakHound Core
//!
//! An entity graph of namespaced objects carrying typed content, queried with a small
//! SQL-like language.
//!
//! # Architecture
//!
//! - **Objects and content**: objects form a tree per namespace; content records (state,
//!   number, event, assignment, ...) hang off objects
//! - **Deterministic identity**: object uuids are derived from `namespace:path`
//! - **Memory drivers**: per-type caches with negative marks and subscriptions
//! - **One engine, two sources**: statements run against a remote client or a local
//!   snapshot with the same results
//!
//! # Modules
//!
//! - [`models`] - Objects, content records, snapshots and path utilities
//! - [`query`] - Query text → scope of statements and variables
//! - [`engine`] - Statement execution and result assembly
//! - [`drivers`] - In-memory entity drivers and the object index driver
//! - [`config`] - Driver and engine settings
//! - [`error`] - Error types

pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod models;
pub mod query;

// Re-export commonly used types
pub use config::{DriverConfig, EngineConfig, TrakHoundConfig};
pub use engine::{subscription_expressions, DriverClient, EntitiesClient, QueryEngine, QueryResult, Source};
pub use error::{ClientError, ConfigError, DriverError};
pub use models::*;
pub use query::{parse, QueryScope, Statement};
