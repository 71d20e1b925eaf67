//! # sdb-core
//!
//! Snapshot aggregation and item dispatch for the SequoiaDB monitoring
//! adapter.
//!
//! ## Design Principles
//!
//! - **Synchronous**: one invocation, one snapshot, no async runtime.
//! - **Transport-free**: records arrive through [`SnapshotSource`]; nothing
//!   here opens a socket.
//! - **Strict**: malformed records and failed fetches abort the invocation.
//!   The monitoring agent's next poll is the retry.
//! - **Lenient on vocabulary**: session statuses and agent types the adapter
//!   does not know are counted in totals, never rejected.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sdb_core::{aggregate_sessions, SessionRecord};
//!
//! let report = aggregate_sessions(&sessions, chrono::Local::now().naive_local())?;
//! println!("{}", serde_json::to_string(&report)?);
//! ```

pub mod cache;
pub mod collectionspaces;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ops;
pub mod sessions;
pub mod source;
pub mod types;

pub use cache::ReportCache;
pub use config::{load_config, CacheConfig, Config, ConnectConfig, InstanceConfig, LoggingConfig};
pub use error::{Result, SdbError};
pub use ops::{run, GlobalOp, InstanceOp, Invocation, Output};
pub use sessions::{aggregate_sessions, percentile_95};
pub use source::{Connector, SnapshotSource};
pub use types::*;
