//! Snapshot source abstraction.
//!
//! The aggregation and reporting code only ever sees materialized records.
//! How they were fetched (REST gateway, fixtures in tests) stays behind these
//! traits.

use crate::config::ConnectConfig;
use crate::error::Result;
use sdb_rest_protocol::{Record, SnapshotKind};
use serde_json::Value;

pub trait SnapshotSource {
    /// Fetches every record of one snapshot, optionally filtered by a
    /// matcher such as `{"Name": "cs_orders"}`.
    fn snapshot(&mut self, kind: SnapshotKind, condition: Option<Value>) -> Result<Vec<Record>>;

    /// Lists collection spaces; each record carries at least `Name`.
    fn list_collection_spaces(&mut self) -> Result<Vec<Record>>;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Box<S> {
    fn snapshot(&mut self, kind: SnapshotKind, condition: Option<Value>) -> Result<Vec<Record>> {
        (**self).snapshot(kind, condition)
    }

    fn list_collection_spaces(&mut self) -> Result<Vec<Record>> {
        (**self).list_collection_spaces()
    }
}

/// Opens a [`SnapshotSource`] for one configured instance.
pub trait Connector {
    type Source: SnapshotSource;

    fn connect(&self, connect: &ConnectConfig) -> Result<Self::Source>;
}
