//! Low-level discovery payloads.
//!
//! The monitoring agent creates per-entity checks from a `{"data": [...]}`
//! document whose entries use `{#MACRO}` keys.

use crate::config::{Config, ConnectConfig};
use crate::error::{Result, SdbError};
use crate::source::{Connector, SnapshotSource};
use sdb_rest_protocol::{Record, SnapshotKind};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discovery<T> {
    pub data: Vec<T>,
}

impl<T> Default for Discovery<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// One configured instance carrying a discovery flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEntry {
    #[serde(rename = "{#INST}")]
    pub instance: String,
    #[serde(rename = "{#INFO}")]
    pub info: String,
    #[serde(rename = "{#IP}")]
    pub ip: String,
    #[serde(rename = "{#SERVICE}")]
    pub service: u16,
}

/// One collection space of one configured instance, across the whole config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterCollectionSpaceEntry {
    #[serde(rename = "{#DB}")]
    pub instance: String,
    #[serde(rename = "{#INFO}")]
    pub info: String,
    #[serde(rename = "{#IP}")]
    pub ip: String,
    #[serde(rename = "{#SERVICE}")]
    pub service: u16,
    #[serde(rename = "{#CSNAME}")]
    pub csname: String,
}

/// One collection space from a single instance's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSpaceEntry {
    #[serde(rename = "{#DB}")]
    pub info: String,
    #[serde(rename = "{#HOST}")]
    pub host: String,
    #[serde(rename = "{#SERVICE}")]
    pub service: u16,
    #[serde(rename = "{#CSNAME}")]
    pub csname: String,
}

/// Lists configured instances whose `flag` table sets `flag` to true.
pub fn discover_instances(config: &Config, flag: &str) -> Discovery<InstanceEntry> {
    let data = config
        .instances
        .iter()
        .filter(|(_, instance)| instance.flag.get(flag).copied().unwrap_or(false))
        .map(|(name, instance)| InstanceEntry {
            instance: name.clone(),
            info: instance.info.clone(),
            ip: instance.connect.host.clone(),
            service: instance.connect.service,
        })
        .collect();
    Discovery { data }
}

/// Connects to every configured instance and lists its collection spaces.
///
/// Any connection or fetch failure aborts the whole discovery.
pub fn discover_all_collection_spaces<C: Connector>(
    config: &Config,
    connector: &C,
) -> Result<Discovery<ClusterCollectionSpaceEntry>> {
    let mut discovery = Discovery::default();
    for (name, instance) in &config.instances {
        let mut source = connector.connect(&instance.connect)?;
        let spaces = source.list_collection_spaces()?;
        tracing::debug!(instance = %name, count = spaces.len(), "Listed collection spaces");

        discovery.data.extend(
            spaces
                .iter()
                .filter_map(|record| record.get("Name").and_then(Value::as_str))
                .map(|csname| ClusterCollectionSpaceEntry {
                    instance: name.clone(),
                    info: instance.info.clone(),
                    ip: instance.connect.host.clone(),
                    service: instance.connect.service,
                    csname: csname.to_string(),
                }),
        );
    }
    Ok(discovery)
}

/// Lists the collection spaces of one instance from its snapshot.
pub fn discover_collection_spaces<S: SnapshotSource + ?Sized>(
    source: &mut S,
    info: &str,
    connect: &ConnectConfig,
) -> Result<Discovery<CollectionSpaceEntry>> {
    let records = source.snapshot(SnapshotKind::CollectionSpaces, None)?;
    collection_space_entries(&records, info, connect).map(|data| Discovery { data })
}

fn collection_space_entries(
    records: &[Record],
    info: &str,
    connect: &ConnectConfig,
) -> Result<Vec<CollectionSpaceEntry>> {
    records
        .iter()
        .map(|record| {
            let csname = record
                .get("Name")
                .and_then(Value::as_str)
                .ok_or_else(|| SdbError::InvalidRecord {
                    context: "collection space snapshot".to_string(),
                    details: "record has no Name".to_string(),
                })?;
            Ok(CollectionSpaceEntry {
                info: info.to_string(),
                host: connect.host.clone(),
                service: connect.service,
                csname: csname.to_string(),
            })
        })
        .collect()
}
