//! Item-key dispatch.
//!
//! An invocation names either a global operation (`discovery_inst coord`) or
//! an instance item key followed by a function and its arguments
//! (`sdb_prod_sessions sessions`). Both are closed allow-lists: anything not
//! listed here is rejected with [`SdbError::UnsupportedOperation`].

use crate::cache::{lookup, ReportCache};
use crate::collectionspaces::{collection_space_name, collection_space_report, merge_records};
use crate::config::{Config, InstanceConfig};
use crate::discovery::{
    discover_all_collection_spaces, discover_collection_spaces, discover_instances,
};
use crate::error::{Result, SdbError};
use crate::sessions::aggregate_sessions;
use crate::source::{Connector, SnapshotSource};
use crate::types::{AggregateReport, CollectionSpaceReport, SessionRecord};
use chrono::NaiveDateTime;
use sdb_rest_protocol::{Record, SnapshotKind};
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;

/// Operations that need no instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalOp {
    DiscoveryInst,
    DiscoveryAllCs,
}

impl GlobalOp {
    pub fn from_item(item: &str) -> Option<Self> {
        match item {
            "discovery_inst" => Some(GlobalOp::DiscoveryInst),
            "discovery_all_cs" => Some(GlobalOp::DiscoveryAllCs),
            _ => None,
        }
    }
}

/// Operations run against one configured instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOp {
    Snapshot,
    Sessions,
    CollectionSpaces,
    DiscoveryCollectionSpaces,
    Cached,
}

impl InstanceOp {
    pub fn name(self) -> &'static str {
        match self {
            InstanceOp::Snapshot => "snapshot",
            InstanceOp::Sessions => "sessions",
            InstanceOp::CollectionSpaces => "collectionspaces",
            InstanceOp::DiscoveryCollectionSpaces => "discovery_collectionspaces",
            InstanceOp::Cached => "cached",
        }
    }
}

impl FromStr for InstanceOp {
    type Err = SdbError;

    /// Accepts dotted spellings (`discovery.collectionspaces`) as well.
    fn from_str(func: &str) -> Result<Self> {
        match func.replace('.', "_").as_str() {
            "snapshot" => Ok(InstanceOp::Snapshot),
            "sessions" => Ok(InstanceOp::Sessions),
            "collectionspaces" => Ok(InstanceOp::CollectionSpaces),
            "discovery_collectionspaces" => Ok(InstanceOp::DiscoveryCollectionSpaces),
            "cached" => Ok(InstanceOp::Cached),
            _ => Err(SdbError::UnsupportedOperation(func.to_string())),
        }
    }
}

/// Result of one invocation, printed as a single stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Json(Value),
    Text(String),
}

impl Output {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Output::Text(text),
            Value::Number(number) => Output::Text(number.to_string()),
            Value::Bool(flag) => Output::Text(flag.to_string()),
            Value::Null => Output::Text("null".to_string()),
            other => Output::Json(other),
        }
    }

    pub fn render(&self) -> Result<String> {
        match self {
            Output::Json(value) => serde_json::to_string(value).map_err(|source| SdbError::Json {
                context: "Failed to encode output".to_string(),
                source,
            }),
            Output::Text(text) => Ok(text.clone()),
        }
    }
}

/// Everything an invocation needs besides the database connection.
pub struct Invocation<'a> {
    pub config: &'a Config,
    pub cache: &'a ReportCache,
    /// Capture instant, in the database's local time.
    pub now: NaiveDateTime,
}

/// Instance name encoded in an item key: its first two `_` segments.
pub fn instance_name(item: &str) -> String {
    item.splitn(3, '_').take(2).collect::<Vec<_>>().join("_")
}

/// Dispatches one item key.
pub fn run<C: Connector>(
    ctx: &Invocation<'_>,
    connector: &C,
    item: &str,
    args: &[String],
) -> Result<Output> {
    if let Some(op) = GlobalOp::from_item(item) {
        tracing::debug!(op = ?op, args = ?args, "Running global operation");
        return run_global(ctx, connector, op, args);
    }

    let name = instance_name(item);
    tracing::debug!(item = %item, instance = %name, "Resolved instance from item key");
    let instance = ctx.config.instance(&name)?;

    let (func, rest) = args.split_first().ok_or_else(|| SdbError::MissingArgument {
        operation: item.to_string(),
        argument: "function",
    })?;
    let op: InstanceOp = func.parse()?;
    run_instance(ctx, connector, instance, op, rest)
}

fn run_global<C: Connector>(
    ctx: &Invocation<'_>,
    connector: &C,
    op: GlobalOp,
    args: &[String],
) -> Result<Output> {
    match op {
        GlobalOp::DiscoveryInst => {
            let flag = required(args, 0, "discovery_inst", "flag")?;
            to_output(&discover_instances(ctx.config, flag))
        }
        GlobalOp::DiscoveryAllCs => {
            to_output(&discover_all_collection_spaces(ctx.config, connector)?)
        }
    }
}

fn run_instance<C: Connector>(
    ctx: &Invocation<'_>,
    connector: &C,
    instance: &InstanceConfig,
    op: InstanceOp,
    args: &[String],
) -> Result<Output> {
    let open_source = || connector.connect(&instance.connect);
    let (report, value) = match op {
        InstanceOp::Cached => return cached(ctx.cache, instance, args),
        InstanceOp::Snapshot => {
            let kind = required(args, 0, op.name(), "snapshot type")?;
            let kind = database_snapshot_kind(kind)?;
            let merged = database_snapshot(&mut open_source()?, kind)?;
            (Some(kind.name().to_string()), Value::Object(merged))
        }
        InstanceOp::Sessions => {
            let report = sessions_report(&mut open_source()?, ctx.now)?;
            (Some("sessions".to_string()), to_value(&report)?)
        }
        InstanceOp::CollectionSpaces => {
            let argument = required(args, 0, op.name(), "collection space")?;
            let report = collection_space(&mut open_source()?, argument)?;
            (Some(format!("cs_{}", report.csname)), to_value(&report)?)
        }
        InstanceOp::DiscoveryCollectionSpaces => {
            let discovery = discover_collection_spaces(
                &mut open_source()?,
                &instance.info,
                &instance.connect,
            )?;
            (None, to_value(&discovery)?)
        }
    };

    if let Some(report) = report {
        let connect = &instance.connect;
        if let Err(err) = ctx.cache.store(&connect.host, connect.service, &report, &value) {
            tracing::warn!(error = %err, report = %report, "Failed to cache report");
        }
    }

    Ok(Output::Json(value))
}

/// Fetches and aggregates the sessions snapshot.
pub fn sessions_report<S: SnapshotSource + ?Sized>(
    source: &mut S,
    now: NaiveDateTime,
) -> Result<AggregateReport> {
    let records = source.snapshot(SnapshotKind::Sessions, None)?;
    tracing::debug!(count = records.len(), "Fetched sessions snapshot");
    let sessions = records
        .into_iter()
        .map(|record| {
            serde_json::from_value::<SessionRecord>(Value::Object(record)).map_err(|err| {
                SdbError::InvalidRecord {
                    context: "sessions snapshot".to_string(),
                    details: err.to_string(),
                }
            })
        })
        .collect::<Result<Vec<_>>>()?;
    aggregate_sessions(&sessions, now)
}

/// Fetches one collection space's snapshot and reports its sizes.
pub fn collection_space<S: SnapshotSource + ?Sized>(
    source: &mut S,
    argument: &str,
) -> Result<CollectionSpaceReport> {
    let name = collection_space_name(argument);
    let condition = json!({ "Name": name });
    let records = source.snapshot(SnapshotKind::CollectionSpaces, Some(condition))?;
    Ok(collection_space_report(name, &merge_records(records)))
}

/// Fetches a database or system snapshot merged into one record.
pub fn database_snapshot<S: SnapshotSource + ?Sized>(
    source: &mut S,
    kind: SnapshotKind,
) -> Result<Record> {
    Ok(merge_records(source.snapshot(kind, None)?))
}

fn database_snapshot_kind(name: &str) -> Result<SnapshotKind> {
    match SnapshotKind::from_name(name) {
        Some(kind @ (SnapshotKind::Database | SnapshotKind::System)) => Ok(kind),
        _ => Err(SdbError::UnsupportedOperation(format!("snapshot {}", name))),
    }
}

fn cached(cache: &ReportCache, instance: &InstanceConfig, args: &[String]) -> Result<Output> {
    let report = required(args, 0, "cached", "report")?;
    let path = args.get(1).map(String::as_str).unwrap_or("");
    let connect = &instance.connect;
    let value = cache.load(&connect.host, connect.service, report)?;
    lookup(&value, path)
        .cloned()
        .map(Output::from_value)
        .ok_or_else(|| SdbError::CacheMiss(format!("{} has no field {:?}", report, path)))
}

fn required<'a>(
    args: &'a [String],
    index: usize,
    operation: &str,
    argument: &'static str,
) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| SdbError::MissingArgument {
            operation: operation.to_string(),
            argument,
        })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| SdbError::Json {
        context: "Failed to encode report".to_string(),
        source,
    })
}

fn to_output<T: Serialize>(value: &T) -> Result<Output> {
    to_value(value).map(Output::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_takes_two_segments() {
        assert_eq!(instance_name("sdb_prod_sessions"), "sdb_prod");
        assert_eq!(instance_name("sdb_prod"), "sdb_prod");
        assert_eq!(instance_name("sdb_prod_cs_orders"), "sdb_prod");
        assert_eq!(instance_name("sdb"), "sdb");
    }

    #[test]
    fn instance_ops_are_an_allow_list() {
        assert_eq!("sessions".parse::<InstanceOp>().unwrap(), InstanceOp::Sessions);
        assert_eq!(
            "discovery.collectionspaces".parse::<InstanceOp>().unwrap(),
            InstanceOp::DiscoveryCollectionSpaces
        );
        let err = "listCollectionSpaces".parse::<InstanceOp>().unwrap_err();
        assert!(
            matches!(err, SdbError::UnsupportedOperation(name) if name == "listCollectionSpaces")
        );
        assert!("__del__".parse::<InstanceOp>().is_err());
    }

    #[test]
    fn global_ops_match_exact_names() {
        assert_eq!(GlobalOp::from_item("discovery_inst"), Some(GlobalOp::DiscoveryInst));
        assert_eq!(GlobalOp::from_item("discovery_all_cs"), Some(GlobalOp::DiscoveryAllCs));
        assert_eq!(GlobalOp::from_item("discovery_inst_x"), None);
        assert_eq!(GlobalOp::from_item("main"), None);
    }

    #[test]
    fn only_database_and_system_snapshots_are_exposed() {
        assert_eq!(
            database_snapshot_kind("SDB_SNAP_DATABASE").unwrap(),
            SnapshotKind::Database
        );
        assert_eq!(
            database_snapshot_kind("SDB_SNAP_SYSTEM").unwrap(),
            SnapshotKind::System
        );
        assert!(database_snapshot_kind("SDB_SNAP_SESSIONS").is_err());
        assert!(database_snapshot_kind("bogus").is_err());
    }

    #[test]
    fn scalars_render_as_plain_text() {
        assert_eq!(Output::from_value(json!(3)).render().unwrap(), "3");
        assert_eq!(Output::from_value(json!(0.5)).render().unwrap(), "0.5");
        assert_eq!(Output::from_value(json!("数据")).render().unwrap(), "数据");
        assert_eq!(
            Output::from_value(json!({"名": 1})).render().unwrap(),
            "{\"名\":1}"
        );
    }
}
