//! Record and report types shared by the aggregator, the dispatcher and the
//! binary.
//!
//! Input records keep the database's field names (`Status`, `UserCPU`, ...)
//! and output reports keep the key names the monitoring templates expect
//! (`split_type`, `n_95userCPU`, ...), so both sides serialize without glue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Session Enumerations
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a database session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Creating,
    Running,
    Waiting,
    Idle,
    Destroying,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Creating,
        SessionStatus::Running,
        SessionStatus::Waiting,
        SessionStatus::Idle,
        SessionStatus::Destroying,
    ];
}

impl FromStr for SessionStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Creating" => Ok(SessionStatus::Creating),
            "Running" => Ok(SessionStatus::Running),
            "Waiting" => Ok(SessionStatus::Waiting),
            "Idle" => Ok(SessionStatus::Idle),
            "Destroying" => Ok(SessionStatus::Destroying),
            _ => Err(()),
        }
    }
}

/// The database subsystem that owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentType {
    Agent,
    ShardAgent,
    ReplAgent,
    #[serde(rename = "HTTPAgent")]
    HttpAgent,
}

impl AgentType {
    pub const ALL: [AgentType; 4] = [
        AgentType::Agent,
        AgentType::ShardAgent,
        AgentType::ReplAgent,
        AgentType::HttpAgent,
    ];
}

impl FromStr for AgentType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Agent" => Ok(AgentType::Agent),
            "ShardAgent" => Ok(AgentType::ShardAgent),
            "ReplAgent" => Ok(AgentType::ReplAgent),
            "HTTPAgent" => Ok(AgentType::HttpAgent),
            _ => Err(()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Sentinel reported in `LastOpBegin` when no operation is in flight.
pub const NO_OPERATION: &str = "--";

fn no_operation() -> String {
    NO_OPERATION.to_string()
}

/// One row of the sessions snapshot.
///
/// `status` and `agent_type` stay as raw strings: newer servers report values
/// outside the known enumerations and those rows must still be counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Type")]
    pub agent_type: String,
    #[serde(rename = "UserCPU")]
    pub user_cpu: f64,
    #[serde(rename = "SysCPU")]
    pub sys_cpu: f64,
    #[serde(rename = "LastOpType", default)]
    pub last_op_type: String,
    #[serde(rename = "LastOpBegin", default = "no_operation")]
    pub last_op_begin: String,
}

/// Summary of one sessions snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    #[serde(rename = "split_type")]
    pub by_agent_status: BTreeMap<AgentType, BTreeMap<SessionStatus, u64>>,
    pub total: u64,
    #[serde(flatten)]
    pub by_status: BTreeMap<SessionStatus, u64>,
    #[serde(rename = "n_95userCPU")]
    pub outlier_user_cpu_count: u64,
    #[serde(rename = "n_95sysCPU")]
    pub outlier_sys_cpu_count: u64,
    pub slowest_second: f64,
}

impl AggregateReport {
    /// A report with every table cell present and zero.
    pub fn zeroed() -> Self {
        let statuses = || {
            SessionStatus::ALL
                .iter()
                .map(|status| (*status, 0))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            by_agent_status: AgentType::ALL
                .iter()
                .map(|agent| (*agent, statuses()))
                .collect(),
            total: 0,
            by_status: statuses(),
            outlier_user_cpu_count: 0,
            outlier_sys_cpu_count: 0,
            slowest_second: 0.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collection Spaces
// ═══════════════════════════════════════════════════════════════════════════════

/// Size and capacity metrics for one collection space.
///
/// Size fields are `-1` when the snapshot did not report them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSpaceReport {
    pub csname: String,
    #[serde(rename = "PageSize")]
    pub page_size: i64,
    #[serde(rename = "LobPageSize")]
    pub lob_page_size: i64,
    #[serde(rename = "TotalSize")]
    pub total_size: i64,
    #[serde(rename = "FreeSize")]
    pub free_size: i64,
    #[serde(rename = "TotalDataSize")]
    pub total_data_size: i64,
    #[serde(rename = "FreeDataSize")]
    pub free_data_size: i64,
    #[serde(rename = "TotalIndexSize")]
    pub total_index_size: i64,
    #[serde(rename = "FreeIndexSize")]
    pub free_index_size: i64,
    #[serde(rename = "TotalLobSize")]
    pub total_lob_size: i64,
    #[serde(rename = "FreeLobSize")]
    pub free_lob_size: i64,
    #[serde(rename = "n_Collection")]
    pub collection_count: usize,
    #[serde(rename = "n_Group")]
    pub group_count: usize,
}
