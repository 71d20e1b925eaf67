//! Session snapshot aggregation.
//!
//! The raw sessions snapshot is far too large to hand to the monitoring agent,
//! so it is reduced to a fixed-shape report: status tallies (overall and per
//! agent type), counts of sessions above the 95th-percentile CPU value, and
//! the age of the oldest running query.
//!
//! The percentile is the value at sorted index `floor(0.95 * n)`, not an
//! interpolated percentile. With few sessions that index lands on the maximum
//! and no session can exceed it.

use crate::error::{Result, SdbError};
use crate::types::{AggregateReport, AgentType, SessionRecord, SessionStatus, NO_OPERATION};
use chrono::NaiveDateTime;

/// Format of `LastOpBegin` as documented for the snapshot.
const OP_BEGIN_FORMAT: &str = "%Y-%m-%d-%H:%M:%S%.f";
/// Format the server actually emits, e.g. `2020-07-03-14.34.49.465546`.
const OP_BEGIN_FORMAT_DOTTED: &str = "%Y-%m-%d-%H.%M.%S%.f";

const PERCENTILE: f64 = 0.95;

/// Reduces one sessions snapshot to an [`AggregateReport`].
///
/// `now` is the capture instant, in the server's local time. Sessions with a
/// status or agent type outside the known enumerations count toward `total`
/// only.
///
/// # Errors
///
/// - [`SdbError::OutOfRange`] when `sessions` is empty.
/// - [`SdbError::MalformedTimestamp`] when a running query has an unparseable
///   `LastOpBegin`.
pub fn aggregate_sessions(
    sessions: &[SessionRecord],
    now: NaiveDateTime,
) -> Result<AggregateReport> {
    let mut report = AggregateReport::zeroed();

    let mut user_cpu: Vec<f64> = sessions.iter().map(|s| s.user_cpu).collect();
    let mut sys_cpu: Vec<f64> = sessions.iter().map(|s| s.sys_cpu).collect();
    let user_threshold = percentile_95(&mut user_cpu, "UserCPU")?;
    let sys_threshold = percentile_95(&mut sys_cpu, "SysCPU")?;

    let mut oldest_query = now;
    for session in sessions {
        report.total += 1;

        let status = session.status.parse::<SessionStatus>().ok();
        let agent = session.agent_type.parse::<AgentType>().ok();

        if let (Some(agent), Some(status)) = (agent, status) {
            if let Some(cell) = report
                .by_agent_status
                .get_mut(&agent)
                .and_then(|row| row.get_mut(&status))
            {
                *cell += 1;
            }
        }
        if let Some(cell) = status.and_then(|status| report.by_status.get_mut(&status)) {
            *cell += 1;
        }

        if session.user_cpu > user_threshold {
            report.outlier_user_cpu_count += 1;
        }
        if session.sys_cpu > sys_threshold {
            report.outlier_sys_cpu_count += 1;
        }

        if status == Some(SessionStatus::Running)
            && session.last_op_type == "Query"
            && session.last_op_begin != NO_OPERATION
        {
            let began = parse_op_begin(&session.last_op_begin)?;
            if began < oldest_query {
                oldest_query = began;
            }
        }
    }

    report.slowest_second = seconds_between(oldest_query, now);
    tracing::debug!(
        total = report.total,
        user_cpu_p95 = user_threshold,
        sys_cpu_p95 = sys_threshold,
        slowest_second = report.slowest_second,
        "Aggregated sessions snapshot"
    );

    Ok(report)
}

/// Sorts `values` ascending and returns the value at index `floor(0.95 * n)`.
pub fn percentile_95(values: &mut [f64], metric: &'static str) -> Result<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    let index = (values.len() as f64 * PERCENTILE) as usize;
    values
        .get(index)
        .copied()
        .ok_or(SdbError::OutOfRange { metric })
}

/// Parses a `LastOpBegin` value, accepting either time separator.
pub fn parse_op_begin(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, OP_BEGIN_FORMAT)
        .or_else(|err| {
            NaiveDateTime::parse_from_str(value, OP_BEGIN_FORMAT_DOTTED).map_err(|_| err)
        })
        .map_err(|source| SdbError::MalformedTimestamp {
            value: value.to_string(),
            source,
        })
}

fn seconds_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    let elapsed = later.signed_duration_since(earlier);
    match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => elapsed.num_seconds() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: &str, agent_type: &str, user_cpu: f64, sys_cpu: f64) -> SessionRecord {
        SessionRecord {
            status: status.to_string(),
            agent_type: agent_type.to_string(),
            user_cpu,
            sys_cpu,
            last_op_type: String::new(),
            last_op_begin: NO_OPERATION.to_string(),
        }
    }

    fn query(began: &str) -> SessionRecord {
        SessionRecord {
            last_op_type: "Query".to_string(),
            last_op_begin: began.to_string(),
            ..session("Running", "Agent", 0.0, 0.0)
        }
    }

    fn at(value: &str) -> NaiveDateTime {
        parse_op_begin(value).unwrap()
    }

    fn now() -> NaiveDateTime {
        at("2020-07-03-15:00:00.000000")
    }

    #[test]
    fn total_counts_every_record() {
        let sessions = vec![
            session("Idle", "Agent", 1.0, 1.0),
            session("Running", "ShardAgent", 2.0, 1.0),
            session("Waiting", "ReplAgent", 3.0, 1.0),
        ];
        let report = aggregate_sessions(&sessions, now()).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.by_status.values().sum::<u64>(), 3);
        assert_eq!(report.by_status[&SessionStatus::Idle], 1);
        assert_eq!(report.by_status[&SessionStatus::Creating], 0);
        assert_eq!(
            report.by_agent_status[&AgentType::ShardAgent][&SessionStatus::Running],
            1
        );
        assert_eq!(
            report.by_agent_status[&AgentType::HttpAgent][&SessionStatus::Running],
            0
        );
    }

    #[test]
    fn twenty_sessions_put_threshold_on_maximum() {
        let sessions: Vec<_> = (1..=20)
            .map(|cpu| session("Idle", "Agent", cpu as f64, 0.0))
            .collect();
        let mut values: Vec<f64> = sessions.iter().map(|s| s.user_cpu).collect();
        assert_eq!(percentile_95(&mut values, "UserCPU").unwrap(), 20.0);

        let report = aggregate_sessions(&sessions, now()).unwrap();
        assert_eq!(report.outlier_user_cpu_count, 0);
        assert_eq!(report.outlier_sys_cpu_count, 0);
    }

    #[test]
    fn values_above_threshold_are_outliers() {
        // 40 samples: index floor(0.95 * 40) = 38, so only the top value exceeds.
        let mut sessions: Vec<_> = (1..=40)
            .map(|cpu| session("Idle", "Agent", cpu as f64, 5.0))
            .collect();
        sessions[0].sys_cpu = 100.0;
        let report = aggregate_sessions(&sessions, now()).unwrap();
        assert_eq!(report.outlier_user_cpu_count, 1);
        // sys threshold is 5.0 (index 38 of 39 fives + one hundred); 100 exceeds it
        assert_eq!(report.outlier_sys_cpu_count, 1);
    }

    #[test]
    fn input_order_does_not_matter() {
        let forward: Vec<_> = (1..=30)
            .map(|cpu| session("Idle", "Agent", cpu as f64, (31 - cpu) as f64))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        let a = aggregate_sessions(&forward, now()).unwrap();
        let b = aggregate_sessions(&reversed, now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_session_is_never_an_outlier() {
        let report = aggregate_sessions(&[session("Idle", "Agent", 42.0, 7.0)], now()).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.outlier_user_cpu_count, 0);
        assert_eq!(report.outlier_sys_cpu_count, 0);
    }

    #[test]
    fn threshold_does_not_decrease_when_a_value_grows() {
        let base: Vec<f64> = (0..25).map(|v| v as f64).collect();
        let before = percentile_95(&mut base.clone(), "UserCPU").unwrap();
        for i in 0..base.len() {
            let mut grown = base.clone();
            grown[i] += 50.0;
            let after = percentile_95(&mut grown, "UserCPU").unwrap();
            assert!(after >= before, "index {} lowered threshold", i);
        }
    }

    #[test]
    fn empty_snapshot_is_out_of_range() {
        let err = aggregate_sessions(&[], now()).unwrap_err();
        assert!(matches!(err, SdbError::OutOfRange { metric: "UserCPU" }));
    }

    #[test]
    fn unknown_status_counts_only_toward_total() {
        let sessions = vec![
            session("Blocked", "Agent", 1.0, 1.0),
            session("Idle", "Agent", 1.0, 1.0),
        ];
        let report = aggregate_sessions(&sessions, now()).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.by_status.values().sum::<u64>(), 1);
        let agent_cells: u64 = report
            .by_agent_status
            .values()
            .flat_map(|row| row.values())
            .sum();
        assert_eq!(agent_cells, 1);
    }

    #[test]
    fn unknown_agent_type_still_counts_status() {
        let sessions = vec![session("Running", "CoordAgent", 1.0, 1.0)];
        let report = aggregate_sessions(&sessions, now()).unwrap();
        assert_eq!(report.by_status[&SessionStatus::Running], 1);
        let agent_cells: u64 = report
            .by_agent_status
            .values()
            .flat_map(|row| row.values())
            .sum();
        assert_eq!(agent_cells, 0);
    }

    #[test]
    fn slowest_query_measures_from_capture_time() {
        let began = "2020-07-03-14.34.49.465546";
        let now = at(began) + Duration::seconds(10);
        let report = aggregate_sessions(&[query(began)], now).unwrap();
        assert!((report.slowest_second - 10.0).abs() < 1e-9);
    }

    #[test]
    fn oldest_of_several_queries_wins() {
        let sessions = vec![
            query("2020-07-03-14:59:50.000000"),
            query("2020-07-03-14:58:00.500000"),
            query("2020-07-03-14:59:59.000000"),
        ];
        let report = aggregate_sessions(&sessions, now()).unwrap();
        assert!((report.slowest_second - 119.5).abs() < 1e-9);
    }

    #[test]
    fn sentinel_begin_is_not_tracked() {
        let report = aggregate_sessions(&[query(NO_OPERATION)], now()).unwrap();
        assert_eq!(report.slowest_second, 0.0);
    }

    #[test]
    fn non_query_and_idle_sessions_are_not_tracked() {
        let mut insert = query("2020-07-03-14:00:00.000000");
        insert.last_op_type = "Insert".to_string();
        let mut idle = query("2020-07-03-14:00:00.000000");
        idle.status = "Idle".to_string();
        let report = aggregate_sessions(&[insert, idle], now()).unwrap();
        assert_eq!(report.slowest_second, 0.0);
    }

    #[test]
    fn future_begin_does_not_go_negative() {
        let report = aggregate_sessions(&[query("2020-07-03-16:00:00.000000")], now()).unwrap();
        assert_eq!(report.slowest_second, 0.0);
    }

    #[test]
    fn malformed_begin_is_an_error() {
        let err = aggregate_sessions(&[query("yesterday")], now()).unwrap_err();
        match err {
            SdbError::MalformedTimestamp { value, .. } => assert_eq!(value, "yesterday"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn both_time_separators_parse_to_same_instant() {
        assert_eq!(
            at("2020-07-03-14:34:49.465546"),
            at("2020-07-03-14.34.49.465546")
        );
    }

    #[test]
    fn aggregating_twice_gives_same_report() {
        let sessions = vec![
            session("Idle", "Agent", 3.0, 1.0),
            query("2020-07-03-14:59:00.000000"),
        ];
        let first = aggregate_sessions(&sessions, now()).unwrap();
        let second = aggregate_sessions(&sessions, now()).unwrap();
        assert_eq!(first, second);
    }
}
