//! Request and response types for the SequoiaDB REST gateway.
//!
//! Shared by the snapshot client and its tests so the command vocabulary and
//! the response framing live in one place. The gateway answers every request
//! with a stream of concatenated JSON objects: a header carrying `errno`,
//! followed by zero or more records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The REST gateway listens on the database service port plus this offset.
pub const REST_PORT_OFFSET: u16 = 4;
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024; // 64MB
pub const SESSION_HEADER: &str = "SessionID";

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    #[serde(rename = "SDB_SNAP_SESSIONS")]
    Sessions,
    #[serde(rename = "SDB_SNAP_COLLECTIONSPACES")]
    CollectionSpaces,
    #[serde(rename = "SDB_SNAP_DATABASE")]
    Database,
    #[serde(rename = "SDB_SNAP_SYSTEM")]
    System,
}

impl SnapshotKind {
    /// Parses the `SDB_SNAP_*` name used by item keys.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SDB_SNAP_SESSIONS" => Some(SnapshotKind::Sessions),
            "SDB_SNAP_COLLECTIONSPACES" => Some(SnapshotKind::CollectionSpaces),
            "SDB_SNAP_DATABASE" => Some(SnapshotKind::Database),
            "SDB_SNAP_SYSTEM" => Some(SnapshotKind::System),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SnapshotKind::Sessions => "SDB_SNAP_SESSIONS",
            SnapshotKind::CollectionSpaces => "SDB_SNAP_COLLECTIONSPACES",
            SnapshotKind::Database => "SDB_SNAP_DATABASE",
            SnapshotKind::System => "SDB_SNAP_SYSTEM",
        }
    }

    fn command(self) -> &'static str {
        match self {
            SnapshotKind::Sessions => "snapshot sessions",
            SnapshotKind::CollectionSpaces => "snapshot collectionspaces",
            SnapshotKind::Database => "snapshot database",
            SnapshotKind::System => "snapshot system",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { user: String, password_md5: String },
    Snapshot { kind: SnapshotKind, filter: Option<Value> },
    ListCollectionSpaces,
}

impl Command {
    /// Encodes the command as an `application/x-www-form-urlencoded` body.
    pub fn to_form_body(&self) -> String {
        match self {
            Command::Login { user, password_md5 } => form(&[
                ("cmd", "login"),
                ("user", user.as_str()),
                ("passwd", password_md5.as_str()),
            ]),
            Command::Snapshot { kind, filter } => match filter {
                Some(filter) => {
                    let filter = filter.to_string();
                    form(&[("cmd", kind.command()), ("filter", filter.as_str())])
                }
                None => form(&[("cmd", kind.command())]),
            },
            Command::ListCollectionSpaces => form(&[("cmd", "list collectionspaces")]),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Snapshot { kind, .. } => kind.command(),
            Command::ListCollectionSpaces => "list collectionspaces",
        }
    }
}

fn form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Deserialize)]
struct ResponseHeader {
    errno: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Splits a gateway response body into its header and records.
///
/// A non-zero `errno` in the header is returned as an error whose code is the
/// errno value.
pub fn parse_response_body(body: &[u8]) -> Result<Vec<Record>, ErrorInfo> {
    let mut objects = serde_json::Deserializer::from_slice(body).into_iter::<Value>();

    let header = match objects.next() {
        Some(Ok(value)) => value,
        Some(Err(err)) => {
            return Err(ErrorInfo::new(
                "invalid_response",
                format!("response header is invalid JSON: {}", err),
            ))
        }
        None => return Err(ErrorInfo::new("invalid_response", "response body was empty")),
    };

    let header: ResponseHeader = serde_json::from_value(header).map_err(|err| {
        ErrorInfo::new(
            "invalid_response",
            format!("response header has no errno: {}", err),
        )
    })?;

    if header.errno != 0 {
        let description = header.description.unwrap_or_default();
        let message = match header.detail.filter(|detail| !detail.is_empty()) {
            Some(detail) => format!("{} ({})", description, detail),
            None => description,
        };
        return Err(ErrorInfo::new(&header.errno.to_string(), message));
    }

    let mut records = Vec::new();
    for object in objects {
        match object {
            Ok(Value::Object(record)) => records.push(record),
            Ok(other) => {
                return Err(ErrorInfo::new(
                    "invalid_response",
                    format!("expected a record object, got {}", other),
                ))
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "invalid_response",
                    format!("record is invalid JSON: {}", err),
                ))
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_names_round_trip_through_from_name() {
        for kind in [
            SnapshotKind::Sessions,
            SnapshotKind::CollectionSpaces,
            SnapshotKind::Database,
            SnapshotKind::System,
        ] {
            assert_eq!(SnapshotKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SnapshotKind::from_name("SDB_SNAP_CONTEXTS"), None);
    }

    #[test]
    fn snapshot_command_encodes_filter() {
        let command = Command::Snapshot {
            kind: SnapshotKind::CollectionSpaces,
            filter: Some(json!({"Name": "cs_a"})),
        };
        assert_eq!(
            command.to_form_body(),
            "cmd=snapshot%20collectionspaces&filter=%7B%22Name%22%3A%22cs_a%22%7D"
        );
    }

    #[test]
    fn snapshot_command_without_filter() {
        let command = Command::Snapshot {
            kind: SnapshotKind::Sessions,
            filter: None,
        };
        assert_eq!(command.to_form_body(), "cmd=snapshot%20sessions");
        assert_eq!(command.label(), "snapshot sessions");
    }

    #[test]
    fn parses_header_and_records() {
        let body = br#"{ "errno": 0 }{ "Name": "a" }
{ "Name": "b" }"#;
        let records = parse_response_body(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["Name"], "b");
    }

    #[test]
    fn header_only_body_yields_no_records() {
        let records = parse_response_body(br#"{"errno":0}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn nonzero_errno_becomes_error() {
        let body = br#"{ "errno": -179, "description": "Authority is forbidden", "detail": "" }"#;
        let err = parse_response_body(body).unwrap_err();
        assert_eq!(err.code, "-179");
        assert_eq!(err.message, "Authority is forbidden");
    }

    #[test]
    fn empty_body_is_invalid() {
        let err = parse_response_body(b"").unwrap_err();
        assert_eq!(err.code, "invalid_response");
    }

    #[test]
    fn non_object_record_is_invalid() {
        let err = parse_response_body(br#"{"errno":0}[1,2]"#).unwrap_err();
        assert_eq!(err.code, "invalid_response");
    }
}
