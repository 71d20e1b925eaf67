//! Snapshot source backed by the SequoiaDB REST gateway.
//!
//! Every command is one form-encoded `POST /` through a blocking `reqwest`
//! client. Failures surface as `UpstreamFetch` errors; there is no retry.

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sdb_core::{ConnectConfig, Connector, Result, SdbError, SnapshotSource};
use sdb_rest_protocol::{
    parse_response_body, Command, Record, SnapshotKind, MAX_RESPONSE_BYTES, SESSION_HEADER,
};
use serde_json::Value;
use std::io::Read;
use std::time::Duration;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Opens one [`RestClient`] per configured instance.
pub struct RestConnector;

impl Connector for RestConnector {
    type Source = RestClient;

    fn connect(&self, connect: &ConnectConfig) -> Result<RestClient> {
        RestClient::connect(connect)
    }
}

pub struct RestClient {
    client: Client,
    url: String,
    endpoint: String,
    session_id: Option<String>,
}

impl RestClient {
    /// Builds the HTTP client and, when credentials are configured, logs in.
    pub fn connect(config: &ConnectConfig) -> Result<Self> {
        let endpoint = format!("{}:{}", config.host, config.rest_port());
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .user_agent(concat!("zbx-sdb/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| SdbError::UpstreamFetch {
                context: endpoint.clone(),
                details: format!("Failed to create HTTP client: {}", error_chain(&err)),
            })?;

        let mut rest = Self {
            client,
            url: format!("http://{}/", endpoint),
            endpoint,
            session_id: None,
        };

        if !config.user.is_empty() {
            rest.login(&config.user, &config.password)?;
        }

        Ok(rest)
    }

    fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let command = Command::Login {
            user: user.to_string(),
            password_md5: format!("{:x}", md5::compute(password.as_bytes())),
        };
        let response = self.send(&command)?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        self.read_records(&command, response)?;

        let session_id = session_id
            .ok_or_else(|| self.upstream_error(&command, "login response has no session id"))?;
        self.session_id = Some(session_id);
        tracing::debug!(endpoint = %self.endpoint, user = %user, "Logged in to REST gateway");
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<Vec<Record>> {
        let response = self.send(command)?;
        let records = self.read_records(command, response)?;
        tracing::debug!(
            endpoint = %self.endpoint,
            command = command.label(),
            records = records.len(),
            "REST command completed"
        );
        Ok(records)
    }

    fn send(&self, command: &Command) -> Result<Response> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(command.to_form_body());
        if let Some(session_id) = &self.session_id {
            request = request.header(SESSION_HEADER, session_id.as_str());
        }

        let response = request
            .send()
            .map_err(|err| self.upstream_error(command, &error_chain(&err)))?;
        if !response.status().is_success() {
            return Err(self.upstream_error(
                command,
                &format!("REST gateway returned {}", response.status()),
            ));
        }
        Ok(response)
    }

    fn read_records(&self, command: &Command, response: Response) -> Result<Vec<Record>> {
        if response
            .content_length()
            .is_some_and(|length| length > MAX_RESPONSE_BYTES as u64)
        {
            return Err(self.upstream_error(command, "Response exceeded maximum size"));
        }

        let mut body = Vec::new();
        response
            .take(MAX_RESPONSE_BYTES as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|err| {
                self.upstream_error(command, &format!("Failed to read response: {}", err))
            })?;
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(self.upstream_error(command, "Response exceeded maximum size"));
        }

        parse_response_body(&body).map_err(|info| self.upstream_error(command, &info.to_string()))
    }

    fn upstream_error(&self, command: &Command, details: &str) -> SdbError {
        SdbError::UpstreamFetch {
            context: format!("{} {}", self.endpoint, command.label()),
            details: details.to_string(),
        }
    }
}

impl SnapshotSource for RestClient {
    fn snapshot(&mut self, kind: SnapshotKind, condition: Option<Value>) -> Result<Vec<Record>> {
        self.execute(&Command::Snapshot {
            kind,
            filter: condition,
        })
    }

    fn list_collection_spaces(&mut self) -> Result<Vec<Record>> {
        self.execute(&Command::ListCollectionSpaces)
    }
}

/// `reqwest` keeps the useful part (refused, timed out) in the source chain.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
