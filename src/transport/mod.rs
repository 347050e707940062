//! HTTP transport
//!
//! Two execution paths share everything except I/O:
//!
//! - [`HttpTransport`]: `reqwest::blocking`, one thread per in-flight query
//! - [`AsyncHttpTransport`]: `reqwest::Client` on tokio
//!
//! Request building ([`HttpRequestParts`]), error classification
//! ([`classify_error`]) and the TSV row decoder are the same for both, so a
//! statement behaves identically whichever path runs it.

mod blocking;
mod decoder;
mod nonblocking;
mod pool;

pub use blocking::{HttpTransport, RowCursor};
pub use decoder::ResultHeader;
pub use nonblocking::{AsyncHttpTransport, AsyncRowCursor, ByteStream};
pub use pool::{AsyncConnectionPool, AsyncPoolPermit, ConnectionPool, PoolPermit};

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::query::Statement;

/// Response header carrying the server's exception code
pub const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

/// One statement to run, with its request id
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub statement: Statement,
    /// Sent as `query_id`; shows up in the server's query log
    pub query_id: String,
    /// Send the configured database with the request
    pub use_database: bool,
}

impl QueryRequest {
    pub fn new(statement: Statement) -> Self {
        Self {
            statement,
            query_id: uuid::Uuid::new_v4().to_string(),
            use_database: true,
        }
    }

    /// Run outside the configured database (for `CREATE DATABASE` and
    /// friends, before the database exists)
    pub fn without_database(mut self) -> Self {
        self.use_database = false;
        self
    }
}

/// Blocking statement execution
pub trait Transport: Send + Sync {
    fn execute(&self, request: &QueryRequest) -> OrmResult<RowCursor>;
}

/// Async statement execution
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn execute(&self, request: &QueryRequest) -> OrmResult<AsyncRowCursor>;
}

/// Everything needed to send a request, independent of the HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestParts {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: String,
    /// `(user, password)` for basic auth
    pub auth: Option<(String, Option<String>)>,
}

impl HttpRequestParts {
    pub fn new(config: &ConnectionConfig, request: &QueryRequest) -> Self {
        let mut params = Vec::with_capacity(3);
        if request.use_database {
            params.push(("database".to_string(), config.database.clone()));
        }
        params.push(("query_id".to_string(), request.query_id.clone()));
        params.push((
            "date_time_output_format".to_string(),
            "iso".to_string(),
        ));

        Self {
            url: config.base_url(),
            params,
            body: request.statement.body(),
            auth: config
                .user
                .as_ref()
                .map(|user| (user.clone(), config.password.clone())),
        }
    }
}

fn exception_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Code: (\d+)[.,] (?:DB::Exception: )?(.*)").ok())
        .as_ref()
}

/// Extract `(code, message)` from server exception text
pub(crate) fn parse_exception(text: &str) -> Option<(u32, String)> {
    let captures = exception_regex()?.captures(text)?;
    let code = captures.get(1)?.as_str().parse().ok()?;
    let message = captures
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    Some((code, message))
}

/// Turn a failed HTTP response into an error
///
/// Anything carrying a server exception code (header or body) is a
/// **Server** error; everything else is a **Transport** error.
pub fn classify_error(
    status: u16,
    header_code: Option<&str>,
    body: &str,
    statement: &str,
) -> OrmError {
    let parsed = parse_exception(body);
    let code = header_code
        .and_then(|c| c.trim().parse::<u32>().ok())
        .or_else(|| parsed.as_ref().map(|(code, _)| *code));

    match code {
        Some(code) => OrmError::Server {
            code,
            message: parsed
                .map(|(_, message)| message)
                .unwrap_or_else(|| body.trim().to_string()),
            statement: statement.to_string(),
        },
        None => OrmError::Transport {
            message: format!("HTTP {}: {}", status, body.trim()),
            statement: Some(statement.to_string()),
            source: None,
        },
    }
}

/// Map a reqwest failure to a transport error
pub(crate) fn request_error(e: reqwest::Error) -> OrmError {
    let message = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "could not connect to server"
    } else {
        "request failed"
    };
    OrmError::transport_from(message, e)
}

/// The body of an error response could not be read
pub(crate) fn unreadable_error_body(status: u16, e: reqwest::Error, statement: &str) -> OrmError {
    OrmError::transport_from(
        format!("HTTP {}: failed to read error response", status),
        e,
    )
    .with_statement(statement)
}
