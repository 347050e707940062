//! Blocking transport over `reqwest::blocking`

use std::io::{BufRead, BufReader, Cursor, Read};
use std::sync::Arc;

use reqwest::blocking::Client;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::query::Statement;

use super::decoder::{decode_row, line_from_bytes, ResultHeader};
use super::pool::{ConnectionPool, PoolPermit};
use super::{
    classify_error, request_error, unreadable_error_body, HttpRequestParts, QueryRequest,
    Transport, EXCEPTION_CODE_HEADER,
};

/// Blocking HTTP transport with a bounded connection pool
pub struct HttpTransport {
    client: Client,
    config: Arc<ConnectionConfig>,
    pool: Arc<ConnectionPool>,
}

impl HttpTransport {
    /// Build the HTTP client
    ///
    /// Must not be called from inside an async runtime; use
    /// [`AsyncHttpTransport`](super::AsyncHttpTransport) there.
    pub fn new(config: Arc<ConnectionConfig>) -> OrmResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| OrmError::transport_from("failed to create HTTP client", e))?;
        let pool = ConnectionPool::new(config.max_connections, config.pool_timeout());
        Ok(Self {
            client,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &QueryRequest) -> OrmResult<RowCursor> {
        let statement = &request.statement.text;
        let permit = self.pool.acquire()?;
        let parts = HttpRequestParts::new(&self.config, request);

        let mut builder = self
            .client
            .post(&parts.url)
            .query(&parts.params)
            .body(parts.body);
        if let Some((user, password)) = &parts.auth {
            builder = builder.basic_auth(user, password.as_ref());
        }

        let response = builder
            .send()
            .map_err(|e| request_error(e).with_statement(statement))?;

        let status = response.status();
        if !status.is_success() {
            let header_code = response
                .headers()
                .get(EXCEPTION_CODE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .text()
                .map_err(|e| unreadable_error_body(status.as_u16(), e, statement))?;
            return Err(classify_error(
                status.as_u16(),
                header_code.as_deref(),
                &body,
                statement,
            ));
        }

        debug!(query_id = %request.query_id, status = %status, "response received");
        RowCursor::new(
            Box::new(BufReader::new(response)),
            &request.statement,
            Some(permit),
        )
    }
}

/// Forward-only cursor over a blocking response body
///
/// Yields raw cells; `None` is SQL NULL. The first error ends the cursor.
pub struct RowCursor {
    header: Option<ResultHeader>,
    reader: Box<dyn BufRead + Send>,
    statement: String,
    done: bool,
    _permit: Option<PoolPermit>,
}

impl RowCursor {
    /// Wrap a response body, reading the header lines of row-returning
    /// statements
    pub fn new(
        reader: Box<dyn BufRead + Send>,
        statement: &Statement,
        permit: Option<PoolPermit>,
    ) -> OrmResult<Self> {
        let mut cursor = Self {
            header: None,
            reader,
            statement: statement.text.clone(),
            done: false,
            _permit: permit,
        };
        if statement.format.is_some() {
            cursor.header = Some(cursor.read_header()?);
        }
        Ok(cursor)
    }

    /// Cursor over an in-memory body
    pub fn from_body(body: impl Into<Vec<u8>>, statement: &Statement) -> OrmResult<Self> {
        Self::new(Box::new(Cursor::new(body.into())), statement, None)
    }

    /// Column names and types; `None` for statements without a result set
    pub fn header(&self) -> Option<&ResultHeader> {
        self.header.as_ref()
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Read the rest of the body as text
    pub fn into_text(mut self) -> OrmResult<String> {
        let mut body = String::new();
        self.reader
            .read_to_string(&mut body)
            .map_err(|e| {
                OrmError::transport_from("failed to read response", e)
                    .with_statement(&self.statement)
            })?;
        Ok(body)
    }

    fn read_header(&mut self) -> OrmResult<ResultHeader> {
        let names = match self.next_line()? {
            Some(line) => line,
            None => return Ok(ResultHeader::default()),
        };
        let types = self.next_line()?.ok_or_else(|| {
            OrmError::decode("<header>", None, "response ended before the type header")
                .with_statement(&self.statement)
        })?;
        ResultHeader::parse(&names, &types, &self.statement)
    }

    fn next_line(&mut self) -> OrmResult<Option<String>> {
        let mut buf = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| {
                OrmError::transport_from("response stream interrupted", e)
                    .with_statement(&self.statement)
            })?;
        if read == 0 {
            return Ok(None);
        }
        line_from_bytes(buf)
            .map(Some)
            .map_err(|e| e.with_statement(&self.statement))
    }
}

impl Iterator for RowCursor {
    type Item = OrmResult<Vec<Option<String>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.header.is_none() {
            self.done = true;
            return None;
        }
        let result = match self.next_line() {
            Ok(Some(line)) => match &self.header {
                Some(header) => decode_row(&line, header, &self.statement),
                None => return None,
            },
            Ok(None) => {
                self.done = true;
                self._permit = None;
                return None;
            }
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
            self._permit = None;
        }
        Some(result)
    }
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("header", &self.header)
            .field("statement", &self.statement)
            .field("done", &self.done)
            .finish()
    }
}
