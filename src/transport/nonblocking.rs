//! Async transport over `reqwest::Client`

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Client;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::query::Statement;

use super::decoder::{decode_row, LineBuffer, ResultHeader};
use super::pool::{AsyncConnectionPool, AsyncPoolPermit};
use super::{
    classify_error, request_error, unreadable_error_body, AsyncTransport, HttpRequestParts,
    QueryRequest, EXCEPTION_CODE_HEADER,
};

/// Response body as a stream of chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = OrmResult<Vec<u8>>> + Send>>;

/// Async HTTP transport with a semaphore-bounded pool
pub struct AsyncHttpTransport {
    client: Client,
    config: Arc<ConnectionConfig>,
    pool: AsyncConnectionPool,
}

impl AsyncHttpTransport {
    pub fn new(config: Arc<ConnectionConfig>) -> OrmResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| OrmError::transport_from("failed to create HTTP client", e))?;
        let pool = AsyncConnectionPool::new(config.max_connections, config.pool_timeout());
        Ok(Self {
            client,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &AsyncConnectionPool {
        &self.pool
    }
}

#[async_trait]
impl AsyncTransport for AsyncHttpTransport {
    async fn execute(&self, request: &QueryRequest) -> OrmResult<AsyncRowCursor> {
        let statement = &request.statement.text;
        let permit = self.pool.acquire().await?;
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
            .await
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
                .await
                .map_err(|e| unreadable_error_body(status.as_u16(), e, statement))?;
            return Err(classify_error(
                status.as_u16(),
                header_code.as_deref(),
                &body,
                statement,
            ));
        }

        debug!(query_id = %request.query_id, status = %status, "response received");
        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| OrmError::transport_from("response stream interrupted", e))
        });
        AsyncRowCursor::new(Box::pin(body), &request.statement, Some(permit)).await
    }
}

/// Forward-only cursor over an async response body
///
/// Dropping the cursor, or calling [`AsyncRowCursor::cancel`], closes the
/// body and returns the pool permit.
pub struct AsyncRowCursor {
    header: Option<ResultHeader>,
    body: Option<ByteStream>,
    buffer: LineBuffer,
    statement: String,
    done: bool,
    _permit: Option<AsyncPoolPermit>,
}

impl AsyncRowCursor {
    /// Wrap a response body, reading the header lines of row-returning
    /// statements
    pub async fn new(
        body: ByteStream,
        statement: &Statement,
        permit: Option<AsyncPoolPermit>,
    ) -> OrmResult<Self> {
        let mut cursor = Self {
            header: None,
            body: Some(body),
            buffer: LineBuffer::default(),
            statement: statement.text.clone(),
            done: false,
            _permit: permit,
        };
        if statement.format.is_some() {
            cursor.header = Some(cursor.read_header().await?);
        }
        Ok(cursor)
    }

    /// Cursor over an in-memory body
    pub async fn from_body(body: impl Into<Vec<u8>>, statement: &Statement) -> OrmResult<Self> {
        let chunks: Vec<OrmResult<Vec<u8>>> = vec![Ok(body.into())];
        Self::new(Box::pin(stream::iter(chunks)), statement, None).await
    }

    pub fn header(&self) -> Option<&ResultHeader> {
        self.header.as_ref()
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Whether rows may still be read
    pub fn is_open(&self) -> bool {
        !self.done
    }

    /// Next row of raw cells, `None` once the body is exhausted
    ///
    /// The first error closes the cursor.
    pub async fn next_row(&mut self) -> Option<OrmResult<Vec<Option<String>>>> {
        if self.done {
            return None;
        }
        if self.header.is_none() {
            return None;
        }
        let result = match self.next_line().await {
            Ok(Some(line)) => match &self.header {
                Some(header) => decode_row(&line, header, &self.statement),
                None => return None,
            },
            Ok(None) => {
                self.cancel();
                return None;
            }
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.cancel();
        }
        Some(result)
    }

    /// Rows as a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = OrmResult<Vec<Option<String>>>> + Send {
        stream::unfold(self, |mut cursor| async move {
            cursor.next_row().await.map(|row| (row, cursor))
        })
    }

    /// Stop reading: closes the body and releases the pool permit
    pub fn cancel(&mut self) {
        self.done = true;
        self.body = None;
        self.buffer = LineBuffer::default();
        self._permit = None;
    }

    /// Read the rest of the body as text
    pub async fn into_text(mut self) -> OrmResult<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        Ok(text)
    }

    async fn read_header(&mut self) -> OrmResult<ResultHeader> {
        let names = match self.next_line().await? {
            Some(line) => line,
            None => return Ok(ResultHeader::default()),
        };
        let types = self.next_line().await?.ok_or_else(|| {
            OrmError::decode("<header>", None, "response ended before the type header")
                .with_statement(&self.statement)
        })?;
        ResultHeader::parse(&names, &types, &self.statement)
    }

    async fn next_line(&mut self) -> OrmResult<Option<String>> {
        loop {
            let buffered = self
                .buffer
                .pop_line()
                .map_err(|e| e.with_statement(&self.statement))?;
            if let Some(line) = buffered {
                return Ok(Some(line));
            }
            let body = match self.body.as_mut() {
                Some(body) => body,
                None => return Ok(None),
            };
            match body.next().await {
                Some(Ok(chunk)) => self.buffer.extend(&chunk),
                Some(Err(e)) => return Err(e.with_statement(&self.statement)),
                None => {
                    self.body = None;
                    return self
                        .buffer
                        .finish()
                        .map_err(|e| e.with_statement(&self.statement));
                }
            }
        }
    }
}

impl std::fmt::Debug for AsyncRowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRowCursor")
            .field("header", &self.header)
            .field("statement", &self.statement)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::AsyncConnectionPool;
    use crate::test_support::truncated_error_server;
    use std::time::Duration;

    fn chunked(parts: &[&str]) -> ByteStream {
        let chunks: Vec<OrmResult<Vec<u8>>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_rows_split_across_chunks() {
        let statement = Statement::query("SELECT name, age FROM person");
        let body = chunked(&["na", "me\tage\nStr", "ing\tUInt8\nAnn\t3", "0\nBob\t\\N\n"]);
        let mut cursor = AsyncRowCursor::new(body, &statement, None).await.unwrap();

        assert_eq!(cursor.header().unwrap().names, vec!["name", "age"]);
        assert_eq!(
            cursor.next_row().await.unwrap().unwrap(),
            vec![Some("Ann".to_string()), Some("30".to_string())]
        );
        assert_eq!(
            cursor.next_row().await.unwrap().unwrap(),
            vec![Some("Bob".to_string()), None]
        );
        assert!(cursor.next_row().await.is_none());
        assert!(!cursor.is_open());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let statement = Statement::query("SELECT n");
        let cursor = AsyncRowCursor::from_body("n\nUInt8\n1\n2\n3\n", &statement)
            .await
            .unwrap();
        let rows: Vec<_> = cursor.into_stream().collect().await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_stream_error_carries_statement() {
        let statement = Statement::query("SELECT n");
        let body: ByteStream = Box::pin(stream::iter(vec![
            Ok(b"n\nUInt8\n1\n".to_vec()),
            Err(OrmError::transport("connection reset")),
        ]));
        let mut cursor = AsyncRowCursor::new(body, &statement, None).await.unwrap();
        assert!(cursor.next_row().await.unwrap().is_ok());
        let err = cursor.next_row().await.unwrap().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.statement(), Some("SELECT n"));
        assert!(cursor.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_releases_permit() {
        let pool = AsyncConnectionPool::new(1, Duration::from_millis(50));
        let permit = pool.acquire().await.unwrap();
        let statement = Statement::query("SELECT n");
        let mut cursor = AsyncRowCursor::new(chunked(&["n\nUInt8\n1\n2\n"]), &statement, Some(permit))
            .await
            .unwrap();

        assert!(cursor.next_row().await.unwrap().is_ok());
        assert_eq!(pool.available(), 0);
        cursor.cancel();
        assert_eq!(pool.available(), 1);
        assert!(cursor.next_row().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_cursor_releases_permit() {
        let pool = AsyncConnectionPool::new(1, Duration::from_millis(50));
        let permit = pool.acquire().await.unwrap();
        let statement = Statement::query("SELECT n");
        let cursor = AsyncRowCursor::new(chunked(&["n\nUInt8\n1\n"]), &statement, Some(permit))
            .await
            .unwrap();
        drop(cursor);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_into_text() {
        let statement = Statement::command("SELECT version()");
        let cursor = AsyncRowCursor::from_body("23.8.1.1\n", &statement)
            .await
            .unwrap();
        assert_eq!(cursor.into_text().await.unwrap(), "23.8.1.1\n");
    }

    #[tokio::test]
    async fn test_unreadable_error_body_is_transport_error() {
        let mut config = ConnectionConfig::new("default");
        config.port = truncated_error_server();
        config.timeout_secs = 5;
        let transport = AsyncHttpTransport::new(Arc::new(config)).unwrap();

        let err = transport
            .execute(&QueryRequest::new(Statement::query("SELECT 1")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert_eq!(err.statement(), Some("SELECT 1"));
    }
}
