//! In-process mock of the database's HTTP interface
//!
//! The server runs on its own thread with its own runtime so both the
//! blocking and the async transports can talk to it from any test.

use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::sync::oneshot;

const FORMAT_SUFFIX: &str = " FORMAT TabSeparatedWithNamesAndTypes";

#[derive(Debug, Clone)]
struct Recorded {
    statement: String,
    params: Vec<(String, String)>,
}

pub(crate) struct MockServer {
    addr: SocketAddr,
    log: Arc<Mutex<Vec<Recorded>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    /// Serve `POST /`, answering each statement with `handler`
    ///
    /// The handler sees the statement without its `FORMAT` suffix.
    pub(crate) fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);
        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_log = Arc::clone(&log);
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();

                let app = Router::new().route(
                    "/",
                    post(
                        move |Query(params): Query<Vec<(String, String)>>, body: String| {
                            let handler = Arc::clone(&handler);
                            let log = Arc::clone(&server_log);
                            async move {
                                let statement =
                                    body.strip_suffix(FORMAT_SUFFIX).unwrap_or(&body).to_string();
                                let response = handler(&statement);
                                log.lock().unwrap().push(Recorded { statement, params });
                                response
                            }
                        },
                    ),
                );
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        Self {
            addr: addr_rx.recv().unwrap(),
            log,
            shutdown: Some(shutdown_tx),
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Statements received so far, in arrival order
    pub(crate) fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.statement.clone())
            .collect()
    }

    /// Query parameters of each request, in arrival order
    pub(crate) fn params(&self) -> Vec<Vec<(String, String)>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.params.clone())
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A local port nothing is listening on
pub(crate) fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Answers one request with a 500 whose body ends early
pub(crate) fn truncated_error_server() -> u16 {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\nCode: 1",
            );
        }
    });
    port
}
