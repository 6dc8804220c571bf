//! In-memory stand-in for the store.

use crate::{
    client::SeriesStore,
    error::StoreError,
};
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub database: String,
    pub policy: String,
    pub body: String,
}

#[derive(Default)]
struct State {
    queries: Vec<String>,
    writes: Vec<RecordedWrite>,
    query_error: Option<StoreError>,
    fail_writes: bool,
}

/// Records statements and writes. Clones share the record.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state().queries.clone()
    }

    /// Successful writes only.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state().writes.clone()
    }

    /// Every following statement fails with a copy of `error`.
    pub fn fail_queries_with(&self, error: Option<StoreError>) {
        self.state().query_error = error;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }
}

fn copy_of(error: &StoreError) -> StoreError {
    match error {
        StoreError::Statement(message) => StoreError::Statement(message.clone()),
        StoreError::Status { status, body } => StoreError::Status {
            status: *status,
            body: body.clone(),
        },
        other => StoreError::Statement(other.to_string()),
    }
}

impl SeriesStore for MemoryStore {
    fn query<'a>(&'a self, statement: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = {
            let mut state = self.state();
            state.queries.push(statement.to_string());
            match &state.query_error {
                Some(error) => Err(copy_of(error)),
                None => Ok(()),
            }
        };
        async move { result }.boxed()
    }

    fn write<'a>(&'a self, database: &'a str, policy: &'a str, body: String) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = {
            let mut state = self.state();
            if state.fail_writes {
                Err(StoreError::Status {
                    status: 500,
                    body: "timeout".to_string(),
                })
            } else {
                state.writes.push(RecordedWrite {
                    database: database.to_string(),
                    policy: policy.to_string(),
                    body,
                });
                Ok(())
            }
        };
        async move { result }.boxed()
    }
}

/// Answers a single HTTP request on a local port with a canned response.
///
/// The handle resolves to the raw request text once the response is sent.
#[cfg(test)]
pub(crate) async fn serve_once(
    status: &'static str,
    body: &'static str,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<String>) {
    use tokio::{
        io::{
            AsyncReadExt as _,
            AsyncWriteExt as _,
        },
        net::TcpListener,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
            let Some(head_end) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= head_end + 4 + content_length {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&request).into_owned()
    });
    (address, handle)
}
