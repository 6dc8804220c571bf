//! In-memory stand-in for the statistics queue.

use crate::{
    connection::{
        Connector,
        Popped,
        QueueConnection,
    },
    error::QueueError,
};
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

/// Commands seen by the fake, tagged with the connection number (from 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(usize),
    Ping(usize),
    Auth(usize, String),
    Pop(usize),
}

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    events: Vec<Event>,
    connections: usize,
    fail_connect: bool,
    fail_ping: bool,
    fail_pop: bool,
}

fn simulated(what: &'static str) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, what))
}

/// Shared list store. Clones observe the same lists and event log.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Append a payload to the tail of `queue`.
    pub fn push(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.state()
            .lists
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.into());
    }

    pub fn len(&self, queue: &str) -> usize {
        self.state().lists.get(queue).map_or(0, VecDeque::len)
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Number of connections opened so far, failed ones included.
    pub fn connections(&self) -> usize {
        self.state().connections
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub fn fail_ping(&self, fail: bool) {
        self.state().fail_ping = fail;
    }

    pub fn fail_pop(&self, fail: bool) {
        self.state().fail_pop = fail;
    }
}

impl Connector for MemoryQueue {
    type Connection = MemoryConnection;

    fn connect(&self) -> BoxFuture<'_, Result<MemoryConnection, QueueError>> {
        let result = {
            let mut state = self.state();
            state.connections += 1;
            let id = state.connections;
            state.events.push(Event::Connect(id));
            if state.fail_connect {
                Err(QueueError::Connect {
                    address: "memory".to_string(),
                    source: simulated("connection refused"),
                })
            } else {
                Ok(MemoryConnection {
                    id,
                    queue: self.clone(),
                })
            }
        };
        async move { result }.boxed()
    }
}

pub struct MemoryConnection {
    id: usize,
    queue: MemoryQueue,
}

impl QueueConnection for MemoryConnection {
    fn ping(&mut self) -> BoxFuture<'_, Result<(), QueueError>> {
        let result = {
            let mut state = self.queue.state();
            state.events.push(Event::Ping(self.id));
            if state.fail_ping {
                Err(QueueError::command("PING", simulated("broken pipe")))
            } else {
                Ok(())
            }
        };
        async move { result }.boxed()
    }

    fn auth<'a>(&'a mut self, token: &'a str) -> BoxFuture<'a, Result<(), QueueError>> {
        self.queue.state().events.push(Event::Auth(self.id, token.to_string()));
        async move { Ok(()) }.boxed()
    }

    /// Never blocks: an empty read answers immediately as if the timeout elapsed.
    fn pop<'a>(
        &'a mut self,
        queues: [&'a str; 2],
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Option<Popped>, QueueError>> {
        let result = {
            let mut state = self.queue.state();
            state.events.push(Event::Pop(self.id));
            if state.fail_pop {
                Err(QueueError::command("BLPOP", simulated("connection reset")))
            } else {
                let popped = queues.iter().find_map(|queue| {
                    state
                        .lists
                        .get_mut(*queue)
                        .and_then(VecDeque::pop_front)
                        .map(|payload| (queue.to_string(), payload))
                });
                Ok(popped)
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
