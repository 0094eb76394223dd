//! Transport layer abstraction for remote requests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

/// A transport-level failure: connection refused, bad status, and so on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable description.
    pub message: String,
    /// HTTP-style status code, if the remote answered at all.
    pub status: Option<u16>,
}

impl TransportError {
    /// Creates an error for a remote that could not be reached.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Creates an error for a remote that answered with a failure status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: format!("status {status}: {}", message.into()),
            status: Some(status),
        }
    }
}

/// A remote transport moves raw bytes to and from the quote server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, a file-backed simulated server, mock for testing).
/// Decoding is the fetcher's job.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Reads the resource at `path`.
    async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// Sends `body` to `path` and returns the response body.
    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// A mock transport for testing.
///
/// `get` answers from a queue of scripted responses, falling back to a
/// default body once the queue is empty. `post` does the same and records
/// every request it receives.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    get_responses: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    get_default: Mutex<Option<Vec<u8>>>,
    post_responses: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    posted: Mutex<Vec<(String, Vec<u8>)>>,
    get_count: AtomicUsize,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            get_responses: Mutex::new(VecDeque::new()),
            get_default: Mutex::new(None),
            post_responses: Mutex::new(VecDeque::new()),
            posted: Mutex::new(Vec::new()),
            get_count: AtomicUsize::new(0),
        }
    }

    /// Queues a response for the next `get`.
    pub fn push_get(&self, response: Result<Vec<u8>, TransportError>) {
        self.get_responses.lock().push_back(response);
    }

    /// Sets the body returned by `get` once the queue is empty.
    pub fn set_get_body(&self, body: impl Into<Vec<u8>>) {
        *self.get_default.lock() = Some(body.into());
    }

    /// Queues a response for the next `post`.
    pub fn push_post(&self, response: Result<Vec<u8>, TransportError>) {
        self.post_responses.lock().push_back(response);
    }

    /// Sets the connected state. A disconnected mock fails every request.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every `post` received so far, as `(path, body)`.
    pub fn posted(&self) -> Vec<(String, Vec<u8>)> {
        self.posted.lock().clone()
    }

    /// Returns the number of `get` calls received.
    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::unreachable("not connected"))
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn get(&self, _path: &str) -> Result<Vec<u8>, TransportError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        if let Some(response) = self.get_responses.lock().pop_front() {
            return response;
        }
        self.get_default
            .lock()
            .clone()
            .ok_or_else(|| TransportError::status(404, "no mock get response set"))
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        self.posted.lock().push((path.to_string(), body));
        self.post_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::status(404, "no mock post response set")))
    }
}
