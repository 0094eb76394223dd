//! Remote fetcher and its JSON implementation.
//!
//! The fetcher turns whatever the remote speaks into a [`Snapshot`]. The
//! transport underneath is abstracted via [`RemoteTransport`] so the same
//! decoding runs against a real HTTP client, the CLI's file-backed server,
//! or a mock.

use crate::error::FetchError;
use crate::transport::RemoteTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use quotesync_protocol::{Item, ItemId, ItemStatus, OriginTag, Payload, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Server acknowledgement of one uploaded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAck {
    /// Id the item had locally when it was uploaded.
    pub local_id: ItemId,
    /// Id the server assigned. May equal `local_id`.
    pub remote_id: ItemId,
}

/// Boundary to the remote quote source.
///
/// Implementations never return partial data: a response is either fully
/// decoded or rejected. Retries and timeouts are driven by the
/// [`SyncEngine`](crate::SyncEngine), not by the fetcher.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Retrieves the full remote collection.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Unavailable`] if the remote cannot be reached
    /// - [`FetchError::InvalidData`] if the response cannot be decoded
    async fn fetch(&self) -> Result<Snapshot, FetchError>;

    /// Uploads locally created items and returns the server's acknowledgements.
    ///
    /// Items without an acknowledgement were not accepted.
    ///
    /// # Errors
    ///
    /// Same classification as [`fetch`](Self::fetch).
    async fn upload(&self, items: &[Item]) -> Result<Vec<UploadAck>, FetchError>;
}

#[async_trait]
impl<F: RemoteFetcher + ?Sized> RemoteFetcher for Arc<F> {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        (**self).fetch().await
    }

    async fn upload(&self, items: &[Item]) -> Result<Vec<UploadAck>, FetchError> {
        (**self).upload(items).await
    }
}

/// An id as it appears on the wire: quote servers use numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Numeric id, e.g. `17`.
    Number(u64),
    /// String id, e.g. `"q-17"`.
    Text(String),
}

impl From<WireId> for ItemId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => ItemId::from(n),
            WireId::Text(s) => ItemId::new(s),
        }
    }
}

impl From<&ItemId> for WireId {
    fn from(id: &ItemId) -> Self {
        WireId::Text(id.as_str().to_string())
    }
}

fn default_category() -> String {
    "General".to_string()
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// One quote as exchanged with the server.
///
/// `text` is also accepted as `title` or `body`, and `attribution` as
/// `author`. A missing category defaults to `"General"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Record id.
    pub id: WireId,
    /// Quote text.
    #[serde(alias = "title", alias = "body")]
    pub text: String,
    /// Optional author.
    #[serde(default, alias = "author", skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Category label.
    #[serde(default = "default_category")]
    pub category: String,
    /// Last modification on the server, milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub modified_at: u64,
}

impl WireRecord {
    /// Encodes a local item for upload.
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: WireId::from(&item.id),
            text: item.payload.text.clone(),
            attribution: item.payload.attribution.clone(),
            category: item.payload.category.clone(),
            modified_at: item.modified_at,
        }
    }

    /// Decodes the record as a server-confirmed item.
    pub fn into_item(self) -> Item {
        Item {
            id: self.id.into(),
            payload: Payload {
                text: self.text,
                attribution: self.attribution,
                category: self.category,
            },
            origin: OriginTag::Remote,
            modified_at: self.modified_at,
            status: ItemStatus::Synced,
        }
    }
}

/// The versioned collection document served by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCollection {
    /// Remote version marker.
    pub version: u64,
    /// Quote records.
    pub items: Vec<WireRecord>,
}

/// Acknowledgement record returned for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAck {
    /// Id sent in the upload.
    pub local_id: WireId,
    /// Id assigned by the server.
    pub id: WireId,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionShape {
    Versioned(RemoteCollection),
    Bare(Vec<WireRecord>),
}

/// Decodes a collection body into a snapshot.
///
/// Accepts `{"version": n, "items": [...]}` or a bare array, which gets
/// version 0.
///
/// # Errors
///
/// Returns [`FetchError::InvalidData`] for malformed JSON, records without
/// `id` or `text`, or repeated ids.
pub fn decode_collection(bytes: &[u8]) -> Result<Snapshot, FetchError> {
    let shape: CollectionShape = serde_json::from_slice(bytes)
        .map_err(|e| FetchError::InvalidData(format!("failed to decode collection: {e}")))?;
    let collection = match shape {
        CollectionShape::Versioned(collection) => collection,
        CollectionShape::Bare(items) => RemoteCollection { version: 0, items },
    };

    let items: Vec<Item> = collection
        .items
        .into_iter()
        .map(WireRecord::into_item)
        .collect();
    let snapshot = Snapshot::new(items, collection.version);
    if let Some(id) = snapshot.duplicate_id() {
        return Err(FetchError::InvalidData(format!(
            "remote collection repeats id {id}"
        )));
    }
    Ok(snapshot)
}

/// Remote fetcher speaking JSON over a [`RemoteTransport`].
///
/// `GET {path}` returns the collection; `POST {path}` takes an array of
/// [`WireRecord`]s and answers with an array of [`WireAck`]s.
pub struct HttpFetcher<T: RemoteTransport> {
    transport: T,
    path: String,
    last_error: RwLock<Option<String>>,
}

impl<T: RemoteTransport> HttpFetcher<T> {
    /// Creates a fetcher for the collection at `path`.
    pub fn new(transport: T, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the collection path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record<V>(&self, result: Result<V, FetchError>) -> Result<V, FetchError> {
        *self.last_error.write() = result.as_ref().err().map(ToString::to_string);
        result
    }

    async fn fetch_inner(&self) -> Result<Snapshot, FetchError> {
        let body = self
            .transport
            .get(&self.path)
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;
        let snapshot = decode_collection(&body)?;
        debug!(
            items = snapshot.len(),
            version = snapshot.version,
            "fetched remote collection"
        );
        Ok(snapshot)
    }

    async fn upload_inner(&self, items: &[Item]) -> Result<Vec<UploadAck>, FetchError> {
        let records: Vec<WireRecord> = items.iter().map(WireRecord::from_item).collect();
        let body = serde_json::to_vec(&records)
            .map_err(|e| FetchError::InvalidData(format!("failed to encode upload: {e}")))?;

        let response = self
            .transport
            .post(&self.path, body)
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;
        let acks: Vec<WireAck> = serde_json::from_slice(&response)
            .map_err(|e| FetchError::InvalidData(format!("failed to decode upload acks: {e}")))?;

        let sent: HashSet<&ItemId> = items.iter().map(|item| &item.id).collect();
        let mut confirmed = Vec::with_capacity(acks.len());
        for ack in acks {
            let local_id = ItemId::from(ack.local_id);
            if !sent.contains(&local_id) {
                return Err(FetchError::InvalidData(format!(
                    "acknowledgement for unknown item {local_id}"
                )));
            }
            confirmed.push(UploadAck {
                local_id,
                remote_id: ack.id.into(),
            });
        }
        debug!(sent = items.len(), acked = confirmed.len(), "uploaded items");
        Ok(confirmed)
    }
}

#[async_trait]
impl<T: RemoteTransport> RemoteFetcher for HttpFetcher<T> {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let result = self.fetch_inner().await;
        self.record(result)
    }

    async fn upload(&self, items: &[Item]) -> Result<Vec<UploadAck>, FetchError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.upload_inner(items).await;
        self.record(result)
    }
}
