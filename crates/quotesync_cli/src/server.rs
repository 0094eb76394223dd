//! File-backed simulated quote server.
//!
//! The server document is a [`RemoteCollection`] stored as JSON. `GET`
//! returns it, `POST` accepts uploaded records: records whose id is already
//! on the server are updates, everything else gets the next numeric id.
//! Every change bumps the collection version.

use async_trait::async_trait;
use quotesync_engine::{
    RemoteCollection, RemoteTransport, TransportError, WireAck, WireId, WireRecord,
};
use quotesync_protocol::{now_millis, ItemId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Path the quote collection is served under.
pub const COLLECTION_PATH: &str = "/quotes";

/// A quote server living in a single JSON file.
pub struct FileServer {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileServer {
    /// Creates a server backed by `path`. A missing file is an empty server.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current collection.
    pub async fn load(&self) -> Result<RemoteCollection, TransportError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RemoteCollection::default()),
            Err(e) => return Err(TransportError::unreachable(e.to_string())),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(RemoteCollection::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::status(500, format!("corrupt server file: {e}")))
    }

    async fn save(&self, collection: &RemoteCollection) -> Result<(), TransportError> {
        let json = serde_json::to_vec_pretty(collection)
            .map_err(|e| TransportError::status(500, e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TransportError::unreachable(e.to_string()))?;
            }
        }
        let mut temp = self.path.as_os_str().to_os_string();
        temp.push(".tmp");
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| TransportError::unreachable(e.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| TransportError::unreachable(e.to_string()))
    }

    /// Stores `records` and returns one acknowledgement per record.
    pub async fn accept(&self, records: Vec<WireRecord>) -> Result<Vec<WireAck>, TransportError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        let mut next_id = next_numeric_id(&collection);

        let mut acks = Vec::with_capacity(records.len());
        for record in records {
            let key = ItemId::from(record.id.clone());
            let position = collection
                .items
                .iter()
                .position(|stored| ItemId::from(stored.id.clone()) == key);

            let id = match position {
                Some(index) => {
                    let stored = &mut collection.items[index];
                    stored.text = record.text;
                    stored.attribution = record.attribution;
                    stored.category = record.category;
                    stored.modified_at = record.modified_at;
                    stored.id.clone()
                }
                None => {
                    let id = WireId::Number(next_id);
                    next_id += 1;
                    collection.items.push(WireRecord {
                        id: id.clone(),
                        ..record.clone()
                    });
                    id
                }
            };
            acks.push(WireAck {
                local_id: record.id,
                id,
            });
        }

        if !acks.is_empty() {
            collection.version += 1;
            self.save(&collection).await?;
        }
        debug!(accepted = acks.len(), version = collection.version, "server accepted upload");
        Ok(acks)
    }

    /// Adds a quote directly on the server and returns its id.
    pub async fn add(
        &self,
        text: &str,
        category: &str,
        attribution: Option<String>,
    ) -> Result<WireId, TransportError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        let id = WireId::Number(next_numeric_id(&collection));
        collection.items.push(WireRecord {
            id: id.clone(),
            text: text.to_string(),
            attribution,
            category: category.to_string(),
            modified_at: now_millis(),
        });
        collection.version += 1;
        self.save(&collection).await?;
        Ok(id)
    }

    /// Changes the text of a quote on the server. Returns false if `id` is unknown.
    pub async fn edit(&self, id: &str, text: &str) -> Result<bool, TransportError> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await?;
        let key = ItemId::new(id);
        let Some(stored) = collection
            .items
            .iter_mut()
            .find(|stored| ItemId::from(stored.id.clone()) == key)
        else {
            return Ok(false);
        };
        stored.text = text.to_string();
        stored.modified_at = now_millis();
        collection.version += 1;
        self.save(&collection).await?;
        Ok(true)
    }
}

fn next_numeric_id(collection: &RemoteCollection) -> u64 {
    collection
        .items
        .iter()
        .filter_map(|record| match &record.id {
            WireId::Number(n) => Some(*n),
            WireId::Text(s) => s.parse().ok(),
        })
        .max()
        .unwrap_or(0)
        + 1
}

fn check_path(path: &str) -> Result<(), TransportError> {
    if path == COLLECTION_PATH {
        Ok(())
    } else {
        Err(TransportError::status(404, format!("no resource at {path}")))
    }
}

#[async_trait]
impl RemoteTransport for FileServer {
    async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        check_path(path)?;
        let collection = self.load().await?;
        serde_json::to_vec(&collection).map_err(|e| TransportError::status(500, e.to_string()))
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        check_path(path)?;
        let records: Vec<WireRecord> = serde_json::from_slice(&body)
            .map_err(|e| TransportError::status(400, format!("bad upload: {e}")))?;
        let acks = self.accept(records).await?;
        serde_json::to_vec(&acks).map_err(|e| TransportError::status(500, e.to_string()))
    }
}
