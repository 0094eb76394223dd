//! Synchronizable items.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Stable identifier of an [`Item`].
///
/// Locally created items get a random UUID. Servers are free to use their
/// own scheme (numeric ids are common), so the id is kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh local id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Content of a quote.
///
/// Two payloads are equal only when every field matches byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload {
    /// The quote text.
    pub text: String,
    /// Who said it, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Category used for filtering.
    pub category: String,
}

impl Payload {
    /// Creates a payload without attribution.
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attribution: None,
            category: category.into(),
        }
    }

    /// Sets the attribution.
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Lists the fields that differ between `self` and `other`.
    pub fn differing_fields(&self, other: &Payload) -> Vec<PayloadField> {
        let mut fields = Vec::new();
        if self.text != other.text {
            fields.push(PayloadField::Text);
        }
        if self.attribution != other.attribution {
            fields.push(PayloadField::Attribution);
        }
        if self.category != other.category {
            fields.push(PayloadField::Category);
        }
        fields
    }
}

/// A field of [`Payload`], used to report what a modification touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadField {
    /// [`Payload::text`].
    Text,
    /// [`Payload::attribution`].
    Attribution,
    /// [`Payload::category`].
    Category,
}

impl PayloadField {
    /// Returns the field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadField::Text => "text",
            PayloadField::Attribution => "attribution",
            PayloadField::Category => "category",
        }
    }
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginTag {
    /// Created on this device.
    Local,
    /// Received from the server.
    Remote,
    /// Loaded from an import.
    Imported,
}

/// Upload state of an item relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Never uploaded; the server cannot know about it yet.
    Pending,
    /// The server acknowledged an upload but has not returned it from a fetch.
    Uploaded,
    /// Observed in a remote snapshot.
    Synced,
}

impl ItemStatus {
    /// Returns true if the server acknowledged the item but no fetch has
    /// returned it yet.
    ///
    /// Such an item missing from a remote snapshot is a divergence. A
    /// `Synced` item missing remotely is not: it was simply kept locally.
    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, ItemStatus::Uploaded)
    }
}

/// A single synchronizable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique id within a snapshot.
    pub id: ItemId,
    /// Quote content.
    pub payload: Payload,
    /// Provenance.
    pub origin: OriginTag,
    /// Milliseconds since the Unix epoch of the last local mutation.
    pub modified_at: u64,
    /// Upload state.
    pub status: ItemStatus,
}

impl Item {
    /// Creates a locally originated, not yet uploaded item.
    pub fn local(id: impl Into<ItemId>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
            origin: OriginTag::Local,
            modified_at: now_millis(),
            status: ItemStatus::Pending,
        }
    }

    /// Creates an item as received from the server.
    pub fn remote(id: impl Into<ItemId>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
            origin: OriginTag::Remote,
            modified_at: now_millis(),
            status: ItemStatus::Synced,
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the origin tag.
    pub fn with_origin(mut self, origin: OriginTag) -> Self {
        self.origin = origin;
        self
    }

    /// Returns true if both items carry the same payload.
    pub fn same_content(&self, other: &Item) -> bool {
        self.payload == other.payload
    }
}

/// A new item as submitted by the UI, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    /// Explicit id, or `None` to have one generated.
    pub id: Option<ItemId>,
    /// Quote content.
    pub payload: Payload,
    /// Provenance, `Local` unless the draft comes from an import.
    pub origin: OriginTag,
}

impl ItemDraft {
    /// Creates a draft for a locally entered quote.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: None,
            payload,
            origin: OriginTag::Local,
        }
    }

    /// Requests a specific id.
    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the origin tag.
    pub fn with_origin(mut self, origin: OriginTag) -> Self {
        self.origin = origin;
        self
    }

    /// Turns the draft into a pending item, generating an id if needed.
    pub fn into_item(self) -> Item {
        Item {
            id: self.id.unwrap_or_else(ItemId::generate),
            payload: self.payload,
            origin: self.origin,
            modified_at: now_millis(),
            status: ItemStatus::Pending,
        }
    }
}
