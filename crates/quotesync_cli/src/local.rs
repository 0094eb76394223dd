//! The local quote store used by every command.

use quotesync_protocol::{Item, ItemDraft, Payload};
use quotesync_store::{JsonFilePersistence, RecordStore};
use std::path::Path;
use std::sync::Arc;

/// Quotes a fresh store starts with.
pub fn default_quotes() -> Vec<ItemDraft> {
    [
        (
            "The best way to predict the future is to create it.",
            "Motivation",
        ),
        (
            "Life is what happens when you're busy making other plans.",
            "Life",
        ),
        (
            "Do not watch the clock. Do what it does. Keep going.",
            "Motivation",
        ),
        ("Knowledge is power.", "Education"),
    ]
    .into_iter()
    .map(|(text, category)| ItemDraft::new(Payload::new(text, category)))
    .collect()
}

/// Opens the JSON store at `path`, seeding the default quotes on first use.
pub fn open_store(path: &Path) -> Result<Arc<RecordStore>, Box<dyn std::error::Error>> {
    let persistence = Arc::new(JsonFilePersistence::open_with_create_dirs(path)?);
    let store = RecordStore::open_or_seed(persistence, default_quotes())?;
    Ok(Arc::new(store))
}

/// Formats one quote for terminal output.
pub fn format_quote(item: &Item) -> String {
    match &item.payload.attribution {
        Some(author) => format!("\"{}\" - {}", item.payload.text, author),
        None => format!("\"{}\"", item.payload.text),
    }
}
