//! Add command implementation.

use crate::local::open_store;
use quotesync_protocol::{ItemDraft, Payload};
use quotesync_store::RecordStore;
use std::path::Path;

/// Builds a payload from user input, trimming every field.
pub fn payload_from_input(
    text: &str,
    category: &str,
    author: Option<&str>,
) -> Result<Payload, String> {
    let text = text.trim();
    let category = category.trim();
    if text.is_empty() || category.is_empty() {
        return Err("Please enter both quote text and category.".to_string());
    }
    let payload = Payload::new(text, category);
    Ok(match author.map(str::trim).filter(|a| !a.is_empty()) {
        Some(author) => payload.with_attribution(author),
        None => payload,
    })
}

/// Runs the add command.
pub fn run(
    store_path: &Path,
    text: &str,
    category: &str,
    author: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = payload_from_input(text, category, author)?;
    let store = open_store(store_path)?;
    add_quote(&store, payload)?;
    println!("Quote added successfully!");
    Ok(())
}

/// Inserts `payload` and fails if it could not be saved.
///
/// The CLI exits right after, so an unsaved quote would be lost.
pub fn add_quote(store: &RecordStore, payload: Payload) -> Result<(), Box<dyn std::error::Error>> {
    let commit = store.insert(ItemDraft::new(payload))?;
    match commit.persist_error {
        None => Ok(()),
        Some(e) => Err(format!("Quote could not be saved: {e}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotesync_store::InMemoryPersistence;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn input_is_trimmed() {
        let payload = payload_from_input("  Stay hungry. ", " Motivation ", Some("  ")).unwrap();
        assert_eq!(payload.text, "Stay hungry.");
        assert_eq!(payload.category, "Motivation");
        assert_eq!(payload.attribution, None);
    }

    #[test]
    fn blank_fields_are_rejected() {
        let err = payload_from_input("   ", "Life", None).unwrap_err();
        assert_eq!(err, "Please enter both quote text and category.");
        assert!(payload_from_input("Text", "", None).is_err());
    }

    #[test]
    fn failed_save_is_reported() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let store = RecordStore::open(persistence.clone()).unwrap();
        persistence.set_fail_saves(true);

        let err = add_quote(&store, Payload::new("Stay hungry.", "Motivation")).unwrap_err();
        assert!(err.to_string().starts_with("Quote could not be saved"));

        persistence.set_fail_saves(false);
        add_quote(&store, Payload::new("Keep going.", "Motivation")).unwrap();
        assert_eq!(persistence.saved().unwrap().len(), 2);
    }

    #[test]
    fn added_quote_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quotes.json");
        run(&path, "Stay hungry.", "Motivation", Some("Steve Jobs")).unwrap();

        let store = open_store(&path).unwrap();
        assert_eq!(store.len(), 5);
        let added = store
            .by_category("Motivation")
            .into_iter()
            .find(|item| item.payload.text == "Stay hungry.")
            .unwrap();
        assert_eq!(added.payload.attribution.as_deref(), Some("Steve Jobs"));
    }
}
