//! Categories command implementation.

use crate::local::open_store;
use std::path::Path;

/// Runs the categories command.
pub fn run(store_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(store_path)?;
    for category in store.categories() {
        let count = store.by_category(&category).len();
        println!("{category} ({count})");
    }
    Ok(())
}
