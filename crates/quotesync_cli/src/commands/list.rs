//! List command implementation.

use crate::local::{format_quote, open_store};
use quotesync_protocol::Item;
use std::path::Path;

/// Runs the list command.
pub fn run(
    store_path: &Path,
    category: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(store_path)?;
    let items = match category {
        Some(category) => store.by_category(category),
        None => store.current().items,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&items)?),
        "text" => print_text(&items),
        other => return Err(format!("Unknown output format: {other}").into()),
    }
    Ok(())
}

fn print_text(items: &[Item]) {
    if items.is_empty() {
        println!("No quotes.");
        return;
    }
    for item in items {
        println!(
            "[{}] {} ({}, {:?})",
            item.id,
            format_quote(item),
            item.payload.category,
            item.status
        );
    }
}
