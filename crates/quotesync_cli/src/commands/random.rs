//! Random command implementation.

use crate::local::{format_quote, open_store};
use quotesync_protocol::Item;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

/// Picks one quote, optionally restricted to `category`.
pub fn pick<'a, R: Rng + ?Sized>(
    items: &'a [Item],
    category: Option<&str>,
    rng: &mut R,
) -> Option<&'a Item> {
    let candidates: Vec<&Item> = items
        .iter()
        .filter(|item| category.map_or(true, |c| item.payload.category == c))
        .collect();
    candidates.choose(rng).copied()
}

/// Runs the random command.
pub fn run(store_path: &Path, category: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(store_path)?;
    let snapshot = store.current();
    match pick(&snapshot.items, category, &mut rand::thread_rng()) {
        Some(item) => {
            println!("{}", format_quote(item));
            println!("Category: {}", item.payload.category);
        }
        None => println!("No quotes available for this category."),
    }
    Ok(())
}
