//! Remote command implementation.
//!
//! Edits the simulated server directly, standing in for another device.

use crate::server::FileServer;
use clap::Subcommand;
use quotesync_protocol::ItemId;
use std::path::Path;

/// Actions on the simulated server.
#[derive(Subcommand)]
pub enum RemoteAction {
    /// List quotes stored on the server
    List,

    /// Add a quote on the server
    Add {
        /// Quote text
        text: String,

        /// Category
        #[arg(short, long)]
        category: String,

        /// Author
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Change the text of a quote on the server
    Edit {
        /// Server id of the quote
        id: String,

        /// New text
        text: String,
    },
}

/// Runs the remote command.
pub fn run(remote_path: &Path, action: RemoteAction) -> Result<(), Box<dyn std::error::Error>> {
    let server = FileServer::new(remote_path);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        match action {
            RemoteAction::List => {
                let collection = server.load().await?;
                println!(
                    "Server {} at version {}",
                    server.path().display(),
                    collection.version
                );
                for record in &collection.items {
                    println!(
                        "[{}] \"{}\" ({})",
                        ItemId::from(record.id.clone()),
                        record.text,
                        record.category
                    );
                }
            }
            RemoteAction::Add {
                text,
                category,
                author,
            } => {
                let id = server.add(&text, &category, author).await?;
                println!("Added quote {} on the server.", ItemId::from(id));
            }
            RemoteAction::Edit { id, text } => {
                if !server.edit(&id, &text).await? {
                    return Err(format!("No quote with id {id} on the server").into());
                }
                println!("Quote {id} updated on the server.");
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
