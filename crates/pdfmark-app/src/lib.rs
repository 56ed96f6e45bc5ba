//! pdfmark command-line front end.
//!
//! Manages the local highlight store and moves highlights in and out of PDF files.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfmark_core::{FileStorage, OwnerKey};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pdfmark")]
#[command(about = "Manage PDF highlights stored offline", version)]
pub struct Cli {
    /// Store directory (defaults to the platform data directory).
    #[arg(long, global = true, env = "PDFMARK_STORE", value_name = "DIR")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List stored highlights.
    List {
        /// Owner key: `remote:<id>`, `local:<id>` or `ephemeral`.
        #[arg(long)]
        owner: OwnerKey,
        /// Only this page (1-based).
        #[arg(long)]
        page: Option<u32>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Delete one highlight locally.
    Remove {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Delete older duplicates, keeping the most recent of each.
    Dedupe {
        #[arg(long)]
        owner: OwnerKey,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Read highlight annotations from a PDF into the store.
    Import {
        #[arg(value_name = "PDF")]
        pdf: PathBuf,
        #[arg(long)]
        owner: OwnerKey,
    },
    /// Write stored highlights into a copy of a PDF.
    Export {
        #[arg(value_name = "PDF")]
        pdf: PathBuf,
        #[arg(value_name = "OUT")]
        output: PathBuf,
        #[arg(long)]
        owner: OwnerKey,
    },
    /// Show pending remote operations.
    Queue {
        #[command(subcommand)]
        action: Option<QueueAction>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum QueueAction {
    /// Drop one pending item, or all of them.
    Clear {
        #[arg(value_name = "ID")]
        id: Option<u64>,
    },
}

fn open_store(path: Option<PathBuf>) -> Result<FileStorage> {
    let storage = match path {
        Some(path) => FileStorage::new(path.clone())
            .with_context(|| format!("failed to open store at {}", path.display()))?,
        None => FileStorage::default_location().context("failed to open default store")?,
    };
    log::debug!("using store at {}", storage.base_path().display());
    Ok(storage)
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let storage = open_store(cli.store)?;

    pollster::block_on(async move {
        let mut out = std::io::stdout().lock();
        let ctx = commands::Context::new(storage);
        match cli.command {
            Commands::List { owner, page, json } => ctx.list(&mut out, &owner, page, json).await,
            Commands::Remove { id } => ctx.remove(&mut out, &id).await,
            Commands::Dedupe { owner, page } => ctx.dedupe(&mut out, &owner, page).await,
            Commands::Import { pdf, owner } => ctx.import(&mut out, &pdf, &owner).await,
            Commands::Export { pdf, output, owner } => ctx.export(&mut out, &pdf, &output, &owner).await,
            Commands::Queue { action: None, json } => ctx.queue(&mut out, json).await,
            Commands::Queue {
                action: Some(QueueAction::Clear { id }),
                ..
            } => ctx.queue_clear(&mut out, id).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_owner_keys() {
        let cli = Cli::parse_from(["pdfmark", "list", "--owner", "local:cache-7", "--page", "3"]);
        match cli.command {
            Commands::List { owner, page, json } => {
                assert_eq!(owner, OwnerKey::Local("cache-7".to_string()));
                assert_eq!(page, Some(3));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_owner() {
        assert!(Cli::try_parse_from(["pdfmark", "list", "--owner", "cloud:x"]).is_err());
    }

    #[test]
    fn test_queue_clear_parses() {
        let cli = Cli::try_parse_from(["pdfmark", "--store", "/tmp/x", "queue", "clear", "4"]).unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(
            cli.command,
            Commands::Queue {
                action: Some(QueueAction::Clear { id: Some(4) }),
                ..
            }
        ));
    }
}
