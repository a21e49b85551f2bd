/// `planstore cache` command implementation
///
/// Lists and removes stored plans.
use anyhow::{Context, Result};

use super::Workspace;
use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::{format_size, planstore_prefix};
use crate::fingerprint::CacheKey;
use crate::snapshot::GraphSnapshotReader;
use crate::storage::PlanStore;

pub fn cache(args: &CacheArgs, workspace: &Workspace) -> Result<()> {
    let store = workspace.store()?;

    match &args.command {
        CacheCommands::List { verbose } => list(&store, *verbose),
        CacheCommands::Clean { key } => clean(&store, key.as_deref()),
    }
}

/// List all stored plans
fn list(store: &PlanStore, verbose: bool) -> Result<()> {
    let entries = store.list().context("Failed to list stored plans")?;

    if entries.is_empty() {
        println!("No stored plans.");
        return Ok(());
    }

    println!("Stored plans ({} entries):", entries.len());
    println!();

    let reader = GraphSnapshotReader::new(store);
    for entry in entries {
        println!("  {}", entry.key);
        println!("    Size: {}", format_size(entry.size_bytes));
        if let Some(modified) = entry.modified_at {
            println!("    Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }

        if verbose {
            println!("    Path: {}", entry.path.display());
            match reader.stored_fingerprint(&entry.key) {
                Ok(fingerprint) => println!("    Fingerprint: {}", fingerprint),
                Err(e) if e.is_version_mismatch() => println!("    Outdated: {}", e),
                Err(e) => println!("    Unusable: {}", e),
            }
        }

        println!();
    }

    Ok(())
}

/// Remove one stored plan, or all of them
fn clean(store: &PlanStore, key: Option<&str>) -> Result<()> {
    match key {
        Some(key) => {
            let key = CacheKey::parse(key)?;
            let removed = store
                .remove(&key)
                .with_context(|| format!("Failed to remove stored plan {}", key))?;

            if removed {
                println!("{} Removed stored plan {}", planstore_prefix(), key);
            } else {
                println!("{} No stored plan {}", planstore_prefix(), key);
            }
        }
        None => {
            println!("{} Removing all stored plans...", planstore_prefix());
            let removed = store.clean_all().context("Failed to clean plan store")?;
            println!("{} Removed {} stored plans.", planstore_prefix(), removed);
        }
    }

    Ok(())
}
