mod config;
mod flags;
mod repo;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, RuntimeConfig, lock_store_dir};
use crate::flags::{Entrystore, EntrystoreCmd};
use crate::repo::Repository;
use crate::repo::context::Context;
use crate::repo::entry::Entry;
use crate::repo::error::RepoError;
use crate::repo::manager::{backup_stamp, parse_backup_stamp};
use crate::repo::rdf::RdfFormat;
use crate::repo::vocab;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let flags = Entrystore::from_env_or_exit();
    let config = Config::load(flags.config.as_deref())?;
    let mut lock = lock_store_dir(&config.repository.store_path)?;
    let _guard = lock
        .try_write()
        .context("the store is in use by another process")?;

    let runtime = RuntimeConfig::open(config)?;
    let repo = Repository::open(&runtime)?;
    repo.initialize()?;
    run(&repo, flags.subcommand)?;
    runtime
        .keyspace
        .persist(fjall::PersistMode::SyncAll)
        .context("unable to persist the store")?;
    Ok(())
}

fn context(repo: &Repository, id_or_alias: &str) -> Result<Arc<Context>> {
    match repo.manager.get_context(id_or_alias)? {
        Some(context) => Ok(context),
        None => bail!(RepoError::NotFound(format!("context {id_or_alias}"))),
    }
}

fn context_entry(repo: &Repository, context: &Context) -> Result<Arc<Entry>> {
    match repo.manager.root().get(context.id())? {
        Some(entry) => Ok(entry),
        None => bail!(RepoError::NotFound(context.entry_uri())),
    }
}

fn run(repo: &Repository, cmd: EntrystoreCmd) -> Result<()> {
    let manager = &repo.manager;
    match cmd {
        EntrystoreCmd::Init(_) => {
            println!("repository ready at {}", manager.backend().codec.base());
        }
        EntrystoreCmd::CreateContext(cmd) => {
            let created = manager.create_context(cmd.id.as_deref())?;
            if let Some(alias) = cmd.alias {
                if !manager.set_context_alias(created.uri(), &alias)? {
                    warn!(alias, "alias already taken, context left without one");
                }
            }
            println!("{}", created.uri());
        }
        EntrystoreCmd::DeleteContext(cmd) => {
            let doomed = context(repo, &cmd.context)?;
            manager.delete_context(doomed.uri())?;
            println!("deleted {}", doomed.uri());
        }
        EntrystoreCmd::SetAlias(cmd) => {
            let target = context(repo, &cmd.context)?;
            if !manager.set_context_alias(target.uri(), &cmd.alias)? {
                bail!(RepoError::Disallowed(format!("alias {} names another context", cmd.alias)));
            }
        }
        EntrystoreCmd::ListContexts(_) => {
            for entry in manager.context_entries()? {
                let alias = manager.get_context_alias(&entry.resource_uri)?;
                println!(
                    "{}\t{}\t{}",
                    entry.id,
                    alias.as_deref().unwrap_or("-"),
                    entry.resource_uri
                );
            }
        }
        EntrystoreCmd::Export(cmd) => {
            let source = context(repo, &cmd.context)?;
            let entry = context_entry(repo, &source)?;
            let format = if cmd.nquads {
                RdfFormat::NQuads
            } else {
                RdfFormat::TriG
            };
            let mut principals = BTreeSet::new();
            let statements = manager.export_context(
                &entry,
                &cmd.file,
                &mut principals,
                cmd.metadata_only,
                format,
            )?;
            println!(
                "exported {statements} statements and {} principals to {}",
                principals.len(),
                cmd.file.display()
            );
        }
        EntrystoreCmd::Import(cmd) => {
            let target = context(repo, &cmd.context)?;
            let entry = context_entry(repo, &target)?;
            let summary = manager.import_context(&entry, &cmd.file)?;
            println!(
                "imported {} entries ({} statements, {} files); skipped {} principal statements",
                summary.entries, summary.inserted, summary.payloads, summary.skipped_principals
            );
        }
        EntrystoreCmd::Backup(cmd) => {
            let source = context(repo, &cmd.context)?;
            let at = manager.backup_context(source.uri())?;
            println!("{}", backup_stamp(at));
        }
        EntrystoreCmd::ListBackups(cmd) => {
            let source = context(repo, &cmd.context)?;
            for at in manager.list_backups(source.uri())? {
                println!("{}\t{at}", backup_stamp(at));
            }
        }
        EntrystoreCmd::Restore(cmd) => {
            let target = context(repo, &cmd.context)?;
            let Some(at) = parse_backup_stamp(&cmd.timestamp) else {
                bail!(RepoError::MalformedInput(format!("bad backup timestamp {}", cmd.timestamp)));
            };
            let restored = manager.restore_backup(target.uri(), at)?;
            info!(context = target.id(), restored, "restore finished");
        }
        EntrystoreCmd::DeleteBackup(cmd) => {
            let target = context(repo, &cmd.context)?;
            let Some(at) = parse_backup_stamp(&cmd.timestamp) else {
                bail!(RepoError::MalformedInput(format!("bad backup timestamp {}", cmd.timestamp)));
            };
            if !manager.delete_backup(target.uri(), at)? {
                bail!(RepoError::NotFound(format!("backup {}", cmd.timestamp)));
            }
        }
        EntrystoreCmd::SearchLiterals(cmd) => {
            let predicates = if cmd.predicate.is_empty() {
                vec![vocab::DC_TITLE.to_owned()]
            } else {
                cmd.predicate
            };
            let mut contexts = vec![];
            for id in &cmd.context {
                contexts.push(context(repo, id)?.uri().to_owned());
            }
            let ranked = manager.search_literals(
                &predicates,
                &cmd.terms,
                cmd.lang.as_deref(),
                &contexts,
                cmd.match_all,
            )?;
            for (entry, score) in ranked {
                println!("{score}\t{}", entry.entry_uri);
            }
        }
        EntrystoreCmd::Reindex(cmd) => {
            let target = context(repo, &cmd.context)?;
            let indexed = target.reindex()?;
            println!("reindexed {indexed} entries of {}", target.uri());
        }
    }
    Ok(())
}
