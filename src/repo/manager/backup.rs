use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use quads::{Pattern, Quad, Term};
use tracing::{info, warn};

use super::ContextManager;
use crate::repo::entry::{AccessProperty, Entry, EntryType, GraphType};
use crate::repo::error::RepoError;
use crate::repo::rdf::{RdfFormat, read_quads, write_quads};
use crate::repo::vocab::iri;

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Folder name of a backup taken at `at`, in UTC.
pub(crate) fn backup_stamp(at: Timestamp) -> String {
    at.strftime(STAMP_FORMAT).to_string()
}

pub(crate) fn parse_backup_stamp(name: &str) -> Option<Timestamp> {
    let civil = DateTime::strptime(STAMP_FORMAT, name).ok()?;
    civil.to_zoned(TimeZone::UTC).ok().map(|z| z.timestamp())
}

fn graph_quads(manager: &ContextManager, graph: &str) -> Result<Vec<Quad>> {
    manager
        .backend
        .quads
        .quads(&Pattern::any().graph(iri(graph)))
}

fn write_file(path: &Path, quads: &[Quad]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    write_quads(BufWriter::new(file), RdfFormat::TriG, quads)?
        .flush()
        .with_context(|| format!("unable to write {}", path.display()))
}

impl ContextManager {
    fn administered_context(&self, context_uri: &str) -> Result<Arc<Entry>> {
        let entry = match self.context_id_of(context_uri) {
            Some(id) => self.root.get(&id)?,
            None => None,
        };
        let Some(entry) = entry.filter(|e| e.graph_type.is_context()) else {
            bail!(RepoError::NotFound(context_uri.to_owned()));
        };
        self.backend
            .auth
            .check_authorized(&entry, AccessProperty::Administer)?;
        Ok(entry)
    }

    fn backup_dir(&self, context_id: &str, at: Timestamp) -> PathBuf {
        self.backup_folder(context_id).join(backup_stamp(at))
    }

    /// Writes `{id}-index.rdf` with the context's own graphs and
    /// `{id}-entries.rdf` with the graphs of its entries into a new
    /// timestamped folder. Returns the backup's timestamp.
    pub(crate) fn backup_context(&self, context_uri: &str) -> Result<Timestamp> {
        let context_entry = self.administered_context(context_uri)?;
        let id = &context_entry.id;
        let Some(context) = self.get_context(id)? else {
            bail!(RepoError::NotFound(context_uri.to_owned()));
        };
        // second resolution, matching the folder names
        let now = Timestamp::from_second(Timestamp::now().as_second())?;
        let dir = self.backup_dir(id, now);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create {}", dir.display()))?;

        let mut index = vec![];
        for graph in [
            &context_entry.entry_uri,
            &context_entry.metadata_uri,
            &context_entry.resource_uri,
        ] {
            index.extend(graph_quads(self, graph)?);
        }
        write_file(&dir.join(format!("{id}-index.rdf")), &index)?;

        let mut statements = vec![];
        let entries = context.entries()?;
        for entry in &entries {
            statements.extend(graph_quads(self, &entry.entry_uri)?);
            if let Some(metadata) = entry.local_metadata_uri() {
                statements.extend(graph_quads(self, metadata)?);
            }
            if entry.entry_type == EntryType::Local && entry.graph_type != GraphType::None {
                statements.extend(graph_quads(self, &entry.resource_uri)?);
            }
        }
        write_file(&dir.join(format!("{id}-entries.rdf")), &statements)?;
        info!(
            target: "backup",
            context = id,
            entries = entries.len(),
            statements = index.len() + statements.len(),
            folder = %dir.display(),
            "backed up context"
        );
        Ok(now)
    }

    /// Backups of a context, oldest first. Folders whose name is not a
    /// backup timestamp are skipped.
    pub(crate) fn list_backups(&self, context_uri: &str) -> Result<Vec<Timestamp>> {
        let context_entry = self.administered_context(context_uri)?;
        let folder = self.backup_folder(&context_entry.id);
        if !folder.is_dir() {
            return Ok(vec![]);
        }
        let mut backups = vec![];
        for dirent in std::fs::read_dir(&folder)
            .with_context(|| format!("unable to list {}", folder.display()))?
        {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(at) = name.to_str().and_then(parse_backup_stamp) else {
                warn!(target: "backup", name = ?name, "skipping unrecognized backup folder");
                continue;
            };
            backups.push(at);
        }
        backups.sort();
        Ok(backups)
    }

    /// Replaces the context's current graphs with the statements of a backup.
    pub(crate) fn restore_backup(&self, context_uri: &str, at: Timestamp) -> Result<usize> {
        let context_entry = self.administered_context(context_uri)?;
        let id = &context_entry.id;
        let Some(context) = self.get_context(id)? else {
            bail!(RepoError::NotFound(context_uri.to_owned()));
        };
        let dir = self.backup_dir(id, at);
        if !dir.is_dir() {
            bail!(RepoError::NotFound(dir.display().to_string()));
        }
        let mut statements = vec![];
        for file in [format!("{id}-index.rdf"), format!("{id}-entries.rdf")] {
            let path = dir.join(file);
            let reader = File::open(&path)
                .with_context(|| format!("unable to open {}", path.display()))?;
            statements.extend(read_quads(BufReader::new(reader), RdfFormat::TriG)?);
        }

        let mut tx = self.backend.quads.begin()?;
        let mut graphs: Vec<Term> =
            tx.graphs_with_prefix(&self.backend.codec.context_namespace(id))?;
        graphs.extend(
            [
                &context_entry.entry_uri,
                &context_entry.metadata_uri,
                &context_entry.resource_uri,
            ]
            .map(|uri| iri(uri.as_str())),
        );
        for graph in &graphs {
            tx.clear_graph(graph)?;
        }
        let mut restored = 0;
        for quad in &statements {
            if tx.insert(quad)? {
                restored += 1;
            }
        }
        context.reindex_in(&mut tx, &context.payload_folder())?;
        tx.commit()?;

        self.backend.cache.evict(&context_entry.entry_uri);
        context.after_reindex();
        info!(target: "backup", context = id, at = %at, restored, "restored context");
        Ok(restored)
    }

    /// Returns false when no such backup exists.
    pub(crate) fn delete_backup(&self, context_uri: &str, at: Timestamp) -> Result<bool> {
        let context_entry = self.administered_context(context_uri)?;
        let dir = self.backup_dir(&context_entry.id, at);
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("unable to delete {}", dir.display()))?;
        info!(target: "backup", context = context_entry.id, at = %at, "deleted backup");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use quads::{Term, Triple};

    use super::{backup_stamp, parse_backup_stamp};
    use crate::repo::entry::{GraphType, NewEntry};
    use crate::repo::testing;
    use crate::repo::vocab::{self, iri};

    fn title(subject: &str, text: &str) -> Vec<Triple> {
        vec![Triple::new(iri(subject), iri(vocab::DC_TITLE), Term::literal(text))]
    }

    #[test]
    fn stamps_round_trip_at_second_resolution() -> Result<()> {
        let at: jiff::Timestamp = "2024-03-05T06:07:08Z".parse()?;
        assert_eq!(backup_stamp(at), "20240305060708");
        assert_eq!(parse_backup_stamp("20240305060708"), Some(at));
        assert_eq!(parse_backup_stamp("latest"), None);
        Ok(())
    }

    #[test]
    fn backup_list_restore_delete() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let context = manager.create_context(None)?;
        let entry = context.create(NewEntry::local(GraphType::None))?;
        context.set_metadata(&entry, &title(&entry.resource_uri, "before"))?;

        let at = manager.backup_context(context.uri())?;
        let folder = manager.backup_folder(context.id());
        std::fs::create_dir_all(folder.join("not-a-backup"))?;
        assert_eq!(manager.list_backups(context.uri())?, vec![at]);

        context.set_metadata(&entry, &title(&entry.resource_uri, "after"))?;
        let later = context.create(NewEntry::local(GraphType::None))?;
        manager.restore_backup(context.uri(), at)?;

        let entry = context.get(&entry.id)?.expect("restored entry");
        assert_eq!(context.local_metadata(&entry)?, title(&entry.resource_uri, "before"));
        assert!(context.get(&later.id)?.is_none());
        assert!(context.get("_top")?.is_some());

        assert!(manager.delete_backup(context.uri(), at)?);
        assert!(!manager.delete_backup(context.uri(), at)?);
        assert!(manager.list_backups(context.uri())?.is_empty());
        Ok(())
    }
}
