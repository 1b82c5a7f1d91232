//! A context: an isolated set of entries sharing a namespace, a quota and a
//! name index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use jiff::Timestamp;
use quads::{Pattern, Quad, Term, Transaction};
use tracing::{debug, info, warn};

mod access;
mod metadata;
mod quota;

pub(crate) use metadata::Revision;

use super::address::{AddressCodec, Facet, SYSTEM_CONTEXTS_ID, is_system_id};
use super::auth::Authorizer;
use super::entry::{AccessProperty, Entry, EntryType, GraphType, NewEntry, ResourceType};
use super::error::RepoError;
use super::names::{Binding, NameIndex};
use super::resource::{self, Resource};
use super::vocab::{self, iri};
use super::{Backend, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextKind {
    /// `_contexts`, whose entries describe every other context.
    Root,
    System,
    Regular,
}

impl ContextKind {
    fn of(id: &str) -> ContextKind {
        if id == SYSTEM_CONTEXTS_ID {
            ContextKind::Root
        } else if is_system_id(id) {
            ContextKind::System
        } else {
            ContextKind::Regular
        }
    }

    fn allows(self, new: &NewEntry) -> bool {
        match self {
            ContextKind::Root | ContextKind::System => true,
            ContextKind::Regular if new.graph_type.is_context() => false,
            ContextKind::Regular if new.entry_type != EntryType::Local => true,
            ContextKind::Regular => matches!(
                new.graph_type,
                GraphType::None
                    | GraphType::List
                    | GraphType::ResultList
                    | GraphType::Graph
                    | GraphType::String
                    | GraphType::Pipeline
                    | GraphType::PipelineResult
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeletedEntry {
    pub(crate) entry_uri: String,
    pub(crate) deleted: Option<Timestamp>,
    pub(crate) deleted_by: Option<String>,
}

/// What an entry removal left for after the commit.
#[derive(Default)]
struct Removal {
    payload: Option<PathBuf>,
    touched: Vec<String>,
}

/// Entries removed by a transaction that has yet to commit.
pub(crate) struct Removals(Vec<(Arc<Entry>, Removal)>);

pub(crate) struct Context {
    backend: Arc<Backend>,
    id: String,
    kind: ContextKind,
    uri: String,
    names: NameIndex,
}

impl Context {
    pub(crate) fn new(backend: Arc<Backend>, id: &str) -> Context {
        let uri = backend.codec.context_uri(id);
        Context {
            kind: ContextKind::of(id),
            names: NameIndex::new(&uri),
            id: id.to_owned(),
            uri,
            backend,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Resource URI of the context, also the name of its own graph.
    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn entry_uri(&self) -> String {
        self.backend.codec.context_entry_uri(&self.id)
    }

    pub(crate) fn codec(&self) -> &AddressCodec {
        &self.backend.codec
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.backend.settings
    }

    pub(crate) fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    fn auth(&self) -> &dyn Authorizer {
        self.backend.auth.as_ref()
    }

    fn graph(&self) -> Term {
        iri(&self.uri)
    }

    /// The entry describing this context inside `_contexts`.
    pub(crate) fn entry(&self) -> Result<Option<Arc<Entry>>> {
        self.backend.entry(SYSTEM_CONTEXTS_ID, &self.id)
    }

    pub(crate) fn check_context_access(&self, property: AccessProperty) -> Result<()> {
        match self.entry()? {
            Some(entry) => self.auth().check_authorized(&entry, property),
            None if self.auth().is_admin() => Ok(()),
            None => bail!(RepoError::Unauthorized {
                principal: self.auth().current_principal(),
                entry: self.entry_uri(),
                property,
            }),
        }
    }

    /// Folder holding the payload files of the context's data entries.
    pub(crate) fn payload_folder(&self) -> PathBuf {
        self.backend.settings.data_folder.join(&self.id)
    }

    /// Payload file of a local data entry.
    pub(crate) fn payload_path(&self, id: &str) -> PathBuf {
        self.payload_folder().join(id)
    }

    pub(crate) fn resource(&self, entry: Arc<Entry>) -> Option<Resource<'_>> {
        Resource::of(self, entry)
    }

    pub(crate) fn get(&self, id: &str) -> Result<Option<Arc<Entry>>> {
        self.backend.entry(&self.id, id)
    }

    pub(crate) fn get_by_entry_uri(&self, entry_uri: &str) -> Result<Option<Arc<Entry>>> {
        match self.backend.codec.parse(entry_uri) {
            Some(address) if address.facet == Facet::Entry && address.context_id == self.id => {
                self.get(&address.id)
            }
            _ => Ok(None),
        }
    }

    fn indexed(&self, predicate: &str, uri: &str) -> Result<Vec<Arc<Entry>>> {
        let pattern = Pattern::any()
            .subject(iri(uri))
            .predicate(iri(predicate))
            .graph(self.graph());
        let mut entries = vec![];
        for quad in self.backend.quads.quads(&pattern)? {
            let Some(entry_uri) = quad.object.as_iri() else {
                continue;
            };
            if let Some(entry) = self.get_by_entry_uri(entry_uri)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Entries whose resource is `resource_uri`. Several links may share one.
    pub(crate) fn get_by_resource_uri(&self, resource_uri: &str) -> Result<Vec<Arc<Entry>>> {
        self.indexed(vocab::RES_HAS_ENTRY, resource_uri)
    }

    pub(crate) fn get_by_external_metadata_uri(
        &self,
        metadata_uri: &str,
    ) -> Result<Vec<Arc<Entry>>> {
        self.indexed(vocab::MD_HAS_ENTRY, metadata_uri)
    }

    pub(crate) fn entry_uris(&self) -> Result<BTreeSet<String>> {
        let pattern = Pattern::any()
            .predicate(iri(vocab::RES_HAS_ENTRY))
            .graph(self.graph());
        Ok(self
            .backend
            .quads
            .quads(&pattern)?
            .into_iter()
            .filter_map(|q| q.object.as_iri().map(str::to_owned))
            .collect())
    }

    pub(crate) fn entries(&self) -> Result<Vec<Arc<Entry>>> {
        let mut entries = vec![];
        for uri in self.entry_uris()? {
            if let Some(entry) = self.get_by_entry_uri(&uri)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Creates an entry, allocating the next free numeric id unless the
    /// description carries one.
    pub(crate) fn create(&self, new: NewEntry) -> Result<Arc<Entry>> {
        self.check_context_access(AccessProperty::WriteResource)?;
        if !self.kind.allows(&new) {
            bail!(RepoError::Disallowed(format!(
                "{:?} {:?} entries are not allowed in context {}",
                new.entry_type, new.graph_type, self.id
            )));
        }
        if new.entry_type.has_external_metadata() && new.external_metadata_uri.is_none() {
            bail!(RepoError::MalformedInput(
                "reference entries need an external metadata uri".into()
            ));
        }
        let list = match &new.list {
            Some(uri) => Some(self.writable_list(uri)?),
            None => None,
        };

        let codec = &self.backend.codec;
        let principal = self.auth().current_principal();
        let now = Timestamp::now();
        let mut tx = self.backend.quads.begin()?;
        let id = match &new.id {
            Some(id) => {
                if self.exists_in(&tx, &codec.entry_uri(&self.id, id))? {
                    bail!(RepoError::Disallowed(format!(
                        "entry {id} already exists in {}",
                        self.id
                    )));
                }
                id.clone()
            }
            None => self.next_id_in(&mut tx)?,
        };
        let resource_uri = match new.entry_type {
            EntryType::Local if self.kind == ContextKind::Root && new.graph_type.is_context() => {
                codec.context_uri(&id)
            }
            EntryType::Local => codec.resource_uri(&self.id, &id),
            _ => match &new.resource_uri {
                Some(uri) => uri.clone(),
                None => bail!(RepoError::MalformedInput(
                    "link and reference entries need a resource uri".into()
                )),
            },
        };

        let entry_uri = codec.entry_uri(&self.id, &id);
        for quad in new.entry_graph(codec, &self.id, &id, &resource_uri, &principal, now) {
            tx.insert(&quad)?;
        }
        tx.insert(&Quad::new(
            iri(&resource_uri),
            iri(vocab::RES_HAS_ENTRY),
            iri(&entry_uri),
            self.graph(),
        ))?;
        if let Some(external) = &new.external_metadata_uri {
            tx.insert(&Quad::new(
                iri(external),
                iri(vocab::MD_HAS_ENTRY),
                iri(&entry_uri),
                self.graph(),
            ))?;
        }
        if let Some(list) = &list {
            resource::append_member_in(&mut tx, list, &entry_uri)?;
            touch(&mut tx, &list.entry_uri, now)?;
        }
        self.touch_context_in(&mut tx, now)?;
        tx.commit()?;

        if let Some(list) = &list {
            self.backend.cache.evict(&list.entry_uri);
        }
        debug!(
            target: "context",
            context = self.id,
            id,
            entry_type = ?new.entry_type,
            graph_type = ?new.graph_type,
            "created entry"
        );
        self.get(&id)?
            .ok_or_else(|| RepoError::NotFound(entry_uri).into())
    }

    fn writable_list(&self, list_entry_uri: &str) -> Result<Arc<Entry>> {
        let Some(list) = self.get_by_entry_uri(list_entry_uri)? else {
            bail!(RepoError::NotFound(list_entry_uri.to_owned()));
        };
        if !matches!(list.graph_type, GraphType::List | GraphType::ResultList) {
            bail!(RepoError::Disallowed(format!("{list_entry_uri} is not a list")));
        }
        self.auth().check_authorized(&list, AccessProperty::WriteResource)?;
        Ok(list)
    }

    fn exists_in(&self, tx: &Transaction<'_>, entry_uri: &str) -> Result<bool> {
        let graph = iri(entry_uri);
        let pattern = Pattern::any()
            .subject(graph.clone())
            .predicate(iri(vocab::RESOURCE))
            .graph(graph);
        Ok(!tx.quads(&pattern)?.is_empty())
    }

    fn counter_in(&self, tx: &Transaction<'_>) -> Result<u64> {
        Ok(tx
            .quads(&self.context_fact(vocab::COUNTER))?
            .first()
            .and_then(|q| vocab::parse_long(&q.object))
            .unwrap_or(0))
    }

    fn next_id_in(&self, tx: &mut Transaction<'_>) -> Result<String> {
        let mut counter = self.counter_in(tx)?;
        loop {
            counter += 1;
            let id = counter.to_string();
            let entry_graph = iri(&self.backend.codec.entry_uri(&self.id, &id));
            if tx.quads(&Pattern::any().graph(entry_graph))?.is_empty() {
                self.set_context_fact_in(tx, vocab::COUNTER, vocab::long(counter))?;
                return Ok(id);
            }
        }
    }

    /// Pattern for a statement about the context in its own graph.
    fn context_fact(&self, predicate: &str) -> Pattern {
        Pattern::any()
            .subject(self.graph())
            .predicate(iri(predicate))
            .graph(self.graph())
    }

    fn set_context_fact_in(
        &self,
        tx: &mut Transaction<'_>,
        predicate: &str,
        object: Term,
    ) -> Result<()> {
        tx.remove_matching(&self.context_fact(predicate))?;
        tx.insert(&Quad::new(self.graph(), iri(predicate), object, self.graph()))?;
        Ok(())
    }

    fn touch_context_in(&self, tx: &mut Transaction<'_>, now: Timestamp) -> Result<()> {
        let entry_uri = self.entry_uri();
        if self.exists_in(tx, &entry_uri)? {
            touch(tx, &entry_uri, now)?;
        }
        Ok(())
    }

    /// Bumps the modification time and records the acting principal as a
    /// contributor when it is not the creator.
    fn register_modified_in(
        &self,
        tx: &mut Transaction<'_>,
        entry: &Entry,
        now: Timestamp,
    ) -> Result<()> {
        touch(tx, &entry.entry_uri, now)?;
        let principal = self.auth().current_principal();
        if entry.creator.as_deref() != Some(principal.as_str()) {
            tx.insert(&entry.fact(vocab::DC_CONTRIBUTOR, iri(&principal)))?;
        }
        Ok(())
    }

    /// Records a modification made outside the entry graphs, such as a new
    /// payload.
    pub(crate) fn touch_entry(&self, entry: &Entry) -> Result<()> {
        let mut tx = self.backend.quads.begin()?;
        self.register_modified_in(&mut tx, entry, Timestamp::now())?;
        tx.commit()?;
        self.backend.cache.evict(&entry.entry_uri);
        Ok(())
    }

    /// Fresh snapshot after a mutation.
    fn reload(&self, entry: &Entry) -> Result<Arc<Entry>> {
        self.backend.cache.evict(&entry.entry_uri);
        self.get(&entry.id)?
            .ok_or_else(|| RepoError::NotFound(entry.entry_uri.clone()).into())
    }

    pub(crate) fn remove(&self, entry_uri: &str) -> Result<()> {
        let Some(entry) = self.get_by_entry_uri(entry_uri)? else {
            bail!(RepoError::NotFound(entry_uri.to_owned()));
        };
        if entry.is_system() {
            bail!(RepoError::Disallowed(format!("system entry {entry_uri} cannot be removed")));
        }
        self.auth().check_authorized(&entry, AccessProperty::Administer)?;
        let now = Timestamp::now();
        let mut tx = self.backend.quads.begin()?;
        let removal = self.remove_in(&mut tx, &entry, now)?;
        self.touch_context_in(&mut tx, now)?;
        tx.commit()?;
        self.after_removal(&entry, removal);
        debug!(target: "context", context = self.id, entry_uri, "removed entry");
        Ok(())
    }

    /// Removes every entry except the system ones. Returns how many went.
    pub(crate) fn remove_all(&self) -> Result<usize> {
        self.check_context_access(AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        let removed = self.remove_all_in(&mut tx, Timestamp::now())?;
        tx.commit()?;
        Ok(self.after_removals(removed))
    }

    /// Stages the removal of every non-system entry in `tx`. Pass the result
    /// to [`Context::after_removals`] once `tx` commits.
    pub(crate) fn remove_all_in(
        &self,
        tx: &mut Transaction<'_>,
        now: Timestamp,
    ) -> Result<Removals> {
        let mut removed = vec![];
        for entry in self.entries()? {
            if entry.is_system() {
                continue;
            }
            let removal = self.remove_in(tx, &entry, now)?;
            removed.push((entry, removal));
        }
        self.touch_context_in(tx, now)?;
        Ok(Removals(removed))
    }

    /// Evicts the removed entries and deletes their payload files.
    pub(crate) fn after_removals(&self, removals: Removals) -> usize {
        let count = removals.0.len();
        for (entry, removal) in removals.0 {
            self.after_removal(&entry, removal);
        }
        info!(target: "context", context = self.id, removed = count, "removed all entries");
        count
    }

    fn remove_in(
        &self,
        tx: &mut Transaction<'_>,
        entry: &Entry,
        now: Timestamp,
    ) -> Result<Removal> {
        let graph = self.graph();
        let subject = iri(&entry.entry_uri);
        tx.remove(&Quad::new(
            iri(&entry.resource_uri),
            iri(vocab::RES_HAS_ENTRY),
            subject.clone(),
            graph.clone(),
        ))?;
        if let Some(external) = &entry.external_metadata_uri {
            tx.remove(&Quad::new(
                iri(external),
                iri(vocab::MD_HAS_ENTRY),
                subject.clone(),
                graph.clone(),
            ))?;
        }
        tx.remove_matching(
            &Pattern::any()
                .subject(subject.clone())
                .predicate(iri(vocab::ALIAS))
                .graph(graph.clone()),
        )?;
        tx.insert(&Quad::new(
            subject.clone(),
            iri(vocab::DELETED),
            vocab::timestamp(now),
            graph.clone(),
        ))?;
        tx.insert(&Quad::new(
            subject,
            iri(vocab::DELETED_BY),
            iri(&self.auth().current_principal()),
            graph,
        ))?;

        let mut removal = Removal::default();
        self.drop_inverse_relations_in(tx, entry)?;
        for list_uri in &entry.referred_in {
            if let Some(list) = self.backend.entry_by_uri(list_uri)? {
                resource::remove_member_in(tx, &list, &entry.entry_uri)?;
                removal.touched.push(list.entry_uri.clone());
            }
        }
        if matches!(entry.graph_type, GraphType::List | GraphType::ResultList) {
            for child in resource::members_in(tx, &entry.resource_uri)? {
                let child_graph = iri(&child);
                tx.remove(&Quad::new(
                    child_graph.clone(),
                    iri(vocab::REFERRED_IN),
                    iri(&entry.entry_uri),
                    child_graph,
                ))?;
                removal.touched.push(child);
            }
        }
        for graph in self.revision_graphs_in(tx, entry)? {
            tx.clear_graph(&graph)?;
        }
        for graph in entry.owned_graphs() {
            tx.clear_graph(&graph)?;
        }

        if is_payload_entry(entry) {
            let path = self.payload_path(&entry.id);
            if let Ok(meta) = std::fs::metadata(&path) {
                self.decrease_fill_level_in(tx, meta.len())?;
                removal.payload = Some(path);
            }
        }
        Ok(removal)
    }

    fn after_removal(&self, entry: &Entry, removal: Removal) {
        self.backend.cache.evict(&entry.entry_uri);
        self.backend.cache.evict(&self.entry_uri());
        for uri in &removal.touched {
            self.backend.cache.evict(uri);
        }
        self.names.forget(&entry.entry_uri);
        if let Some(path) = removal.payload {
            if let Err(error) = std::fs::remove_file(&path) {
                warn!(
                    target: "context",
                    path = %path.display(),
                    %error,
                    "unable to delete payload"
                );
            }
        }
    }

    /// Rebuilds the resource and metadata indexes, the counter and the quota
    /// fill level from the entry graphs in the store and the payload files.
    pub(crate) fn reindex(&self) -> Result<usize> {
        let mut tx = self.backend.quads.begin()?;
        let indexed = self.reindex_in(&mut tx, &self.payload_folder())?;
        tx.commit()?;
        self.after_reindex();
        Ok(indexed)
    }

    /// Stages a reindex in `tx`, seeing its buffered writes. Payload sizes
    /// are read from `payloads`, which holds one file per entry id. Call
    /// [`Context::after_reindex`] once `tx` commits.
    pub(crate) fn reindex_in(&self, tx: &mut Transaction<'_>, payloads: &Path) -> Result<usize> {
        let codec = &self.backend.codec;
        for predicate in [vocab::RES_HAS_ENTRY, vocab::MD_HAS_ENTRY] {
            tx.remove_matching(
                &Pattern::any()
                    .predicate(iri(predicate))
                    .graph(self.graph()),
            )?;
        }
        let mut counter = self.counter_in(tx)?;
        let mut indexed = 0;
        let mut fill_level = 0u64;
        for graph in tx.graphs_with_prefix(&codec.context_namespace(&self.id))? {
            let Some(address) = graph.as_iri().and_then(|g| codec.parse(g)) else {
                continue;
            };
            if address.facet != Facet::Entry || address.context_id != self.id {
                continue;
            }
            let statements = tx.quads(&Pattern::any().graph(graph.clone()))?;
            let entry = Entry::from_statements(codec, &self.id, &address.id, &statements);
            tx.insert(&Quad::new(
                iri(&entry.resource_uri),
                iri(vocab::RES_HAS_ENTRY),
                graph.clone(),
                self.graph(),
            ))?;
            if let Some(external) = &entry.external_metadata_uri {
                tx.insert(&Quad::new(
                    iri(external),
                    iri(vocab::MD_HAS_ENTRY),
                    graph,
                    self.graph(),
                ))?;
            }
            if is_payload_entry(&entry) {
                if let Ok(meta) = std::fs::metadata(payloads.join(&address.id)) {
                    fill_level += meta.len();
                }
            }
            if let Ok(n) = address.id.parse::<u64>() {
                counter = counter.max(n);
            }
            indexed += 1;
        }
        self.set_context_fact_in(tx, vocab::COUNTER, vocab::long(counter))?;
        self.set_context_fact_in(tx, vocab::HAS_QUOTA_FILL_LEVEL, vocab::long(fill_level))?;
        info!(target: "context", context = self.id, indexed, fill_level, "reindexed");
        Ok(indexed)
    }

    pub(crate) fn after_reindex(&self) {
        self.backend.cache.evict_context(&self.id);
        self.backend.cache.evict(&self.entry_uri());
        self.names.reset();
    }

    /// Tombstones of removed entries, newest first.
    pub(crate) fn deleted_entries(&self) -> Result<Vec<DeletedEntry>> {
        let mut deleted: BTreeMap<String, DeletedEntry> = BTreeMap::new();
        for predicate in [vocab::DELETED, vocab::DELETED_BY] {
            let pattern = Pattern::any().predicate(iri(predicate)).graph(self.graph());
            for quad in self.backend.quads.quads(&pattern)? {
                let Some(uri) = quad.subject.as_iri() else {
                    continue;
                };
                let tombstone = deleted.entry(uri.to_owned()).or_insert_with(|| DeletedEntry {
                    entry_uri: uri.to_owned(),
                    deleted: None,
                    deleted_by: None,
                });
                if predicate == vocab::DELETED {
                    tombstone.deleted = vocab::parse_timestamp(&quad.object);
                } else {
                    tombstone.deleted_by = quad.object.as_iri().map(str::to_owned);
                }
            }
        }
        let mut deleted: Vec<_> = deleted.into_values().collect();
        deleted.sort_by(|a, b| b.deleted.cmp(&a.deleted));
        Ok(deleted)
    }

    pub(crate) fn entry_name(&self, entry_uri: &str) -> Result<Option<String>> {
        self.names.name_of(&self.backend.quads, entry_uri)
    }

    pub(crate) fn entry_by_name(&self, name: &str) -> Result<Option<Arc<Entry>>> {
        match self.names.uri_of(&self.backend.quads, name)? {
            Some(uri) => self.backend.entry_by_uri(&uri),
            None => Ok(None),
        }
    }

    pub(crate) fn names(&self) -> Result<Vec<(String, String)>> {
        self.names.names(&self.backend.quads)
    }

    /// Binds `name` to the entry. Returns false, changing nothing, when the
    /// name belongs to another entry.
    pub(crate) fn set_entry_name(&self, entry_uri: &str, name: &str) -> Result<bool> {
        let Some(entry) = self.backend.entry_by_uri(entry_uri)? else {
            bail!(RepoError::NotFound(entry_uri.to_owned()));
        };
        self.auth().check_authorized(&entry, AccessProperty::WriteResource)?;
        let now = Timestamp::now();
        let mut tx = self.backend.quads.begin()?;
        match self.names.bind(&mut tx, entry_uri, name)? {
            Binding::Conflict => {
                tx.rollback();
                debug!(target: "context", context = self.id, name, entry_uri, "name taken");
                return Ok(false);
            }
            Binding::Unchanged => return Ok(true),
            Binding::Changed => {}
        }
        touch(&mut tx, entry_uri, now)?;
        tx.commit()?;
        self.names.bound(entry_uri, name);
        self.backend.cache.evict(entry_uri);
        debug!(target: "context", context = self.id, name, entry_uri, "named entry");
        Ok(true)
    }

    /// Drops a name binding without touching the store, after the statement
    /// went away with a wider removal.
    pub(crate) fn forget_name(&self, entry_uri: &str) {
        self.names.forget(entry_uri);
    }
}

fn is_payload_entry(entry: &Entry) -> bool {
    entry.entry_type == EntryType::Local
        && entry.graph_type == GraphType::None
        && entry.resource_type == ResourceType::InformationResource
}

/// Replaces the modification time of an entry.
pub(super) fn touch(tx: &mut Transaction<'_>, entry_uri: &str, now: Timestamp) -> Result<()> {
    let graph = iri(entry_uri);
    tx.remove_matching(
        &Pattern::any()
            .subject(graph.clone())
            .predicate(iri(vocab::DC_MODIFIED))
            .graph(graph.clone()),
    )?;
    tx.insert(&Quad::new(
        graph.clone(),
        iri(vocab::DC_MODIFIED),
        vocab::timestamp(now),
        graph,
    ))?;
    Ok(())
}
