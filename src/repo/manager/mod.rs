//! The context manager: the `_contexts` root context plus the operations that
//! span whole contexts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Result, bail};
use quads::Pattern;
use tracing::{info, warn};

mod backup;
mod bootstrap;
mod search;
mod transfer;

pub(crate) use backup::{backup_stamp, parse_backup_stamp};
pub(crate) use search::{QueryDataset, QueryEngine};

use super::Backend;
use super::address::{Facet, PRINCIPALS_ID, SYSTEM_CONTEXTS_ID, is_system_id};
use super::auth::{NamedPrincipals, PrincipalDirectory};
use super::context::Context;
use super::entry::{AccessProperty, Entry, EntryType, GraphType, NewEntry};
use super::error::RepoError;
use super::vocab::iri;

pub(crate) struct ContextManager {
    backend: Arc<Backend>,
    root: Arc<Context>,
    contexts: RwLock<HashMap<String, Arc<Context>>>,
    principals: Arc<dyn PrincipalDirectory>,
    queries: Option<Arc<dyn QueryEngine>>,
}

impl ContextManager {
    pub(crate) fn new(backend: Arc<Backend>) -> ContextManager {
        let root = Arc::new(Context::new(backend.clone(), SYSTEM_CONTEXTS_ID));
        let principals = Arc::new(Context::new(backend.clone(), PRINCIPALS_ID));
        let contexts = HashMap::from([(PRINCIPALS_ID.to_owned(), principals.clone())]);
        ContextManager {
            backend,
            root,
            contexts: RwLock::new(contexts),
            principals: Arc::new(NamedPrincipals::new(principals)),
            queries: None,
        }
    }

    pub(crate) fn with_query_engine(mut self, engine: Arc<dyn QueryEngine>) -> ContextManager {
        self.queries = Some(engine);
        self
    }

    pub(crate) fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub(crate) fn root(&self) -> &Arc<Context> {
        &self.root
    }

    pub(crate) fn principals(&self) -> &dyn PrincipalDirectory {
        self.principals.as_ref()
    }

    /// Resolves by id first, then by alias.
    pub(crate) fn get_context(&self, id_or_alias: &str) -> Result<Option<Arc<Context>>> {
        if id_or_alias == SYSTEM_CONTEXTS_ID {
            return Ok(Some(self.root.clone()));
        }
        if let Some(context) = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id_or_alias)
        {
            return Ok(Some(context.clone()));
        }
        let entry = match self.root.get(id_or_alias)? {
            Some(entry) => Some(entry),
            None => self.root.entry_by_name(id_or_alias)?,
        };
        let Some(entry) = entry.filter(|e| e.graph_type.is_context()) else {
            return Ok(None);
        };
        if let Some(context) = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entry.id)
        {
            return Ok(Some(context.clone()));
        }
        let context = Arc::new(Context::new(self.backend.clone(), &entry.id));
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(contexts.entry(entry.id.clone()).or_insert(context).clone()))
    }

    /// Context id named by a context resource URI or context entry URI.
    pub(crate) fn context_id_of(&self, uri: &str) -> Option<String> {
        let address = self.backend.codec.parse(uri)?;
        match address.facet {
            Facet::Resource | Facet::Entry if address.context_id == SYSTEM_CONTEXTS_ID => {
                Some(address.id)
            }
            _ => None,
        }
    }

    pub(crate) fn context_by_uri(&self, uri: &str) -> Result<Option<Arc<Context>>> {
        match self.context_id_of(uri) {
            Some(id) => self.get_context(&id),
            None => Ok(None),
        }
    }

    /// Any entry of the repository, checked for metadata read access.
    pub(crate) fn get_entry(&self, uri: &str) -> Result<Option<Arc<Entry>>> {
        let Some(entry) = self.backend.entry_by_uri(uri)? else {
            return Ok(None);
        };
        self.backend
            .auth
            .check_authorized(&entry, AccessProperty::ReadMetadata)?;
        Ok(Some(entry))
    }

    pub(crate) fn get_context_alias(&self, context_uri: &str) -> Result<Option<String>> {
        match self.context_id_of(context_uri) {
            Some(id) => self
                .root
                .entry_name(&self.backend.codec.context_entry_uri(&id)),
            None => Ok(None),
        }
    }

    /// False when the alias already names another context.
    pub(crate) fn set_context_alias(&self, context_uri: &str, alias: &str) -> Result<bool> {
        let Some(id) = self.context_id_of(context_uri) else {
            bail!(RepoError::NotFound(context_uri.to_owned()));
        };
        self.root
            .set_entry_name(&self.backend.codec.context_entry_uri(&id), alias)
    }

    /// Mints a regular context and bootstraps its system lists.
    pub(crate) fn create_context(&self, id: Option<&str>) -> Result<Arc<Context>> {
        let mut new = NewEntry::local(GraphType::Context);
        if let Some(id) = id {
            if is_system_id(id) {
                bail!(RepoError::Disallowed(format!("{id} is reserved for system contexts")));
            }
            new = new.with_id(id);
        }
        let entry = self.root.create(new)?;
        let Some(context) = self.get_context(&entry.id)? else {
            bail!(RepoError::NotFound(entry.entry_uri.clone()));
        };
        self.bootstrap_regular(&context)?;
        info!(target: "repo", context = entry.id, "created context");
        Ok(context)
    }

    /// Entries of every context and system context.
    pub(crate) fn context_entries(&self) -> Result<Vec<Arc<Entry>>> {
        Ok(self
            .root
            .entries()?
            .into_iter()
            .filter(|e| e.graph_type.is_context())
            .collect())
    }

    fn all_contexts(&self) -> Result<Vec<Arc<Context>>> {
        let mut contexts = vec![];
        for entry in self.context_entries()? {
            if let Some(context) = self.get_context(&entry.id)? {
                contexts.push(context);
            }
        }
        Ok(contexts)
    }

    /// Link entries pointing at `resource_uri`, across all contexts.
    pub(crate) fn links(&self, resource_uri: &str) -> Result<Vec<Arc<Entry>>> {
        let mut links = vec![];
        for context in self.all_contexts()? {
            links.extend(
                context
                    .get_by_resource_uri(resource_uri)?
                    .into_iter()
                    .filter(|e| matches!(e.entry_type, EntryType::Link | EntryType::LinkReference)),
            );
        }
        Ok(links)
    }

    /// Reference entries whose external metadata is `metadata_uri`.
    pub(crate) fn references(&self, metadata_uri: &str) -> Result<Vec<Arc<Entry>>> {
        let mut references = vec![];
        for context in self.all_contexts()? {
            references.extend(context.get_by_external_metadata_uri(metadata_uri)?);
        }
        Ok(references)
    }

    pub(crate) fn backup_folder(&self, context_id: &str) -> PathBuf {
        self.backend.settings.backup_folder.join(context_id)
    }

    /// Irreversibly removes a context: every graph under its namespace, every
    /// statement mentioning its own URIs, and its payload directory.
    pub(crate) fn delete_context(&self, context_uri: &str) -> Result<()> {
        let Some(id) = self.context_id_of(context_uri) else {
            bail!(RepoError::NotFound(context_uri.to_owned()));
        };
        if is_system_id(&id) {
            bail!(RepoError::Disallowed(format!("system context {id} cannot be deleted")));
        }
        let Some(entry) = self.root.get(&id)? else {
            bail!(RepoError::NotFound(context_uri.to_owned()));
        };
        self.backend
            .auth
            .check_authorized(&entry, AccessProperty::Administer)?;

        let mut own = vec![
            entry.entry_uri.clone(),
            entry.metadata_uri.clone(),
            entry.resource_uri.clone(),
            entry.relation_uri.clone(),
        ];
        own.extend(entry.cached_external_metadata_uri.clone());

        let mut tx = self.backend.quads.begin()?;
        let graphs = tx.graphs_with_prefix(&self.backend.codec.context_namespace(&id))?;
        if graphs.is_empty() {
            tx.rollback();
            warn!(
                target: "repo",
                context = id,
                "no graphs under the context namespace, treating as deleted"
            );
            return Ok(());
        }
        let mut removed = 0;
        for graph in &graphs {
            removed += tx.clear_graph(graph)?;
        }
        for uri in &own {
            removed += tx.clear_graph(&iri(uri))?;
            removed += tx.remove_matching(&Pattern::any().subject(iri(uri)))?;
            removed += tx.remove_matching(&Pattern::any().object(iri(uri)))?;
        }
        tx.commit()?;

        self.backend.cache.evict_context(&id);
        self.backend.cache.evict(&entry.entry_uri);
        self.root.forget_name(&entry.entry_uri);
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let folder = self.backend.settings.data_folder.join(&id);
        if folder.exists() {
            if let Err(error) = std::fs::remove_dir_all(&folder) {
                warn!(
                    target: "repo",
                    folder = %folder.display(),
                    %error,
                    "unable to delete payload folder"
                );
            }
        }
        info!(target: "repo", context = id, graphs = graphs.len(), removed, "deleted context");
        Ok(())
    }
}
