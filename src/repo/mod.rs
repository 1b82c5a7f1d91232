//! The context/entry repository layer on top of the quad store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use quads::QuadStore;

pub(crate) mod address;
pub(crate) mod auth;
pub(crate) mod cache;
pub(crate) mod context;
pub(crate) mod entry;
pub(crate) mod error;
pub(crate) mod manager;
pub(crate) mod names;
pub(crate) mod rdf;
pub(crate) mod resource;
pub(crate) mod vocab;

use self::address::{AddressCodec, Facet};
use self::auth::{AclAuthorizer, Authorizer};
use self::cache::EntryCache;
use self::entry::Entry;
use self::manager::ContextManager;
use crate::config::RuntimeConfig;

/// Repository-wide switches taken from the configuration.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) data_folder: PathBuf,
    pub(crate) backup_folder: PathBuf,
    pub(crate) quota_enabled: bool,
    pub(crate) default_quota: Option<u64>,
    pub(crate) provenance: bool,
    pub(crate) system_context_aliases: Vec<String>,
}

/// State shared by every context of one repository.
pub(crate) struct Backend {
    pub(crate) quads: QuadStore,
    pub(crate) codec: AddressCodec,
    pub(crate) cache: EntryCache,
    pub(crate) auth: Arc<dyn Authorizer>,
    pub(crate) settings: Settings,
}

impl Backend {
    /// Cached snapshot of an entry, loaded from the store on a miss.
    pub(crate) fn entry(&self, context_id: &str, id: &str) -> Result<Option<Arc<Entry>>> {
        let entry_uri = self.codec.entry_uri(context_id, id);
        if let Some(entry) = self.cache.get(&entry_uri) {
            return Ok(Some(entry));
        }
        let epoch = self.cache.epoch();
        let Some(entry) = Entry::load(&self.quads, &self.codec, context_id, id)? else {
            return Ok(None);
        };
        let entry = Arc::new(entry);
        self.cache.put(entry.clone(), epoch);
        Ok(Some(entry))
    }

    /// Entry owning any of the graph URIs of an entry.
    pub(crate) fn entry_owning(&self, uri: &str) -> Result<Option<Arc<Entry>>> {
        match self.codec.parse(uri) {
            Some(address) => self.entry(&address.context_id, &address.id),
            None => Ok(None),
        }
    }

    pub(crate) fn entry_by_uri(&self, entry_uri: &str) -> Result<Option<Arc<Entry>>> {
        match self.codec.parse(entry_uri) {
            Some(address) if address.facet == Facet::Entry => {
                self.entry(&address.context_id, &address.id)
            }
            _ => Ok(None),
        }
    }
}

/// An opened repository: the context manager plus the authorizer the
/// command line drives.
pub(crate) struct Repository {
    pub(crate) manager: ContextManager,
    pub(crate) auth: Arc<AclAuthorizer>,
    principal: Option<String>,
}

impl Repository {
    pub(crate) fn open(runtime: &RuntimeConfig) -> Result<Repository> {
        let config = &runtime.init;
        let quads = QuadStore::open(runtime.keyspace.clone())?;
        let codec = AddressCodec::new(&config.repository.base_url)?;
        let auth = Arc::new(AclAuthorizer::new(quads.clone(), codec.clone(), None));
        let backend = Backend {
            quads,
            codec,
            cache: EntryCache::new(&config.cache),
            auth: auth.clone(),
            settings: Settings {
                data_folder: config.repository.data_folder.clone(),
                backup_folder: config.repository.backup_folder.clone(),
                quota_enabled: config.quota.enabled,
                default_quota: config.quota.default_bytes,
                provenance: config.repository.provenance,
                system_context_aliases: config.repository.system_context_aliases.clone(),
            },
        };
        let manager = ContextManager::new(Arc::new(backend));
        Ok(Repository {
            manager,
            auth,
            principal: config.auth.principal.clone(),
        })
    }

    /// Ensures the system entries as the administrator, then acts as the
    /// configured principal.
    pub(crate) fn initialize(&self) -> Result<()> {
        self.manager.initialize_system_entries()?;
        if let Some(principal) = &self.principal {
            self.auth.set_principal(principal);
        }
        Ok(())
    }
}
