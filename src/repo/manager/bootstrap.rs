use std::sync::Arc;

use anyhow::{Result, bail};
use quads::{Term, Triple};
use tracing::{debug, info, warn};

use super::ContextManager;
use crate::repo::address::{
    ADMIN_ID, ALL_ID, BACKUP_ID, GUEST_ID, PRINCIPALS_ID, SYSTEM_CONTEXTS_ID, TOP_ID,
};
use crate::repo::context::Context;
use crate::repo::entry::{AccessProperty, Entry, GraphType, NewEntry};
use crate::repo::error::RepoError;
use crate::repo::vocab::{self, iri};

/// Lists every regular context starts with.
const REGULAR_LISTS: [(&str, &str); 6] = [
    (TOP_ID, "Top folder"),
    ("_trash", "Trash"),
    ("_comments", "Comments"),
    ("_contacts", "Contacts"),
    ("_featured", "Featured"),
    ("_feeds", "Feeds"),
];

fn title_of(id: &str) -> String {
    match id {
        SYSTEM_CONTEXTS_ID => "Contexts".to_owned(),
        PRINCIPALS_ID => "Principals".to_owned(),
        other => other.trim_start_matches('_').to_owned(),
    }
}

impl ContextManager {
    /// Ensures the system contexts, the root lists and the built-in
    /// principals exist. Running it again changes nothing.
    pub(crate) fn initialize_system_entries(&self) -> Result<()> {
        let mut aliases = self.backend.settings.system_context_aliases.clone();
        if aliases.first().map(String::as_str) != Some(SYSTEM_CONTEXTS_ID) {
            aliases.retain(|a| a != SYSTEM_CONTEXTS_ID);
            aliases.insert(0, SYSTEM_CONTEXTS_ID.to_owned());
        }
        if !aliases.iter().any(|a| a == PRINCIPALS_ID) {
            aliases.push(PRINCIPALS_ID.to_owned());
        }
        for alias in &aliases {
            self.ensure_system_context(alias)?;
        }

        let guest = self.principals.guest_uri();
        for (id, graph_type, title) in [
            (ALL_ID, GraphType::List, "all contexts"),
            (TOP_ID, GraphType::List, "Top folder"),
            (BACKUP_ID, GraphType::None, "Backup entry"),
        ] {
            let entry = self.ensure_entry(&self.root, id, graph_type, title)?;
            self.ensure_named(&self.root, &entry, id)?;
            let mut readable = vec![AccessProperty::ReadMetadata];
            if id == ALL_ID {
                readable.push(AccessProperty::ReadResource);
            }
            for property in readable {
                if entry.acl.allowed(property).is_empty() {
                    self.root.grant(&entry, property, &guest)?;
                }
            }
        }
        info!(target: "repo", contexts = aliases.len(), "system entries ready");
        Ok(())
    }

    fn ensure_system_context(&self, id: &str) -> Result<()> {
        let entry = self.ensure_entry(&self.root, id, GraphType::SystemContext, &title_of(id))?;
        self.ensure_named(&self.root, &entry, id)?;
        if entry.acl.allowed(AccessProperty::ReadMetadata).is_empty() {
            self.root
                .grant(&entry, AccessProperty::ReadMetadata, &self.principals.guest_uri())?;
        }
        let Some(context) = self.get_context(id)? else {
            bail!(RepoError::NotFound(entry.entry_uri.clone()));
        };
        if id == PRINCIPALS_ID {
            self.bootstrap_principals(&context)?;
        }
        Ok(())
    }

    fn bootstrap_principals(&self, context: &Context) -> Result<()> {
        let guest = self.principals.guest_uri();
        for (id, name) in [(GUEST_ID, "guest"), (ADMIN_ID, "admin")] {
            let entry = self.ensure_entry(context, id, GraphType::User, name)?;
            self.ensure_named(context, &entry, name)?;
            if entry.acl.allowed(AccessProperty::ReadMetadata).is_empty() {
                context.grant(&entry, AccessProperty::ReadMetadata, &guest)?;
            }
        }
        Ok(())
    }

    /// Creates the system lists of a regular context.
    pub(super) fn bootstrap_regular(&self, context: &Context) -> Result<()> {
        for (id, title) in REGULAR_LISTS {
            self.ensure_entry(context, id, GraphType::List, title)?;
        }
        debug!(target: "repo", context = context.id(), "bootstrapped lists");
        Ok(())
    }

    /// Binds `name` unless the entry already has one.
    fn ensure_named(&self, context: &Context, entry: &Entry, name: &str) -> Result<()> {
        if context.entry_name(&entry.entry_uri)?.is_none()
            && !context.set_entry_name(&entry.entry_uri, name)?
        {
            warn!(target: "repo", context = context.id(), name, "name already taken");
        }
        Ok(())
    }

    /// Returns the entry `id` of `context`, creating it with a title when
    /// absent.
    fn ensure_entry(
        &self,
        context: &Context,
        id: &str,
        graph_type: GraphType,
        title: &str,
    ) -> Result<Arc<Entry>> {
        let entry = match context.get(id)? {
            Some(entry) => entry,
            None => context.create(NewEntry::local(graph_type).with_id(id))?,
        };
        if context.local_metadata(&entry)?.is_empty() {
            let title = Triple::new(
                iri(&entry.resource_uri),
                iri(vocab::DC_TITLE),
                Term::literal(title),
            );
            return context.set_metadata(&entry, &[title]);
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::repo::address::{ALL_ID, PRINCIPALS_ID};
    use crate::repo::entry::AccessProperty;
    use crate::repo::resource::Resource;
    use crate::repo::testing;

    #[test]
    fn bootstrap_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let quads = &manager.backend().quads;
        let before = quads.quads(&quads::Pattern::any())?.len();
        manager.initialize_system_entries()?;
        manager.initialize_system_entries()?;
        assert_eq!(quads.quads(&quads::Pattern::any())?.len(), before);

        let principals = manager.get_context(PRINCIPALS_ID)?.expect("principals context");
        assert!(principals.get("_guest")?.is_some());
        assert_eq!(
            manager.principals().principal_by_name("admin")?,
            Some(manager.principals().admin_uri())
        );
        let principals_uri = "http://example.org/store/_principals";
        assert_eq!(
            manager.get_context_alias(principals_uri)?.as_deref(),
            Some("_principals")
        );
        Ok(())
    }

    #[test]
    fn all_contexts_list_is_computed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let context = manager.create_context(None)?;
        let all = manager.root().get(ALL_ID)?.expect("_all entry");
        assert!(all.acl.allows(AccessProperty::ReadResource, &manager.principals().guest_uri()));
        assert_eq!(manager.root().entry_name(&all.entry_uri)?.as_deref(), Some(ALL_ID));
        let backup = manager.root().get("_backup")?.expect("_backup entry");
        assert!(backup.acl.allows(AccessProperty::ReadMetadata, &manager.principals().guest_uri()));
        let Some(Resource::List(list)) = manager.root().resource(all) else {
            panic!("list resource expected");
        };
        let children = list.children()?;
        assert!(children.contains(&context.entry_uri()));
        assert!(children.contains(&manager.backend().codec.context_entry_uri(PRINCIPALS_ID)));

        for id in ["_top", "_trash", "_comments", "_contacts", "_featured", "_feeds"] {
            assert!(context.get(id)?.is_some(), "{id}");
        }
        Ok(())
    }
}
