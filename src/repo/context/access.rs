use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use jiff::Timestamp;
use quads::Pattern;

use super::{Context, touch};
use crate::repo::entry::{
    AccessProperty, Entry, EntryType, GraphType, ResourceType, entry_type_quad, graph_type_quad,
    resource_type_quad,
};
use crate::repo::error::RepoError;
use crate::repo::vocab::{self, iri};

impl Context {
    pub(crate) fn rights(&self, entry: &Entry) -> Result<BTreeSet<AccessProperty>> {
        self.auth().rights(entry)
    }

    pub(crate) fn grant(
        &self,
        entry: &Entry,
        property: AccessProperty,
        principal: &str,
    ) -> Result<Arc<Entry>> {
        self.auth().check_authorized(entry, AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        if tx.insert(&entry.acl_quad(property, principal))? {
            touch(&mut tx, &entry.entry_uri, Timestamp::now())?;
            tx.commit()?;
        }
        self.reload(entry)
    }

    pub(crate) fn revoke(
        &self,
        entry: &Entry,
        property: AccessProperty,
        principal: &str,
    ) -> Result<Arc<Entry>> {
        self.auth().check_authorized(entry, AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        if tx.remove(&entry.acl_quad(property, principal))? {
            touch(&mut tx, &entry.entry_uri, Timestamp::now())?;
            tx.commit()?;
        }
        self.reload(entry)
    }

    /// Replaces the principals granted `property`.
    pub(crate) fn set_allowed_principals(
        &self,
        entry: &Entry,
        property: AccessProperty,
        principals: &BTreeSet<String>,
    ) -> Result<Arc<Entry>> {
        self.auth().check_authorized(entry, AccessProperty::Administer)?;
        let template = entry.acl_quad(property, "");
        let mut tx = self.backend.quads.begin()?;
        tx.remove_matching(
            &Pattern::any()
                .subject(template.subject)
                .predicate(template.predicate)
                .graph(template.graph),
        )?;
        for principal in principals {
            tx.insert(&entry.acl_quad(property, principal))?;
        }
        touch(&mut tx, &entry.entry_uri, Timestamp::now())?;
        tx.commit()?;
        self.reload(entry)
    }

    /// Switches between the link and reference flavours. Local entries keep
    /// their type.
    pub(crate) fn set_entry_type(
        &self,
        entry: &Entry,
        entry_type: EntryType,
    ) -> Result<Arc<Entry>> {
        if entry.entry_type == entry_type {
            return self.reload(entry);
        }
        if entry.entry_type == EntryType::Local || entry_type == EntryType::Local {
            bail!(RepoError::Disallowed(format!(
                "{} cannot change between local and {entry_type:?}",
                entry.entry_uri
            )));
        }
        if entry_type.has_external_metadata() && entry.external_metadata_uri.is_none() {
            bail!(RepoError::Disallowed(format!(
                "{} has no external metadata to reference",
                entry.entry_uri
            )));
        }
        self.auth().check_authorized(entry, AccessProperty::Administer)?;
        let now = Timestamp::now();
        let metadata_pointer = entry.fact(vocab::METADATA, iri(&entry.metadata_uri));
        let mut tx = self.backend.quads.begin()?;
        if let Some(old) = entry_type_quad(entry, entry.entry_type) {
            tx.remove(&old)?;
        }
        if let Some(new) = entry_type_quad(entry, entry_type) {
            tx.insert(&new)?;
        }
        if entry_type.has_local_metadata() {
            tx.insert(&metadata_pointer)?;
        } else {
            self.drop_inverse_relations_in(&mut tx, entry)?;
            tx.remove(&metadata_pointer)?;
            tx.clear_graph(&iri(&entry.metadata_uri))?;
        }
        touch(&mut tx, &entry.entry_uri, now)?;
        tx.commit()?;
        self.reload(entry)
    }

    pub(crate) fn set_graph_type(
        &self,
        entry: &Entry,
        graph_type: GraphType,
    ) -> Result<Arc<Entry>> {
        if entry.graph_type == graph_type {
            return self.reload(entry);
        }
        if entry.entry_type == EntryType::Local {
            bail!(RepoError::Disallowed(format!(
                "graph type of local entry {} is fixed",
                entry.entry_uri
            )));
        }
        self.auth().check_authorized(entry, AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        if let Some(old) = graph_type_quad(entry, entry.graph_type) {
            tx.remove(&old)?;
        }
        if let Some(new) = graph_type_quad(entry, graph_type) {
            tx.insert(&new)?;
        }
        touch(&mut tx, &entry.entry_uri, Timestamp::now())?;
        tx.commit()?;
        self.reload(entry)
    }

    pub(crate) fn set_resource_type(
        &self,
        entry: &Entry,
        resource_type: ResourceType,
    ) -> Result<Arc<Entry>> {
        if entry.resource_type == resource_type {
            return self.reload(entry);
        }
        if entry.entry_type == EntryType::Local
            && !matches!(entry.graph_type, GraphType::None | GraphType::Pipeline)
        {
            bail!(RepoError::Disallowed(format!(
                "resource type of {} is fixed by its {:?} resource",
                entry.entry_uri, entry.graph_type
            )));
        }
        self.auth().check_authorized(entry, AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        if let Some(old) = resource_type_quad(entry, entry.resource_type) {
            tx.remove(&old)?;
        }
        if let Some(new) = resource_type_quad(entry, resource_type) {
            tx.insert(&new)?;
        }
        touch(&mut tx, &entry.entry_uri, Timestamp::now())?;
        tx.commit()?;
        self.reload(entry)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use anyhow::Result;

    use crate::repo::entry::{AccessProperty, EntryType, GraphType, NewEntry, ResourceType};
    use crate::repo::error::{RepoError, is_unauthorized};
    use crate::repo::testing;

    const ALICE: &str = "http://example.org/store/_principals/resource/alice";

    #[test]
    fn type_mutation_rules() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let context = repo.manager.create_context(None)?;

        let list = context.create(NewEntry::local(GraphType::List))?;
        let err = context.set_graph_type(&list, GraphType::Graph).unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Disallowed(_))));
        let err = context
            .set_resource_type(&list, ResourceType::NamedResource)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Disallowed(_))));

        let data = context.create(NewEntry::local(GraphType::None))?;
        let data = context.set_resource_type(&data, ResourceType::NamedResource)?;
        assert_eq!(data.resource_type, ResourceType::NamedResource);

        let link = context.create(NewEntry::link("http://elsewhere.org/y"))?;
        let link = context.set_graph_type(&link, GraphType::List)?;
        assert_eq!(link.graph_type, GraphType::List);
        assert!(context.set_entry_type(&link, EntryType::Reference).is_err());
        assert!(context.set_entry_type(&link, EntryType::Local).is_err());

        let reference = context.create(NewEntry::reference(
            "http://elsewhere.org/z",
            "http://elsewhere.org/z.rdf",
        ))?;
        let promoted = context.set_entry_type(&reference, EntryType::LinkReference)?;
        assert_eq!(promoted.entry_type, EntryType::LinkReference);
        assert_eq!(promoted.local_metadata_uri(), Some(promoted.metadata_uri.as_str()));
        Ok(())
    }

    #[test]
    fn acl_grants_and_replacement() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let context = repo.manager.create_context(None)?;
        let entry = context.create(NewEntry::local(GraphType::None))?;

        let entry = context.grant(&entry, AccessProperty::ReadMetadata, ALICE)?;
        assert!(entry.acl.allows(AccessProperty::ReadMetadata, ALICE));
        assert!(entry.has_acl());

        repo.auth.set_principal(ALICE);
        context.metadata(&entry)?;
        let err = context
            .local_metadata(&entry)
            .and_then(|_| context.set_metadata(&entry, &[]))
            .unwrap_err();
        assert!(is_unauthorized(&err));
        assert!(context.grant(&entry, AccessProperty::Administer, ALICE).is_err());
        repo.auth.set_principal("http://example.org/store/_principals/resource/_admin");

        let entry = context.set_allowed_principals(
            &entry,
            AccessProperty::ReadMetadata,
            &BTreeSet::from(["urn:x".to_owned(), "urn:y".to_owned()]),
        )?;
        assert_eq!(entry.acl.allowed(AccessProperty::ReadMetadata).len(), 2);
        let entry = context.revoke(&entry, AccessProperty::ReadMetadata, "urn:x")?;
        assert_eq!(
            entry.acl.allowed(AccessProperty::ReadMetadata),
            BTreeSet::from(["urn:y".to_owned()])
        );
        Ok(())
    }
}
