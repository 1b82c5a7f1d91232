//! Locally materialized resources, one variant per structural graph type.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use quads::{Pattern, Quad, Term, Transaction, Triple};
use tracing::{debug, warn};
use uuid::Uuid;

use super::address::{ALL_ID, Facet, SYSTEM_CONTEXTS_ID};
use super::context::Context;
use super::entry::{AccessProperty, Entry, EntryType, GraphType, ResourceType};
use super::error::RepoError;
use super::vocab::{self, iri};

pub(crate) enum Resource<'a> {
    Data(DataResource<'a>),
    List(ListResource<'a>),
    Graph(GraphResource<'a>),
    String(StringResource<'a>),
    /// The resource is the context with this id.
    Context(String),
}

impl<'a> Resource<'a> {
    /// Links and references point elsewhere and have no local resource.
    pub(crate) fn of(context: &'a Context, entry: Arc<Entry>) -> Option<Resource<'a>> {
        if entry.entry_type != EntryType::Local {
            return None;
        }
        Some(match entry.graph_type {
            GraphType::None if entry.resource_type == ResourceType::InformationResource => {
                Resource::Data(DataResource { context, entry })
            }
            GraphType::None => return None,
            GraphType::List | GraphType::ResultList => {
                Resource::List(ListResource { context, entry })
            }
            GraphType::Graph
            | GraphType::Pipeline
            | GraphType::PipelineResult
            | GraphType::User
            | GraphType::Group => Resource::Graph(GraphResource { context, entry }),
            GraphType::String => Resource::String(StringResource { context, entry }),
            GraphType::Context | GraphType::SystemContext => Resource::Context(entry.id.clone()),
        })
    }
}

fn check(context: &Context, entry: &Entry, property: AccessProperty) -> Result<()> {
    context.backend().auth.check_authorized(entry, property)
}

/// Binary payload stored as one file per entry.
pub(crate) struct DataResource<'a> {
    context: &'a Context,
    entry: Arc<Entry>,
}

impl DataResource<'_> {
    pub(crate) fn path(&self) -> PathBuf {
        self.context.payload_path(&self.entry.id)
    }

    fn stored_size(&self) -> Result<Option<u64>> {
        match fs::metadata(self.path()) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context("unable to stat payload"),
        }
    }

    pub(crate) fn size(&self) -> Result<Option<u64>> {
        check(self.context, &self.entry, AccessProperty::ReadResource)?;
        self.stored_size()
    }

    pub(crate) fn data(&self) -> Result<Option<File>> {
        check(self.context, &self.entry, AccessProperty::ReadResource)?;
        match File::open(self.path()) {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context("unable to open payload"),
        }
    }

    /// Replaces the payload. The quota is charged the size difference; when
    /// it is exceeded the new bytes are discarded and the old payload stays.
    pub(crate) fn set_data(&self, mut reader: impl Read) -> Result<u64> {
        check(self.context, &self.entry, AccessProperty::WriteResource)?;
        let path = self.path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        // one staging file per upload
        let staging = path.with_extension(format!("{}.upload", Uuid::now_v7().simple()));
        let written = {
            let mut file = File::create(&staging).context("unable to create payload file")?;
            let written = io::copy(&mut reader, &mut file).context("unable to write payload")?;
            file.sync_all().context("unable to sync payload")?;
            written
        };
        let previous = self.stored_size()?.unwrap_or(0);
        let charged = if written >= previous {
            self.context.increase_fill_level(written - previous)
        } else {
            self.context.decrease_fill_level(previous - written)
        };
        if let Err(err) = charged {
            discard(&staging);
            return Err(err);
        }
        if let Err(err) = fs::rename(&staging, &path) {
            discard(&staging);
            let refund = if written >= previous {
                self.context.decrease_fill_level(written - previous)
            } else {
                self.context.increase_fill_level(previous - written)
            };
            if let Err(error) = refund {
                warn!(target: "context", %error, "unable to restore fill level");
            }
            return Err(err).context("unable to store payload");
        }
        self.context.touch_entry(&self.entry)?;
        debug!(target: "context", entry = self.entry.entry_uri, written, "stored payload");
        Ok(written)
    }

    /// Deletes the payload. Returns false when there was none.
    pub(crate) fn remove_data(&self) -> Result<bool> {
        check(self.context, &self.entry, AccessProperty::WriteResource)?;
        let Some(size) = self.stored_size()? else {
            return Ok(false);
        };
        fs::remove_file(self.path()).context("unable to delete payload")?;
        self.context.decrease_fill_level(size)?;
        self.context.touch_entry(&self.entry)?;
        Ok(true)
    }
}

fn discard(path: &std::path::Path) {
    if let Err(error) = fs::remove_file(path) {
        warn!(target: "context", path = %path.display(), %error, "unable to discard upload");
    }
}

/// Ordered entries of the same context, kept as an `rdf:Seq`.
pub(crate) struct ListResource<'a> {
    context: &'a Context,
    entry: Arc<Entry>,
}

impl ListResource<'_> {
    fn is_all_contexts(&self) -> bool {
        self.entry.context_id == SYSTEM_CONTEXTS_ID && self.entry.id == ALL_ID
    }

    /// Entry URIs of the members, in order. The list of all contexts is
    /// computed from the current context entries.
    pub(crate) fn children(&self) -> Result<Vec<String>> {
        check(self.context, &self.entry, AccessProperty::ReadResource)?;
        if self.is_all_contexts() {
            return Ok(self
                .context
                .entries()?
                .into_iter()
                .filter(|e| e.graph_type.is_context())
                .map(|e| e.entry_uri.clone())
                .collect());
        }
        members(self.context, &self.entry.resource_uri)
    }

    fn checked_child(&self, child_uri: &str) -> Result<Arc<Entry>> {
        match self.context.codec().parse(child_uri) {
            Some(address)
                if address.facet == Facet::Entry
                    && address.context_id == self.entry.context_id => {}
            _ => bail!(RepoError::Disallowed(format!(
                "{child_uri} is not an entry of context {}",
                self.entry.context_id
            ))),
        }
        self.context
            .get_by_entry_uri(child_uri)?
            .ok_or_else(|| RepoError::NotFound(child_uri.to_owned()).into())
    }

    fn writable(&self) -> Result<()> {
        if self.is_all_contexts() {
            bail!(RepoError::Disallowed("the list of all contexts is computed".into()));
        }
        check(self.context, &self.entry, AccessProperty::WriteResource)
    }

    pub(crate) fn add_child(&self, child_uri: &str) -> Result<()> {
        self.writable()?;
        self.checked_child(child_uri)?;
        let backend = self.context.backend();
        let mut tx = backend.quads.begin()?;
        if !append_member_in(&mut tx, &self.entry, child_uri)? {
            bail!(RepoError::Disallowed(format!(
                "{child_uri} is already a member of {}",
                self.entry.entry_uri
            )));
        }
        super::context::touch(&mut tx, &self.entry.entry_uri, jiff::Timestamp::now())?;
        tx.commit()?;
        backend.cache.evict(&self.entry.entry_uri);
        backend.cache.evict(child_uri);
        Ok(())
    }

    pub(crate) fn remove_child(&self, child_uri: &str) -> Result<bool> {
        self.writable()?;
        let backend = self.context.backend();
        let mut tx = backend.quads.begin()?;
        if !remove_member_in(&mut tx, &self.entry, child_uri)? {
            return Ok(false);
        }
        super::context::touch(&mut tx, &self.entry.entry_uri, jiff::Timestamp::now())?;
        tx.commit()?;
        backend.cache.evict(&self.entry.entry_uri);
        backend.cache.evict(child_uri);
        Ok(true)
    }

    pub(crate) fn set_children(&self, children: &[String]) -> Result<()> {
        self.writable()?;
        for (i, child) in children.iter().enumerate() {
            self.checked_child(child)?;
            if children[..i].contains(child) {
                bail!(RepoError::Disallowed(format!("{child} is listed twice")));
            }
        }
        let backend = self.context.backend();
        let mut tx = backend.quads.begin()?;
        let previous = members_in(&tx, &self.entry.resource_uri)?;
        for child in previous.iter().filter(|c| !children.contains(c)) {
            tx.remove(&referral(child, &self.entry.entry_uri))?;
        }
        write_members_in(&mut tx, &self.entry.resource_uri, children)?;
        for child in children {
            tx.insert(&referral(child, &self.entry.entry_uri))?;
        }
        super::context::touch(&mut tx, &self.entry.entry_uri, jiff::Timestamp::now())?;
        tx.commit()?;
        backend.cache.evict(&self.entry.entry_uri);
        for child in previous.iter().chain(children) {
            backend.cache.evict(child);
        }
        Ok(())
    }
}

fn referral(child_uri: &str, list_entry_uri: &str) -> Quad {
    Quad::new(
        iri(child_uri),
        iri(vocab::REFERRED_IN),
        iri(list_entry_uri),
        iri(child_uri),
    )
}

fn member_index(predicate: &Term) -> Option<usize> {
    predicate
        .as_iri()?
        .strip_prefix(vocab::RDF_MEMBER_PREFIX)?
        .parse()
        .ok()
}

fn sorted_members(quads: Vec<Quad>) -> Vec<String> {
    let mut members: Vec<(usize, String)> = quads
        .into_iter()
        .filter_map(|q| Some((member_index(&q.predicate)?, q.object.as_iri()?.to_owned())))
        .collect();
    members.sort();
    members.into_iter().map(|(_, uri)| uri).collect()
}

fn members(context: &Context, resource_uri: &str) -> Result<Vec<String>> {
    let quads = context
        .backend()
        .quads
        .quads(&Pattern::any().subject(iri(resource_uri)).graph(iri(resource_uri)))?;
    Ok(sorted_members(quads))
}

pub(crate) fn members_in(tx: &Transaction<'_>, resource_uri: &str) -> Result<Vec<String>> {
    let quads = tx.quads(&Pattern::any().subject(iri(resource_uri)).graph(iri(resource_uri)))?;
    Ok(sorted_members(quads))
}

/// Rewrites the sequence so members are numbered from one without gaps.
pub(crate) fn write_members_in(
    tx: &mut Transaction<'_>,
    resource_uri: &str,
    children: &[String],
) -> Result<()> {
    let graph = iri(resource_uri);
    for quad in tx.quads(&Pattern::any().subject(graph.clone()).graph(graph.clone()))? {
        if member_index(&quad.predicate).is_some() {
            tx.remove(&quad)?;
        }
    }
    tx.insert(&Quad::new(
        graph.clone(),
        iri(vocab::RDF_TYPE),
        iri(vocab::RDF_SEQ),
        graph.clone(),
    ))?;
    for (i, child) in children.iter().enumerate() {
        tx.insert(&Quad::new(
            graph.clone(),
            iri(&format!("{}{}", vocab::RDF_MEMBER_PREFIX, i + 1)),
            iri(child),
            graph.clone(),
        ))?;
    }
    Ok(())
}

/// Appends a member and records the referral on the child. Returns false
/// when the child is already a member.
pub(crate) fn append_member_in(
    tx: &mut Transaction<'_>,
    list: &Entry,
    child_uri: &str,
) -> Result<bool> {
    let mut children = members_in(tx, &list.resource_uri)?;
    if children.iter().any(|c| c == child_uri) {
        return Ok(false);
    }
    children.push(child_uri.to_owned());
    write_members_in(tx, &list.resource_uri, &children)?;
    tx.insert(&referral(child_uri, &list.entry_uri))?;
    Ok(true)
}

pub(crate) fn remove_member_in(
    tx: &mut Transaction<'_>,
    list: &Entry,
    child_uri: &str,
) -> Result<bool> {
    let mut children = members_in(tx, &list.resource_uri)?;
    let before = children.len();
    children.retain(|c| c != child_uri);
    if children.len() == before {
        return Ok(false);
    }
    write_members_in(tx, &list.resource_uri, &children)?;
    tx.remove(&referral(child_uri, &list.entry_uri))?;
    Ok(true)
}

/// An RDF document stored as the resource graph.
pub(crate) struct GraphResource<'a> {
    context: &'a Context,
    entry: Arc<Entry>,
}

impl GraphResource<'_> {
    pub(crate) fn graph(&self) -> Result<Vec<Triple>> {
        check(self.context, &self.entry, AccessProperty::ReadResource)?;
        Ok(self
            .context
            .backend()
            .quads
            .quads(&Pattern::any().graph(iri(&self.entry.resource_uri)))?
            .into_iter()
            .map(Triple::from)
            .collect())
    }

    pub(crate) fn set_graph(&self, triples: &[Triple]) -> Result<()> {
        check(self.context, &self.entry, AccessProperty::WriteResource)?;
        let backend = self.context.backend();
        let graph = iri(&self.entry.resource_uri);
        let mut tx = backend.quads.begin()?;
        tx.clear_graph(&graph)?;
        for triple in triples {
            tx.insert(&triple.in_graph(&graph))?;
        }
        super::context::touch(&mut tx, &self.entry.entry_uri, jiff::Timestamp::now())?;
        tx.commit()?;
        backend.cache.evict(&self.entry.entry_uri);
        Ok(())
    }
}

/// A single `xsd:string` value.
pub(crate) struct StringResource<'a> {
    context: &'a Context,
    entry: Arc<Entry>,
}

impl StringResource<'_> {
    fn pattern(&self) -> Pattern {
        let resource = iri(&self.entry.resource_uri);
        Pattern::any()
            .subject(resource.clone())
            .predicate(iri(vocab::RDF_VALUE))
            .graph(resource)
    }

    pub(crate) fn string(&self) -> Result<Option<String>> {
        check(self.context, &self.entry, AccessProperty::ReadResource)?;
        Ok(self
            .context
            .backend()
            .quads
            .quads(&self.pattern())?
            .into_iter()
            .find_map(|q| q.object.as_literal().map(|l| l.value.clone())))
    }

    pub(crate) fn set_string(&self, text: &str) -> Result<()> {
        check(self.context, &self.entry, AccessProperty::WriteResource)?;
        let backend = self.context.backend();
        let resource = iri(&self.entry.resource_uri);
        let mut tx = backend.quads.begin()?;
        tx.remove_matching(&self.pattern())?;
        tx.insert(&Quad::new(
            resource.clone(),
            iri(vocab::RDF_VALUE),
            Term::typed_literal(text, vocab::XSD_STRING),
            resource,
        ))?;
        super::context::touch(&mut tx, &self.entry.entry_uri, jiff::Timestamp::now())?;
        tx.commit()?;
        backend.cache.evict(&self.entry.entry_uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use quads::{Term, Triple};

    use super::Resource;
    use crate::repo::entry::{GraphType, NewEntry};
    use crate::repo::error::RepoError;
    use crate::repo::testing;
    use crate::repo::vocab::iri;

    #[test]
    fn lists_keep_order_and_referrals() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let context = repo.manager.create_context(None)?;
        let list = context.create(NewEntry::local(GraphType::List))?;
        let a = context.create(NewEntry::local(GraphType::None).in_list(&list.entry_uri))?;
        let b = context.create(NewEntry::local(GraphType::None))?;

        let Some(Resource::List(members)) = context.resource(list.clone()) else {
            panic!("expected a list resource");
        };
        members.add_child(&b.entry_uri)?;
        assert_eq!(members.children()?, vec![a.entry_uri.clone(), b.entry_uri.clone()]);
        let err = members.add_child(&a.entry_uri).unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Disallowed(_))));
        assert!(context.get(&a.id)?.unwrap().referred_in.contains(&list.entry_uri));

        members.set_children(&[b.entry_uri.clone()])?;
        assert!(context.get(&a.id)?.unwrap().referred_in.is_empty());

        context.remove(&b.entry_uri)?;
        assert!(members.children()?.is_empty());
        assert!(!members.remove_child(&a.entry_uri)?);
        Ok(())
    }

    #[test]
    fn string_and_graph_resources() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let context = repo.manager.create_context(None)?;

        let text = context.create(NewEntry::local(GraphType::String))?;
        let Some(Resource::String(text)) = context.resource(text) else {
            panic!("expected a string resource");
        };
        assert_eq!(text.string()?, None);
        text.set_string("hello")?;
        text.set_string("hello again")?;
        assert_eq!(text.string()?.as_deref(), Some("hello again"));

        let doc = context.create(NewEntry::local(GraphType::Graph))?;
        let triple = Triple::new(iri("urn:s"), iri("urn:p"), Term::literal("o"));
        let Some(Resource::Graph(doc)) = context.resource(doc) else {
            panic!("expected a graph resource");
        };
        doc.set_graph(&[triple.clone()])?;
        assert_eq!(doc.graph()?, vec![triple]);

        let link = context.create(NewEntry::link("http://elsewhere.org/"))?;
        assert!(context.resource(link).is_none());
        Ok(())
    }

    #[test]
    fn payload_quota_rollback() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = testing::config(dir.path());
        config.quota.enabled = true;
        let repo = testing::open_with(config)?;
        let context = repo.manager.create_context(None)?;
        context.set_quota(10)?;
        let entry = context.create(NewEntry::local(GraphType::None))?;
        let Some(Resource::Data(data)) = context.resource(entry) else {
            panic!("expected a data resource");
        };

        assert_eq!(data.set_data(&b"12345678"[..])?, 8);
        assert_eq!(context.quota_fill_level()?, 8);
        let err = data.set_data(&b"0123456789ab"[..]).unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::QuotaExceeded { .. })));
        assert_eq!(context.quota_fill_level()?, 8);
        assert_eq!(std::fs::read(data.path())?, b"12345678");

        data.set_data(&b"123"[..])?;
        assert_eq!(context.quota_fill_level()?, 3);
        assert!(data.remove_data()?);
        assert_eq!(context.quota_fill_level()?, 0);
        assert!(data.data()?.is_none());
        Ok(())
    }
}
