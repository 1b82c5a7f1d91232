//! Local and cached metadata graphs, inverse relations and metadata
//! revisions.

use std::sync::Arc;

use anyhow::{Result, bail};
use jiff::Timestamp;
use quads::{Pattern, Quad, Term, Transaction, Triple};
use tracing::debug;

use super::Context;
use crate::repo::address::Facet;
use crate::repo::entry::{AccessProperty, Entry, EntryType};
use crate::repo::error::RepoError;
use crate::repo::vocab::{self, iri};

/// A recorded version of an entry's local metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Revision {
    pub(crate) uri: String,
    pub(crate) number: u64,
    pub(crate) attributed_to: Option<String>,
    pub(crate) generated_at: Option<Timestamp>,
    /// The latest revision is the live metadata graph.
    pub(crate) latest: bool,
}

fn revision_uri(metadata_uri: &str, number: u64) -> String {
    format!("{metadata_uri}?rev={number}")
}

fn revision_number(metadata_uri: &str, uri: &str) -> Option<u64> {
    uri.strip_prefix(metadata_uri)?
        .strip_prefix("?rev=")?
        .parse()
        .ok()
}

impl Context {
    fn graph_triples(&self, graph: &str) -> Result<Vec<Triple>> {
        Ok(self
            .backend
            .quads
            .quads(&Pattern::any().graph(iri(graph)))?
            .into_iter()
            .map(Triple::from)
            .collect())
    }

    /// The entry whose local metadata a reference reads through, when the
    /// external metadata lives in this repository.
    fn referenced_local_entry(&self, entry: &Entry) -> Result<Option<Arc<Entry>>> {
        if entry.entry_type != EntryType::Reference {
            return Ok(None);
        }
        let Some(external) = &entry.external_metadata_uri else {
            return Ok(None);
        };
        match self.backend.codec.parse(external) {
            Some(address) if address.facet == Facet::Metadata => {
                self.backend.entry(&address.context_id, &address.id)
            }
            _ => Ok(None),
        }
    }

    /// Metadata as seen by readers: the local graph, the cached external
    /// graph, or both for link references.
    pub(crate) fn metadata(&self, entry: &Entry) -> Result<Vec<Triple>> {
        self.auth().check_authorized(entry, AccessProperty::ReadMetadata)?;
        if let Some(target) = self.referenced_local_entry(entry)? {
            self.auth().check_authorized(&target, AccessProperty::ReadMetadata)?;
            return self.graph_triples(&target.metadata_uri);
        }
        let mut triples = vec![];
        if let Some(local) = entry.local_metadata_uri() {
            triples.extend(self.graph_triples(local)?);
        }
        if let Some(cached) = &entry.cached_external_metadata_uri {
            triples.extend(self.graph_triples(cached)?);
        }
        Ok(triples)
    }

    pub(crate) fn local_metadata(&self, entry: &Entry) -> Result<Vec<Triple>> {
        let Some(local) = entry.local_metadata_uri() else {
            return Ok(vec![]);
        };
        self.auth().check_authorized(entry, AccessProperty::ReadMetadata)?;
        self.graph_triples(local)
    }

    /// Replaces the local metadata graph.
    pub(crate) fn set_metadata(&self, entry: &Entry, triples: &[Triple]) -> Result<Arc<Entry>> {
        let Some(local) = entry.local_metadata_uri() else {
            bail!(RepoError::Disallowed(format!(
                "{} has no local metadata",
                entry.entry_uri
            )));
        };
        self.auth().check_authorized(entry, AccessProperty::WriteMetadata)?;
        let now = Timestamp::now();
        let graph = iri(local);
        let mut tx = self.backend.quads.begin()?;
        let previous = tx.quads(&Pattern::any().graph(graph.clone()))?;
        self.drop_inverse_relations_in(&mut tx, entry)?;
        if self.backend.settings.provenance {
            self.record_revision_in(&mut tx, entry, &previous, now)?;
        }
        tx.clear_graph(&graph)?;
        for triple in triples {
            tx.insert(&triple.in_graph(&graph))?;
        }
        self.add_inverse_relations_in(&mut tx, entry, triples)?;
        self.register_modified_in(&mut tx, entry, now)?;
        tx.commit()?;
        debug!(
            target: "context",
            entry = entry.entry_uri,
            statements = triples.len(),
            "set metadata"
        );
        self.reload(entry)
    }

    pub(crate) fn cached_external_metadata(&self, entry: &Entry) -> Result<Vec<Triple>> {
        let Some(cached) = &entry.cached_external_metadata_uri else {
            return Ok(vec![]);
        };
        self.auth().check_authorized(entry, AccessProperty::ReadMetadata)?;
        self.graph_triples(cached)
    }

    /// Replaces the cached copy of external metadata and stamps the cache
    /// time.
    pub(crate) fn set_cached_external_metadata(
        &self,
        entry: &Entry,
        triples: &[Triple],
    ) -> Result<Arc<Entry>> {
        let Some(cached) = &entry.cached_external_metadata_uri else {
            bail!(RepoError::Disallowed(format!(
                "{} has no external metadata",
                entry.entry_uri
            )));
        };
        if self.referenced_local_entry(entry)?.is_some() {
            bail!(RepoError::Disallowed(format!(
                "metadata of {} is read from the referenced entry",
                entry.entry_uri
            )));
        }
        self.auth().check_authorized(entry, AccessProperty::WriteMetadata)?;
        let graph = iri(cached);
        let mut tx = self.backend.quads.begin()?;
        tx.clear_graph(&graph)?;
        for triple in triples {
            tx.insert(&triple.in_graph(&graph))?;
        }
        tx.remove_matching(
            &Pattern::any()
                .subject(entry.graph())
                .predicate(iri(vocab::CACHED))
                .graph(entry.graph()),
        )?;
        tx.insert(&entry.fact(vocab::CACHED, vocab::timestamp(Timestamp::now())))?;
        tx.commit()?;
        self.reload(entry)
    }

    /// Statements of other entries' metadata that point at this entry.
    pub(crate) fn relations(&self, entry: &Entry) -> Result<Vec<Triple>> {
        self.auth().check_authorized(entry, AccessProperty::ReadMetadata)?;
        self.graph_triples(&entry.relation_uri)
    }

    fn relation_target(&self, entry: &Entry, triple: &Triple) -> Result<Option<Arc<Entry>>> {
        let codec = &self.backend.codec;
        let (Some(subject), Some(object)) = (triple.subject.as_iri(), triple.object.as_iri()) else {
            return Ok(None);
        };
        if !codec.is_local(subject) || !codec.is_local(object) {
            return Ok(None);
        }
        Ok(self
            .backend
            .entry_owning(object)?
            .filter(|target| target.entry_uri != entry.entry_uri))
    }

    pub(super) fn add_inverse_relations_in(
        &self,
        tx: &mut Transaction<'_>,
        entry: &Entry,
        triples: &[Triple],
    ) -> Result<()> {
        for triple in triples {
            if let Some(target) = self.relation_target(entry, triple)? {
                tx.insert(&triple.in_graph(&iri(&target.relation_uri)))?;
            }
        }
        Ok(())
    }

    /// Withdraws the relations the current local metadata put on other
    /// entries.
    pub(super) fn drop_inverse_relations_in(
        &self,
        tx: &mut Transaction<'_>,
        entry: &Entry,
    ) -> Result<()> {
        let Some(local) = entry.local_metadata_uri() else {
            return Ok(());
        };
        for quad in tx.quads(&Pattern::any().graph(iri(local)))? {
            let triple = Triple::from(quad);
            if let Some(target) = self.relation_target(entry, &triple)? {
                tx.remove(&triple.in_graph(&iri(&target.relation_uri)))?;
            }
        }
        Ok(())
    }

    fn revisions_in(&self, tx: &Transaction<'_>, entry: &Entry) -> Result<Vec<Revision>> {
        let statements = tx.quads(&Pattern::any().graph(entry.graph()))?;
        Ok(collect_revisions(entry, &statements))
    }

    /// Graphs holding superseded metadata.
    pub(super) fn revision_graphs_in(
        &self,
        tx: &Transaction<'_>,
        entry: &Entry,
    ) -> Result<Vec<Term>> {
        Ok(self
            .revisions_in(tx, entry)?
            .into_iter()
            .filter(|r| !r.latest)
            .map(|r| iri(&r.uri))
            .collect())
    }

    fn record_revision_in(
        &self,
        tx: &mut Transaction<'_>,
        entry: &Entry,
        previous: &[Quad],
        now: Timestamp,
    ) -> Result<()> {
        let graph = entry.graph();
        let metadata = iri(&entry.metadata_uri);
        let latest = self.revisions_in(tx, entry)?.pop();
        let number = latest.as_ref().map_or(1, |r| r.number + 1);
        let uri = iri(&revision_uri(&entry.metadata_uri, number));
        if let Some(latest) = latest {
            let superseded = iri(&latest.uri);
            tx.remove(&Quad::new(
                superseded.clone(),
                iri(vocab::OWL_SAME_AS),
                metadata.clone(),
                graph.clone(),
            ))?;
            tx.insert(&Quad::new(
                uri.clone(),
                iri(vocab::PROV_WAS_REVISION_OF),
                superseded.clone(),
                graph.clone(),
            ))?;
            for quad in previous {
                tx.insert(&Triple::from(quad.clone()).in_graph(&superseded))?;
            }
        }
        let principal = self.auth().current_principal();
        for (predicate, object) in [
            (vocab::PROV_WAS_ATTRIBUTED_TO, iri(&principal)),
            (vocab::PROV_GENERATED_AT_TIME, vocab::timestamp(now)),
            (vocab::OWL_SAME_AS, metadata.clone()),
        ] {
            tx.insert(&Quad::new(uri.clone(), iri(predicate), object, graph.clone()))?;
        }
        Ok(())
    }

    pub(crate) fn revisions(&self, entry: &Entry) -> Result<Vec<Revision>> {
        self.auth().check_authorized(entry, AccessProperty::ReadMetadata)?;
        let statements = self
            .backend
            .quads
            .quads(&Pattern::any().graph(entry.graph()))?;
        Ok(collect_revisions(entry, &statements))
    }

    /// Metadata as it was at revision `number`.
    pub(crate) fn metadata_revision(
        &self,
        entry: &Entry,
        number: u64,
    ) -> Result<Option<Vec<Triple>>> {
        let Some(revision) = self
            .revisions(entry)?
            .into_iter()
            .find(|r| r.number == number)
        else {
            return Ok(None);
        };
        let graph = if revision.latest {
            &entry.metadata_uri
        } else {
            &revision.uri
        };
        Ok(Some(self.graph_triples(graph)?))
    }
}

fn collect_revisions(entry: &Entry, statements: &[Quad]) -> Vec<Revision> {
    let mut revisions: Vec<Revision> = statements
        .iter()
        .filter(|q| q.predicate.value() == vocab::PROV_WAS_ATTRIBUTED_TO)
        .filter_map(|q| {
            let uri = q.subject.as_iri()?;
            let number = revision_number(&entry.metadata_uri, uri)?;
            let about = |predicate: &str| {
                statements
                    .iter()
                    .find(|s| s.subject == q.subject && s.predicate.value() == predicate)
                    .map(|s| &s.object)
            };
            Some(Revision {
                uri: uri.to_owned(),
                number,
                attributed_to: q.object.as_iri().map(str::to_owned),
                generated_at: about(vocab::PROV_GENERATED_AT_TIME).and_then(vocab::parse_timestamp),
                latest: about(vocab::OWL_SAME_AS).is_some(),
            })
        })
        .collect();
    revisions.sort_by_key(|r| r.number);
    revisions
}
