use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use jiff::Timestamp;
use quads::{Pattern, Quad, QuadStore, Term};

use super::address::{AddressCodec, Facet, SYSTEM_CONTEXTS_ID, is_system_id};
use super::vocab;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum EntryType {
    Local,
    Link,
    Reference,
    LinkReference,
}

impl EntryType {
    fn iri(self) -> Option<&'static str> {
        match self {
            EntryType::Local => None,
            EntryType::Link => Some(vocab::LINK),
            EntryType::Reference => Some(vocab::REFERENCE),
            EntryType::LinkReference => Some(vocab::LINK_REFERENCE),
        }
    }

    fn from_iri(iri: &str) -> Option<EntryType> {
        [EntryType::Link, EntryType::Reference, EntryType::LinkReference]
            .into_iter()
            .find(|t| t.iri() == Some(iri))
    }

    /// Local metadata is owned by every entry type but plain references.
    pub(crate) fn has_local_metadata(self) -> bool {
        self != EntryType::Reference
    }

    pub(crate) fn has_external_metadata(self) -> bool {
        matches!(self, EntryType::Reference | EntryType::LinkReference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GraphType {
    None,
    List,
    ResultList,
    Graph,
    String,
    Context,
    SystemContext,
    User,
    Group,
    Pipeline,
    PipelineResult,
}

impl GraphType {
    const ALL: [GraphType; 11] = [
        GraphType::None,
        GraphType::List,
        GraphType::ResultList,
        GraphType::Graph,
        GraphType::String,
        GraphType::Context,
        GraphType::SystemContext,
        GraphType::User,
        GraphType::Group,
        GraphType::Pipeline,
        GraphType::PipelineResult,
    ];

    pub(crate) fn iri(self) -> Option<&'static str> {
        Some(match self {
            GraphType::None => return None,
            GraphType::List => vocab::LIST,
            GraphType::ResultList => vocab::RESULT_LIST,
            GraphType::Graph => vocab::GRAPH,
            GraphType::String => vocab::STRING,
            GraphType::Context => vocab::CONTEXT,
            GraphType::SystemContext => vocab::SYSTEM_CONTEXT,
            GraphType::User => vocab::USER,
            GraphType::Group => vocab::GROUP,
            GraphType::Pipeline => vocab::PIPELINE,
            GraphType::PipelineResult => vocab::PIPELINE_RESULT,
        })
    }

    fn from_iri(iri: &str) -> Option<GraphType> {
        GraphType::ALL.into_iter().find(|t| t.iri() == Some(iri))
    }

    pub(crate) fn is_context(self) -> bool {
        matches!(self, GraphType::Context | GraphType::SystemContext)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ResourceType {
    InformationResource,
    NamedResource,
    Unknown,
}

impl ResourceType {
    fn iri(self) -> Option<&'static str> {
        match self {
            ResourceType::InformationResource => None,
            ResourceType::NamedResource => Some(vocab::NAMED_RESOURCE),
            ResourceType::Unknown => Some(vocab::UNKNOWN_RESOURCE),
        }
    }

    fn from_iri(iri: &str) -> Option<ResourceType> {
        [ResourceType::NamedResource, ResourceType::Unknown]
            .into_iter()
            .find(|t| t.iri() == Some(iri))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum AccessProperty {
    Administer,
    ReadMetadata,
    WriteMetadata,
    ReadResource,
    WriteResource,
}

impl AccessProperty {
    pub(crate) const ALL: [AccessProperty; 5] = [
        AccessProperty::Administer,
        AccessProperty::ReadMetadata,
        AccessProperty::WriteMetadata,
        AccessProperty::ReadResource,
        AccessProperty::WriteResource,
    ];

    /// Subject facet and predicate of the ACL statement for this property.
    fn statement_shape(self) -> (Facet, &'static str) {
        match self {
            AccessProperty::Administer => (Facet::Entry, vocab::WRITE),
            AccessProperty::ReadMetadata => (Facet::Metadata, vocab::READ),
            AccessProperty::WriteMetadata => (Facet::Metadata, vocab::WRITE),
            AccessProperty::ReadResource => (Facet::Resource, vocab::READ),
            AccessProperty::WriteResource => (Facet::Resource, vocab::WRITE),
        }
    }
}

/// Principals granted each access property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Acl {
    grants: BTreeMap<AccessProperty, BTreeSet<String>>,
}

impl Acl {
    pub(crate) fn allowed(&self, property: AccessProperty) -> BTreeSet<String> {
        self.grants.get(&property).cloned().unwrap_or_default()
    }

    pub(crate) fn allows(&self, property: AccessProperty, principal: &str) -> bool {
        self.grants
            .get(&property)
            .is_some_and(|principals| principals.contains(principal))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.grants.values().all(BTreeSet::is_empty)
    }

    fn grant(&mut self, property: AccessProperty, principal: String) {
        self.grants.entry(property).or_default().insert(principal);
    }
}

/// Snapshot of an entry graph. Mutations go through the owning context and
/// produce a fresh snapshot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Entry {
    pub(crate) context_id: String,
    pub(crate) id: String,
    pub(crate) entry_uri: String,
    pub(crate) resource_uri: String,
    pub(crate) metadata_uri: String,
    pub(crate) relation_uri: String,
    pub(crate) external_metadata_uri: Option<String>,
    pub(crate) cached_external_metadata_uri: Option<String>,
    pub(crate) entry_type: EntryType,
    pub(crate) graph_type: GraphType,
    pub(crate) resource_type: ResourceType,
    pub(crate) created: Option<Timestamp>,
    pub(crate) modified: Option<Timestamp>,
    pub(crate) cached: Option<Timestamp>,
    pub(crate) creator: Option<String>,
    pub(crate) contributors: BTreeSet<String>,
    pub(crate) referred_in: BTreeSet<String>,
    pub(crate) acl: Acl,
}

impl Entry {
    pub(crate) fn load(
        quads: &QuadStore,
        codec: &AddressCodec,
        context_id: &str,
        id: &str,
    ) -> Result<Option<Entry>> {
        let entry_uri = codec.entry_uri(context_id, id);
        let statements = quads.quads(&Pattern::any().graph(Term::iri(&entry_uri)))?;
        if statements.is_empty() {
            return Ok(None);
        }
        Ok(Some(Entry::from_statements(
            codec,
            context_id,
            id,
            &statements,
        )))
    }

    pub(crate) fn from_statements(
        codec: &AddressCodec,
        context_id: &str,
        id: &str,
        statements: &[Quad],
    ) -> Entry {
        let entry_uri = codec.entry_uri(context_id, id);
        let object_of = |subject: &str, predicate: &str| -> Option<&Term> {
            statements
                .iter()
                .find(|q| q.subject.value() == subject && q.predicate.value() == predicate)
                .map(|q| &q.object)
        };
        let iri_of = |subject: &str, predicate: &str| -> Option<String> {
            object_of(subject, predicate)
                .and_then(Term::as_iri)
                .map(str::to_owned)
        };
        let iris_of = |subject: &str, predicate: &str| -> BTreeSet<String> {
            statements
                .iter()
                .filter(|q| q.subject.value() == subject && q.predicate.value() == predicate)
                .filter_map(|q| q.object.as_iri().map(str::to_owned))
                .collect()
        };

        let resource_uri =
            iri_of(&entry_uri, vocab::RESOURCE)
                .unwrap_or_else(|| codec.resource_uri(context_id, id));
        let metadata_uri = codec.metadata_uri(context_id, id);
        let relation_uri = codec.relation_uri(context_id, id);

        let entry_types = iris_of(&entry_uri, vocab::RDF_TYPE);
        let entry_type = entry_types
            .iter()
            .find_map(|t| EntryType::from_iri(t))
            .unwrap_or(EntryType::Local);
        let resource_type = entry_types
            .iter()
            .find_map(|t| ResourceType::from_iri(t))
            .unwrap_or(ResourceType::InformationResource);
        let graph_type = iris_of(&resource_uri, vocab::RDF_TYPE)
            .iter()
            .find_map(|t| GraphType::from_iri(t))
            .unwrap_or(GraphType::None);

        let mut acl = Acl::default();
        for property in AccessProperty::ALL {
            let (facet, predicate) = property.statement_shape();
            let subject = match facet {
                Facet::Entry => &entry_uri,
                Facet::Metadata => &metadata_uri,
                _ => &resource_uri,
            };
            for principal in iris_of(subject, predicate) {
                acl.grant(property, principal);
            }
        }

        Entry {
            context_id: context_id.to_owned(),
            id: id.to_owned(),
            external_metadata_uri: iri_of(&entry_uri, vocab::EXTERNAL_METADATA),
            cached_external_metadata_uri: iri_of(&entry_uri, vocab::CACHED_EXTERNAL_METADATA),
            entry_type,
            graph_type,
            resource_type,
            created: object_of(&entry_uri, vocab::DC_CREATED).and_then(vocab::parse_timestamp),
            modified: object_of(&entry_uri, vocab::DC_MODIFIED).and_then(vocab::parse_timestamp),
            cached: object_of(&entry_uri, vocab::CACHED).and_then(vocab::parse_timestamp),
            creator: iri_of(&entry_uri, vocab::DC_CREATOR),
            contributors: iris_of(&entry_uri, vocab::DC_CONTRIBUTOR),
            referred_in: iris_of(&entry_uri, vocab::REFERRED_IN),
            acl,
            entry_uri,
            resource_uri,
            metadata_uri,
            relation_uri,
        }
    }

    pub(crate) fn is_system(&self) -> bool {
        is_system_id(&self.id)
    }

    pub(crate) fn has_acl(&self) -> bool {
        !self.acl.is_empty()
    }

    /// Entries of the root context describe contexts.
    pub(crate) fn is_context_entry(&self) -> bool {
        self.context_id == SYSTEM_CONTEXTS_ID && self.graph_type.is_context()
    }

    /// Local metadata graph, if this entry owns one.
    pub(crate) fn local_metadata_uri(&self) -> Option<&str> {
        self.entry_type
            .has_local_metadata()
            .then_some(self.metadata_uri.as_str())
    }

    /// Subject of the ACL statement for `property`.
    pub(crate) fn acl_subject(&self, property: AccessProperty) -> &str {
        match property.statement_shape().0 {
            Facet::Entry => &self.entry_uri,
            Facet::Metadata => &self.metadata_uri,
            _ => &self.resource_uri,
        }
    }

    pub(crate) fn acl_quad(&self, property: AccessProperty, principal: &str) -> Quad {
        let (_, predicate) = property.statement_shape();
        Quad::new(
            Term::iri(self.acl_subject(property)),
            Term::iri(predicate),
            Term::iri(principal),
            self.graph(),
        )
    }

    /// The entry graph.
    pub(crate) fn graph(&self) -> Term {
        Term::iri(&self.entry_uri)
    }

    /// Statement in the entry graph about the entry itself.
    pub(crate) fn fact(&self, predicate: &str, object: Term) -> Quad {
        Quad::new(self.graph(), Term::iri(predicate), object, self.graph())
    }

    /// Every graph this entry owns.
    pub(crate) fn owned_graphs(&self) -> Vec<Term> {
        let mut graphs = vec![
            self.graph(),
            Term::iri(&self.metadata_uri),
            Term::iri(&self.relation_uri),
        ];
        if let Some(cached) = &self.cached_external_metadata_uri {
            graphs.push(Term::iri(cached));
        }
        if self.entry_type == EntryType::Local && !self.graph_type.is_context() {
            graphs.push(Term::iri(&self.resource_uri));
        }
        graphs
    }
}

/// Description of an entry to create inside a context.
#[derive(Debug, Clone)]
pub(crate) struct NewEntry {
    pub(crate) id: Option<String>,
    pub(crate) entry_type: EntryType,
    pub(crate) graph_type: GraphType,
    pub(crate) resource_type: ResourceType,
    pub(crate) resource_uri: Option<String>,
    pub(crate) external_metadata_uri: Option<String>,
    pub(crate) list: Option<String>,
}

impl NewEntry {
    pub(crate) fn local(graph_type: GraphType) -> NewEntry {
        NewEntry {
            id: None,
            entry_type: EntryType::Local,
            graph_type,
            resource_type: ResourceType::InformationResource,
            resource_uri: None,
            external_metadata_uri: None,
            list: None,
        }
    }

    pub(crate) fn link(resource_uri: &str) -> NewEntry {
        NewEntry {
            entry_type: EntryType::Link,
            resource_uri: Some(resource_uri.to_owned()),
            ..NewEntry::local(GraphType::None)
        }
    }

    pub(crate) fn reference(resource_uri: &str, external_metadata_uri: &str) -> NewEntry {
        NewEntry {
            entry_type: EntryType::Reference,
            resource_uri: Some(resource_uri.to_owned()),
            external_metadata_uri: Some(external_metadata_uri.to_owned()),
            ..NewEntry::local(GraphType::None)
        }
    }

    pub(crate) fn link_reference(resource_uri: &str, external_metadata_uri: &str) -> NewEntry {
        NewEntry {
            entry_type: EntryType::LinkReference,
            ..NewEntry::reference(resource_uri, external_metadata_uri)
        }
    }

    pub(crate) fn with_id(mut self, id: &str) -> NewEntry {
        self.id = Some(id.to_owned());
        self
    }

    pub(crate) fn with_graph_type(mut self, graph_type: GraphType) -> NewEntry {
        self.graph_type = graph_type;
        self
    }

    pub(crate) fn with_resource_type(mut self, resource_type: ResourceType) -> NewEntry {
        self.resource_type = resource_type;
        self
    }

    pub(crate) fn in_list(mut self, list_entry_uri: &str) -> NewEntry {
        self.list = Some(list_entry_uri.to_owned());
        self
    }

    /// Statements of the fresh entry graph.
    pub(crate) fn entry_graph(
        &self,
        codec: &AddressCodec,
        context_id: &str,
        id: &str,
        resource_uri: &str,
        creator: &str,
        now: Timestamp,
    ) -> Vec<Quad> {
        let entry_uri = codec.entry_uri(context_id, id);
        let graph = Term::iri(&entry_uri);
        let fact = |predicate: &str, object: Term| {
            Quad::new(graph.clone(), Term::iri(predicate), object, graph.clone())
        };

        let mut quads = vec![
            fact(vocab::RESOURCE, Term::iri(resource_uri)),
            fact(vocab::DC_CREATED, vocab::timestamp(now)),
            fact(vocab::DC_MODIFIED, vocab::timestamp(now)),
            fact(vocab::RELATION, Term::iri(codec.relation_uri(context_id, id))),
        ];
        if self.entry_type.has_local_metadata() {
            quads.push(fact(vocab::METADATA, Term::iri(codec.metadata_uri(context_id, id))));
        }
        if let Some(external) = &self.external_metadata_uri {
            quads.push(fact(vocab::EXTERNAL_METADATA, Term::iri(external)));
            quads.push(fact(
                vocab::CACHED_EXTERNAL_METADATA,
                Term::iri(codec.cached_metadata_uri(context_id, id)),
            ));
        }
        if let Some(iri) = self.entry_type.iri() {
            quads.push(fact(vocab::RDF_TYPE, Term::iri(iri)));
        }
        if let Some(iri) = self.resource_type.iri() {
            quads.push(fact(vocab::RDF_TYPE, Term::iri(iri)));
        }
        if let Some(iri) = self.graph_type.iri() {
            quads.push(Quad::new(
                Term::iri(resource_uri),
                Term::iri(vocab::RDF_TYPE),
                Term::iri(iri),
                graph.clone(),
            ));
        }
        if !is_system_id(id) {
            quads.push(fact(vocab::DC_CREATOR, Term::iri(creator)));
        }
        quads
    }
}

pub(crate) fn entry_type_quad(entry: &Entry, entry_type: EntryType) -> Option<Quad> {
    entry_type
        .iri()
        .map(|iri| entry.fact(vocab::RDF_TYPE, Term::iri(iri)))
}

pub(crate) fn graph_type_quad(entry: &Entry, graph_type: GraphType) -> Option<Quad> {
    graph_type.iri().map(|iri| {
        Quad::new(
            Term::iri(&entry.resource_uri),
            Term::iri(vocab::RDF_TYPE),
            Term::iri(iri),
            entry.graph(),
        )
    })
}

pub(crate) fn resource_type_quad(entry: &Entry, resource_type: ResourceType) -> Option<Quad> {
    resource_type
        .iri()
        .map(|iri| entry.fact(vocab::RDF_TYPE, Term::iri(iri)))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use jiff::Timestamp;

    use super::{AccessProperty, Entry, EntryType, GraphType, NewEntry, ResourceType};
    use crate::repo::address::AddressCodec;

    const ADMIN: &str = "http://example.org/_principals/resource/_admin";

    #[test]
    fn local_entry_graph_round_trips_through_snapshot() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/")?;
        let resource = codec.resource_uri("1", "5");
        let quads = NewEntry::local(GraphType::List).entry_graph(
            &codec,
            "1",
            "5",
            &resource,
            ADMIN,
            Timestamp::now(),
        );
        let entry = Entry::from_statements(&codec, "1", "5", &quads);
        assert_eq!(entry.entry_type, EntryType::Local);
        assert_eq!(entry.graph_type, GraphType::List);
        assert_eq!(entry.resource_type, ResourceType::InformationResource);
        assert_eq!(entry.resource_uri, resource);
        assert_eq!(entry.creator.as_deref(), Some(ADMIN));
        assert_eq!(entry.local_metadata_uri(), Some("http://example.org/1/metadata/5"));
        assert!(entry.created.is_some());
        assert!(entry.acl.is_empty());
        Ok(())
    }

    #[test]
    fn reference_has_no_local_metadata() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/")?;
        let new = NewEntry::reference("http://elsewhere.org/doc", "http://elsewhere.org/doc.rdf")
            .with_resource_type(ResourceType::NamedResource);
        let quads =
            new.entry_graph(
                &codec,
                "1",
                "_ref",
                "http://elsewhere.org/doc",
                ADMIN,
                Timestamp::now(),
            );
        let entry = Entry::from_statements(&codec, "1", "_ref", &quads);
        assert_eq!(entry.entry_type, EntryType::Reference);
        assert_eq!(entry.resource_type, ResourceType::NamedResource);
        assert_eq!(entry.local_metadata_uri(), None);
        assert_eq!(
            entry.cached_external_metadata_uri.as_deref(),
            Some("http://example.org/1/cached-external-metadata/_ref")
        );
        // system ids carry no creator
        assert_eq!(entry.creator, None);
        Ok(())
    }

    #[test]
    fn acl_statements_use_facet_subjects() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/")?;
        let resource = codec.resource_uri("1", "2");
        let mut quads = NewEntry::local(GraphType::None).entry_graph(
            &codec,
            "1",
            "2",
            &resource,
            ADMIN,
            Timestamp::now(),
        );
        let entry = Entry::from_statements(&codec, "1", "2", &quads);
        quads.push(entry.acl_quad(AccessProperty::ReadMetadata, "urn:guest"));
        quads.push(entry.acl_quad(AccessProperty::Administer, "urn:owner"));
        assert_eq!(quads[quads.len() - 2].subject.value(), entry.metadata_uri);

        let entry = Entry::from_statements(&codec, "1", "2", &quads);
        assert!(entry.acl.allows(AccessProperty::ReadMetadata, "urn:guest"));
        assert!(entry.acl.allows(AccessProperty::Administer, "urn:owner"));
        assert!(!entry.acl.allows(AccessProperty::WriteMetadata, "urn:owner"));
        Ok(())
    }
}
