//! IRIs of the repository vocabulary and the few external vocabularies the
//! entry graphs use.

use quads::Term;

macro_rules! es {
    ($name:literal) => {
        concat!("http://entrystore.org/terms/", $name)
    };
}

macro_rules! rdf {
    ($name:literal) => {
        concat!("http://www.w3.org/1999/02/22-rdf-syntax-ns#", $name)
    };
}

macro_rules! dcterms {
    ($name:literal) => {
        concat!("http://purl.org/dc/terms/", $name)
    };
}

macro_rules! xsd {
    ($name:literal) => {
        concat!("http://www.w3.org/2001/XMLSchema#", $name)
    };
}

macro_rules! prov {
    ($name:literal) => {
        concat!("http://www.w3.org/ns/prov#", $name)
    };
}

pub(crate) const NS: &str = es!("");

// entry graph bookkeeping
pub(crate) const RESOURCE: &str = es!("resource");
pub(crate) const METADATA: &str = es!("metadata");
pub(crate) const EXTERNAL_METADATA: &str = es!("externalMetadata");
pub(crate) const CACHED_EXTERNAL_METADATA: &str = es!("cachedExternalMetadata");
pub(crate) const CACHED: &str = es!("cached");
pub(crate) const RELATION: &str = es!("relation");
pub(crate) const REFERRED_IN: &str = es!("referredIn");

// access control
pub(crate) const READ: &str = es!("read");
pub(crate) const WRITE: &str = es!("write");

// context graph bookkeeping
pub(crate) const COUNTER: &str = es!("counter");
pub(crate) const RES_HAS_ENTRY: &str = es!("resHasEntry");
pub(crate) const MD_HAS_ENTRY: &str = es!("mdHasEntry");
pub(crate) const ALIAS: &str = es!("alias");
pub(crate) const DELETED: &str = es!("deleted");
pub(crate) const DELETED_BY: &str = es!("deletedBy");
pub(crate) const HAS_QUOTA: &str = es!("hasQuota");
pub(crate) const HAS_QUOTA_FILL_LEVEL: &str = es!("hasQuotaFillLevel");

// entry types
pub(crate) const LINK: &str = es!("Link");
pub(crate) const REFERENCE: &str = es!("Reference");
pub(crate) const LINK_REFERENCE: &str = es!("LinkReference");

// graph types
pub(crate) const LIST: &str = es!("List");
pub(crate) const RESULT_LIST: &str = es!("ResultList");
pub(crate) const GRAPH: &str = es!("Graph");
pub(crate) const STRING: &str = es!("String");
pub(crate) const CONTEXT: &str = es!("Context");
pub(crate) const SYSTEM_CONTEXT: &str = es!("SystemContext");
pub(crate) const USER: &str = es!("User");
pub(crate) const GROUP: &str = es!("Group");
pub(crate) const PIPELINE: &str = es!("Pipeline");
pub(crate) const PIPELINE_RESULT: &str = es!("PipelineResult");

// resource types
pub(crate) const NAMED_RESOURCE: &str = es!("NamedResource");
pub(crate) const UNKNOWN_RESOURCE: &str = es!("Unknown");

pub(crate) const RDF_TYPE: &str = rdf!("type");
pub(crate) const RDF_VALUE: &str = rdf!("value");
pub(crate) const RDF_SEQ: &str = rdf!("Seq");
pub(crate) const RDF_MEMBER_PREFIX: &str = rdf!("_");

pub(crate) const DC_CREATED: &str = dcterms!("created");
pub(crate) const DC_MODIFIED: &str = dcterms!("modified");
pub(crate) const DC_CREATOR: &str = dcterms!("creator");
pub(crate) const DC_CONTRIBUTOR: &str = dcterms!("contributor");
pub(crate) const DC_TITLE: &str = dcterms!("title");

pub(crate) const XSD_DATETIME: &str = xsd!("dateTime");
pub(crate) const XSD_LONG: &str = xsd!("long");
pub(crate) const XSD_STRING: &str = xsd!("string");

pub(crate) const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";
pub(crate) const PROV_WAS_REVISION_OF: &str = prov!("wasRevisionOf");
pub(crate) const PROV_WAS_ATTRIBUTED_TO: &str = prov!("wasAttributedTo");
pub(crate) const PROV_GENERATED_AT_TIME: &str = prov!("generatedAtTime");

/// Predicates whose objects are principal URIs.
pub(crate) const PRINCIPAL_PREDICATES: [&str; 5] =
    [DC_CREATOR, DC_CONTRIBUTOR, READ, WRITE, DELETED_BY];

pub(crate) fn iri(iri: &str) -> Term {
    Term::iri(iri)
}

pub(crate) fn long(value: u64) -> Term {
    Term::typed_literal(value.to_string(), XSD_LONG)
}

pub(crate) fn timestamp(ts: jiff::Timestamp) -> Term {
    Term::typed_literal(ts.to_string(), XSD_DATETIME)
}

pub(crate) fn parse_long(term: &Term) -> Option<u64> {
    term.as_literal()?.value.parse().ok()
}

pub(crate) fn parse_timestamp(term: &Term) -> Option<jiff::Timestamp> {
    term.as_literal()?.value.parse().ok()
}

pub(crate) fn is_principal_predicate(predicate: &str) -> bool {
    PRINCIPAL_PREDICATES.contains(&predicate)
}
