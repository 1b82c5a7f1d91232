//! The only place that knows how entry, metadata, resource and relation URIs
//! are laid out under the repository base URL.

use anyhow::{Result, bail};

pub(crate) const SYSTEM_CONTEXTS_ID: &str = "_contexts";
pub(crate) const PRINCIPALS_ID: &str = "_principals";
pub(crate) const BACKUP_ID: &str = "_backup";
pub(crate) const ALL_ID: &str = "_all";
pub(crate) const TOP_ID: &str = "_top";
pub(crate) const GUEST_ID: &str = "_guest";
pub(crate) const ADMIN_ID: &str = "_admin";

/// Ids starting with `_` are reserved for entries the repository maintains.
pub(crate) fn is_system_id(id: &str) -> bool {
    id.starts_with('_')
}

/// Role of a named graph with respect to its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Facet {
    Entry,
    Metadata,
    Resource,
    Relation,
    CachedExternalMetadata,
}

impl Facet {
    pub(crate) const ALL: [Facet; 5] = [
        Facet::Entry,
        Facet::Metadata,
        Facet::Resource,
        Facet::Relation,
        Facet::CachedExternalMetadata,
    ];

    pub(crate) fn segment(self) -> &'static str {
        match self {
            Facet::Entry => "entry",
            Facet::Metadata => "metadata",
            Facet::Resource => "resource",
            Facet::Relation => "relation",
            Facet::CachedExternalMetadata => "cached-external-metadata",
        }
    }

    fn from_segment(segment: &str) -> Option<Facet> {
        Facet::ALL.into_iter().find(|f| f.segment() == segment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Address {
    pub(crate) context_id: String,
    pub(crate) facet: Facet,
    pub(crate) id: String,
}

impl Address {
    pub(crate) fn new(context_id: &str, facet: Facet, id: &str) -> Address {
        Address {
            context_id: context_id.to_owned(),
            facet,
            id: id.to_owned(),
        }
    }

    /// True for the resource URI of a context, `{base}{contextId}`.
    pub(crate) fn is_context(&self) -> bool {
        self.context_id == SYSTEM_CONTEXTS_ID && self.facet == Facet::Resource
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace())
}

#[derive(Debug, Clone)]
pub(crate) struct AddressCodec {
    base: String,
}

impl AddressCodec {
    pub(crate) fn new(base_url: &str) -> Result<AddressCodec> {
        if !base_url.contains("://") {
            bail!("base url {base_url:?} is not absolute");
        }
        let mut base = base_url.to_owned();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(AddressCodec { base })
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn is_local(&self, uri: &str) -> bool {
        uri.starts_with(&self.base)
    }

    pub(crate) fn fabricate(&self, context_id: &str, facet: Facet, id: &str) -> String {
        format!("{}{}/{}/{}", self.base, context_id, facet.segment(), id)
    }

    pub(crate) fn uri(&self, address: &Address) -> String {
        self.fabricate(&address.context_id, address.facet, &address.id)
    }

    pub(crate) fn entry_uri(&self, context_id: &str, id: &str) -> String {
        self.fabricate(context_id, Facet::Entry, id)
    }

    pub(crate) fn metadata_uri(&self, context_id: &str, id: &str) -> String {
        self.fabricate(context_id, Facet::Metadata, id)
    }

    pub(crate) fn relation_uri(&self, context_id: &str, id: &str) -> String {
        self.fabricate(context_id, Facet::Relation, id)
    }

    pub(crate) fn cached_metadata_uri(&self, context_id: &str, id: &str) -> String {
        self.fabricate(context_id, Facet::CachedExternalMetadata, id)
    }

    pub(crate) fn resource_uri(&self, context_id: &str, id: &str) -> String {
        self.fabricate(context_id, Facet::Resource, id)
    }

    /// Resource URI of a context, which is also the name of its graph.
    pub(crate) fn context_uri(&self, context_id: &str) -> String {
        format!("{}{}", self.base, context_id)
    }

    /// Every graph owned by entries of the context starts with this prefix.
    pub(crate) fn context_namespace(&self, context_id: &str) -> String {
        format!("{}{}/", self.base, context_id)
    }

    pub(crate) fn context_entry_uri(&self, context_id: &str) -> String {
        self.entry_uri(SYSTEM_CONTEXTS_ID, context_id)
    }

    /// Resolves any URI under the base. Foreign or malformed URIs give `None`.
    pub(crate) fn parse(&self, uri: &str) -> Option<Address> {
        let rest = uri.strip_prefix(&self.base)?;
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [id] if is_valid_segment(id) => {
                Some(Address::new(SYSTEM_CONTEXTS_ID, Facet::Resource, id))
            }
            [context_id, facet, id] if is_valid_segment(context_id) && is_valid_segment(id) => {
                Some(Address::new(context_id, Facet::from_segment(facet)?, id))
            }
            _ => None,
        }
    }

    /// Entry URI of whatever entry owns `uri`.
    pub(crate) fn entry_uri_of(&self, uri: &str) -> Option<String> {
        let address = self.parse(uri)?;
        Some(self.entry_uri(&address.context_id, &address.id))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{Address, AddressCodec, Facet, SYSTEM_CONTEXTS_ID};

    #[test]
    fn fabricate_then_parse() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/store")?;
        for facet in Facet::ALL {
            for (context_id, id) in [("1", "7"), ("_principals", "_admin"), ("abc", "x-1")] {
                let uri = codec.fabricate(context_id, facet, id);
                assert_eq!(codec.parse(&uri), Some(Address::new(context_id, facet, id)));
            }
        }
        Ok(())
    }

    #[test]
    fn context_uri_is_a_resource_of_the_system_contexts() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/store/")?;
        let uri = codec.context_uri("42");
        assert_eq!(uri, "http://example.org/store/42");
        let address = codec.parse(&uri).unwrap();
        assert!(address.is_context());
        assert_eq!(address, Address::new(SYSTEM_CONTEXTS_ID, Facet::Resource, "42"));
        assert_eq!(
            codec.entry_uri_of(&uri).as_deref(),
            Some("http://example.org/store/_contexts/entry/42")
        );
        Ok(())
    }

    #[test]
    fn foreign_and_malformed_uris_are_unknown() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/store/")?;
        assert_eq!(codec.parse("http://other.org/1/entry/2"), None);
        assert_eq!(codec.parse("http://example.org/store/"), None);
        assert_eq!(codec.parse("http://example.org/store/1/bogus/2"), None);
        assert_eq!(codec.parse("http://example.org/store/1/entry/"), None);
        assert_eq!(codec.parse("http://example.org/store/1/entry/2/3"), None);
        assert_eq!(codec.parse("http://example.org/store/1/metadata/2?rev=1"), None);
        assert!(AddressCodec::new("not a url").is_err());
        Ok(())
    }
}
