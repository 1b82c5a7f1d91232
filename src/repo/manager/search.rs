use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use quads::Pattern;
use tracing::{debug, warn};

use super::ContextManager;
use crate::repo::entry::{AccessProperty, Entry};
use crate::repo::error::is_unauthorized;
use crate::repo::vocab::iri;

/// Which union of graphs a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryDataset {
    /// Local and cached external metadata graphs.
    Metadata,
    /// Entry information graphs.
    Entries,
}

/// Evaluates a query and returns the IRIs it selects: metadata graph IRIs
/// for [`QueryDataset::Metadata`], entry IRIs for [`QueryDataset::Entries`].
pub(crate) trait QueryEngine: Send + Sync {
    fn select_iris(&self, query: &str, dataset: QueryDataset) -> Result<Vec<String>>;
}

impl ContextManager {
    fn readable(&self, entry: &Entry) -> Result<bool> {
        match self
            .backend
            .auth
            .check_authorized(entry, AccessProperty::ReadMetadata)
        {
            Ok(()) => Ok(true),
            Err(error) if is_unauthorized(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Entry URIs selected by one half of a search. A failing half is
    /// logged and counts as no hits.
    fn query_half(&self, query: &str, dataset: QueryDataset) -> BTreeSet<String> {
        let Some(engine) = &self.queries else {
            warn!(target: "search", ?dataset, "no query engine configured");
            return BTreeSet::new();
        };
        match engine.select_iris(query, dataset) {
            Ok(iris) => iris
                .iter()
                .filter_map(|uri| self.backend.codec.entry_uri_of(uri))
                .collect(),
            Err(error) => {
                warn!(target: "search", ?dataset, %error, "query failed");
                BTreeSet::new()
            }
        }
    }

    /// Entries matching an entry-graph query and/or a metadata query. With
    /// both, only entries selected by each are returned. `contexts` holds
    /// context resource URIs limiting the result.
    pub(crate) fn search(
        &self,
        entry_query: Option<&str>,
        metadata_query: Option<&str>,
        contexts: &[String],
    ) -> Result<Vec<Arc<Entry>>> {
        let entries = entry_query.map(|q| self.query_half(q, QueryDataset::Entries));
        let metadata = metadata_query.map(|q| self.query_half(q, QueryDataset::Metadata));
        let hits = match (entries, metadata) {
            (Some(entries), Some(metadata)) => entries.intersection(&metadata).cloned().collect(),
            (Some(hits), None) | (None, Some(hits)) => hits,
            (None, None) => BTreeSet::new(),
        };

        let mut found = vec![];
        for uri in hits {
            let Some(entry) = self.backend.entry_by_uri(&uri)? else {
                continue;
            };
            if !self.in_scope(&entry, contexts) || !self.readable(&entry)? {
                continue;
            }
            found.push(entry);
        }
        debug!(target: "search", found = found.len(), "search");
        Ok(found)
    }

    fn in_scope(&self, entry: &Entry, contexts: &[String]) -> bool {
        contexts.is_empty()
            || contexts
                .iter()
                .any(|c| self.context_id_of(c).as_deref() == Some(entry.context_id.as_str()))
    }

    /// Ranks entries by how many of `terms` occur, case-insensitively, in
    /// their literals of the given predicates. Scores add up across
    /// matching statements; ties are ordered by entry URI.
    pub(crate) fn search_literals(
        &self,
        predicates: &[String],
        terms: &[String],
        lang: Option<&str>,
        contexts: &[String],
        match_all: bool,
    ) -> Result<Vec<(Arc<Entry>, usize)>> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(vec![]);
        }
        let namespaces: Vec<String> = contexts
            .iter()
            .filter_map(|c| self.context_id_of(c))
            .map(|id| self.backend.codec.context_namespace(&id))
            .collect();

        let mut per_graph: HashMap<String, usize> = HashMap::new();
        for predicate in predicates {
            for quad in self
                .backend
                .quads
                .quads(&Pattern::any().predicate(iri(predicate)))?
            {
                let Some(literal) = quad.object.as_literal() else {
                    continue;
                };
                if let Some(lang) = lang {
                    if !literal
                        .lang
                        .as_deref()
                        .is_some_and(|l| l.eq_ignore_ascii_case(lang))
                    {
                        continue;
                    }
                }
                let Some(graph) = quad.graph.as_iri() else {
                    continue;
                };
                if !contexts.is_empty() && !namespaces.iter().any(|ns| graph.starts_with(ns)) {
                    continue;
                }
                let value = literal.value.to_lowercase();
                let hits = terms.iter().filter(|t| value.contains(t.as_str())).count();
                if hits == 0 || (match_all && hits < terms.len()) {
                    continue;
                }
                *per_graph.entry(graph.to_owned()).or_default() += hits;
            }
        }

        let mut per_entry: HashMap<String, (Arc<Entry>, usize)> = HashMap::new();
        for (graph, score) in per_graph {
            let Some(entry) = self.backend.entry_owning(&graph)? else {
                continue;
            };
            per_entry
                .entry(entry.entry_uri.clone())
                .or_insert((entry, 0))
                .1 += score;
        }
        let mut ranked = vec![];
        for (entry, score) in per_entry.into_values() {
            if self.readable(&entry)? {
                ranked.push((entry, score));
            }
        }
        ranked.sort_by(|(a, x), (b, y)| {
            y.cmp(x)
                .then_with(|| a.entry_uri.to_lowercase().cmp(&b.entry_uri.to_lowercase()))
        });
        debug!(target: "search", terms = terms.len(), found = ranked.len(), "literal search");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{Result, bail};
    use quads::{Term, Triple};

    use super::{QueryDataset, QueryEngine};
    use crate::repo::entry::{GraphType, NewEntry};
    use crate::repo::manager::ContextManager;
    use crate::repo::testing;
    use crate::repo::vocab::{self, iri};

    /// Answers entry queries with fixed IRIs and fails metadata queries
    /// named "broken".
    struct Canned {
        entries: Vec<String>,
        metadata: Vec<String>,
    }

    impl QueryEngine for Canned {
        fn select_iris(&self, query: &str, dataset: QueryDataset) -> Result<Vec<String>> {
            if query == "broken" {
                bail!("query engine down");
            }
            Ok(match dataset {
                QueryDataset::Entries => self.entries.clone(),
                QueryDataset::Metadata => self.metadata.clone(),
            })
        }
    }

    fn titled(
        context: &crate::repo::context::Context,
        text: &str,
        lang: Option<&str>,
    ) -> Result<Arc<crate::repo::entry::Entry>> {
        let entry = context.create(NewEntry::local(GraphType::None))?;
        let literal = match lang {
            Some(lang) => Term::lang_literal(text, lang),
            None => Term::literal(text),
        };
        context.set_metadata(
            &entry,
            &[Triple::new(iri(&entry.resource_uri), iri(vocab::DC_TITLE), literal)],
        )
    }

    #[test]
    fn search_intersects_and_degrades() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let context = repo.manager.create_context(None)?;
        let a = titled(&context, "a", None)?;
        let b = titled(&context, "b", None)?;
        let c = titled(&context, "c", None)?;
        let engine = Canned {
            entries: vec![a.entry_uri.clone(), b.entry_uri.clone()],
            metadata: vec![b.metadata_uri.clone(), c.metadata_uri.clone()],
        };
        let manager = ContextManager::new(repo.manager.backend().clone())
            .with_query_engine(Arc::new(engine));

        let uris = |found: Vec<Arc<crate::repo::entry::Entry>>| {
            found.into_iter().map(|e| e.entry_uri.clone()).collect::<Vec<_>>()
        };
        assert_eq!(uris(manager.search(Some("q"), Some("q"), &[])?), vec![b.entry_uri.clone()]);
        assert_eq!(uris(manager.search(None, Some("q"), &[])?).len(), 2);
        assert!(manager.search(Some("q"), Some("broken"), &[])?.is_empty());
        assert_eq!(uris(manager.search(Some("q"), None, &[])?).len(), 2);
        assert!(manager.search(Some("broken"), None, &[])?.is_empty());

        let other = manager.create_context(None)?;
        assert!(manager.search(Some("q"), None, &[other.uri().to_owned()])?.is_empty());
        assert_eq!(manager.search(Some("q"), None, &[context.uri().to_owned()])?.len(), 2);
        Ok(())
    }

    #[test]
    fn search_literals_ranks_and_filters() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let context = manager.create_context(None)?;
        let both = titled(&context, "Rust Storage Engines", Some("en"))?;
        let one = titled(&context, "Storage units", Some("en"))?;
        let german = titled(&context, "Rust und Speicher", Some("de"))?;
        let predicates = vec![vocab::DC_TITLE.to_owned()];
        let terms = vec!["rust".to_owned(), "STORAGE".to_owned()];

        let ranked = manager.search_literals(&predicates, &terms, None, &[], false)?;
        let ranked: Vec<_> = ranked.into_iter().map(|(e, s)| (e.entry_uri.clone(), s)).collect();
        assert_eq!(ranked[0], (both.entry_uri.clone(), 2));
        assert_eq!(ranked.len(), 3);
        // equal scores fall back to URI order
        let mut tied = vec![one.entry_uri.clone(), german.entry_uri.clone()];
        tied.sort_by_key(|u| u.to_lowercase());
        assert_eq!(vec![ranked[1].0.clone(), ranked[2].0.clone()], tied);

        let all = manager.search_literals(&predicates, &terms, None, &[], true)?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.entry_uri, both.entry_uri);

        let de = manager.search_literals(&predicates, &terms, Some("DE"), &[], false)?;
        assert_eq!(de.len(), 1);
        assert_eq!(de[0].0.entry_uri, german.entry_uri);

        let other = manager.create_context(None)?;
        assert!(manager
            .search_literals(&predicates, &terms, None, &[other.uri().to_owned()], false)?
            .is_empty());

        repo.auth
            .set_principal("http://example.org/store/_principals/resource/_guest");
        assert!(manager.search_literals(&predicates, &terms, None, &[], false)?.is_empty());
        Ok(())
    }
}
