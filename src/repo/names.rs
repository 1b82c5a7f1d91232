//! Per-context name index: `entry es:alias "name"` statements in the context
//! graph, mirrored in a bidirectional map loaded on first use.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use bimap::BiMap;
use quads::{Pattern, Quad, QuadStore, Term, Transaction};

use super::vocab::{self, iri};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    Changed,
    Unchanged,
    /// The name already belongs to another entry.
    Conflict,
}

pub(crate) struct NameIndex {
    graph: Term,
    names: RwLock<Option<BiMap<String, String>>>,
}

impl NameIndex {
    pub(crate) fn new(context_uri: &str) -> NameIndex {
        NameIndex {
            graph: iri(context_uri),
            names: RwLock::new(None),
        }
    }

    fn with_names<R>(
        &self,
        quads: &QuadStore,
        f: impl FnOnce(&BiMap<String, String>) -> R,
    ) -> Result<R> {
        {
            let guard = self.names.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(names) = guard.as_ref() {
                return Ok(f(names));
            }
        }
        // loaded under the write guard so a concurrent `bound` lands on the
        // installed map
        let mut guard = self.names.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let pattern = Pattern::any()
                .predicate(iri(vocab::ALIAS))
                .graph(self.graph.clone());
            let mut loaded = BiMap::new();
            for quad in quads.quads(&pattern)? {
                if let (Some(uri), Some(name)) = (quad.subject.as_iri(), quad.object.as_literal()) {
                    loaded.insert(name.value.clone(), uri.to_owned());
                }
            }
            *guard = Some(loaded);
        }
        Ok(f(guard.get_or_insert_with(BiMap::new)))
    }

    pub(crate) fn name_of(&self, quads: &QuadStore, entry_uri: &str) -> Result<Option<String>> {
        self.with_names(quads, |names| names.get_by_right(entry_uri).cloned())
    }

    pub(crate) fn uri_of(&self, quads: &QuadStore, name: &str) -> Result<Option<String>> {
        self.with_names(quads, |names| names.get_by_left(name).cloned())
    }

    /// All `(name, entry uri)` pairs.
    pub(crate) fn names(&self, quads: &QuadStore) -> Result<Vec<(String, String)>> {
        self.with_names(quads, |names| {
            let mut all: Vec<_> = names.iter().map(|(n, u)| (n.clone(), u.clone())).collect();
            all.sort();
            all
        })
    }

    /// Stages the binding inside `tx`. The owner of a name is read through
    /// `tx`, which holds the store lock, never from the in-memory map.
    /// Call [`NameIndex::bound`] once the transaction commits.
    pub(crate) fn bind(
        &self,
        tx: &mut Transaction<'_>,
        entry_uri: &str,
        name: &str,
    ) -> Result<Binding> {
        let owners = tx.quads(
            &Pattern::any()
                .predicate(iri(vocab::ALIAS))
                .object(Term::literal(name))
                .graph(self.graph.clone()),
        )?;
        if owners.iter().any(|q| q.subject.as_iri() != Some(entry_uri)) {
            return Ok(Binding::Conflict);
        }
        if !owners.is_empty() {
            return Ok(Binding::Unchanged);
        }
        tx.remove_matching(
            &Pattern::any()
                .subject(iri(entry_uri))
                .predicate(iri(vocab::ALIAS))
                .graph(self.graph.clone()),
        )?;
        tx.insert(&Quad::new(
            iri(entry_uri),
            iri(vocab::ALIAS),
            Term::literal(name),
            self.graph.clone(),
        ))?;
        Ok(Binding::Changed)
    }

    pub(crate) fn bound(&self, entry_uri: &str, name: &str) {
        let mut guard = self.names.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(names) = guard.as_mut() {
            names.insert(name.to_owned(), entry_uri.to_owned());
        }
    }

    pub(crate) fn forget(&self, entry_uri: &str) {
        let mut guard = self.names.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(names) = guard.as_mut() {
            names.remove_by_right(entry_uri);
        }
    }

    /// Drops the in-memory map; the next lookup reloads it from the store.
    pub(crate) fn reset(&self) {
        *self.names.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use quads::QuadStore;

    use super::{Binding, NameIndex};

    #[test]
    fn bind_conflict_and_rename() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(dir.path()).temporary(true).open()?;
        let store = QuadStore::open(keyspace)?;
        let index = NameIndex::new("http://example.org/1");
        let a = "http://example.org/1/entry/a";
        let b = "http://example.org/1/entry/b";

        let mut tx = store.begin()?;
        assert_eq!(index.bind(&mut tx, a, "home")?, Binding::Changed);
        tx.commit()?;
        index.bound(a, "home");

        let mut tx = store.begin()?;
        assert_eq!(index.bind(&mut tx, b, "home")?, Binding::Conflict);
        assert_eq!(index.bind(&mut tx, a, "home")?, Binding::Unchanged);
        assert_eq!(index.bind(&mut tx, a, "away")?, Binding::Changed);
        tx.commit()?;
        index.bound(a, "away");

        assert_eq!(index.uri_of(&store, "home")?, None);
        assert_eq!(index.name_of(&store, a)?.as_deref(), Some("away"));

        // a fresh index sees the same state in the store
        let reloaded = NameIndex::new("http://example.org/1");
        assert_eq!(reloaded.names(&store)?, vec![("away".to_owned(), a.to_owned())]);
        Ok(())
    }

    #[test]
    fn conflicts_are_decided_from_the_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(dir.path()).temporary(true).open()?;
        let store = QuadStore::open(keyspace)?;
        let index = NameIndex::new("http://example.org/1");
        let other = NameIndex::new("http://example.org/1");
        let a = "http://example.org/1/entry/a";
        let b = "http://example.org/1/entry/b";

        // loaded before the binding below, and never told about it
        assert!(index.names(&store)?.is_empty());
        let mut tx = store.begin()?;
        assert_eq!(other.bind(&mut tx, a, "x")?, Binding::Changed);
        tx.commit()?;

        let mut tx = store.begin()?;
        assert_eq!(index.bind(&mut tx, b, "x")?, Binding::Conflict);
        assert_eq!(index.bind(&mut tx, a, "x")?, Binding::Unchanged);
        tx.rollback();

        index.reset();
        assert_eq!(index.uri_of(&store, "x")?.as_deref(), Some(a));
        Ok(())
    }
}
