use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow, bail};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use tracing::debug;

use crate::term::{Pattern, Quad, Term};

type TermId = u64;

const EMPTY: &[u8] = &[];
const ORDERS: [Order; 4] = [Order::Gspo, Order::Spog, Order::Posg, Order::Ospg];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct QuadIds {
    g: TermId,
    s: TermId,
    p: TermId,
    o: TermId,
}

/// Key layout of one covering index.
#[derive(Debug, Clone, Copy)]
enum Order {
    Gspo,
    Spog,
    Posg,
    Ospg,
}

impl Order {
    fn key(self, ids: &QuadIds) -> [u8; 32] {
        let parts = match self {
            Order::Gspo => [ids.g, ids.s, ids.p, ids.o],
            Order::Spog => [ids.s, ids.p, ids.o, ids.g],
            Order::Posg => [ids.p, ids.o, ids.s, ids.g],
            Order::Ospg => [ids.o, ids.s, ids.p, ids.g],
        };
        let mut key = [0u8; 32];
        for (chunk, id) in key.chunks_exact_mut(8).zip(parts) {
            chunk.copy_from_slice(&id.to_be_bytes());
        }
        key
    }

    fn decode(self, key: &[u8]) -> Result<QuadIds> {
        if key.len() != 32 {
            bail!("malformed quad index key of {} bytes", key.len());
        }
        let a = decode_id(&key[0..8])?;
        let b = decode_id(&key[8..16])?;
        let c = decode_id(&key[16..24])?;
        let d = decode_id(&key[24..32])?;
        Ok(match self {
            Order::Gspo => QuadIds { g: a, s: b, p: c, o: d },
            Order::Spog => QuadIds { s: a, p: b, o: c, g: d },
            Order::Posg => QuadIds { p: a, o: b, s: c, g: d },
            Order::Ospg => QuadIds { o: a, s: b, p: c, g: d },
        })
    }
}

fn decode_id(bytes: &[u8]) -> Result<TermId> {
    let bytes: [u8; 8] = bytes.try_into().context("malformed term id")?;
    Ok(u64::from_be_bytes(bytes))
}

#[derive(Debug, Default)]
struct BoundIds {
    g: Option<TermId>,
    s: Option<TermId>,
    p: Option<TermId>,
    o: Option<TermId>,
}

impl BoundIds {
    fn matches(&self, ids: &QuadIds) -> bool {
        self.g.is_none_or(|g| g == ids.g)
            && self.s.is_none_or(|s| s == ids.s)
            && self.p.is_none_or(|p| p == ids.p)
            && self.o.is_none_or(|o| o == ids.o)
    }

    /// Picks the index whose leading positions are bound, and the prefix to
    /// seek with.
    fn plan(&self) -> (Order, Vec<u8>) {
        let (order, leading) = if let Some(g) = self.g {
            (Order::Gspo, leading_ids(g, &[self.s, self.p, self.o]))
        } else if let Some(s) = self.s {
            (Order::Spog, leading_ids(s, &[self.p, self.o]))
        } else if let Some(p) = self.p {
            (Order::Posg, leading_ids(p, &[self.o]))
        } else if let Some(o) = self.o {
            (Order::Ospg, vec![o])
        } else {
            (Order::Gspo, vec![])
        };
        let prefix = leading.iter().flat_map(|id| id.to_be_bytes()).collect();
        (order, prefix)
    }
}

fn leading_ids(first: TermId, rest: &[Option<TermId>]) -> Vec<TermId> {
    let mut ids = vec![first];
    ids.extend(rest.iter().map_while(|id| *id));
    ids
}

/// Quads partitioned into named graphs, stored as four covering indexes over
/// a term dictionary.
#[derive(Clone)]
pub struct QuadStore {
    keyspace: Keyspace,
    terms: PartitionHandle,
    term_ids: PartitionHandle,
    gspo: PartitionHandle,
    spog: PartitionHandle,
    posg: PartitionHandle,
    ospg: PartitionHandle,
    next_id: Arc<AtomicU64>,
    write_lock: Arc<Mutex<()>>,
}

impl QuadStore {
    pub fn open(keyspace: Keyspace) -> Result<QuadStore> {
        let terms = keyspace.open_partition("quad_terms", PartitionCreateOptions::default())?;
        let term_ids = keyspace.open_partition("quad_term_ids", PartitionCreateOptions::default())?;
        let gspo = keyspace.open_partition("quad_gspo", PartitionCreateOptions::default())?;
        let spog = keyspace.open_partition("quad_spog", PartitionCreateOptions::default())?;
        let posg = keyspace.open_partition("quad_posg", PartitionCreateOptions::default())?;
        let ospg = keyspace.open_partition("quad_ospg", PartitionCreateOptions::default())?;

        let next_id = match terms.last_key_value()? {
            Some((key, _)) => decode_id(&key)? + 1,
            None => 1,
        };
        debug!(target: "quads", next_id, "opened quad store");

        Ok(QuadStore {
            keyspace,
            terms,
            term_ids,
            gspo,
            spog,
            posg,
            ospg,
            next_id: Arc::new(AtomicU64::new(next_id)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Opens a write transaction. Blocks until no other transaction is open.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Transaction {
            store: self,
            _guard: guard,
            new_terms: HashMap::new(),
            pending: BTreeMap::new(),
            finished: false,
        })
    }

    pub fn quads(&self, pattern: &Pattern) -> Result<Vec<Quad>> {
        let Some(bound) = self.bind(pattern, |term| self.term_id(term))? else {
            return Ok(vec![]);
        };
        let mut resolved = HashMap::new();
        self.scan(&bound)?
            .iter()
            .map(|ids| self.resolve(ids, &mut resolved))
            .collect()
    }

    pub fn count(&self, pattern: &Pattern) -> Result<usize> {
        match self.bind(pattern, |term| self.term_id(term))? {
            Some(bound) => Ok(self.scan(&bound)?.len()),
            None => Ok(0),
        }
    }

    pub fn contains(&self, quad: &Quad) -> Result<bool> {
        match self.quad_ids(quad, |term| self.term_id(term))? {
            Some(ids) => Ok(self.gspo.contains_key(Order::Gspo.key(&ids))?),
            None => Ok(false),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.gspo
            .is_empty()
            .context("unable to read from quad index")
    }

    /// Distinct named graphs, found by seeking from one graph id to the next.
    pub fn graphs(&self) -> Result<Vec<Term>> {
        let mut graphs = vec![];
        let mut from: TermId = 0;
        while let Some(item) = self.gspo.range(from.to_be_bytes()..).next() {
            let (key, _) = item?;
            let ids = Order::Gspo.decode(&key)?;
            graphs.push(self.term(ids.g)?);
            match ids.g.checked_add(1) {
                Some(next) => from = next,
                None => break,
            }
        }
        Ok(graphs)
    }

    pub fn graphs_with_prefix(&self, prefix: &str) -> Result<Vec<Term>> {
        Ok(self
            .graphs()?
            .into_iter()
            .filter(|g| g.as_iri().is_some_and(|iri| iri.starts_with(prefix)))
            .collect())
    }

    fn index(&self, order: Order) -> &PartitionHandle {
        match order {
            Order::Gspo => &self.gspo,
            Order::Spog => &self.spog,
            Order::Posg => &self.posg,
            Order::Ospg => &self.ospg,
        }
    }

    fn term_id(&self, term: &Term) -> Result<Option<TermId>> {
        match self.term_ids.get(term.to_bytes()?)? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    fn term(&self, id: TermId) -> Result<Term> {
        let bytes = self
            .terms
            .get(id.to_be_bytes())?
            .ok_or_else(|| anyhow!("dangling term id {id}"))?;
        Term::from_bytes(&bytes)
    }

    /// Resolves bound positions to ids. `None` when a bound term is unknown,
    /// in which case nothing can match.
    fn bind(
        &self,
        pattern: &Pattern,
        lookup: impl Fn(&Term) -> Result<Option<TermId>>,
    ) -> Result<Option<BoundIds>> {
        let mut bound = BoundIds::default();
        for (slot, term) in [
            (&mut bound.g, &pattern.graph),
            (&mut bound.s, &pattern.subject),
            (&mut bound.p, &pattern.predicate),
            (&mut bound.o, &pattern.object),
        ] {
            if let Some(term) = term {
                match lookup(term)? {
                    Some(id) => *slot = Some(id),
                    None => return Ok(None),
                }
            }
        }
        Ok(Some(bound))
    }

    fn quad_ids(
        &self,
        quad: &Quad,
        lookup: impl Fn(&Term) -> Result<Option<TermId>>,
    ) -> Result<Option<QuadIds>> {
        let (Some(g), Some(s), Some(p), Some(o)) = (
            lookup(&quad.graph)?,
            lookup(&quad.subject)?,
            lookup(&quad.predicate)?,
            lookup(&quad.object)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(QuadIds { g, s, p, o }))
    }

    fn scan(&self, bound: &BoundIds) -> Result<Vec<QuadIds>> {
        let (order, prefix) = bound.plan();
        let mut found = vec![];
        for item in self.index(order).prefix(prefix) {
            let (key, _) = item?;
            let ids = order.decode(&key)?;
            if bound.matches(&ids) {
                found.push(ids);
            }
        }
        Ok(found)
    }

    fn resolve(&self, ids: &QuadIds, resolved: &mut HashMap<TermId, Term>) -> Result<Quad> {
        let mut term = |id: TermId| -> Result<Term> {
            if let Some(term) = resolved.get(&id) {
                return Ok(term.clone());
            }
            let term = self.term(id)?;
            resolved.insert(id, term.clone());
            Ok(term)
        };
        Ok(Quad {
            subject: term(ids.s)?,
            predicate: term(ids.p)?,
            object: term(ids.o)?,
            graph: term(ids.g)?,
        })
    }
}

enum Pending {
    Insert(Quad),
    Remove,
}

/// Buffered writes over a consistent view of the store.
///
/// Holds the store write lock until committed or dropped. Dropping without
/// commit discards every buffered write.
pub struct Transaction<'a> {
    store: &'a QuadStore,
    _guard: MutexGuard<'a, ()>,
    new_terms: HashMap<Term, TermId>,
    pending: BTreeMap<QuadIds, Pending>,
    finished: bool,
}

impl Transaction<'_> {
    /// Adds `quad`; returns false when it is already present.
    pub fn insert(&mut self, quad: &Quad) -> Result<bool> {
        let ids = QuadIds {
            g: self.intern(&quad.graph)?,
            s: self.intern(&quad.subject)?,
            p: self.intern(&quad.predicate)?,
            o: self.intern(&quad.object)?,
        };
        if self.exists(&ids)? {
            return Ok(false);
        }
        self.pending.insert(ids, Pending::Insert(quad.clone()));
        Ok(true)
    }

    /// Removes `quad`; returns false when it was not present.
    pub fn remove(&mut self, quad: &Quad) -> Result<bool> {
        let Some(ids) = self.store.quad_ids(quad, |term| self.lookup(term))? else {
            return Ok(false);
        };
        if !self.exists(&ids)? {
            return Ok(false);
        }
        if self.store.gspo.contains_key(Order::Gspo.key(&ids))? {
            self.pending.insert(ids, Pending::Remove);
        } else {
            self.pending.remove(&ids);
        }
        Ok(true)
    }

    pub fn remove_matching(&mut self, pattern: &Pattern) -> Result<usize> {
        let quads = self.quads(pattern)?;
        for quad in &quads {
            self.remove(quad)?;
        }
        Ok(quads.len())
    }

    pub fn clear_graph(&mut self, graph: &Term) -> Result<usize> {
        self.remove_matching(&Pattern::any().graph(graph.clone()))
    }

    pub fn contains(&self, quad: &Quad) -> Result<bool> {
        match self.store.quad_ids(quad, |term| self.lookup(term))? {
            Some(ids) => self.exists(&ids),
            None => Ok(false),
        }
    }

    /// Matching quads including the writes buffered so far.
    pub fn quads(&self, pattern: &Pattern) -> Result<Vec<Quad>> {
        let mut found = vec![];
        if let Some(bound) = self.store.bind(pattern, |term| self.lookup(term))? {
            let mut resolved = HashMap::new();
            for ids in self.store.scan(&bound)? {
                if self.pending.contains_key(&ids) {
                    continue;
                }
                found.push(self.store.resolve(&ids, &mut resolved)?);
            }
        }
        for pending in self.pending.values() {
            if let Pending::Insert(quad) = pending {
                if pattern.matches(quad) {
                    found.push(quad.clone());
                }
            }
        }
        Ok(found)
    }

    /// Named graphs under `prefix` that still hold a quad once the buffered
    /// writes apply.
    pub fn graphs_with_prefix(&self, prefix: &str) -> Result<Vec<Term>> {
        let mut candidates = self.store.graphs_with_prefix(prefix)?;
        for pending in self.pending.values() {
            if let Pending::Insert(quad) = pending {
                let under = quad.graph.as_iri().is_some_and(|g| g.starts_with(prefix));
                if under && !candidates.contains(&quad.graph) {
                    candidates.push(quad.graph.clone());
                }
            }
        }
        let mut graphs = vec![];
        for graph in candidates {
            if !self.quads(&Pattern::any().graph(graph.clone()))?.is_empty() {
                graphs.push(graph);
            }
        }
        Ok(graphs)
    }

    pub fn commit(mut self) -> Result<()> {
        let store = self.store;
        let mut batch = store.keyspace.batch();
        for (term, id) in &self.new_terms {
            let bytes = term.to_bytes()?;
            batch.insert(&store.terms, id.to_be_bytes(), bytes.clone());
            batch.insert(&store.term_ids, bytes, id.to_be_bytes());
        }
        let (mut inserted, mut removed) = (0usize, 0usize);
        for (ids, pending) in &self.pending {
            match pending {
                Pending::Insert(_) => {
                    for order in ORDERS {
                        batch.insert(store.index(order), order.key(ids), EMPTY);
                    }
                    inserted += 1;
                }
                Pending::Remove => {
                    for order in ORDERS {
                        batch.remove(store.index(order), order.key(ids));
                    }
                    removed += 1;
                }
            }
        }
        batch.commit().context("unable to commit quad batch")?;
        store
            .keyspace
            .persist(PersistMode::SyncAll)
            .context("unable to persist quad store")?;
        self.finished = true;
        debug!(target: "quads", inserted, removed, "committed transaction");
        Ok(())
    }

    pub fn rollback(mut self) {
        self.finished = true;
        debug!(target: "quads", pending = self.pending.len(), "rolled back transaction");
    }

    fn lookup(&self, term: &Term) -> Result<Option<TermId>> {
        if let Some(id) = self.new_terms.get(term) {
            return Ok(Some(*id));
        }
        self.store.term_id(term)
    }

    fn intern(&mut self, term: &Term) -> Result<TermId> {
        if let Some(id) = self.lookup(term)? {
            return Ok(id);
        }
        let id = self.store.next_id.fetch_add(1, Ordering::SeqCst);
        self.new_terms.insert(term.clone(), id);
        Ok(id)
    }

    fn exists(&self, ids: &QuadIds) -> Result<bool> {
        match self.pending.get(ids) {
            Some(Pending::Insert(_)) => Ok(true),
            Some(Pending::Remove) => Ok(false),
            None => Ok(self.store.gspo.contains_key(Order::Gspo.key(ids))?),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.pending.is_empty() {
            debug!(
                target: "quads",
                pending = self.pending.len(),
                "discarding uncommitted transaction"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::QuadStore;
    use crate::{Pattern, Quad, Term};

    fn quad(s: &str, p: &str, o: Term, g: &str) -> Quad {
        Quad::new(Term::iri(s), Term::iri(p), o, Term::iri(g))
    }

    fn open_temporary(dir: &std::path::Path) -> Result<QuadStore> {
        let keyspace = fjall::Config::new(dir).temporary(true).open()?;
        QuadStore::open(keyspace)
    }

    #[test]
    fn insert_then_match_on_every_position() -> Result<()> {
        let dir = tempdir()?;
        let store = open_temporary(dir.path())?;

        let mut tx = store.begin()?;
        assert!(tx.insert(&quad("urn:s1", "urn:p", Term::literal("a"), "urn:g1"))?);
        assert!(tx.insert(&quad("urn:s1", "urn:q", Term::iri("urn:s2"), "urn:g1"))?);
        assert!(tx.insert(&quad("urn:s2", "urn:p", Term::literal("b"), "urn:g2"))?);
        assert!(!tx.insert(&quad("urn:s2", "urn:p", Term::literal("b"), "urn:g2"))?);
        tx.commit()?;

        let by_graph = store.quads(&Pattern::any().graph(Term::iri("urn:g1")))?;
        assert_eq!(by_graph.len(), 2);
        let by_subject = store.quads(&Pattern::any().subject(Term::iri("urn:s2")))?;
        assert_eq!(by_subject.len(), 1);
        let by_predicate = store.quads(&Pattern::any().predicate(Term::iri("urn:p")))?;
        assert_eq!(by_predicate.len(), 2);
        let by_object = store.quads(&Pattern::any().object(Term::iri("urn:s2")))?;
        assert_eq!(by_object[0].subject, Term::iri("urn:s1"));
        let subject_and_object = Pattern::any()
            .subject(Term::iri("urn:s1"))
            .object(Term::literal("a"));
        assert_eq!(store.count(&subject_and_object)?, 1);
        assert_eq!(store.count(&Pattern::any().subject(Term::iri("urn:nope")))?, 0);
        assert_eq!(store.count(&Pattern::any())?, 3);
        Ok(())
    }

    #[test]
    fn graphs_are_enumerated_once() -> Result<()> {
        let dir = tempdir()?;
        let store = open_temporary(dir.path())?;

        let mut tx = store.begin()?;
        for i in 0..5 {
            tx.insert(&quad("urn:s", "urn:p", Term::literal(format!("{i}")), "urn:ctx/1/g"))?;
        }
        tx.insert(&quad("urn:s", "urn:p", Term::literal("x"), "urn:ctx/2/g"))?;
        tx.insert(&quad("urn:s", "urn:p", Term::literal("y"), "urn:other"))?;
        tx.commit()?;

        assert_eq!(store.graphs()?.len(), 3);
        assert_eq!(store.graphs_with_prefix("urn:ctx/")?.len(), 2);

        let mut tx = store.begin()?;
        tx.clear_graph(&Term::iri("urn:ctx/2/g"))?;
        tx.insert(&quad("urn:s", "urn:p", Term::literal("z"), "urn:ctx/3/g"))?;
        assert_eq!(
            tx.graphs_with_prefix("urn:ctx/")?,
            vec![Term::iri("urn:ctx/1/g"), Term::iri("urn:ctx/3/g")]
        );
        Ok(())
    }

    #[test]
    fn dropped_transaction_rolls_back() -> Result<()> {
        let dir = tempdir()?;
        let store = open_temporary(dir.path())?;
        {
            let mut tx = store.begin()?;
            tx.insert(&quad("urn:s", "urn:p", Term::literal("v"), "urn:g"))?;
            assert_eq!(tx.quads(&Pattern::any())?.len(), 1);
        }
        assert!(store.is_empty()?);

        let mut tx = store.begin()?;
        tx.insert(&quad("urn:s", "urn:p", Term::literal("v"), "urn:g"))?;
        tx.rollback();
        assert!(store.is_empty()?);
        Ok(())
    }

    #[test]
    fn transaction_reads_its_own_writes() -> Result<()> {
        let dir = tempdir()?;
        let store = open_temporary(dir.path())?;
        let kept = quad("urn:s", "urn:p", Term::literal("kept"), "urn:g");
        let gone = quad("urn:s", "urn:p", Term::literal("gone"), "urn:g");

        let mut tx = store.begin()?;
        tx.insert(&kept)?;
        tx.insert(&gone)?;
        tx.commit()?;

        let mut tx = store.begin()?;
        assert!(tx.remove(&gone)?);
        assert!(!tx.remove(&gone)?);
        assert!(!tx.contains(&gone)?);
        let added = quad("urn:s", "urn:p", Term::literal("added"), "urn:g");
        tx.insert(&added)?;
        let mut seen = tx.quads(&Pattern::any().graph(Term::iri("urn:g")))?;
        seen.sort();
        assert_eq!(seen, vec![added.clone(), kept.clone()]);
        // committed state is untouched until commit
        assert!(store.contains(&gone)?);
        tx.commit()?;

        assert!(!store.contains(&gone)?);
        assert!(store.contains(&added)?);
        Ok(())
    }

    #[test]
    fn clear_graph_leaves_other_graphs() -> Result<()> {
        let dir = tempdir()?;
        let store = open_temporary(dir.path())?;

        let mut tx = store.begin()?;
        tx.insert(&quad("urn:a", "urn:p", Term::literal("1"), "urn:g1"))?;
        tx.insert(&quad("urn:b", "urn:p", Term::literal("2"), "urn:g1"))?;
        tx.insert(&quad("urn:a", "urn:p", Term::literal("1"), "urn:g2"))?;
        tx.commit()?;

        let mut tx = store.begin()?;
        assert_eq!(tx.clear_graph(&Term::iri("urn:g1"))?, 2);
        tx.commit()?;

        assert_eq!(store.graphs()?, vec![Term::iri("urn:g2")]);
        Ok(())
    }

    #[test]
    fn term_ids_survive_reopen() -> Result<()> {
        let dir = tempdir()?;
        {
            let store = QuadStore::open(fjall::Config::new(dir.path()).open()?)?;
            let mut tx = store.begin()?;
            tx.insert(&quad("urn:s", "urn:p", Term::literal("before"), "urn:g"))?;
            tx.commit()?;
        }
        let store = QuadStore::open(fjall::Config::new(dir.path()).open()?)?;
        let mut tx = store.begin()?;
        tx.insert(&quad("urn:s2", "urn:p2", Term::literal("after"), "urn:g"))?;
        tx.commit()?;

        let mut all = store.quads(&Pattern::any())?;
        all.sort();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].object, Term::literal("before"));
        assert_eq!(all[1].object, Term::literal("after"));
        Ok(())
    }

    #[test]
    fn concurrent_writers_are_serialized() -> Result<()> {
        let dir = tempdir()?;
        let store = open_temporary(dir.path())?;

        let mut handles = vec![];
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let mut tx = store.begin().unwrap();
                // every writer interns the same shared terms
                tx.insert(&quad(
                    "urn:shared",
                    "urn:p",
                    Term::literal(format!("{i}")),
                    "urn:g",
                ))
                .unwrap();
                tx.commit().unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count(&Pattern::any().subject(Term::iri("urn:shared")))?, 8);
        Ok(())
    }
}
