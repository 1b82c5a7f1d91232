//! Read-through cache of entry snapshots keyed by entry URI.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, warn};

use super::entry::Entry;
use crate::config::CacheConfig;

/// Snapshots are only inserted by loads that no eviction overlapped. Every
/// eviction bumps `epoch`; a load records it before reading the store.
#[derive(Clone)]
pub(crate) struct EntryCache {
    entries: Cache<String, Arc<Entry>>,
    epoch: Arc<AtomicU64>,
}

impl EntryCache {
    pub(crate) fn new(config: &CacheConfig) -> EntryCache {
        let mut builder = Cache::builder()
            .max_capacity(config.max_entries)
            .support_invalidation_closures();
        if let Some(secs) = config.time_to_idle_secs {
            builder = builder.time_to_idle(Duration::from_secs(secs));
        }
        EntryCache {
            entries: builder.build(),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn get(&self, entry_uri: &str) -> Option<Arc<Entry>> {
        self.entries.get(entry_uri)
    }

    /// Marker to take before loading a snapshot from the store.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Caches a snapshot loaded after `epoch` was taken, unless an eviction
    /// ran since. An eviction racing the insert wins.
    pub(crate) fn put(&self, entry: Arc<Entry>, epoch: u64) {
        if self.epoch() != epoch {
            return;
        }
        let entry_uri = entry.entry_uri.clone();
        self.entries.insert(entry_uri.clone(), entry);
        if self.epoch() != epoch {
            self.entries.invalidate(&entry_uri);
        }
    }

    pub(crate) fn evict(&self, entry_uri: &str) {
        debug!(target: "cache", entry_uri, "evict");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.invalidate(entry_uri);
    }

    /// Drops every snapshot belonging to `context_id`.
    pub(crate) fn evict_context(&self, context_id: &str) {
        let context_id = context_id.to_owned();
        debug!(target: "cache", context_id, "evict context");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let predicate = move |_: &String, entry: &Arc<Entry>| entry.context_id == context_id;
        if let Err(error) = self.entries.invalidate_entries_if(predicate) {
            warn!(target: "cache", %error, "falling back to full invalidation");
            self.entries.invalidate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use jiff::Timestamp;

    use super::EntryCache;
    use crate::config::CacheConfig;
    use crate::repo::address::AddressCodec;
    use crate::repo::entry::{Entry, GraphType, NewEntry};

    fn entry(codec: &AddressCodec, context_id: &str, id: &str) -> Arc<Entry> {
        let resource = codec.resource_uri(context_id, id);
        let quads = NewEntry::local(GraphType::None).entry_graph(
            codec,
            context_id,
            id,
            &resource,
            "urn:admin",
            Timestamp::now(),
        );
        Arc::new(Entry::from_statements(codec, context_id, id, &quads))
    }

    #[test]
    fn put_get_evict() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/")?;
        let cache = EntryCache::new(&CacheConfig::default());
        let e = entry(&codec, "1", "1");
        cache.put(e.clone(), cache.epoch());
        assert_eq!(cache.get(&e.entry_uri), Some(e.clone()));
        cache.evict(&e.entry_uri);
        assert_eq!(cache.get(&e.entry_uri), None);
        Ok(())
    }

    #[test]
    fn evict_context_keeps_other_contexts() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/")?;
        let cache = EntryCache::new(&CacheConfig::default());
        let doomed = entry(&codec, "1", "1");
        let kept = entry(&codec, "2", "1");
        cache.put(doomed.clone(), cache.epoch());
        cache.put(kept.clone(), cache.epoch());
        cache.evict_context("1");
        assert_eq!(cache.get(&doomed.entry_uri), None);
        assert_eq!(cache.get(&kept.entry_uri), Some(kept));
        Ok(())
    }

    #[test]
    fn load_overlapping_an_eviction_is_not_cached() -> Result<()> {
        let codec = AddressCodec::new("http://example.org/")?;
        let cache = EntryCache::new(&CacheConfig::default());
        let e = entry(&codec, "1", "1");
        let before_load = cache.epoch();
        // a removal commits and evicts while the load is in flight
        cache.evict(&e.entry_uri);
        cache.put(e.clone(), before_load);
        assert_eq!(cache.get(&e.entry_uri), None);

        cache.put(e.clone(), cache.epoch());
        assert_eq!(cache.get(&e.entry_uri), Some(e));
        Ok(())
    }
}
