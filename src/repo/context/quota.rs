use anyhow::{Result, bail};
use quads::Transaction;
use tracing::debug;

use super::{Context, ContextKind};
use crate::repo::entry::AccessProperty;
use crate::repo::error::RepoError;
use crate::repo::vocab;

impl Context {
    /// Byte ceiling of the context. `None` means unknown, which is unlimited.
    pub(crate) fn quota(&self) -> Result<Option<u64>> {
        let stored = self
            .backend
            .quads
            .quads(&self.context_fact(vocab::HAS_QUOTA))?
            .first()
            .and_then(|q| vocab::parse_long(&q.object));
        Ok(stored.or(self.default_quota()))
    }

    fn quota_in(&self, tx: &Transaction<'_>) -> Result<Option<u64>> {
        let stored = tx
            .quads(&self.context_fact(vocab::HAS_QUOTA))?
            .first()
            .and_then(|q| vocab::parse_long(&q.object));
        Ok(stored.or(self.default_quota()))
    }

    fn default_quota(&self) -> Option<u64> {
        match self.kind {
            ContextKind::Regular => self.backend.settings.default_quota,
            _ => None,
        }
    }

    pub(crate) fn has_quota(&self) -> Result<bool> {
        Ok(self.quota()?.is_some())
    }

    pub(crate) fn set_quota(&self, bytes: u64) -> Result<()> {
        self.check_context_access(AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        self.set_context_fact_in(&mut tx, vocab::HAS_QUOTA, vocab::long(bytes))?;
        tx.commit()?;
        debug!(target: "context", context = self.id, bytes, "set quota");
        Ok(())
    }

    pub(crate) fn remove_quota(&self) -> Result<()> {
        self.check_context_access(AccessProperty::Administer)?;
        let mut tx = self.backend.quads.begin()?;
        tx.remove_matching(&self.context_fact(vocab::HAS_QUOTA))?;
        tx.commit()
    }

    pub(crate) fn quota_fill_level(&self) -> Result<u64> {
        Ok(self
            .backend
            .quads
            .quads(&self.context_fact(vocab::HAS_QUOTA_FILL_LEVEL))?
            .first()
            .and_then(|q| vocab::parse_long(&q.object))
            .unwrap_or(0))
    }

    fn fill_level_in(&self, tx: &Transaction<'_>) -> Result<u64> {
        Ok(tx
            .quads(&self.context_fact(vocab::HAS_QUOTA_FILL_LEVEL))?
            .first()
            .and_then(|q| vocab::parse_long(&q.object))
            .unwrap_or(0))
    }

    /// Fails with [`RepoError::QuotaExceeded`], leaving the level unchanged,
    /// when the new level would pass an enforced quota.
    pub(crate) fn increase_fill_level(&self, bytes: u64) -> Result<u64> {
        let mut tx = self.backend.quads.begin()?;
        let level = self.increase_fill_level_in(&mut tx, bytes)?;
        tx.commit()?;
        Ok(level)
    }

    pub(crate) fn decrease_fill_level(&self, bytes: u64) -> Result<u64> {
        let mut tx = self.backend.quads.begin()?;
        let level = self.decrease_fill_level_in(&mut tx, bytes)?;
        tx.commit()?;
        Ok(level)
    }

    pub(super) fn increase_fill_level_in(
        &self,
        tx: &mut Transaction<'_>,
        bytes: u64,
    ) -> Result<u64> {
        let requested = self.fill_level_in(tx)?.saturating_add(bytes);
        if self.backend.settings.quota_enabled {
            if let Some(quota) = self.quota_in(tx)? {
                if requested > quota {
                    bail!(RepoError::QuotaExceeded {
                        context: self.id.clone(),
                        quota,
                        requested,
                    });
                }
            }
        }
        self.set_context_fact_in(tx, vocab::HAS_QUOTA_FILL_LEVEL, vocab::long(requested))?;
        Ok(requested)
    }

    pub(super) fn decrease_fill_level_in(
        &self,
        tx: &mut Transaction<'_>,
        bytes: u64,
    ) -> Result<u64> {
        let level = self.fill_level_in(tx)?.saturating_sub(bytes);
        self.set_context_fact_in(tx, vocab::HAS_QUOTA_FILL_LEVEL, vocab::long(level))?;
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::repo::error::RepoError;
    use crate::repo::testing;

    #[test]
    fn fill_level_arithmetic() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = testing::config(dir.path());
        config.quota.enabled = true;
        let repo = testing::open_with(config)?;
        let context = repo.manager.create_context(None)?;
        assert_eq!(context.quota()?, None);
        context.set_quota(100)?;
        assert_eq!(context.quota()?, Some(100));

        assert_eq!(context.increase_fill_level(60)?, 60);
        let err = context.increase_fill_level(41).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::QuotaExceeded { quota: 100, requested: 101, .. })
        ));
        assert_eq!(context.quota_fill_level()?, 60);
        assert_eq!(context.increase_fill_level(40)?, 100);
        assert_eq!(context.decrease_fill_level(40)?, 60);
        assert_eq!(context.decrease_fill_level(1_000)?, 0);
        Ok(())
    }

    #[test]
    fn disabled_quota_is_tracked_not_enforced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let context = repo.manager.create_context(None)?;
        context.set_quota(10)?;
        assert_eq!(context.increase_fill_level(25)?, 25);
        context.remove_quota()?;
        assert!(!context.has_quota()?);
        Ok(())
    }

    #[test]
    fn default_quota_applies_to_regular_contexts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = testing::config(dir.path());
        config.quota.enabled = true;
        config.quota.default_bytes = Some(5);
        let repo = testing::open_with(config)?;
        let context = repo.manager.create_context(None)?;
        assert_eq!(context.quota()?, Some(5));
        assert!(context.increase_fill_level(6).is_err());
        assert_eq!(repo.manager.root().quota()?, None);
        Ok(())
    }
}
