//! Authorization and principal lookup collaborators.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Result, bail};
use quads::QuadStore;
use tracing::debug;

use super::address::{ADMIN_ID, AddressCodec, GUEST_ID, PRINCIPALS_ID, SYSTEM_CONTEXTS_ID};
use super::context::Context;
use super::entry::{AccessProperty, Entry};
use super::error::RepoError;

/// Decides whether the acting principal may exercise an access property on an
/// entry. Every read and write of metadata or resources goes through this.
pub(crate) trait Authorizer: Send + Sync {
    fn check_authorized(&self, entry: &Entry, property: AccessProperty) -> Result<()>;

    fn rights(&self, entry: &Entry) -> Result<BTreeSet<AccessProperty>>;

    fn current_principal(&self) -> String;

    fn is_admin(&self) -> bool;
}

/// Resolves principals of the destination repository, used when rewriting
/// principal statements on import.
pub(crate) trait PrincipalDirectory: Send + Sync {
    fn principal_by_id(&self, id: &str) -> Result<Option<String>>;

    fn principal_by_name(&self, name: &str) -> Result<Option<String>>;

    fn name_of(&self, principal_uri: &str) -> Result<Option<String>>;

    fn guest_uri(&self) -> String;

    fn admin_uri(&self) -> String;
}

/// Evaluates entry ACLs for a single acting principal.
///
/// The decision order is: administrator, creator, context administrator,
/// then the entry's own ACL. An entry without any ACL statements inherits
/// resource access from its context.
pub(crate) struct AclAuthorizer {
    quads: QuadStore,
    codec: AddressCodec,
    principal: RwLock<String>,
    guest: String,
    admin: String,
}

impl AclAuthorizer {
    pub(crate) fn new(
        quads: QuadStore,
        codec: AddressCodec,
        principal: Option<&str>,
    ) -> AclAuthorizer {
        let guest = codec.resource_uri(PRINCIPALS_ID, GUEST_ID);
        let admin = codec.resource_uri(PRINCIPALS_ID, ADMIN_ID);
        let principal = principal.map(str::to_owned).unwrap_or_else(|| admin.clone());
        AclAuthorizer {
            quads,
            codec,
            principal: RwLock::new(principal),
            guest,
            admin,
        }
    }

    pub(crate) fn set_principal(&self, principal: &str) {
        *self.principal.write().unwrap_or_else(PoisonError::into_inner) = principal.to_owned();
    }

    fn has_access(&self, principal: &str, entry: &Entry, property: AccessProperty) -> bool {
        if entry.acl.allows(property, &self.guest) || entry.acl.allows(property, principal) {
            return true;
        }
        property != AccessProperty::Administer
            && entry.acl.allows(AccessProperty::Administer, principal)
    }

    fn context_entry(&self, entry: &Entry) -> Result<Option<Entry>> {
        Entry::load(&self.quads, &self.codec, SYSTEM_CONTEXTS_ID, &entry.context_id)
    }

    fn evaluate(
        &self,
        principal: &str,
        entry: &Entry,
        context: Option<&Entry>,
        property: AccessProperty,
    ) -> bool {
        if principal == self.admin || entry.creator.as_deref() == Some(principal) {
            return true;
        }
        let on_context = |p| context.is_some_and(|c| self.has_access(principal, c, p));
        if on_context(AccessProperty::Administer) {
            return true;
        }
        if !entry.acl.is_empty() {
            return self.has_access(principal, entry, AccessProperty::Administer)
                || self.has_access(principal, entry, property)
                || (property == AccessProperty::ReadMetadata
                    && self.has_access(principal, entry, AccessProperty::WriteMetadata))
                || (property == AccessProperty::ReadResource
                    && self.has_access(principal, entry, AccessProperty::WriteResource));
        }
        match property {
            AccessProperty::ReadMetadata | AccessProperty::ReadResource => {
                on_context(AccessProperty::ReadResource)
                    || on_context(AccessProperty::WriteResource)
            }
            _ => on_context(AccessProperty::WriteResource),
        }
    }
}

impl Authorizer for AclAuthorizer {
    fn check_authorized(&self, entry: &Entry, property: AccessProperty) -> Result<()> {
        let principal = self.current_principal();
        if principal == self.admin {
            return Ok(());
        }
        let context = self.context_entry(entry)?;
        if self.evaluate(&principal, entry, context.as_ref(), property) {
            return Ok(());
        }
        debug!(target: "repo", principal, entry = entry.entry_uri, ?property, "denied");
        bail!(RepoError::Unauthorized {
            principal,
            entry: entry.entry_uri.clone(),
            property,
        })
    }

    fn rights(&self, entry: &Entry) -> Result<BTreeSet<AccessProperty>> {
        let principal = self.current_principal();
        let context = self.context_entry(entry)?;
        Ok(AccessProperty::ALL
            .into_iter()
            .filter(|p| self.evaluate(&principal, entry, context.as_ref(), *p))
            .collect())
    }

    fn current_principal(&self) -> String {
        self.principal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_admin(&self) -> bool {
        self.current_principal() == self.admin
    }
}

/// Principals are the resources of the `_principals` context, named through
/// its name index.
pub(crate) struct NamedPrincipals {
    context: Arc<Context>,
}

impl NamedPrincipals {
    pub(crate) fn new(context: Arc<Context>) -> NamedPrincipals {
        NamedPrincipals { context }
    }

    fn codec(&self) -> &AddressCodec {
        self.context.codec()
    }
}

impl PrincipalDirectory for NamedPrincipals {
    fn principal_by_id(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .context
            .get(id)?
            .map(|entry| entry.resource_uri.clone()))
    }

    fn principal_by_name(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .context
            .entry_by_name(name)?
            .map(|entry| entry.resource_uri.clone()))
    }

    fn name_of(&self, principal_uri: &str) -> Result<Option<String>> {
        let Some(address) = self.codec().parse(principal_uri) else {
            return Ok(None);
        };
        if address.context_id != PRINCIPALS_ID {
            return Ok(None);
        }
        let entry_uri = self.codec().entry_uri(PRINCIPALS_ID, &address.id);
        self.context.entry_name(&entry_uri)
    }

    fn guest_uri(&self) -> String {
        self.codec().resource_uri(PRINCIPALS_ID, GUEST_ID)
    }

    fn admin_uri(&self) -> String {
        self.codec().resource_uri(PRINCIPALS_ID, ADMIN_ID)
    }
}
