//! Caller authentication.
//!
//! `jsonrpsee`'s HTTP transport does not hand method handlers the request's
//! headers without a custom `tower` middleware layer, so this server
//! carries the caller's credential as an explicit `api_key` field on every
//! request DTO instead: the same "who is calling, what tenant, are they an
//! operator" contract an `Authorization` header would describe, just
//! transported as a JSON-RPC parameter rather than an HTTP header.

use std::collections::HashMap;

use coordinator_primitives::{TenantContext, TenantId};

/// Why authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The caller supplied an empty `api_key`.
    #[error("no api_key supplied")]
    MissingCredential,
    /// The `api_key` does not match any configured caller.
    #[error("api_key not recognized")]
    UnknownCredential,
}

/// Resolves an opaque API key to a [`TenantContext`].
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Authenticates `api_key`, returning the caller's tenant scope.
    fn authenticate(&self, api_key: &str) -> Result<TenantContext, AuthError>;
}

/// A fixed `api_key -> TenantContext` map, loaded once at startup from
/// configuration. Adequate for the fleet sizes this coordinator targets;
/// swapping in an OIDC- or database-backed provider only requires a new
/// [`IdentityProvider`] impl.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyIdentityProvider {
    keys: HashMap<String, TenantContext>,
}

impl StaticKeyIdentityProvider {
    /// Builds a provider from `(api_key, tenant_context)` pairs.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = (String, TenantContext)>) -> Self {
        Self { keys: keys.into_iter().collect() }
    }

    /// Registers one additional caller, replacing any prior entry for the
    /// same key.
    pub fn insert(&mut self, api_key: impl Into<String>, tenant: TenantContext) {
        self.keys.insert(api_key.into(), tenant);
    }
}

impl IdentityProvider for StaticKeyIdentityProvider {
    fn authenticate(&self, api_key: &str) -> Result<TenantContext, AuthError> {
        if api_key.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.keys.get(api_key).cloned().ok_or(AuthError::UnknownCredential)
    }
}

/// Convenience constructor for test/demo fixtures: one caller per tenant id,
/// keyed by that id's own string form, none holding operator privileges.
#[must_use]
pub fn single_tenant_provider(tenant_id: &str) -> StaticKeyIdentityProvider {
    let mut provider = StaticKeyIdentityProvider::default();
    provider.insert(
        tenant_id,
        TenantContext { tenant_id: TenantId::from(tenant_id), caller_id: tenant_id.to_owned(), is_operator: false },
    );
    provider
}
