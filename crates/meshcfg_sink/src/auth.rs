//! Stream authentication checks.

use crate::error::AuthError;
use crate::stream::AuthInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

/// Auth type carried by TLS-secured peers.
pub const AUTH_TYPE_TLS: &str = "tls";

/// Decides whether a stream may proceed. `auth_info` is `None` for insecure
/// transports or when the peer is unknown.
pub trait AuthChecker: Send + Sync {
    fn check(&self, auth_info: Option<&AuthInfo>) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthChecker for AllowAll {
    fn check(&self, _auth_info: Option<&AuthInfo>) -> Result<(), AuthError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    AllowAll,
    Whitelist,
}

/// Checks TLS peer identities against an updatable list.
#[derive(Debug, Default)]
pub struct ListAuthChecker {
    mode: AuthMode,
    ids: RwLock<BTreeSet<String>>,
}

impl ListAuthChecker {
    pub fn new(mode: AuthMode) -> Self {
        Self {
            mode,
            ids: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn with_ids<I, S>(mode: AuthMode, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let checker = Self::new(mode);
        checker.set(ids);
        checker
    }

    /// Replace the allowed identities.
    pub fn set<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.ids.write().unwrap_or_else(PoisonError::into_inner) =
            ids.into_iter().map(Into::into).collect();
    }

    pub fn allowed(&self, id: &str) -> bool {
        match self.mode {
            AuthMode::AllowAll => true,
            AuthMode::Whitelist => self
                .ids
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(id),
        }
    }
}

impl AuthChecker for ListAuthChecker {
    fn check(&self, auth_info: Option<&AuthInfo>) -> Result<(), AuthError> {
        if self.mode == AuthMode::AllowAll {
            return Ok(());
        }
        let info = auth_info.ok_or(AuthError::MissingAuthInfo)?;
        if info.auth_type != AUTH_TYPE_TLS {
            return Err(AuthError::UnsupportedAuthType(info.auth_type.clone()));
        }
        if info.identities.iter().any(|id| self.allowed(id)) {
            return Ok(());
        }
        Err(AuthError::NotAllowed(info.identities.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls(ids: &[&str]) -> AuthInfo {
        AuthInfo {
            auth_type: AUTH_TYPE_TLS.to_string(),
            identities: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_allow_all_modes() {
        assert!(AllowAll.check(None).is_ok());
        let checker = ListAuthChecker::new(AuthMode::AllowAll);
        assert!(checker.check(None).is_ok());
        assert!(checker.check(Some(&tls(&["spiffe://x"]))).is_ok());
    }

    #[test]
    fn test_whitelist() {
        let checker = ListAuthChecker::with_ids(AuthMode::Whitelist, ["spiffe://cluster.local/ns/a/sa/b"]);

        assert_eq!(checker.check(None), Err(AuthError::MissingAuthInfo));
        assert!(checker
            .check(Some(&tls(&["spiffe://other", "spiffe://cluster.local/ns/a/sa/b"])))
            .is_ok());
        assert!(matches!(
            checker.check(Some(&tls(&["spiffe://other"]))),
            Err(AuthError::NotAllowed(_))
        ));

        let plain = AuthInfo {
            auth_type: "insecure".into(),
            identities: vec![],
        };
        assert!(matches!(
            checker.check(Some(&plain)),
            Err(AuthError::UnsupportedAuthType(_))
        ));

        checker.set(["spiffe://other"]);
        assert!(checker.check(Some(&tls(&["spiffe://other"]))).is_ok());
    }
}
