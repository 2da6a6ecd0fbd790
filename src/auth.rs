// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Authorization seam.
//!
//! Providers produce an authorization string per request and stamp whatever
//! headers their scheme needs. On-premises providers additionally support
//! [`bootstrap_login`](AuthorizationProvider::bootstrap_login), which the
//! engine invokes to refresh an expired login token before retrying.
//!
//! Rate limiting is a cloud concern; the engine disables it whenever the
//! provider reports `on_premises() == true`.

use async_trait::async_trait;

use crate::error::NoSQLError;
use crate::http::Headers;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const COMPARTMENT_HEADER: &str = "x-nosql-compartment-id";

/// Contract between the engine and an authorization scheme.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// The authorization string for the next request. May refresh cached
    /// credentials, so it is async.
    async fn authorization_string(&self) -> Result<String, NoSQLError>;

    /// Reject obviously unusable strings before they go on the wire.
    fn validate_auth_string(&self, auth: &str) -> Result<(), NoSQLError> {
        if auth.is_empty() {
            return Err(NoSQLError::Authentication(
                "empty authorization string".into(),
            ));
        }
        Ok(())
    }

    /// Stamp scheme-specific headers. `compartment` is the effective
    /// compartment after config defaulting.
    fn set_required_headers(&self, auth: &str, compartment: Option<&str>, headers: &mut Headers) {
        headers.set(AUTHORIZATION_HEADER, auth);
        if let Some(c) = compartment {
            headers.set(COMPARTMENT_HEADER, c);
        }
    }

    /// True for secure-store (on-premises) providers.
    fn on_premises(&self) -> bool {
        false
    }

    /// Re-run the login handshake after an authentication retry code.
    /// Only meaningful on-premises.
    async fn bootstrap_login(&self) -> Result<(), NoSQLError> {
        Err(NoSQLError::Authentication(
            "bootstrap login not supported by this provider".into(),
        ))
    }

    /// Release provider resources at client shutdown.
    async fn close(&self) {}
}

/// Provider for unauthenticated endpoints (local simulators).
#[derive(Debug, Default)]
pub struct NoAuthProvider;

#[async_trait]
impl AuthorizationProvider for NoAuthProvider {
    async fn authorization_string(&self) -> Result<String, NoSQLError> {
        Ok("Bearer anonymous".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_auth_provider_is_cloud() {
        let p = NoAuthProvider;
        assert!(!p.on_premises());
        let auth = p.authorization_string().await.unwrap();
        p.validate_auth_string(&auth).unwrap();
    }

    #[tokio::test]
    async fn test_default_validation_rejects_empty() {
        let p = NoAuthProvider;
        assert!(p.validate_auth_string("").is_err());
    }

    #[tokio::test]
    async fn test_default_headers_include_compartment() {
        let p = NoAuthProvider;
        let mut headers = Headers::new();
        p.set_required_headers("Bearer t", Some("tenant-a"), &mut headers);
        assert_eq!(headers.get(AUTHORIZATION_HEADER), Some("Bearer t"));
        assert_eq!(headers.get(COMPARTMENT_HEADER), Some("tenant-a"));
    }

    #[tokio::test]
    async fn test_bootstrap_login_unsupported_by_default() {
        let p = NoAuthProvider;
        assert!(p.bootstrap_login().await.is_err());
    }
}
