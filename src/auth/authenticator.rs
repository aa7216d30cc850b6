//! API key authentication
//!
//! Credentials are accepted from three places, in order of precedence:
//! `Authorization: Bearer <key>`, the `X-API-KEY` header and the `api_key`
//! cookie. Authentication is read-only: it never mutates the store.

use crate::auth::api_key::{self, ApiKeyHasher};
use crate::auth::models::Principal;
use crate::core::error::{AuthFailure, Result};
use crate::db::repository::PrincipalStore;
use axum::http::{header, HeaderMap};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_COOKIE: &str = "api_key";

/// Where a credential was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Bearer,
    Header,
    Cookie,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Bearer => "bearer",
            CredentialSource::Header => "header",
            CredentialSource::Cookie => "cookie",
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(non_empty)
}

fn api_key_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(non_empty)
}

/// Value of cookie `name` across every `Cookie` header
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| non_empty(value))
}

/// The credential carried by a request, honoring source precedence
pub fn extract_credential(headers: &HeaderMap) -> Option<(&str, CredentialSource)> {
    bearer_token(headers)
        .map(|token| (token, CredentialSource::Bearer))
        .or_else(|| api_key_header(headers).map(|key| (key, CredentialSource::Header)))
        .or_else(|| cookie_value(headers, API_KEY_COOKIE).map(|key| (key, CredentialSource::Cookie)))
}

/// Whether the request carries any credential at all
pub fn supports(headers: &HeaderMap) -> bool {
    extract_credential(headers).is_some()
}

/// Resolves request credentials to principals
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    store: Arc<dyn PrincipalStore>,
    hasher: ApiKeyHasher,
}

impl ApiKeyAuthenticator {
    pub fn new(store: Arc<dyn PrincipalStore>, hasher: ApiKeyHasher) -> Self {
        Self { store, hasher }
    }

    /// Full authentication: format check, digest lookup, Argon2 verify, active check
    ///
    /// Failures are `AppError::Authentication`; storage errors pass through.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal> {
        let (credential, source) =
            extract_credential(headers).ok_or(AuthFailure::MissingCredential)?;

        let principal = self.verify_credential(credential).await?;

        tracing::debug!(
            user_id = principal.id,
            source = source.as_str(),
            "API key authenticated"
        );
        Ok(principal)
    }

    /// Authenticate a bare key, as presented to the login endpoint
    pub async fn verify_credential(&self, credential: &str) -> Result<Principal> {
        if !api_key::is_valid_format(credential) {
            return Err(AuthFailure::InvalidFormat.into());
        }

        let user = self
            .store
            .find_by_credential_digest(&api_key::digest(credential))
            .await?
            .ok_or(AuthFailure::InvalidCredential)?;

        let verified = self
            .hasher
            .verify_blocking(credential.to_string(), user.api_key_hash.clone())
            .await;
        if !verified {
            return Err(AuthFailure::InvalidCredential.into());
        }

        if !user.is_active {
            return Err(AuthFailure::InactiveAccount.into());
        }

        Ok(Principal::from(user))
    }

    /// Cheap identification for rate-limit keying
    ///
    /// Skips Argon2 and never fails the request: any problem yields `None`.
    pub async fn identify(&self, headers: &HeaderMap) -> Option<Principal> {
        let (credential, _) = extract_credential(headers)?;
        if !api_key::is_valid_format(credential) {
            return None;
        }

        match self
            .store
            .find_by_credential_digest(&api_key::digest(credential))
            .await
        {
            Ok(Some(user)) if user.is_active => Some(Principal::from(user)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Principal lookup for rate limiting failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::api_key::ApiKey;
    use crate::core::error::AppError;
    use crate::db::models::{now_timestamp, User};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that counts lookups
    struct StubStore {
        users: Vec<User>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl PrincipalStore for StubStore {
        async fn find_by_credential_digest(&self, digest: &str) -> Result<Option<User>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.users.iter().find(|u| u.api_key_digest == digest).cloned())
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
            Ok(self.users.iter().find(|u| u.id == id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            Ok(self.users.iter().find(|u| u.email == email).cloned())
        }

        async fn credential_digest_exists(&self, digest: &str) -> Result<bool> {
            Ok(self.users.iter().any(|u| u.api_key_digest == digest))
        }
    }

    fn hasher() -> ApiKeyHasher {
        ApiKeyHasher::new(8, 1, 1).unwrap()
    }

    fn user(id: i64, key: &ApiKey, active: bool) -> User {
        User {
            id,
            email: format!("user{}@example.com", id),
            name: format!("User {}", id),
            roles: vec![],
            api_key_digest: key.digest(),
            api_key_hash: hasher().hash(key.as_str()).unwrap(),
            is_active: active,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn authenticator(users: Vec<User>) -> (ApiKeyAuthenticator, Arc<StubStore>) {
        let store = Arc::new(StubStore {
            users,
            lookups: AtomicUsize::new(0),
        });
        (ApiKeyAuthenticator::new(store.clone(), hasher()), store)
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn failure(result: Result<Principal>) -> AuthFailure {
        match result {
            Err(AppError::Authentication(failure)) => failure,
            other => panic!("expected authentication failure, got {:?}", other),
        }
    }

    #[test]
    fn test_extraction_precedence() {
        let map = headers(&[
            ("authorization", "Bearer from-bearer"),
            ("x-api-key", "from-header"),
            ("cookie", "theme=dark; api_key=from-cookie"),
        ]);
        assert_eq!(
            extract_credential(&map),
            Some(("from-bearer", CredentialSource::Bearer))
        );

        let map = headers(&[("x-api-key", "from-header"), ("cookie", "api_key=from-cookie")]);
        assert_eq!(
            extract_credential(&map),
            Some(("from-header", CredentialSource::Header))
        );

        let map = headers(&[("cookie", "theme=dark; api_key=from-cookie")]);
        assert_eq!(
            extract_credential(&map),
            Some(("from-cookie", CredentialSource::Cookie))
        );
    }

    #[test]
    fn test_supports_requires_a_credential() {
        assert!(!supports(&HeaderMap::new()));
        assert!(!supports(&headers(&[("authorization", "Basic abc")])));
        assert!(!supports(&headers(&[("authorization", "Bearer ")])));
        assert!(!supports(&headers(&[("cookie", "session=1")])));
        assert!(supports(&headers(&[("x-api-key", "anything")])));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (auth, _) = authenticator(vec![]);
        assert_eq!(
            failure(auth.authenticate(&HeaderMap::new()).await),
            AuthFailure::MissingCredential
        );
    }

    #[tokio::test]
    async fn test_invalid_format_skips_lookup() {
        let (auth, store) = authenticator(vec![]);
        let map = headers(&[("x-api-key", "not-a-key")]);

        assert_eq!(failure(auth.authenticate(&map).await), AuthFailure::InvalidFormat);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_key_is_invalid() {
        let (auth, _) = authenticator(vec![]);
        let zero_key = "0".repeat(64);
        let map = headers(&[("x-api-key", zero_key.as_str())]);

        assert_eq!(failure(auth.authenticate(&map).await), AuthFailure::InvalidCredential);
    }

    #[tokio::test]
    async fn test_valid_key_authenticates() {
        let key = ApiKey::generate();
        let (auth, _) = authenticator(vec![user(1, &key, true)]);
        let bearer = format!("Bearer {}", key.as_str());

        let principal = auth
            .authenticate(&headers(&[("authorization", bearer.as_str())]))
            .await
            .unwrap();
        assert_eq!(principal.id, 1);
        assert!(principal.roles.contains(&"ROLE_USER".to_string()));
    }

    #[tokio::test]
    async fn test_bearer_wins_over_header() {
        let good = ApiKey::generate();
        let other = ApiKey::generate();
        let (auth, _) = authenticator(vec![user(1, &good, true), user(2, &other, true)]);
        let bearer = format!("Bearer {}", good.as_str());

        let principal = auth
            .authenticate(&headers(&[
                ("authorization", bearer.as_str()),
                ("x-api-key", other.as_str()),
            ]))
            .await
            .unwrap();
        assert_eq!(principal.id, 1);
    }

    #[tokio::test]
    async fn test_inactive_account_after_successful_verify() {
        let key = ApiKey::generate();
        let (auth, _) = authenticator(vec![user(1, &key, false)]);

        let result = auth.authenticate(&headers(&[("x-api-key", key.as_str())])).await;
        assert_eq!(failure(result), AuthFailure::InactiveAccount);

        // a wrong key for the same account is invalid, not inactive
        let wrong = ApiKey::generate();
        let result = auth.authenticate(&headers(&[("x-api-key", wrong.as_str())])).await;
        assert_eq!(failure(result), AuthFailure::InvalidCredential);
    }

    #[tokio::test]
    async fn test_identify_is_lenient() {
        let key = ApiKey::generate();
        let inactive_key = ApiKey::generate();
        let (auth, _) = authenticator(vec![user(1, &key, true), user(2, &inactive_key, false)]);

        let found = auth.identify(&headers(&[("x-api-key", key.as_str())])).await;
        assert_eq!(found.map(|p| p.id), Some(1));

        assert!(auth.identify(&headers(&[("x-api-key", inactive_key.as_str())])).await.is_none());
        assert!(auth.identify(&headers(&[("x-api-key", "garbage")])).await.is_none());
        assert!(auth.identify(&HeaderMap::new()).await.is_none());
    }
}
