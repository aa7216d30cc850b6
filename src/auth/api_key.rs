//! API key credentials
//!
//! A key is 32 bytes from the OS CSPRNG, shown to clients as 64 lowercase hex
//! characters. It is persisted only as:
//! - a SHA-256 hex digest, the unique index used to find the owner
//! - an Argon2id PHC string, checked in constant time on every request

use crate::core::config::SecurityConfig;
use crate::core::error::{AppError, Result};
use crate::db::repository::{PrincipalStore, UserRepository};
use argon2::{
    password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Random bytes behind every key
pub const API_KEY_BYTES: usize = 32;

/// Attempts at drawing a key whose digest is not already stored
const MAX_GENERATION_ATTEMPTS: usize = 8;

lazy_static! {
    static ref API_KEY_FORMAT: Regex = Regex::new(r"^[a-f0-9]{64}$").unwrap();
}

/// Exactly 64 lowercase hex characters
pub fn is_valid_format(candidate: &str) -> bool {
    API_KEY_FORMAT.is_match(candidate)
}

/// SHA-256 of the key as lowercase hex; lookup index only, never a verifier
pub fn digest(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Plaintext API key
///
/// `Debug` is redacted so keys never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Fresh key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; API_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accepts only well-formed keys
    pub fn parse(candidate: &str) -> Option<Self> {
        is_valid_format(candidate).then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digest(&self) -> String {
        digest(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({}…)", &self.0[..8.min(self.0.len())])
    }
}

/// Argon2id hashing of API keys with fixed cost parameters
#[derive(Debug, Clone)]
pub struct ApiKeyHasher {
    params: Params,
}

impl ApiKeyHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::CredentialError(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        Self::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// PHC string with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut SaltRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::CredentialError(format!("Failed to hash API key: {}", e)))
    }

    /// Constant-time check; a malformed stored hash never verifies
    pub fn verify(&self, plaintext: &str, phc: &str) -> bool {
        let parsed = match PasswordHash::new(phc) {
            Ok(hash) => hash,
            Err(_) => return false,
        };

        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_blocking(&self, plaintext: String) -> Result<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AppError::TaskError(format!("Hashing task panicked: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking pool; a panicked task verifies as false
    pub async fn verify_blocking(&self, plaintext: String, phc: String) -> bool {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &phc))
            .await
            .unwrap_or(false)
    }
}

/// Freshly issued key material
#[derive(Debug)]
pub struct IssuedApiKey {
    /// Returned to the client exactly once
    pub plaintext: ApiKey,
    pub digest: String,
    pub hash: String,
}

/// Issues and rotates API keys against the user store
pub struct ApiKeyService {
    users: Arc<UserRepository>,
    hasher: ApiKeyHasher,
}

impl ApiKeyService {
    pub fn new(users: Arc<UserRepository>, hasher: ApiKeyHasher) -> Self {
        Self { users, hasher }
    }

    pub fn hasher(&self) -> &ApiKeyHasher {
        &self.hasher
    }

    /// A key whose digest is not yet stored
    pub async fn generate(&self) -> Result<ApiKey> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = ApiKey::generate();
            if !self.users.credential_digest_exists(&candidate.digest()).await? {
                return Ok(candidate);
            }
            tracing::warn!("Generated API key collided with a stored key, resampling");
        }

        Err(AppError::CredentialError(
            "Could not generate a unique API key".to_string(),
        ))
    }

    /// Generate a unique key and derive its storage forms
    pub async fn issue(&self) -> Result<IssuedApiKey> {
        let plaintext = self.generate().await?;
        let digest = plaintext.digest();
        let hash = self.hasher.hash_blocking(plaintext.as_str().to_string()).await?;

        Ok(IssuedApiKey {
            plaintext,
            digest,
            hash,
        })
    }

    /// Replace a user's key; the new plaintext is returned once and never stored
    pub async fn regenerate(&self, user_id: i64) -> Result<ApiKey> {
        let issued = self.issue().await?;

        let updated = self
            .users
            .update_api_key(user_id, issued.digest, issued.hash)
            .await?;
        if !updated {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        tracing::info!(user_id, "API key regenerated");
        Ok(issued.plaintext)
    }
}
