//! Password credentials.
//!
//! Accounts always carry a password credential, even when they only ever
//! sign in through an identity provider. Provider-created accounts get a
//! random secret that is hashed and then discarded.

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use crewboard_core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CredentialError;

/// Bytes of entropy in a generated secret; encodes to 20 characters.
const RANDOM_SECRET_BYTES: usize = 15;

/// Bytes of salt fed to the hasher.
const SALT_BYTES: usize = 16;

/// An opaque, already-hashed password credential (PHC string format).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordCredential(String);

impl PasswordCredential {
    /// Wraps a digest loaded from storage.
    #[must_use]
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the stored digest.
    #[must_use]
    pub fn as_digest(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordCredential(..)")
    }
}

/// Generates a random URL-safe secret of 20 characters.
///
/// # Errors
///
/// Returns an error if the operating system cannot supply randomness.
pub fn random_secret() -> Result<String, CredentialError> {
    let mut bytes = [0u8; RANDOM_SECRET_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| CredentialError::Randomness {
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Issues and checks password credentials.
pub trait CredentialVerifier: Send + Sync {
    /// Hashes `secret` into a storable credential.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails.
    fn digest(&self, secret: &str) -> Result<PasswordCredential, CredentialError>;

    /// Returns true if `candidate` matches the credential.
    fn verify(&self, credential: &PasswordCredential, candidate: &str) -> bool;

    /// Issues a credential for a freshly generated random secret.
    ///
    /// The secret itself is not returned; nobody can sign in with it.
    ///
    /// # Errors
    ///
    /// Returns an error if randomness or hashing fails.
    fn issue_random(&self) -> Result<PasswordCredential, CredentialError> {
        self.digest(&random_secret()?)
    }
}

/// Argon2id-backed credential verifier.
#[derive(Debug, Clone, Default)]
pub struct Argon2CredentialVerifier;

impl Argon2CredentialVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn hasher() -> Argon2<'static> {
        #[cfg(test)]
        {
            use argon2::{Algorithm, Params, Version};
            // Cheap parameters so tests stay fast.
            let params = Params::new(1024, 1, 1, None).expect("valid test params");
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        }

        #[cfg(not(test))]
        {
            Argon2::default()
        }
    }
}

impl CredentialVerifier for Argon2CredentialVerifier {
    fn digest(&self, secret: &str) -> Result<PasswordCredential, CredentialError> {
        let mut salt_bytes = [0u8; SALT_BYTES];
        getrandom::fill(&mut salt_bytes).map_err(|e| CredentialError::Randomness {
            reason: e.to_string(),
        })?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialError::Hashing {
            reason: e.to_string(),
        })?;

        let hash = Self::hasher()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing {
                reason: e.to_string(),
            })?;

        Ok(PasswordCredential(hash.to_string()))
    }

    fn verify(&self, credential: &PasswordCredential, candidate: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(credential.as_digest()) else {
            return false;
        };
        Self::hasher()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }
}
