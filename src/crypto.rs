//! Password hashing logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("password does not match")]
    Mismatch,
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
    /// Hash verified against when no user matches, with the same cost.
    dummy: String,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        let mut manager = Self {
            params,
            dummy: String::new(),
        };
        manager.dummy = manager.hash_password("not a real password")?;
        Ok(manager)
    }

    /// PHC string no user password matches, hashed with configured parameters.
    pub fn dummy_hash(&self) -> &str {
        &self.dummy
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    ///
    /// Parameters encoded in the PHC string win over configured ones, so
    /// hashes survive a configuration change.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> Result<()> {
        let parsed =
            PasswordHash::new(phc_hash).map_err(|_| CryptoError::Mismatch)?;

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .map_err(|_| CryptoError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PasswordManager {
        PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let pwd = manager();
        let hash = pwd.hash_password("StRong_PaÂ§$W0rD").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("StRong_PaÂ§$W0rD", &hash).is_ok());
        assert!(matches!(
            pwd.verify_password("wrong password", &hash),
            Err(CryptoError::Mismatch)
        ));
    }

    #[test]
    fn test_salt_is_random() {
        let pwd = manager();
        assert_ne!(
            pwd.hash_password("password").unwrap(),
            pwd.hash_password("password").unwrap()
        );
    }

    #[test]
    fn test_dummy_hash_uses_configured_cost() {
        let pwd = manager();

        assert!(pwd.dummy_hash().starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(matches!(
            pwd.verify_password("correct horse", pwd.dummy_hash()),
            Err(CryptoError::Mismatch)
        ));
    }

    #[test]
    fn test_invalid_phc() {
        assert!(matches!(
            manager().verify_password("password", "not a phc string"),
            Err(CryptoError::Mismatch)
        ));
    }

    #[test]
    fn test_invalid_params() {
        let config = ArgonConfig {
            memory_cost: 1,
            ..Default::default()
        };
        assert!(PasswordManager::new(Some(config)).is_err());
    }
}
