//! Password hashing and strength rules.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::SecretString;

use super::AuthError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters that satisfy the "special character" rule.
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Hashes and verifies passwords.
pub trait CredentialHasher: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError::PasswordHash` if hashing fails.
    fn hash(&self, password: &str) -> Result<SecretString, AuthError>;

    /// Whether `password` matches the PHC string `hash`. Malformed hashes never match.
    fn verify(&self, password: &str, hash: &str) -> bool;

    /// Burn the same work as a real verification against a throwaway hash.
    fn dummy_verify(&self, password: &str);
}

/// Argon2id hasher.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Argon2Hasher {
    /// # Errors
    ///
    /// Returns `AuthError::PasswordHash` if the dummy hash cannot be computed.
    pub fn new(params: Params) -> Result<Self, AuthError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"studyforge-timing-equalizer", &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::PasswordHash)?;
        Ok(Self { argon2, dummy_hash })
    }

    /// Argon2id with the crate's default cost parameters.
    ///
    /// # Errors
    ///
    /// See [`Argon2Hasher::new`].
    pub fn with_defaults() -> Result<Self, AuthError> {
        Self::new(Params::default())
    }

    /// Minimum-cost parameters. Only for tests.
    ///
    /// # Errors
    ///
    /// See [`Argon2Hasher::new`].
    pub fn for_tests() -> Result<Self, AuthError> {
        let params = Params::new(Params::MIN_M_COST, 1, 1, None).map_err(|_| AuthError::PasswordHash)?;
        Self::new(params)
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<SecretString, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| SecretString::from(hash.to_string()))
            .map_err(|_| AuthError::PasswordHash)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            self.argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }

    fn dummy_verify(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

/// Every strength rule `password` breaks, in a fixed order.
#[must_use]
pub fn password_issues(password: &str) -> Vec<&'static str> {
    let mut issues = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        issues.push("must be at least 8 characters long");
    }
    if !password.chars().any(char::is_uppercase) {
        issues.push("must contain an uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        issues.push("must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("must contain a digit");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        issues.push("must contain a special character");
    }
    issues
}

/// # Errors
///
/// Returns `AuthError::WeakPassword` listing every broken rule.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let issues = password_issues(password);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(format!(
            "password {}",
            issues.join(", ")
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::for_tests().unwrap();
        let hash = hasher.hash("S3cure!pass").unwrap();
        assert!(hash.expose_secret().starts_with("$argon2id$"));
        assert!(hasher.verify("S3cure!pass", hash.expose_secret()));
        assert!(!hasher.verify("wrong", hash.expose_secret()));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        let hasher = Argon2Hasher::for_tests().unwrap();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("", ""));
    }

    #[test]
    fn test_strength_rules() {
        assert!(password_issues("S3cure!pass").is_empty());
        assert_eq!(password_issues("Ab1!"), vec!["must be at least 8 characters long"]);
        assert_eq!(
            password_issues("alllowercase"),
            vec![
                "must contain an uppercase letter",
                "must contain a digit",
                "must contain a special character",
            ]
        );
        assert!(validate_password("NoDigits!!").is_err());
    }
}
