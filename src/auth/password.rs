//! Argon2id hashing for passwords, secret answers and session tokens.
//!
//! Every hash uses a fresh random salt from [`OsRng`] and is stored as a PHC
//! string, so parameters and salt travel with the hash. The server pepper is
//! appended to the secret before hashing and is never stored.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::Result;

/// Hash `secret + pepper` with Argon2id and a random salt
pub fn hash_secret(secret: &str, pepper: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let peppered = format!("{}{}", secret, pepper);
    let hash = Argon2::default().hash_password(peppered.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify `secret + pepper` against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; a malformed stored hash is an error.
pub fn verify_secret(secret: &str, pepper: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)?;
    let peppered = format!("{}{}", secret, pepper);
    match Argon2::default().verify_password(peppered.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Mint a session token for a fresh login.
///
/// The token is a salted one-way hash over the username, the session pepper
/// and the caller's password material. Two logins never produce the same
/// token because the salt is random.
pub fn session_token(username: &str, session_pepper: &str, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let material = format!("{}{}{}", username, session_pepper, password);
    let hash = Argon2::default().hash_password(material.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("correct-horse", "pepper").expect("hashing should succeed");
        assert!(hash.starts_with("$argon2id$"), "expected argon2id PHC prefix");

        assert!(verify_secret("correct-horse", "pepper", &hash).unwrap());
        assert!(!verify_secret("wrong-horse", "pepper", &hash).unwrap());
    }

    #[test]
    fn test_pepper_is_part_of_the_hash() {
        let hash = hash_secret("secret", "pepper-a").unwrap();
        assert!(!verify_secret("secret", "pepper-b", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_secret("x", "", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_session_tokens_are_unique() {
        let a = session_token("alice", "sp", "pw").unwrap();
        let b = session_token("alice", "sp", "pw").unwrap();
        assert_ne!(a, b);
    }
}
