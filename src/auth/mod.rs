use sha2::{Digest, Sha256};

/// Capability for deriving and verifying account credential hashes.
///
/// The ledger never inspects secrets itself; it stores whatever opaque
/// verifier the scheme derives at registration and hands it back for
/// verification. Swapping in a hardened scheme (bcrypt, argon2, an external
/// auth service) only touches this trait.
pub trait CredentialScheme: Send + Sync {
    /// Derive the stored verifier for a new account's secret.
    fn derive(&self, secret: &str) -> String;

    /// Check a presented secret against a stored verifier.
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Default scheme: hex-encoded SHA-256 of the secret.
///
/// Deliberately minimal. Credential hardening is outside the ledger's
/// responsibility; deployments front this with a real KDF behind the same
/// trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Credentials;

impl CredentialScheme for Sha256Credentials {
    fn derive(&self, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        self.derive(secret) == hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let scheme = Sha256Credentials;
        assert_eq!(scheme.derive("hunter2"), scheme.derive("hunter2"));
        assert_ne!(scheme.derive("hunter2"), scheme.derive("hunter3"));
    }

    #[test]
    fn test_verify_roundtrip() {
        let scheme = Sha256Credentials;
        let hash = scheme.derive("s3cret");
        assert!(scheme.verify("s3cret", &hash));
        assert!(!scheme.verify("wrong", &hash));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let scheme = Sha256Credentials;
        let hash = scheme.derive("");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
