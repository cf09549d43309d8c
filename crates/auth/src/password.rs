//! Salted password digests.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

/// `salt$sha256(salt || password)`, both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn hash(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::with_salt(&salt, password)
    }

    fn with_salt(salt: &[u8], password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        Self(format!("{}${}", hex(salt), hex(&hasher.finalize())))
    }

    pub fn verify(&self, password: &str) -> bool {
        let Some((salt_hex, _)) = self.0.split_once('$') else {
            return false;
        };
        let Some(salt) = unhex(salt_hex) else {
            return false;
        };
        let candidate = Self::with_salt(&salt, password);
        constant_time_eq(candidate.0.as_bytes(), self.0.as_bytes())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_the_original_password_only() {
        let digest = PasswordDigest::hash("foobar123");
        assert!(digest.verify("foobar123"));
        assert!(!digest.verify("foobar124"));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(PasswordDigest::hash("same"), PasswordDigest::hash("same"));
    }

    #[test]
    fn malformed_digests_never_verify() {
        assert!(!PasswordDigest("nonsense".to_string()).verify("x"));
        assert!(!PasswordDigest("zz$00".to_string()).verify("x"));
    }
}
