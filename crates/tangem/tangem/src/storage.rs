//! Platform capabilities for persistent secrets.
//!
//! The engine never talks to a keychain or a hardware enclave directly; hosts
//! inject implementations of [`SecureStorage`] and [`SecureEnclave`]. The
//! in-memory versions here back the tests and simple integrations.

use std::{collections::HashMap, fmt::Debug};

use k256::ecdsa::{
    Signature, SigningKey,
    signature::{Signer, Verifier},
};
use parking_lot::Mutex;
use rand_v8::thread_rng;

use crate::StorageError;

/// Key-value store for secret blobs
pub trait SecureStorage: Send + Sync + Debug {
    /// Store a value, replacing any previous one
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Fetch a value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete a value, succeeding if it was absent
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Device-bound signing key
pub trait SecureEnclave: Send + Sync + Debug {
    /// Sign a message
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, StorageError>;

    /// Verify a signature produced by [`sign`](Self::sign)
    fn verify(&self, signature: &[u8], message: &[u8]) -> Result<bool, StorageError>;
}

/// [`SecureStorage`] held in process memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecureStorage for MemoryStorage {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// [`SecureEnclave`] backed by an in-memory secp256k1 ECDSA key
pub struct MemoryEnclave {
    key: SigningKey,
}

impl MemoryEnclave {
    /// Generate a fresh key
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut thread_rng()),
        }
    }
}

impl Default for MemoryEnclave {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MemoryEnclave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEnclave").finish_non_exhaustive()
    }
}

impl SecureEnclave for MemoryEnclave {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, StorageError> {
        let signature: Signature = self.key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, signature: &[u8], message: &[u8]) -> Result<bool, StorageError> {
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(self
            .key
            .verifying_key()
            .verify(message, &signature)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);

        storage.store("a", b"one").unwrap();
        storage.store("a", b"two").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(storage.len(), 1);

        storage.delete("a").unwrap();
        storage.delete("a").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_enclave() {
        let enclave = MemoryEnclave::new();
        let signature = enclave.sign(b"message").unwrap();
        assert!(enclave.verify(&signature, b"message").unwrap());
        assert!(!enclave.verify(&signature, b"massage").unwrap());
        assert!(!enclave.verify(&[0u8; 3], b"message").unwrap());

        let other = MemoryEnclave::new();
        assert!(!other.verify(&signature, b"message").unwrap());
    }
}
