//! Root key material.
//!
//! The root key only ever lives in process memory. [`RootKey`] zeroizes its
//! buffer on drop and on replacement, compares in constant time, and never
//! prints its value through `Debug`.

use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Root key length in bytes.
pub const ROOT_KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("root key is not valid hex")]
    InvalidHex,

    #[error("root key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A fixed-length root key that is scrubbed from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey {
    bytes: [u8; ROOT_KEY_LEN],
}

impl RootKey {
    /// Generate a new key from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ROOT_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; ROOT_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse a hex-encoded key as carried on the Keeper wire.
    pub fn from_hex(encoded: &str) -> Result<Self, KeyDecodeError> {
        let decoded = Zeroizing::new(hex::decode(encoded).map_err(|_| KeyDecodeError::InvalidHex)?);
        if decoded.len() != ROOT_KEY_LEN {
            return Err(KeyDecodeError::InvalidLength {
                expected: ROOT_KEY_LEN,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; ROOT_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// Hex encoding for transport. The returned string is zeroized on drop.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_KEY_LEN] {
        &self.bytes
    }
}

impl PartialEq for RootKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for RootKey {}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey(<redacted>)")
    }
}

/// A root key together with its regeneration epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRootKey {
    pub key: RootKey,
    pub epoch: u64,
}

impl VersionedRootKey {
    pub fn new(key: RootKey, epoch: u64) -> Self {
        Self { key, epoch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = RootKey::generate();
        let b = RootKey::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_preserves_bytes() {
        let key = RootKey::generate();
        let encoded = key.to_hex();
        assert_eq!(encoded.len(), ROOT_KEY_LEN * 2);
        let parsed = RootKey::from_hex(&encoded).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert_eq!(RootKey::from_hex("zz").unwrap_err(), KeyDecodeError::InvalidHex);
        assert_eq!(
            RootKey::from_hex("abcd").unwrap_err(),
            KeyDecodeError::InvalidLength {
                expected: ROOT_KEY_LEN,
                actual: 2
            }
        );
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = RootKey::from_bytes([0xAB; ROOT_KEY_LEN]);
        let printed = format!("{:?}", VersionedRootKey::new(key, 3));
        assert!(!printed.to_lowercase().contains("abab"));
        assert!(printed.contains("redacted"));
    }
}
