//! # Payload cipher contract.
//!
//! The bus never assumes a cipher. Anything that can turn plaintext into
//! opaque bytes and back implements [`PayloadCipher`]; the collaborator is
//! keyed by a per-session [`SessionKey`].
//!
//! - [`Plaintext`] identity transform for subsystems in one trust domain.
//! - `AesGcmCipher` (feature `aes-gcm`) authenticated encryption.

use bytes::Bytes;
use rand::RngCore;

use crate::error::CipherError;

/// Encrypt/decrypt collaborator applied to envelope payloads at a trust boundary.
///
/// `aad` is the envelope's [`associated_data`](crate::Envelope::associated_data).
/// Invariant: `open(seal(p, aad), aad) == p` for every payload `p`. An
/// authenticating cipher fails `open` when `aad` differs from the one sealed.
pub trait PayloadCipher: Send + Sync + 'static {
    /// Transforms plaintext into the bytes carried on the bus.
    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Bytes, CipherError>;

    /// Recovers plaintext from bytes carried on the bus.
    fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Bytes, CipherError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Identity cipher: payloads cross the boundary unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plaintext;

impl PayloadCipher for Plaintext {
    fn seal(&self, plaintext: &[u8], _aad: &[u8]) -> Result<Bytes, CipherError> {
        Ok(Bytes::copy_from_slice(plaintext))
    }

    fn open(&self, sealed: &[u8], _aad: &[u8]) -> Result<Bytes, CipherError> {
        Ok(Bytes::copy_from_slice(sealed))
    }

    fn name(&self) -> &'static str {
        "plaintext"
    }
}

/// Symmetric key shared by the two ends of one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SessionKey::LEN]);

impl SessionKey {
    /// Key length in bytes.
    pub const LEN: usize = 32;

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; Self::LEN];
        rand::rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Wraps existing key material.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; Self::LEN] = bytes.try_into().map_err(|_| CipherError::InvalidKey {
            len: bytes.len(),
            expected: Self::LEN,
        })?;
        Ok(Self(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_is_identity() {
        let sealed = Plaintext.seal(b"torque=3", b"hdr").unwrap();
        assert_eq!(Plaintext.open(&sealed, b"other").unwrap().as_ref(), b"torque=3");
    }

    #[test]
    fn session_keys_are_random_and_length_checked() {
        assert_ne!(SessionKey::generate(), SessionKey::generate());
        let err = SessionKey::from_slice(&[0u8; 16]).unwrap_err();
        assert_eq!(err, CipherError::InvalidKey { len: 16, expected: 32 });
        assert_eq!(format!("{:?}", SessionKey::generate()), "SessionKey(<redacted>)");
    }
}
