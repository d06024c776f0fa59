//! # AES-256-GCM payload cipher.
//!
//! Sealed layout: `nonce (12 bytes) || ciphertext+tag`. A fresh random nonce
//! is drawn for every payload. The envelope header is authenticated as
//! associated data and never stored in the sealed bytes.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;

use crate::error::CipherError;

use super::cipher::{PayloadCipher, SessionKey};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Authenticated encryption collaborator keyed by a [`SessionKey`].
pub struct AesGcmCipher {
    aead: Aes256Gcm,
}

impl AesGcmCipher {
    /// Creates a cipher for one session.
    pub fn new(key: &SessionKey) -> Result<Self, CipherError> {
        let aead = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CipherError::InvalidKey {
            len: key.as_bytes().len(),
            expected: SessionKey::LEN,
        })?;
        Ok(Self { aead })
    }
}

impl PayloadCipher for AesGcmCipher {
    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Bytes, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|e| CipherError::Seal(e.to_string()))?;

        let mut out = BytesMut::with_capacity(NONCE_LEN + ciphertext.len());
        out.put_slice(&nonce);
        out.put_slice(&ciphertext);
        Ok(out.freeze())
    }

    fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Bytes, CipherError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated { len: sealed.len() });
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plain = self
            .aead
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|e| CipherError::Open(e.to_string()))?;
        Ok(Bytes::from(plain))
    }

    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, PayloadKind};

    const HDR: &[u8] = b"telemetry.arm\0arm\0hdr";

    #[test]
    fn open_reverses_seal() {
        let cipher = AesGcmCipher::new(&SessionKey::generate()).unwrap();
        let sealed = cipher.seal(b"joint=4 angle=0.25", HDR).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"joint=4 angle=0.25");
        assert_eq!(cipher.open(&sealed, HDR).unwrap().as_ref(), b"joint=4 angle=0.25");
    }

    #[test]
    fn tampering_and_foreign_keys_are_rejected() {
        let cipher = AesGcmCipher::new(&SessionKey::generate()).unwrap();
        let mut sealed = cipher.seal(b"payload", HDR).unwrap().to_vec();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(cipher.open(&sealed, HDR), Err(CipherError::Open(_))));

        let other = AesGcmCipher::new(&SessionKey::generate()).unwrap();
        let sealed = cipher.seal(b"payload", HDR).unwrap();
        assert!(other.open(&sealed, HDR).is_err());

        assert_eq!(
            cipher.open(&[0u8; 4], HDR).unwrap_err(),
            CipherError::Truncated { len: 4 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn payload_replayed_under_another_header_is_rejected() {
        let cipher = AesGcmCipher::new(&SessionKey::generate()).unwrap();
        let original = Envelope::new("control.arm", "orchestrator", 3, PayloadKind::Command, Vec::new());
        let sealed = cipher.seal(b"restart", &original.associated_data()).unwrap();
        assert!(cipher.open(&sealed, &original.associated_data()).is_ok());

        let replays = [
            Envelope::new("control.motor", "orchestrator", 3, PayloadKind::Command, Vec::new()),
            Envelope::new("control.arm", "intruder", 3, PayloadKind::Command, Vec::new()),
            Envelope::new("control.arm", "orchestrator", 9, PayloadKind::Command, Vec::new()),
            Envelope::new("control.arm", "orchestrator", 3, PayloadKind::Data, Vec::new()),
        ];
        for replay in replays {
            assert!(
                matches!(cipher.open(&sealed, &replay.associated_data()), Err(CipherError::Open(_))),
                "{}/{}/{} opened",
                replay.topic,
                replay.sender_id,
                replay.sequence
            );
        }
    }
}
