//! Payload security boundary for subsystems in separate trust domains.
//!
//! - [`PayloadCipher`] seal/open contract, keyed by a [`SessionKey`]
//! - [`Plaintext`] identity collaborator
//! - [`SealedBus`] bus wrapper that seals on publish and opens on poll
//! - `AesGcmCipher` AES-256-GCM collaborator (feature `aes-gcm`)

#[cfg(feature = "aes-gcm")]
mod aes;
mod boundary;
mod cipher;

#[cfg(feature = "aes-gcm")]
pub use aes::AesGcmCipher;
pub use boundary::SealedBus;
pub use cipher::{PayloadCipher, Plaintext, SessionKey};
