//! Per-session key material.
//!
//! The session prepares three pieces of key material and hands them to
//! the ctrl and stream channels: the RP crypt auth context (derived from
//! target, nonce and the registration's `morning` secret), a random
//! 16-byte handshake key, and an ECDH key pair. The symmetric RP crypt
//! cipher itself lives in the channel implementations; this module only
//! assembles what it is keyed from.

use rand::RngExt;
use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey};
use ring::rand::SystemRandom;

use crate::error::{Result, SessionError};
use crate::target::Target;

/// Size of the RP crypt key material units (nonce, morning, derived keys).
pub const RPCRYPT_KEY_SIZE: usize = 16;

/// Size of the stream handshake key.
pub const HANDSHAKE_KEY_SIZE: usize = 16;

/// Auth-mode RP crypt context.
///
/// Holds the material the channel ciphers derive their per-session keys
/// from. Built once after a successful session request and cloned into
/// each channel context.
#[derive(Debug, Clone)]
pub struct RpCrypt {
    target: Target,
    nonce: [u8; RPCRYPT_KEY_SIZE],
    morning: [u8; RPCRYPT_KEY_SIZE],
}

impl RpCrypt {
    /// Initialize the auth context from the console's nonce and the
    /// registration secret.
    pub fn new_auth(
        target: Target,
        nonce: [u8; RPCRYPT_KEY_SIZE],
        morning: [u8; RPCRYPT_KEY_SIZE],
    ) -> Self {
        RpCrypt {
            target,
            nonce,
            morning,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn nonce(&self) -> &[u8; RPCRYPT_KEY_SIZE] {
        &self.nonce
    }

    pub fn morning(&self) -> &[u8; RPCRYPT_KEY_SIZE] {
        &self.morning
    }
}

/// Per-session ECDH context.
///
/// Generated in the crypto-prep phase and borrowed by the stream channel
/// for the duration of [`StreamConnection::run`](crate::StreamConnection::run).
/// The private key is consumed when the shared secret is derived.
pub struct Ecdh {
    private_key: EphemeralPrivateKey,
    public_key: agreement::PublicKey,
}

impl Ecdh {
    pub fn new() -> Result<Self> {
        let rng = SystemRandom::new();
        let private_key = EphemeralPrivateKey::generate(&agreement::ECDH_P256, &rng)
            .map_err(|_| SessionError::Unknown)?;
        let public_key = private_key
            .compute_public_key()
            .map_err(|_| SessionError::Unknown)?;
        Ok(Ecdh {
            private_key,
            public_key,
        })
    }

    /// Local public key, to be sent to the peer.
    pub fn public_key(&self) -> &[u8] {
        self.public_key.as_ref()
    }

    /// Derive the shared secret from the peer's public key, consuming
    /// the private key.
    pub fn derive_shared_secret(self, peer_public_key: &[u8]) -> Result<Vec<u8>> {
        let peer = UnparsedPublicKey::new(&agreement::ECDH_P256, peer_public_key);
        agreement::agree_ephemeral(self.private_key, &peer, SessionError::Unknown, |secret| {
            Ok(secret.to_vec())
        })
    }
}

/// Generate the random stream handshake key.
pub(crate) fn generate_handshake_key() -> [u8; HANDSHAKE_KEY_SIZE] {
    rand::rng().random()
}
