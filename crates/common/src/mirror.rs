//! Key agreement and authentication of mirrored frames.
//!
//! Prover and Notary agree on a mirror key with ephemeral P-256 ECDH. The
//! shared secret is expanded with HKDF-SHA256, bound to the server name and
//! both key shares. Every [`MirrorFrame`] carries an HMAC-SHA256 tag under
//! that key.

use std::fmt;

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::{ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use rand06_compat::Rand0_6CompatExt;
use sha2::Sha256;
use zeroize::Zeroizing;

use tlsproof_core::transcript::Direction;

use crate::msgs::MirrorFrame;

type HmacSha256 = Hmac<Sha256>;

const KDF_INFO: &[u8] = b"tlsproof mirror key";

/// An ephemeral key share.
pub struct KeyShare {
    secret: SecretKey,
}

opaque_debug::implement!(KeyShare);

impl KeyShare {
    /// Generates a random key share.
    pub fn random() -> Self {
        Self {
            secret: SecretKey::random(&mut rand::rng().compat()),
        }
    }

    /// Returns the SEC1 encoded public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Derives the mirror key with the peer's key share.
    ///
    /// # Arguments
    ///
    /// * `peer` - The peer's SEC1 encoded public key.
    /// * `prover_share` - The Prover's SEC1 encoded public key.
    /// * `notary_share` - The Notary's SEC1 encoded public key.
    /// * `server_name` - Name of the server the session is for.
    pub fn derive(
        self,
        peer: &[u8],
        prover_share: &[u8],
        notary_share: &[u8],
        server_name: &str,
    ) -> Result<MirrorKey, KeyExchangeError> {
        let peer = PublicKey::from_sec1_bytes(peer)
            .map_err(|_| KeyExchangeError("invalid peer key share".to_string()))?;

        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());

        let mut salt = Vec::with_capacity(prover_share.len() + notary_share.len());
        salt.extend_from_slice(prover_share);
        salt.extend_from_slice(notary_share);

        let hk = Hkdf::<Sha256>::new(Some(&salt), shared.raw_secret_bytes().as_slice());
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(&[KDF_INFO, server_name.as_bytes()].concat(), &mut *key)
            .map_err(|err| KeyExchangeError(format!("failed to expand mirror key: {err}")))?;

        Ok(MirrorKey(key))
    }
}

/// Symmetric key authenticating mirrored frames.
pub struct MirrorKey(Zeroizing<[u8; 32]>);

opaque_debug::implement!(MirrorKey);

impl MirrorKey {
    /// Computes the tag of a frame.
    pub fn tag(&self, seq: u64, direction: Direction, data: &[u8]) -> [u8; 32] {
        self.mac(seq, direction, data).finalize().into_bytes().into()
    }

    /// Creates an authenticated frame.
    pub fn frame(&self, seq: u64, direction: Direction, data: Vec<u8>) -> MirrorFrame {
        let tag = self.tag(seq, direction, &data);
        MirrorFrame {
            seq,
            direction,
            data,
            tag,
        }
    }

    /// Checks the tag of a frame in constant time.
    pub fn verify(&self, frame: &MirrorFrame) -> bool {
        self.mac(frame.seq, frame.direction, &frame.data)
            .verify_slice(&frame.tag)
            .is_ok()
    }

    fn mac(&self, seq: u64, direction: Direction, data: &[u8]) -> HmacSha256 {
        let mut mac = new_mac(self.0.as_slice());
        mac.update(&seq.to_be_bytes());
        mac.update(&[direction as u8]);
        mac.update(data);
        mac
    }
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

/// Error for key agreement.
#[derive(Debug, thiserror::Error)]
pub struct KeyExchangeError(String);

impl fmt::Display for KeyExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key exchange error: {}", self.0)
    }
}
