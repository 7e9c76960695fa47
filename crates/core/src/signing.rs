//! Cryptographic signatures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::hash::impl_domain_separator;

/// Key algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAlgId(u8);

impl KeyAlgId {
    /// secp256k1 elliptic curve key algorithm.
    pub const K256: Self = Self(1);
    /// NIST P-256 elliptic curve key algorithm.
    pub const P256: Self = Self(2);

    /// Returns the id as a `u8`.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for KeyAlgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            KeyAlgId::K256 => write!(f, "k256"),
            KeyAlgId::P256 => write!(f, "p256"),
            _ => write!(f, "custom({:02x})", self.0),
        }
    }
}

/// Signature algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureAlgId(u8);

impl SignatureAlgId {
    /// secp256k1 signature algorithm.
    pub const SECP256K1: Self = Self(1);
    /// secp256r1 signature algorithm.
    pub const SECP256R1: Self = Self(2);

    /// Returns the id as a `u8`.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for SignatureAlgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SignatureAlgId::SECP256K1 => write!(f, "secp256k1"),
            SignatureAlgId::SECP256R1 => write!(f, "secp256r1"),
            _ => write!(f, "custom({:02x})", self.0),
        }
    }
}

impl std::str::FromStr for SignatureAlgId {
    type Err = UnknownSignatureAlgId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(Self::SECP256K1),
            "secp256r1" | "p256" => Ok(Self::SECP256R1),
            _ => Err(UnknownSignatureAlgId(None)),
        }
    }
}

/// Unknown signature algorithm error.
#[derive(Debug, thiserror::Error)]
#[error("unknown signature algorithm id: {0:?}")]
pub struct UnknownSignatureAlgId(Option<SignatureAlgId>);

/// Provider of signers.
#[derive(Default)]
pub struct SignerProvider {
    signers: HashMap<SignatureAlgId, Box<dyn Signer + Send + Sync>>,
}

impl SignerProvider {
    /// Returns the supported signature algorithms.
    pub fn supported_algs(&self) -> impl Iterator<Item = SignatureAlgId> + '_ {
        self.signers.keys().copied()
    }

    /// Sets a signer, keyed by its algorithm.
    pub fn set_signer(&mut self, signer: Box<dyn Signer + Send + Sync>) {
        self.signers.insert(signer.alg_id(), signer);
    }

    /// Configures a secp256k1 signer with the provided signing key.
    pub fn set_secp256k1(&mut self, key: &[u8]) -> Result<&mut Self, SignerError> {
        self.set_signer(Box::new(Secp256k1Signer::new(key)?));

        Ok(self)
    }

    /// Configures a secp256r1 signer with the provided signing key.
    pub fn set_secp256r1(&mut self, key: &[u8]) -> Result<&mut Self, SignerError> {
        self.set_signer(Box::new(Secp256r1Signer::new(key)?));

        Ok(self)
    }

    /// Returns a signer for the given algorithm.
    pub fn get(
        &self,
        alg: &SignatureAlgId,
    ) -> Result<&(dyn Signer + Send + Sync), UnknownSignatureAlgId> {
        self.signers
            .get(alg)
            .map(|s| &**s)
            .ok_or(UnknownSignatureAlgId(Some(*alg)))
    }
}

/// Error for [`Signer`].
#[derive(Debug, thiserror::Error)]
#[error("signer error: {0}")]
pub struct SignerError(String);

/// Cryptographic signer.
pub trait Signer {
    /// Returns the algorithm used by this signer.
    fn alg_id(&self) -> SignatureAlgId;

    /// Signs the message.
    fn sign(&self, msg: &[u8]) -> Result<Signature, SignatureError>;

    /// Returns the verifying key for this signer.
    fn verifying_key(&self) -> VerifyingKey;
}

/// Provider of signature verifiers.
pub struct SignatureVerifierProvider {
    verifiers: HashMap<SignatureAlgId, Box<dyn SignatureVerifier + Send + Sync>>,
}

impl Default for SignatureVerifierProvider {
    fn default() -> Self {
        let mut verifiers = HashMap::new();

        verifiers.insert(SignatureAlgId::SECP256K1, Box::new(Secp256k1Verifier) as _);
        verifiers.insert(SignatureAlgId::SECP256R1, Box::new(Secp256r1Verifier) as _);

        Self { verifiers }
    }
}

impl SignatureVerifierProvider {
    /// Sets a verifier for the given algorithm.
    pub fn set_verifier(
        &mut self,
        alg: SignatureAlgId,
        verifier: Box<dyn SignatureVerifier + Send + Sync>,
    ) {
        self.verifiers.insert(alg, verifier);
    }

    /// Returns the verifier for the given algorithm.
    pub fn get(
        &self,
        alg: &SignatureAlgId,
    ) -> Result<&(dyn SignatureVerifier + Send + Sync), UnknownSignatureAlgId> {
        self.verifiers
            .get(alg)
            .map(|s| &**s)
            .ok_or(UnknownSignatureAlgId(Some(*alg)))
    }
}

/// Signature verifier.
pub trait SignatureVerifier {
    /// Returns the algorithm used by this verifier.
    fn alg_id(&self) -> SignatureAlgId;

    /// Verifies the signature.
    fn verify(&self, key: &VerifyingKey, msg: &[u8], sig: &[u8]) -> Result<(), SignatureError>;
}

/// Verifying key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyingKey {
    /// The key algorithm.
    pub alg: KeyAlgId,
    /// The key data, SEC1 encoded.
    pub data: Vec<u8>,
}

impl_domain_separator!(VerifyingKey);

impl VerifyingKey {
    /// Parses a verifying key from a PEM encoded SubjectPublicKeyInfo.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, SignatureError> {
        use k256::pkcs8::DecodePublicKey;

        if let Ok(key) = k256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self {
                alg: KeyAlgId::K256,
                data: key.to_sec1_bytes().to_vec(),
            });
        }

        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self {
                alg: KeyAlgId::P256,
                data: key.to_sec1_bytes().to_vec(),
            });
        }

        Err(SignatureError("unsupported or malformed public key pem".to_string()))
    }

    /// Encodes the key as a PEM SubjectPublicKeyInfo.
    pub fn to_public_key_pem(&self) -> Result<String, SignatureError> {
        use k256::pkcs8::{EncodePublicKey, LineEnding};

        let pem = match self.alg {
            KeyAlgId::K256 => k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.data)
                .map_err(|_| SignatureError("invalid k256 key".to_string()))?
                .to_public_key_pem(LineEnding::LF),
            KeyAlgId::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.data)
                .map_err(|_| SignatureError("invalid p256 key".to_string()))?
                .to_public_key_pem(LineEnding::LF),
            alg => return Err(SignatureError(format!("unsupported key algorithm: {alg}"))),
        };

        pem.map_err(|err| SignatureError(err.to_string()))
    }
}

/// Error occurred while verifying a signature.
#[derive(Debug, thiserror::Error)]
#[error("signature verification failed: {0}")]
pub struct SignatureError(String);

/// A signature.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signature {
    /// The algorithm used to sign the data.
    pub alg: SignatureAlgId,
    /// The signature data.
    pub data: Vec<u8>,
}

mod secp256k1 {
    use std::sync::{Arc, Mutex};

    use k256::ecdsa::{
        signature::{SignerMut, Verifier},
        Signature as Secp256K1Signature, SigningKey,
    };

    use super::*;

    /// secp256k1 signer.
    pub struct Secp256k1Signer(Arc<Mutex<SigningKey>>);

    impl Secp256k1Signer {
        /// Creates a new secp256k1 signer with the provided signing key.
        pub fn new(key: &[u8]) -> Result<Self, SignerError> {
            SigningKey::from_slice(key)
                .map(|key| Self(Arc::new(Mutex::new(key))))
                .map_err(|_| SignerError("invalid key".to_string()))
        }
    }

    impl Signer for Secp256k1Signer {
        fn alg_id(&self) -> SignatureAlgId {
            SignatureAlgId::SECP256K1
        }

        fn sign(&self, msg: &[u8]) -> Result<Signature, SignatureError> {
            let mut key = self
                .0
                .lock()
                .map_err(|_| SignatureError("signing key lock poisoned".to_string()))?;
            let sig: Secp256K1Signature = key.sign(msg);

            Ok(Signature {
                alg: SignatureAlgId::SECP256K1,
                data: sig.to_vec(),
            })
        }

        fn verifying_key(&self) -> VerifyingKey {
            let key = match self.0.lock() {
                Ok(key) => *key.verifying_key(),
                Err(poisoned) => *poisoned.into_inner().verifying_key(),
            };

            VerifyingKey {
                alg: KeyAlgId::K256,
                data: key.to_sec1_bytes().to_vec(),
            }
        }
    }

    /// secp256k1 verifier.
    pub struct Secp256k1Verifier;

    impl SignatureVerifier for Secp256k1Verifier {
        fn alg_id(&self) -> SignatureAlgId {
            SignatureAlgId::SECP256K1
        }

        fn verify(&self, key: &VerifyingKey, msg: &[u8], sig: &[u8]) -> Result<(), SignatureError> {
            if key.alg != KeyAlgId::K256 {
                return Err(SignatureError("key algorithm is not k256".to_string()));
            }

            let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&key.data)
                .map_err(|_| SignatureError("invalid k256 key".to_string()))?;

            let sig = Secp256K1Signature::from_slice(sig)
                .map_err(|_| SignatureError("invalid secp256k1 signature".to_string()))?;

            key.verify(msg, &sig).map_err(|_| {
                SignatureError("secp256k1 signature verification failed".to_string())
            })?;

            Ok(())
        }
    }
}

pub use secp256k1::{Secp256k1Signer, Secp256k1Verifier};

mod secp256r1 {
    use std::sync::{Arc, Mutex};

    use p256::ecdsa::{
        signature::{SignerMut, Verifier},
        Signature as Secp256R1Signature, SigningKey,
    };

    use super::*;

    /// secp256r1 signer.
    pub struct Secp256r1Signer(Arc<Mutex<SigningKey>>);

    impl Secp256r1Signer {
        /// Creates a new secp256r1 signer with the provided signing key.
        pub fn new(key: &[u8]) -> Result<Self, SignerError> {
            SigningKey::from_slice(key)
                .map(|key| Self(Arc::new(Mutex::new(key))))
                .map_err(|_| SignerError("invalid key".to_string()))
        }
    }

    impl Signer for Secp256r1Signer {
        fn alg_id(&self) -> SignatureAlgId {
            SignatureAlgId::SECP256R1
        }

        fn sign(&self, msg: &[u8]) -> Result<Signature, SignatureError> {
            let mut key = self
                .0
                .lock()
                .map_err(|_| SignatureError("signing key lock poisoned".to_string()))?;
            let sig: Secp256R1Signature = key.sign(msg);

            Ok(Signature {
                alg: SignatureAlgId::SECP256R1,
                data: sig.to_vec(),
            })
        }

        fn verifying_key(&self) -> VerifyingKey {
            let key = match self.0.lock() {
                Ok(key) => *key.verifying_key(),
                Err(poisoned) => *poisoned.into_inner().verifying_key(),
            };

            VerifyingKey {
                alg: KeyAlgId::P256,
                data: key.to_sec1_bytes().to_vec(),
            }
        }
    }

    /// secp256r1 verifier.
    pub struct Secp256r1Verifier;

    impl SignatureVerifier for Secp256r1Verifier {
        fn alg_id(&self) -> SignatureAlgId {
            SignatureAlgId::SECP256R1
        }

        fn verify(&self, key: &VerifyingKey, msg: &[u8], sig: &[u8]) -> Result<(), SignatureError> {
            if key.alg != KeyAlgId::P256 {
                return Err(SignatureError("key algorithm is not p256".to_string()));
            }

            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&key.data)
                .map_err(|_| SignatureError("invalid p256 key".to_string()))?;

            let sig = Secp256R1Signature::from_slice(sig)
                .map_err(|_| SignatureError("invalid secp256r1 signature".to_string()))?;

            key.verify(msg, &sig).map_err(|_| {
                SignatureError("secp256r1 signature verification failed".to_string())
            })?;

            Ok(())
        }
    }
}

pub use secp256r1::{Secp256r1Signer, Secp256r1Verifier};

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn secp256k1_signer() -> Secp256k1Signer {
        Secp256k1Signer::new(&[1u8; 32]).unwrap()
    }

    #[fixture]
    fn secp256r1_signer() -> Secp256r1Signer {
        Secp256r1Signer::new(&[1u8; 32]).unwrap()
    }

    #[rstest]
    fn test_secp256k1_success(secp256k1_signer: Secp256k1Signer) {
        let msg = "test message";
        let signature = secp256k1_signer.sign(msg.as_bytes()).unwrap();

        assert!(Secp256k1Verifier
            .verify(
                &secp256k1_signer.verifying_key(),
                msg.as_bytes(),
                &signature.data
            )
            .is_ok());
    }

    #[rstest]
    fn test_secp256r1_success(secp256r1_signer: Secp256r1Signer) {
        let msg = "test message";
        let signature = secp256r1_signer.sign(msg.as_bytes()).unwrap();

        assert!(Secp256r1Verifier
            .verify(
                &secp256r1_signer.verifying_key(),
                msg.as_bytes(),
                &signature.data
            )
            .is_ok());
    }

    #[rstest]
    #[case::wrong_signer(&Secp256k1Signer::new(&[2u8; 32]).unwrap(), false, false)]
    #[case::corrupted_signature(&Secp256k1Signer::new(&[1u8; 32]).unwrap(), true, false)]
    #[case::wrong_message(&Secp256k1Signer::new(&[1u8; 32]).unwrap(), false, true)]
    fn test_secp256k1_fail(
        #[case] wrong_signer: &Secp256k1Signer,
        #[case] corrupted_signature: bool,
        #[case] wrong_message: bool,
        secp256k1_signer: Secp256k1Signer,
    ) {
        let msg = "test message";
        let mut signature = wrong_signer.sign(msg.as_bytes()).unwrap();

        if corrupted_signature {
            signature.data.push(0);
        }

        let msg = if wrong_message { "different message" } else { msg };

        assert!(Secp256k1Verifier
            .verify(
                &secp256k1_signer.verifying_key(),
                msg.as_bytes(),
                &signature.data
            )
            .is_err());
    }

    #[rstest]
    fn test_verifier_rejects_other_curve(
        secp256k1_signer: Secp256k1Signer,
        secp256r1_signer: Secp256r1Signer,
    ) {
        let signature = secp256r1_signer.sign(b"msg").unwrap();

        assert!(Secp256r1Verifier
            .verify(&secp256k1_signer.verifying_key(), b"msg", &signature.data)
            .is_err());
    }

    #[rstest]
    fn test_verifying_key_pem_roundtrip(secp256k1_signer: Secp256k1Signer) {
        let key = secp256k1_signer.verifying_key();
        let pem = key.to_public_key_pem().unwrap();

        assert_eq!(VerifyingKey::from_public_key_pem(&pem).unwrap(), key);
    }

    #[test]
    fn test_signature_alg_from_str() {
        assert_eq!(
            "secp256k1".parse::<SignatureAlgId>().unwrap(),
            SignatureAlgId::SECP256K1
        );
        assert_eq!(
            "SECP256R1".parse::<SignatureAlgId>().unwrap(),
            SignatureAlgId::SECP256R1
        );
        assert!("ed25519".parse::<SignatureAlgId>().is_err());
    }
}
