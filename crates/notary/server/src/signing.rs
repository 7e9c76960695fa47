use core::fmt;

use eyre::{eyre, Result};
use pkcs8::{
    der::Encode, AssociatedOid, DecodePrivateKey, EncodePublicKey, LineEnding, ObjectIdentifier,
    PrivateKeyInfo,
};
use rand06_compat::Rand0_6CompatExt;
use tlsproof_core::signing::{Secp256k1Signer, Secp256r1Signer, SignatureAlgId, Signer};
use tracing::error;

/// A key used by the notary to sign attestations.
pub struct AttestationKey {
    alg_id: SignatureAlgId,
    key: SigningKey,
}

impl TryFrom<PrivateKeyInfo<'_>> for AttestationKey {
    type Error = pkcs8::Error;

    fn try_from(pkcs8: PrivateKeyInfo<'_>) -> Result<Self, Self::Error> {
        const OID_EC_PUBLIC_KEY: ObjectIdentifier =
            ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

        // Only elliptic curve keys are supported.
        if pkcs8.algorithm.oid != OID_EC_PUBLIC_KEY {
            error!("unsupported key algorithm OID: {:?}", pkcs8.algorithm.oid);

            return Err(pkcs8::Error::KeyMalformed);
        }

        let der = pkcs8.to_der()?;
        let (alg_id, key) = match pkcs8.algorithm.parameters_oid()? {
            k256::Secp256k1::OID => {
                let key = k256::ecdsa::SigningKey::from_pkcs8_der(&der)
                    .map_err(|_| pkcs8::Error::KeyMalformed)?;
                (SignatureAlgId::SECP256K1, SigningKey::Secp256k1(key))
            }
            p256::NistP256::OID => {
                let key = p256::ecdsa::SigningKey::from_pkcs8_der(&der)
                    .map_err(|_| pkcs8::Error::KeyMalformed)?;
                (SignatureAlgId::SECP256R1, SigningKey::Secp256r1(key))
            }
            oid => {
                error!("unsupported curve OID: {:?}", oid);

                return Err(pkcs8::Error::KeyMalformed);
            }
        };

        Ok(Self { alg_id, key })
    }
}

impl AttestationKey {
    /// Generates a random key for the given algorithm.
    pub fn random(alg: &str) -> Result<Self> {
        let alg_id = alg
            .parse::<SignatureAlgId>()
            .map_err(|err| eyre!("{err}: {alg}"))?;

        let mut rng = rand::rng().compat();
        let key = match alg_id {
            SignatureAlgId::SECP256K1 => {
                SigningKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut rng))
            }
            SignatureAlgId::SECP256R1 => {
                SigningKey::Secp256r1(p256::ecdsa::SigningKey::random(&mut rng))
            }
            alg_id => return Err(eyre!("unsupported signature algorithm: {alg_id}")),
        };

        Ok(Self { alg_id, key })
    }

    /// Returns the algorithm of the signatures made with this key.
    pub fn alg_id(&self) -> SignatureAlgId {
        self.alg_id
    }

    /// Returns the verifying key as a PEM SubjectPublicKeyInfo.
    pub fn verifying_key_pem(&self) -> Result<String> {
        let pem = match &self.key {
            SigningKey::Secp256k1(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
            SigningKey::Secp256r1(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
        };

        pem.map_err(|err| eyre!("failed to encode verifying key: {err}"))
    }

    /// Creates a new signer using this key.
    pub fn into_signer(self) -> Result<Box<dyn Signer + Send + Sync>> {
        let signer: Box<dyn Signer + Send + Sync> = match self.key {
            SigningKey::Secp256k1(key) => Box::new(Secp256k1Signer::new(&key.to_bytes())?),
            SigningKey::Secp256r1(key) => Box::new(Secp256r1Signer::new(&key.to_bytes())?),
        };

        Ok(signer)
    }
}

impl fmt::Debug for AttestationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationKey")
            .field("alg_id", &self.alg_id)
            .finish_non_exhaustive()
    }
}

enum SigningKey {
    Secp256k1(k256::ecdsa::SigningKey),
    Secp256r1(p256::ecdsa::SigningKey),
}
