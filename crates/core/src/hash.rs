//! Hash types.

use std::{collections::HashMap, fmt, sync::Arc};

use rand::distr::{Distribution, StandardUniform};
use serde::{Deserialize, Serialize};

use crate::serialize::{CanonicalSerialize, DomainSeparator};

pub(crate) use crate::serialize::impl_domain_separator;

/// Maximum length of a hash value.
const MAX_LEN: usize = 32;

/// Hash algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashAlgId(u8);

impl HashAlgId {
    /// SHA-256 hash algorithm.
    pub const SHA256: Self = Self(1);
    /// BLAKE3 hash algorithm.
    pub const BLAKE3: Self = Self(2);

    /// Creates a new hash algorithm identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier is in the reserved range 0-127.
    pub const fn new(id: u8) -> Self {
        assert!(id >= 128, "hash algorithm id range 0-127 is reserved");

        Self(id)
    }

    /// Returns the id as a `u8`.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for HashAlgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HashAlgId::SHA256 => write!(f, "sha256"),
            HashAlgId::BLAKE3 => write!(f, "blake3"),
            _ => write!(f, "custom({:02x})", self.0),
        }
    }
}

/// A typed hash value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedHash {
    /// The algorithm of the hash.
    pub alg: HashAlgId,
    /// The hash value.
    pub value: Hash,
}

/// A hash value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Hash {
    value: [u8; MAX_LEN],
    len: usize,
}

impl Hash {
    /// Creates a new hash value from a slice.
    ///
    /// # Panics
    ///
    /// Panics if the slice is longer than 32 bytes.
    fn new(value: &[u8]) -> Self {
        assert!(value.len() <= MAX_LEN, "hash value must be at most 32 bytes");

        let mut bytes = [0; MAX_LEN];
        bytes[..value.len()].copy_from_slice(value);

        Self {
            value: bytes,
            len: value.len(),
        }
    }

    /// Returns the hash value as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.value[..self.len]
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.as_bytes()))
    }
}

impl From<Hash> for Vec<u8> {
    fn from(value: Hash) -> Self {
        value.as_bytes().to_vec()
    }
}

impl TryFrom<Vec<u8>> for Hash {
    type Error = &'static str;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() > MAX_LEN {
            return Err("hash value exceeds 32 bytes");
        }

        Ok(Self::new(&value))
    }
}

/// Error for [`HashProvider`].
#[derive(Debug, thiserror::Error)]
#[error("unknown hash algorithm id: {}", self.0)]
pub struct HashProviderError(HashAlgId);

/// Hash provider.
pub struct HashProvider {
    algs: HashMap<HashAlgId, Arc<dyn HashAlgorithm + Send + Sync>>,
}

impl Default for HashProvider {
    fn default() -> Self {
        let mut algs: HashMap<_, Arc<dyn HashAlgorithm + Send + Sync>> = HashMap::new();

        algs.insert(HashAlgId::SHA256, Arc::new(Sha256::default()));
        algs.insert(HashAlgId::BLAKE3, Arc::new(Blake3::default()));

        Self { algs }
    }
}

impl HashProvider {
    /// Sets a hash algorithm.
    ///
    /// This can be used to add or override implementations of hash algorithms.
    pub fn set_algorithm(
        &mut self,
        id: HashAlgId,
        algorithm: Box<dyn HashAlgorithm + Send + Sync>,
    ) {
        self.algs.insert(id, Arc::from(algorithm));
    }

    /// Returns the hash algorithm with the given identifier.
    pub fn get(
        &self,
        id: &HashAlgId,
    ) -> Result<&(dyn HashAlgorithm + Send + Sync), HashProviderError> {
        self.algs
            .get(id)
            .map(|alg| &**alg)
            .ok_or(HashProviderError(*id))
    }

    /// Returns a shared handle to the hash algorithm with the given identifier.
    pub fn get_shared(
        &self,
        id: &HashAlgId,
    ) -> Result<Arc<dyn HashAlgorithm + Send + Sync>, HashProviderError> {
        self.algs.get(id).cloned().ok_or(HashProviderError(*id))
    }
}

/// A hash algorithm.
pub trait HashAlgorithm {
    /// Returns the id of the hash algorithm.
    fn id(&self) -> HashAlgId;

    /// Computes the hash of the provided data.
    fn hash(&self, data: &[u8]) -> Hash;

    /// Computes the hash of the provided data with a prefix.
    fn hash_prefixed(&self, prefix: &[u8], data: &[u8]) -> Hash;
}

pub(crate) trait HashAlgorithmExt: HashAlgorithm {
    /// Hashes the canonical serialization of the data.
    #[allow(dead_code)]
    fn hash_canonical<T: CanonicalSerialize>(&self, data: &T) -> Hash {
        self.hash(&data.serialize())
    }

    /// Hashes the canonical serialization of the data, prefixed with its
    /// domain separator.
    fn hash_separated<T: DomainSeparator + CanonicalSerialize>(&self, data: &T) -> Hash {
        self.hash_prefixed(data.domain(), &data.serialize())
    }
}

impl<T: HashAlgorithm + ?Sized> HashAlgorithmExt for T {}

/// A hash blinder.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blinder([u8; 16]);

opaque_debug::implement!(Blinder);

impl Blinder {
    /// Creates a blinder from raw bytes.
    pub(crate) fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the blinder bytes.
    pub(crate) fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Distribution<Blinder> for StandardUniform {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Blinder {
        Blinder(self.sample(rng))
    }
}

/// A blinded pre-image of a hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blinded<T> {
    data: T,
    blinder: Blinder,
}

impl<T> Blinded<T> {
    /// Creates a new blinded pre-image.
    pub(crate) fn new_with_blinder(data: T, blinder: Blinder) -> Self {
        Self { data, blinder }
    }

    /// Returns the data.
    pub(crate) fn data(&self) -> &T {
        &self.data
    }

    /// Returns the blinder.
    #[allow(dead_code)]
    pub(crate) fn blinder(&self) -> &Blinder {
        &self.blinder
    }

    /// Returns the data and the blinder.
    pub(crate) fn into_parts(self) -> (T, Blinder) {
        (self.data, self.blinder)
    }
}

impl Blinded<Vec<u8>> {
    /// Computes the blinded hash, `H(data || blinder)`.
    pub(crate) fn hash(&self, hasher: &dyn HashAlgorithm) -> Hash {
        let mut buf = Vec::with_capacity(self.data.len() + 16);
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(&self.blinder.0);
        hasher.hash(&buf)
    }
}

/// SHA-256 hash algorithm.
#[derive(Default, Clone)]
pub struct Sha256 {}

impl HashAlgorithm for Sha256 {
    fn id(&self) -> HashAlgId {
        HashAlgId::SHA256
    }

    fn hash(&self, data: &[u8]) -> Hash {
        use sha2::Digest;
        Hash::new(sha2::Sha256::digest(data).as_slice())
    }

    fn hash_prefixed(&self, prefix: &[u8], data: &[u8]) -> Hash {
        use sha2::Digest;
        let mut hasher = sha2::Sha256::default();
        hasher.update(prefix);
        hasher.update(data);
        Hash::new(hasher.finalize().as_slice())
    }
}

/// BLAKE3 hash algorithm.
#[derive(Default, Clone)]
pub struct Blake3 {}

impl HashAlgorithm for Blake3 {
    fn id(&self) -> HashAlgId {
        HashAlgId::BLAKE3
    }

    fn hash(&self, data: &[u8]) -> Hash {
        Hash::new(blake3::hash(data).as_bytes())
    }

    fn hash_prefixed(&self, prefix: &[u8], data: &[u8]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(prefix);
        hasher.update(data);
        Hash::new(hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[derive(Serialize)]
    struct Separated(u8);

    impl_domain_separator!(Separated);

    #[rstest]
    #[case::sha256(HashAlgId::SHA256)]
    #[case::blake3(HashAlgId::BLAKE3)]
    fn test_provider_has_default_algs(#[case] id: HashAlgId) {
        let provider = HashProvider::default();
        assert_eq!(provider.get(&id).unwrap().id(), id);
    }

    #[test]
    fn test_provider_unknown_alg() {
        let provider = HashProvider::default();
        assert!(provider.get(&HashAlgId::new(200)).is_err());
    }

    #[rstest]
    #[case::sha256(Sha256::default())]
    #[case::blake3(Blake3::default())]
    fn test_domain_separation<H: HashAlgorithm>(#[case] hasher: H) {
        let data = Separated(1);
        assert_ne!(hasher.hash_canonical(&data), hasher.hash_separated(&data));
    }

    #[rstest]
    #[case::sha256(Sha256::default())]
    #[case::blake3(Blake3::default())]
    fn test_blinded_hash_depends_on_blinder<H: HashAlgorithm>(#[case] hasher: H) {
        let a = Blinded::new_with_blinder(b"hello".to_vec(), Blinder::new([0; 16]));
        let b = Blinded::new_with_blinder(b"hello".to_vec(), Blinder::new([1; 16]));
        assert_ne!(a.hash(&hasher), b.hash(&hasher));
    }

    #[test]
    fn test_hash_vec_conversion() {
        let hash = Blake3::default().hash(b"data");
        let bytes: Vec<u8> = hash.into();
        assert_eq!(Hash::try_from(bytes).unwrap(), hash);
        assert!(Hash::try_from(vec![0u8; 33]).is_err());
    }
}
