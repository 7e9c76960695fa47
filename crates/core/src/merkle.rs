//! Merkle tree types.

use serde::{Deserialize, Serialize};

use crate::hash::{Hash, HashAlgId, HashAlgorithm, TypedHash};

/// Errors that can occur during operations with Merkle tree and Merkle proof
#[derive(Debug, thiserror::Error)]
#[error("merkle error: {0}")]
pub(crate) struct MerkleError(String);

impl MerkleError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A Merkle multi-proof for a set of leaves.
#[derive(Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    alg: HashAlgId,
    tree_len: usize,
    proof: rs_merkle::MerkleProof<Hash>,
}

opaque_debug::implement!(MerkleProof);

impl MerkleProof {
    /// Returns the hash algorithm of the tree.
    pub(crate) fn algorithm(&self) -> HashAlgId {
        self.alg
    }

    /// Returns the number of leaves in the tree this proof was made for.
    pub(crate) fn tree_len(&self) -> usize {
        self.tree_len
    }

    /// Checks that the provided leaves are included in the tree with the
    /// given root.
    pub(crate) fn verify(
        &self,
        hasher: &dyn HashAlgorithm,
        root: &TypedHash,
        leaves: impl IntoIterator<Item = (usize, Hash)>,
    ) -> Result<(), MerkleError> {
        if hasher.id() != self.alg || root.alg != self.alg {
            return Err(MerkleError::new("hash algorithm mismatch"));
        }

        let mut leaves = leaves.into_iter().collect::<Vec<_>>();
        leaves.sort_by_key(|(idx, _)| *idx);

        if leaves.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(MerkleError::new("duplicate leaf indices provided"));
        }

        if leaves.iter().any(|(idx, _)| *idx >= self.tree_len) {
            return Err(MerkleError::new("leaf index out of bounds"));
        }

        let (indices, leaves): (Vec<_>, Vec<_>) = leaves.into_iter().unzip();

        if !self.proof.verify(
            &RsMerkleHasher(hasher),
            root.value,
            &indices,
            &leaves,
            self.tree_len,
        ) {
            return Err(MerkleError::new("invalid merkle proof"));
        }

        Ok(())
    }
}

#[derive(Clone)]
struct RsMerkleHasher<'a>(&'a dyn HashAlgorithm);

impl rs_merkle::Hasher for RsMerkleHasher<'_> {
    type Hash = Hash;

    fn hash(&self, data: &[u8]) -> Hash {
        self.0.hash(data)
    }
}

/// An append-only Merkle tree.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct MerkleTree {
    alg: HashAlgId,
    tree: rs_merkle::MerkleTree<Hash>,
}

opaque_debug::implement!(MerkleTree);

impl MerkleTree {
    pub(crate) fn new(alg: HashAlgId) -> Self {
        Self {
            alg,
            tree: Default::default(),
        }
    }

    /// Returns the root of the tree, or `None` if it is empty.
    pub(crate) fn root(&self) -> Option<TypedHash> {
        self.tree.root().map(|value| TypedHash {
            alg: self.alg,
            value,
        })
    }

    /// Returns the number of leaves in the tree.
    pub(crate) fn len(&self) -> usize {
        self.tree.leaves_len()
    }

    /// Appends leaves to the tree.
    ///
    /// # Panics
    ///
    /// - If the provided hasher is not the same as the one used to create the
    ///   tree.
    pub(crate) fn insert(&mut self, hasher: &dyn HashAlgorithm, mut leaves: Vec<Hash>) {
        assert_eq!(self.alg, hasher.id(), "hash algorithm mismatch");

        self.tree.append(&mut leaves);
        self.tree.commit(&RsMerkleHasher(hasher))
    }

    /// Returns a Merkle proof for the provided indices.
    ///
    /// # Panics
    ///
    /// - If the provided indices are not unique and sorted.
    pub(crate) fn proof(&self, indices: &[usize]) -> MerkleProof {
        assert!(
            indices.windows(2).all(|w| w[0] < w[1]),
            "indices must be unique and sorted"
        );

        MerkleProof {
            alg: self.alg,
            tree_len: self.tree.leaves_len(),
            proof: self.tree.proof(indices),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::hash::{impl_domain_separator, Blake3, HashAlgorithmExt, Sha256};

    use super::*;
    use rstest::*;

    #[derive(Serialize)]
    struct Leaf(u64);

    impl_domain_separator!(Leaf);

    fn leaves<H: HashAlgorithm>(hasher: &H, count: u64) -> Vec<Hash> {
        (0..count)
            .map(|x| hasher.hash_separated(&Leaf(x)))
            .collect()
    }

    fn tree_with<H: HashAlgorithm>(hasher: &H, leaves: &[Hash]) -> MerkleTree {
        let mut tree = MerkleTree::new(hasher.id());
        tree.insert(hasher, leaves.to_vec());
        tree
    }

    #[rstest]
    #[case::sha2(Sha256::default())]
    #[case::blake3(Blake3::default())]
    fn test_verify_success<H: HashAlgorithm>(#[case] hasher: H) {
        let leaves = leaves(&hasher, 5);
        let tree = tree_with(&hasher, &leaves);

        let proof = tree.proof(&[1, 3, 4]);

        assert!(proof
            .verify(
                &hasher,
                &tree.root().unwrap(),
                [1, 3, 4].map(|i| (i, leaves[i]))
            )
            .is_ok());
    }

    #[rstest]
    #[case::sha2(Sha256::default())]
    #[case::blake3(Blake3::default())]
    fn test_verify_fail_wrong_leaf<H: HashAlgorithm>(#[case] hasher: H) {
        let leaves = leaves(&hasher, 5);
        let tree = tree_with(&hasher, &leaves);

        let proof = tree.proof(&[2, 3]);

        assert!(proof
            .verify(
                &hasher,
                &tree.root().unwrap(),
                [(2, leaves[2]), (3, leaves[0])]
            )
            .is_err());
    }

    #[rstest]
    #[case::sha2(Sha256::default())]
    #[case::blake3(Blake3::default())]
    fn test_verify_fail_duplicates<H: HashAlgorithm>(#[case] hasher: H) {
        let leaves = leaves(&hasher, 5);
        let tree = tree_with(&hasher, &leaves);

        let proof = tree.proof(&[2, 3]);

        assert!(proof
            .verify(
                &hasher,
                &tree.root().unwrap(),
                [(2, leaves[2]), (2, leaves[2])]
            )
            .is_err());
    }

    #[rstest]
    #[case::sha2(Sha256::default())]
    #[case::blake3(Blake3::default())]
    fn test_verify_fail_incorrect_leaf_count<H: HashAlgorithm>(#[case] hasher: H) {
        let leaves = leaves(&hasher, 5);
        let tree = tree_with(&hasher, &leaves);

        let mut proof = tree.proof(&[2, 3, 4]);
        proof.tree_len += 1;

        assert!(proof
            .verify(
                &hasher,
                &tree.root().unwrap(),
                [2, 3, 4].map(|i| (i, leaves[i]))
            )
            .is_err());
    }

    #[test]
    fn test_incremental_insert_matches_batch() {
        let hasher = Blake3::default();
        let leaves = leaves(&hasher, 7);

        let batch = tree_with(&hasher, &leaves);

        let mut incremental = MerkleTree::new(hasher.id());
        for leaf in &leaves {
            incremental.insert(&hasher, vec![*leaf]);
        }

        assert_eq!(batch.root(), incremental.root());
        assert_eq!(incremental.len(), 7);
    }

    #[test]
    #[should_panic]
    fn test_proof_fail_unsorted() {
        let hasher = Sha256::default();
        let tree = tree_with(&hasher, &leaves(&hasher, 5));

        _ = tree.proof(&[2, 4, 3]);
    }

    #[test]
    fn test_empty_tree_has_no_root() {
        assert!(MerkleTree::new(HashAlgId::BLAKE3).root().is_none());
    }
}
