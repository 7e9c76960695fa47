//! Plaintext hash commitments.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{
    hash::{impl_domain_separator, Blinded, Blinder, Hash, HashAlgorithm, HashAlgorithmExt, TypedHash},
    transcript::{Direction, InvalidSubsequence, Subsequence},
};

/// Hash of a contiguous range of plaintext in the transcript.
///
/// The hash is computed over the plaintext followed by a 16 byte blinder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextHash {
    /// Direction of the plaintext.
    pub direction: Direction,
    /// Range of the plaintext.
    pub range: Range<usize>,
    /// The hash of the data.
    pub hash: TypedHash,
}

impl_domain_separator!(PlaintextHash);

impl PlaintextHash {
    /// Returns the Merkle leaf of this commitment.
    pub(crate) fn leaf(&self, hasher: &dyn HashAlgorithm) -> Hash {
        hasher.hash_separated(self)
    }
}

/// Opening of a [`PlaintextHash`] commitment.
///
/// Contains the committed plaintext, its blinder and the position of the
/// commitment in the transcript commitment tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaintextHashOpening {
    pub(crate) leaf: u32,
    pub(crate) direction: Direction,
    pub(crate) range: Range<usize>,
    pub(crate) data: Blinded<Vec<u8>>,
}

impl PlaintextHashOpening {
    pub(crate) fn new(
        leaf: u32,
        direction: Direction,
        range: Range<usize>,
        data: Vec<u8>,
        blinder: Blinder,
    ) -> Self {
        Self {
            leaf,
            direction,
            range,
            data: Blinded::new_with_blinder(data, blinder),
        }
    }

    /// Returns the index of the leaf in the commitment tree.
    pub fn leaf(&self) -> u32 {
        self.leaf
    }

    /// Returns the direction of the opened plaintext.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the range of the opened plaintext.
    pub fn range(&self) -> &Range<usize> {
        &self.range
    }

    /// Returns the opened plaintext.
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Recomputes the commitment leaf, returning it with the opened subsequence.
    pub(crate) fn open(
        self,
        hasher: &dyn HashAlgorithm,
    ) -> Result<(usize, Hash, Direction, Subsequence), InvalidSubsequence> {
        let commitment = PlaintextHash {
            direction: self.direction,
            range: self.range.clone(),
            hash: TypedHash {
                alg: hasher.id(),
                value: self.data.hash(hasher),
            },
        };

        let leaf = commitment.leaf(hasher);
        let (data, _) = self.data.into_parts();

        Ok((
            self.leaf as usize,
            leaf,
            self.direction,
            Subsequence::new(self.range, data)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Blake3;

    fn commitment(hasher: &dyn HashAlgorithm, data: &[u8], blinder: Blinder) -> PlaintextHash {
        PlaintextHash {
            direction: Direction::Received,
            range: 4..4 + data.len(),
            hash: TypedHash {
                alg: hasher.id(),
                value: Blinded::new_with_blinder(data.to_vec(), blinder).hash(hasher),
            },
        }
    }

    #[test]
    fn test_opening_reproduces_leaf() {
        let hasher = Blake3::default();
        let blinder = Blinder::new([7; 16]);
        let expected = commitment(&hasher, b"hello", blinder).leaf(&hasher);

        let opening =
            PlaintextHashOpening::new(3, Direction::Received, 4..9, b"hello".to_vec(), blinder);
        let (leaf, hash, direction, seq) = opening.open(&hasher).unwrap();

        assert_eq!(leaf, 3);
        assert_eq!(hash, expected);
        assert_eq!(direction, Direction::Received);
        assert_eq!(seq.data(), b"hello");
    }

    #[test]
    fn test_opening_with_modified_data_changes_leaf() {
        let hasher = Blake3::default();
        let blinder = Blinder::new([7; 16]);
        let expected = commitment(&hasher, b"hello", blinder).leaf(&hasher);

        let opening =
            PlaintextHashOpening::new(0, Direction::Received, 4..9, b"hellO".to_vec(), blinder);
        let (_, hash, _, _) = opening.open(&hasher).unwrap();

        assert_ne!(hash, expected);
    }

    #[test]
    fn test_opening_with_wrong_length_fails() {
        let hasher = Blake3::default();
        let opening = PlaintextHashOpening::new(
            0,
            Direction::Sent,
            0..10,
            b"short".to_vec(),
            Blinder::new([0; 16]),
        );

        assert!(opening.open(&hasher).is_err());
    }
}
