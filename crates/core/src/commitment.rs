//! Commitment engine.
//!
//! The [`CommitmentEngine`] observes the plaintext of every TLS record as it
//! is sent or received and commits to it. Commitments are appended to a
//! Merkle tree in the order they are made and never removed. The root of the
//! tree together with its leaf count forms the [`TranscriptCommitment`] which
//! the Notary signs.
//!
//! Record commitments are first staged, and only appended to the tree once
//! the corresponding ciphertext has been acknowledged by the Notary, see
//! [`CommitmentEngine::finalize_pending`].
//!
//! Blinders are derived from a secret seed, so that the same seed and the same
//! transcript always produce the same commitments.

use std::{fmt, ops::Range, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::trace;
use zeroize::Zeroizing;

use crate::{
    hash::{impl_domain_separator, Blinded, Blinder, HashAlgorithm, TypedHash},
    merkle::{MerkleProof, MerkleTree},
    transcript::{
        Direction, PlaintextHash, PlaintextHashOpening, Record, Transcript, TranscriptCommitConfig,
    },
};

/// Commitment to the entire set of transcript commitments.
///
/// This is the aggregate digest signed by the Notary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptCommitment {
    /// Merkle root of the commitment tree.
    pub root: TypedHash,
    /// Number of leaves in the commitment tree.
    pub leaf_count: u32,
}

impl_domain_separator!(TranscriptCommitment);

/// Incremental, append-only commitment engine.
pub struct CommitmentEngine {
    hasher: Arc<dyn HashAlgorithm + Send + Sync>,
    seed: Zeroizing<[u8; 32]>,
    transcript: Transcript,
    records: Vec<Record>,
    /// Record commitments awaiting finalization.
    pending: Vec<(PlaintextHash, Blinder)>,
    /// Finalized commitments, in leaf order.
    entries: Vec<(PlaintextHash, Blinder)>,
    /// Number of bytes per direction covered by finalized records.
    finalized: (usize, usize),
    next_seq: (u64, u64),
    tree: MerkleTree,
}

opaque_debug::implement!(CommitmentEngine);

impl CommitmentEngine {
    /// Creates a new engine.
    ///
    /// # Arguments
    ///
    /// * `hasher` - Hash algorithm used for commitments and the tree.
    /// * `seed` - Secret seed from which blinders are derived.
    pub fn new(hasher: Arc<dyn HashAlgorithm + Send + Sync>, seed: [u8; 32]) -> Self {
        let tree = MerkleTree::new(hasher.id());

        Self {
            hasher,
            seed: Zeroizing::new(seed),
            transcript: Transcript::new(Vec::new(), Vec::new()),
            records: Vec::new(),
            pending: Vec::new(),
            entries: Vec::new(),
            finalized: (0, 0),
            next_seq: (0, 0),
            tree,
        }
    }

    /// Returns the transcript observed so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the records observed so far.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the number of staged commitments which have not been
    /// finalized.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Observes the plaintext of a record, staging a commitment to it.
    ///
    /// Empty records are recorded but not committed.
    pub fn observe(&mut self, direction: Direction, plaintext: &[u8]) -> Record {
        let start = self.transcript.len_of_direction(direction);
        self.transcript.extend(direction, plaintext);
        let range = start..start + plaintext.len();

        let seq = match direction {
            Direction::Sent => &mut self.next_seq.0,
            Direction::Received => &mut self.next_seq.1,
        };
        let record = Record {
            direction,
            seq: *seq,
            range: range.clone(),
        };
        *seq += 1;

        if !range.is_empty() {
            let entry = self.commit(direction, range);
            self.pending.push(entry);
        }

        trace!(
            "observed {} record {}: {} bytes",
            direction,
            record.seq,
            plaintext.len()
        );

        self.records.push(record.clone());
        record
    }

    /// Appends all staged commitments to the tree, returning how many were
    /// finalized.
    pub fn finalize_pending(&mut self) -> usize {
        let count = self.pending.len();
        if count == 0 {
            return 0;
        }

        let leaves = self
            .pending
            .iter()
            .map(|(commitment, _)| commitment.leaf(&*self.hasher))
            .collect::<Vec<_>>();
        self.tree.insert(&*self.hasher, leaves);

        for (commitment, blinder) in self.pending.drain(..) {
            let end = match commitment.direction {
                Direction::Sent => &mut self.finalized.0,
                Direction::Received => &mut self.finalized.1,
            };
            *end = (*end).max(commitment.range.end);
            self.entries.push((commitment, blinder));
        }

        count
    }

    /// Commits to a range of finalized plaintext, returning the leaf index.
    ///
    /// Committing to a range which is already committed returns the existing
    /// leaf.
    pub fn commit_range(
        &mut self,
        direction: Direction,
        range: Range<usize>,
    ) -> Result<u32, CommitmentError> {
        let finalized = match direction {
            Direction::Sent => self.finalized.0,
            Direction::Received => self.finalized.1,
        };

        if range.is_empty() || range.end > finalized {
            return Err(CommitmentError::new(
                ErrorKind::Range,
                format!(
                    "range {range:?} is empty or exceeds finalized {direction} data ({finalized})"
                ),
            ));
        }

        if let Some(leaf) = self.find(direction, &range) {
            return Ok(leaf);
        }

        let entry = self.commit(direction, range);
        self.tree
            .insert(&*self.hasher, vec![entry.0.leaf(&*self.hasher)]);
        self.entries.push(entry);

        Ok((self.entries.len() - 1) as u32)
    }

    /// Applies a commit config, returning the leaf index of every range.
    pub fn commit_config(
        &mut self,
        config: &TranscriptCommitConfig,
    ) -> Result<Vec<u32>, CommitmentError> {
        if *config.hash_alg() != self.hasher.id() {
            return Err(CommitmentError::new(
                ErrorKind::Config,
                format!(
                    "config hash algorithm {} does not match engine algorithm {}",
                    config.hash_alg(),
                    self.hasher.id()
                ),
            ));
        }

        config
            .iter()
            .map(|(direction, range)| self.commit_range(*direction, range.clone()))
            .collect()
    }

    /// Returns the aggregate commitment over all finalized entries, or `None`
    /// if nothing has been finalized.
    pub fn aggregate(&self) -> Option<TranscriptCommitment> {
        self.tree.root().map(|root| TranscriptCommitment {
            root,
            leaf_count: self.tree.len() as u32,
        })
    }

    /// Closes the engine, returning the aggregate commitment and the secrets
    /// needed to open it later.
    ///
    /// Fails if there are staged commitments which were never finalized, or
    /// if nothing was committed at all.
    pub fn close(self) -> Result<(TranscriptCommitment, CommitmentSecrets), CommitmentError> {
        if !self.pending.is_empty() {
            return Err(CommitmentError::new(
                ErrorKind::Pending,
                format!("{} commitments were never finalized", self.pending.len()),
            ));
        }

        let commitment = self.aggregate().ok_or_else(|| {
            CommitmentError::new(ErrorKind::Empty, "no commitments were made")
        })?;

        Ok((
            commitment,
            CommitmentSecrets {
                transcript: self.transcript,
                records: self.records,
                entries: self.entries,
                tree: self.tree,
            },
        ))
    }

    fn find(&self, direction: Direction, range: &Range<usize>) -> Option<u32> {
        self.entries
            .iter()
            .position(|(commitment, _)| {
                commitment.direction == direction && commitment.range == *range
            })
            .map(|idx| idx as u32)
    }

    fn commit(&self, direction: Direction, range: Range<usize>) -> (PlaintextHash, Blinder) {
        let blinder = derive_blinder(&self.seed, direction, &range);
        let data = self.transcript.data(direction)[range.clone()].to_vec();

        let hash = TypedHash {
            alg: self.hasher.id(),
            value: Blinded::new_with_blinder(data, blinder).hash(&*self.hasher),
        };

        (
            PlaintextHash {
                direction,
                range,
                hash,
            },
            blinder,
        )
    }
}

/// Derives the blinder of a range with keyed BLAKE3.
fn derive_blinder(seed: &[u8; 32], direction: Direction, range: &Range<usize>) -> Blinder {
    let mut hasher = blake3::Hasher::new_keyed(seed);
    hasher.update(b"tlsproof/blinder");
    hasher.update(&[direction as u8]);
    hasher.update(&(range.start as u64).to_le_bytes());
    hasher.update(&(range.end as u64).to_le_bytes());

    let mut blinder = [0u8; 16];
    blinder.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
    Blinder::new(blinder)
}

/// Secret data of a closed commitment engine.
///
/// Held by the Prover and used to build disclosures.
#[derive(Clone, Serialize, Deserialize)]
pub struct CommitmentSecrets {
    transcript: Transcript,
    records: Vec<Record>,
    entries: Vec<(PlaintextHash, Blinder)>,
    tree: MerkleTree,
}

opaque_debug::implement!(CommitmentSecrets);

impl CommitmentSecrets {
    /// Returns the transcript.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the records of the connection.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the committed ranges, in leaf order.
    pub fn committed(&self) -> impl Iterator<Item = (Direction, &Range<usize>)> {
        self.entries
            .iter()
            .map(|(commitment, _)| (commitment.direction, &commitment.range))
    }

    /// Returns the aggregate commitment.
    pub fn aggregate(&self) -> Option<TranscriptCommitment> {
        self.tree.root().map(|root| TranscriptCommitment {
            root,
            leaf_count: self.tree.len() as u32,
        })
    }

    /// Opens the commitments with the given leaf indices, returning the
    /// openings and a Merkle multi-proof of their inclusion.
    pub(crate) fn open(
        &self,
        leaves: &[u32],
    ) -> Result<(Vec<PlaintextHashOpening>, MerkleProof), CommitmentError> {
        let mut indices = leaves.iter().map(|leaf| *leaf as usize).collect::<Vec<_>>();
        indices.sort_unstable();
        indices.dedup();

        let mut openings = Vec::with_capacity(indices.len());
        for idx in &indices {
            let (commitment, blinder) = self.entries.get(*idx).ok_or_else(|| {
                CommitmentError::new(ErrorKind::Range, format!("unknown commitment leaf {idx}"))
            })?;

            let data = self.transcript.data(commitment.direction)[commitment.range.clone()].to_vec();
            openings.push(PlaintextHashOpening::new(
                *idx as u32,
                commitment.direction,
                commitment.range.clone(),
                data,
                *blinder,
            ));
        }

        Ok((openings, self.tree.proof(&indices)))
    }

    /// Returns the leaf hash of a commitment.
    #[cfg(test)]
    pub(crate) fn leaf(&self, hasher: &dyn HashAlgorithm, idx: usize) -> Option<crate::hash::Hash> {
        self.entries.get(idx).map(|(commitment, _)| commitment.leaf(hasher))
    }
}

/// Error for [`CommitmentEngine`].
#[derive(Debug, thiserror::Error)]
pub struct CommitmentError {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CommitmentError {
    fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }
}

#[derive(Debug)]
enum ErrorKind {
    Range,
    Config,
    Pending,
    Empty,
}

impl fmt::Display for CommitmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("commitment error: ")?;

        match self.kind {
            ErrorKind::Range => f.write_str("range error")?,
            ErrorKind::Config => f.write_str("config error")?,
            ErrorKind::Pending => f.write_str("pending commitments")?,
            ErrorKind::Empty => f.write_str("empty")?,
        }

        if let Some(source) = &self.source {
            write!(f, " caused by: {source}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Blake3, HashAlgId, Sha256};
    use rstest::*;

    fn engine(seed: [u8; 32]) -> CommitmentEngine {
        CommitmentEngine::new(Arc::new(Blake3::default()), seed)
    }

    fn feed(engine: &mut CommitmentEngine, records: &[(Direction, &[u8])]) {
        for (direction, data) in records {
            engine.observe(*direction, data);
            engine.finalize_pending();
        }
    }

    const RECORDS: &[(Direction, &[u8])] = &[
        (Direction::Sent, b"GET / HTTP/1.1\r\n"),
        (Direction::Sent, b"Host: example.com\r\n\r\n"),
        (Direction::Received, b"HTTP/1.1 200 OK\r\n\r\n"),
        (Direction::Received, b"hello"),
    ];

    #[test]
    fn test_deterministic() {
        let mut a = engine([1; 32]);
        let mut b = engine([1; 32]);
        feed(&mut a, RECORDS);
        feed(&mut b, RECORDS);

        assert_eq!(a.aggregate(), b.aggregate());
    }

    #[test]
    fn test_different_seed_changes_aggregate() {
        let mut a = engine([1; 32]);
        let mut b = engine([2; 32]);
        feed(&mut a, RECORDS);
        feed(&mut b, RECORDS);

        assert_ne!(a.aggregate(), b.aggregate());
    }

    #[test]
    fn test_different_bytes_change_aggregate() {
        let mut a = engine([1; 32]);
        let mut b = engine([1; 32]);
        feed(&mut a, RECORDS);
        feed(&mut b, &RECORDS[..3]);
        feed(&mut b, &[(Direction::Received, b"hellO")]);

        assert_ne!(a.aggregate(), b.aggregate());
    }

    #[test]
    fn test_append_only() {
        let mut engine = engine([1; 32]);
        feed(&mut engine, &RECORDS[..2]);
        let first = engine.aggregate().unwrap();

        feed(&mut engine, &RECORDS[2..]);
        let second = engine.aggregate().unwrap();

        assert_eq!(first.leaf_count, 2);
        assert_eq!(second.leaf_count, 4);
        assert_ne!(first.root, second.root);
    }

    #[test]
    fn test_records_are_sequenced_per_direction() {
        let mut engine = engine([0; 32]);
        let a = engine.observe(Direction::Sent, b"abc");
        let b = engine.observe(Direction::Received, b"de");
        let c = engine.observe(Direction::Sent, b"fg");

        assert_eq!((a.seq, a.range), (0, 0..3));
        assert_eq!((b.seq, b.range), (0, 0..2));
        assert_eq!((c.seq, c.range), (1, 3..5));
        assert_eq!(engine.pending(), 3);
    }

    #[test]
    fn test_pending_are_not_aggregated() {
        let mut engine = engine([0; 32]);
        engine.observe(Direction::Sent, b"abc");

        assert!(engine.aggregate().is_none());
        assert!(engine.commit_range(Direction::Sent, 0..2).is_err());

        engine.finalize_pending();
        assert_eq!(engine.aggregate().unwrap().leaf_count, 1);
    }

    #[test]
    fn test_close_with_pending_fails() {
        let mut engine = engine([0; 32]);
        engine.observe(Direction::Sent, b"abc");

        assert!(engine.close().is_err());
    }

    #[test]
    fn test_close_empty_fails() {
        assert!(engine([0; 32]).close().is_err());
    }

    #[test]
    fn test_commit_range() {
        let mut engine = engine([0; 32]);
        feed(&mut engine, RECORDS);

        let leaf = engine.commit_range(Direction::Sent, 4..5).unwrap();
        assert_eq!(leaf, 4);

        // Committing again returns the same leaf.
        assert_eq!(engine.commit_range(Direction::Sent, 4..5).unwrap(), 4);
        // The record commitment is reused.
        assert_eq!(engine.commit_range(Direction::Sent, 0..16).unwrap(), 0);

        assert!(engine.commit_range(Direction::Received, 0..100).is_err());
        assert!(engine.commit_range(Direction::Received, 3..3).is_err());
    }

    #[rstest]
    #[case::matching(HashAlgId::BLAKE3, true)]
    #[case::mismatch(HashAlgId::SHA256, false)]
    fn test_commit_config(#[case] alg: HashAlgId, #[case] ok: bool) {
        let mut engine = engine([0; 32]);
        feed(&mut engine, RECORDS);

        let transcript = engine.transcript().clone();
        let mut builder = TranscriptCommitConfig::builder(&transcript);
        builder.hash_alg(alg);
        builder.commit_sent(0..3).unwrap().commit_recv(0..8).unwrap();
        let config = builder.build().unwrap();

        assert_eq!(engine.commit_config(&config).is_ok(), ok);
    }

    #[test]
    fn test_open_verifies_against_aggregate() {
        let hasher = Blake3::default();
        let mut engine = engine([3; 32]);
        feed(&mut engine, RECORDS);

        let (aggregate, secrets) = engine.close().unwrap();
        let (openings, proof) = secrets.open(&[3, 1]).unwrap();

        assert_eq!(openings.len(), 2);
        assert_eq!(openings[0].data(), b"Host: example.com\r\n\r\n");
        assert_eq!(secrets.leaf(&hasher, 1), Some(openings[0].clone().open(&hasher).unwrap().1));

        let leaves = openings
            .into_iter()
            .map(|opening| {
                let (idx, leaf, _, _) = opening.open(&hasher).unwrap();
                (idx, leaf)
            })
            .collect::<Vec<_>>();

        proof.verify(&hasher, &aggregate.root, leaves).unwrap();
    }

    #[test]
    fn test_sha256_engine() {
        let mut engine = CommitmentEngine::new(Arc::new(Sha256::default()), [0; 32]);
        feed(&mut engine, RECORDS);

        assert_eq!(engine.aggregate().unwrap().root.alg, HashAlgId::SHA256);
    }
}
