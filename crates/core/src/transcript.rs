//! Transcript types.
//!
//! All application data communicated over a TLS connection is referred to as a
//! [`Transcript`]. A transcript is two vectors of bytes, one per
//! [`Direction`], built up record by record as the connection progresses.
//!
//! TLS operates over a bidirectional byte stream, so there are no application
//! layer semantics in the transcript itself. HTTP requests and responses are
//! recovered by parsing, see [`crate::http`].
//!
//! ## Selective disclosure
//!
//! A verifier only ever sees a [`PartialTranscript`]: the full length of each
//! direction plus the authenticated bytes. Redacted bytes are zeroed and
//! reported as unauthenticated.

mod commit;
pub(crate) mod hash;

use std::{fmt, ops::Range};

use rangeset::{Difference, RangeSet, Subset, UnionMut};
use serde::{Deserialize, Serialize};

use crate::connection::TranscriptLength;

pub use commit::{TranscriptCommitConfig, TranscriptCommitConfigBuilder, TranscriptCommitError};
pub use hash::{PlaintextHash, PlaintextHashOpening};

/// A transcript contains all the data communicated over a TLS connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Data sent from the Prover to the Server.
    sent: Vec<u8>,
    /// Data received by the Prover from the Server.
    received: Vec<u8>,
}

opaque_debug::implement!(Transcript);

impl Transcript {
    /// Creates a new transcript.
    pub fn new(sent: impl Into<Vec<u8>>, received: impl Into<Vec<u8>>) -> Self {
        Self {
            sent: sent.into(),
            received: received.into(),
        }
    }

    /// Returns a reference to the sent data.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Returns a reference to the received data.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Returns the data of the given direction.
    pub fn data(&self, direction: Direction) -> &[u8] {
        match direction {
            Direction::Sent => &self.sent,
            Direction::Received => &self.received,
        }
    }

    /// Returns the length of the sent and received data, respectively.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> (usize, usize) {
        (self.sent.len(), self.received.len())
    }

    /// Returns the length of the transcript in the given direction.
    pub fn len_of_direction(&self, direction: Direction) -> usize {
        self.data(direction).len()
    }

    /// Returns the transcript length.
    pub fn length(&self) -> TranscriptLength {
        TranscriptLength {
            sent: self.sent.len() as u32,
            received: self.received.len() as u32,
        }
    }

    /// Returns the subsequence of the transcript covered by the range, or
    /// `None` if the range is out of bounds.
    pub fn get(&self, direction: Direction, range: &Range<usize>) -> Option<&[u8]> {
        self.data(direction).get(range.clone())
    }

    /// Appends data to the given direction.
    pub(crate) fn extend(&mut self, direction: Direction, data: &[u8]) {
        match direction {
            Direction::Sent => self.sent.extend_from_slice(data),
            Direction::Received => self.received.extend_from_slice(data),
        }
    }

    /// Returns a partial transcript containing only the provided indices.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn to_partial(&self, sent_idx: Idx, recv_idx: Idx) -> PartialTranscript {
        let mut partial = PartialTranscript::new(self.sent.len(), self.received.len());

        for range in sent_idx.iter_ranges() {
            partial.sent[range.clone()].copy_from_slice(&self.sent[range]);
        }

        for range in recv_idx.iter_ranges() {
            partial.received[range.clone()].copy_from_slice(&self.received[range]);
        }

        partial.sent_authed_idx = sent_idx;
        partial.received_authed_idx = recv_idx;
        partial
    }
}

/// A transcript which may not have all the data authenticated.
///
/// Unauthenticated bytes are always `0x00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTranscript {
    sent: Vec<u8>,
    received: Vec<u8>,
    sent_authed_idx: Idx,
    received_authed_idx: Idx,
}

impl PartialTranscript {
    /// Creates a new partial transcript with nothing authenticated.
    pub fn new(sent_len: usize, received_len: usize) -> Self {
        Self {
            sent: vec![0; sent_len],
            received: vec![0; received_len],
            sent_authed_idx: Idx::default(),
            received_authed_idx: Idx::default(),
        }
    }

    /// Returns the length of the sent transcript.
    pub fn len_sent(&self) -> usize {
        self.sent.len()
    }

    /// Returns the length of the received transcript.
    pub fn len_received(&self) -> usize {
        self.received.len()
    }

    /// Returns whether the transcript is complete.
    pub fn is_complete(&self) -> bool {
        self.sent_authed_idx.len() == self.sent.len()
            && self.received_authed_idx.len() == self.received.len()
    }

    /// Returns the sent data, including unauthenticated (zeroed) bytes.
    pub fn sent_unsafe(&self) -> &[u8] {
        &self.sent
    }

    /// Returns the received data, including unauthenticated (zeroed) bytes.
    pub fn received_unsafe(&self) -> &[u8] {
        &self.received
    }

    /// Returns the index of authenticated data in the sent transcript.
    pub fn sent_authed(&self) -> &Idx {
        &self.sent_authed_idx
    }

    /// Returns the index of authenticated data in the received transcript.
    pub fn received_authed(&self) -> &Idx {
        &self.received_authed_idx
    }

    /// Returns the index of unauthenticated data in the sent transcript.
    pub fn sent_unauthed(&self) -> Idx {
        Idx(RangeSet::from(0..self.sent.len()).difference(&self.sent_authed_idx.0))
    }

    /// Returns the index of unauthenticated data in the received transcript.
    pub fn received_unauthed(&self) -> Idx {
        Idx(RangeSet::from(0..self.received.len()).difference(&self.received_authed_idx.0))
    }

    /// Returns the authenticated bytes of a direction, in order.
    pub fn authed_bytes(&self, direction: Direction) -> Vec<u8> {
        let (data, authed) = match direction {
            Direction::Sent => (&self.sent, &self.sent_authed_idx),
            Direction::Received => (&self.received, &self.received_authed_idx),
        };

        authed
            .iter_ranges()
            .flat_map(|range| data[range].iter().copied())
            .collect()
    }

    /// Unions an authenticated subsequence into this transcript.
    ///
    /// Fails if the subsequence is out of bounds, or if it overlaps already
    /// authenticated data with different bytes.
    pub(crate) fn union_subsequence(
        &mut self,
        direction: Direction,
        seq: &Subsequence,
    ) -> Result<(), InvalidSubsequence> {
        let (data, authed) = match direction {
            Direction::Sent => (&mut self.sent, &mut self.sent_authed_idx),
            Direction::Received => (&mut self.received, &mut self.received_authed_idx),
        };

        let range = seq.range.clone();
        if range.end > data.len() {
            return Err(InvalidSubsequence("subsequence is out of bounds"));
        }

        let overlap = RangeSet::from(range.clone()).difference(
            &RangeSet::from(range.clone()).difference(&authed.0),
        );
        for overlapping in overlap.iter_ranges() {
            let offset = overlapping.start - range.start;
            if data[overlapping.clone()] != seq.data[offset..offset + overlapping.len()] {
                return Err(InvalidSubsequence(
                    "subsequence conflicts with authenticated data",
                ));
            }
        }

        data[range.clone()].copy_from_slice(&seq.data);
        authed.0.union_mut(&range);

        Ok(())
    }
}

/// The direction of data communicated over a TLS connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Sent from the Prover to the TLS peer.
    Sent = 0x00,
    /// Received by the prover from the TLS peer.
    Received = 0x01,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// Transcript index.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Idx(RangeSet<usize>);

impl Idx {
    /// Creates an empty index.
    pub fn empty() -> Self {
        Self(RangeSet::default())
    }

    /// Creates a new index from a range.
    pub fn new(range: Range<usize>) -> Self {
        Self(RangeSet::from(range))
    }

    /// Returns the start of the index, or 0 if empty.
    pub fn start(&self) -> usize {
        self.0.iter_ranges().next().map(|r| r.start).unwrap_or_default()
    }

    /// Returns the end of the index, non-inclusive, or 0 if empty.
    pub fn end(&self) -> usize {
        self.0.iter_ranges().last().map(|r| r.end).unwrap_or_default()
    }

    /// Returns an iterator over the ranges of the index.
    pub fn iter_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.0.iter_ranges()
    }

    /// Returns the number of indices.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    /// Adds a range to the index.
    pub fn union_range(&mut self, range: &Range<usize>) {
        if !range.is_empty() {
            self.0.union_mut(range);
        }
    }

    /// Adds another index to this one.
    pub fn union_mut(&mut self, other: &Idx) {
        for range in other.iter_ranges() {
            self.0.union_mut(&range);
        }
    }

    /// Removes a range from the index.
    pub fn remove_range(&mut self, range: &Range<usize>) {
        if !range.is_empty() {
            self.0 = self.0.difference(&RangeSet::from(range.clone()));
        }
    }

    /// Returns the indices in `self` which are not in `other`.
    pub fn difference(&self, other: &Idx) -> Idx {
        Idx(self.0.difference(&other.0))
    }

    /// Returns whether the range is fully contained in this index.
    pub fn contains_range(&self, range: &Range<usize>) -> bool {
        range.is_empty() || RangeSet::from(range.clone()).is_subset(&self.0)
    }
}

impl From<Range<usize>> for Idx {
    fn from(range: Range<usize>) -> Self {
        Self::new(range)
    }
}

impl FromIterator<Range<usize>> for Idx {
    fn from_iter<T: IntoIterator<Item = Range<usize>>>(iter: T) -> Self {
        let mut idx = Idx::empty();
        for range in iter {
            idx.union_range(&range);
        }
        idx
    }
}

/// A contiguous run of transcript bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsequence {
    range: Range<usize>,
    data: Vec<u8>,
}

impl Subsequence {
    /// Creates a new subsequence.
    pub fn new(range: Range<usize>, data: Vec<u8>) -> Result<Self, InvalidSubsequence> {
        if range.end < range.start || data.len() != range.end - range.start {
            return Err(InvalidSubsequence(
                "range and data length are not the same",
            ));
        }

        Ok(Self { range, data })
    }

    /// Returns the range of the subsequence.
    pub fn range(&self) -> &Range<usize> {
        &self.range
    }

    /// Returns the data of the subsequence.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Invalid subsequence error.
#[derive(Debug, thiserror::Error)]
#[error("invalid subsequence: {0}")]
pub struct InvalidSubsequence(&'static str);

/// A TLS record, as seen by the commitment engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Direction of the record.
    pub direction: Direction,
    /// Sequence number of the record within its direction.
    pub seq: u64,
    /// Range of the record's plaintext in the transcript.
    pub range: Range<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn transcript() -> Transcript {
        Transcript::new(
            [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            [12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23],
        )
    }

    #[rstest]
    fn test_get(transcript: Transcript) {
        assert_eq!(transcript.get(Direction::Sent, &(0..4)), Some(&[0, 1, 2, 3][..]));
        assert_eq!(transcript.get(Direction::Received, &(2..4)), Some(&[14, 15][..]));
        assert_eq!(transcript.get(Direction::Sent, &(10..13)), None);
    }

    #[rstest]
    fn test_to_partial(transcript: Transcript) {
        let sent: Idx = [0..2, 5..7].into_iter().collect();
        let recv = Idx::new(1..3);

        let partial = transcript.to_partial(sent.clone(), recv.clone());

        assert_eq!(partial.sent_unsafe(), &[0, 1, 0, 0, 0, 5, 6, 0, 0, 0, 0, 0]);
        assert_eq!(partial.authed_bytes(Direction::Received), vec![13, 14]);
        assert_eq!(partial.sent_authed(), &sent);
        assert_eq!(partial.sent_unauthed().len(), 8);
        assert!(!partial.is_complete());
    }

    #[rstest]
    fn test_union_subsequence(transcript: Transcript) {
        let mut partial = PartialTranscript::new(12, 12);

        partial
            .union_subsequence(
                Direction::Sent,
                &Subsequence::new(0..4, transcript.sent()[0..4].to_vec()).unwrap(),
            )
            .unwrap();

        // Overlapping with identical bytes is fine.
        partial
            .union_subsequence(
                Direction::Sent,
                &Subsequence::new(2..6, transcript.sent()[2..6].to_vec()).unwrap(),
            )
            .unwrap();

        assert_eq!(partial.sent_authed(), &Idx::new(0..6));
        assert_eq!(partial.authed_bytes(Direction::Sent), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_union_subsequence_conflict() {
        let mut partial = PartialTranscript::new(8, 0);

        partial
            .union_subsequence(Direction::Sent, &Subsequence::new(0..4, vec![1; 4]).unwrap())
            .unwrap();

        assert!(partial
            .union_subsequence(Direction::Sent, &Subsequence::new(2..6, vec![2; 4]).unwrap())
            .is_err());
    }

    #[test]
    fn test_union_subsequence_out_of_bounds() {
        let mut partial = PartialTranscript::new(4, 0);

        assert!(partial
            .union_subsequence(Direction::Sent, &Subsequence::new(2..6, vec![0; 4]).unwrap())
            .is_err());
    }

    #[test]
    fn test_subsequence_length_mismatch() {
        assert!(Subsequence::new(0..4, vec![0; 3]).is_err());
    }

    #[test]
    fn test_idx_operations() {
        let mut idx: Idx = [0..4, 8..12].into_iter().collect();
        assert_eq!(idx.start(), 0);
        assert_eq!(idx.end(), 12);
        assert_eq!(idx.len(), 8);
        assert!(idx.contains_range(&(1..3)));
        assert!(!idx.contains_range(&(3..9)));

        idx.remove_range(&(2..10));
        assert_eq!(idx.iter_ranges().collect::<Vec<_>>(), vec![0..2, 10..12]);

        let other = Idx::new(0..1);
        assert_eq!(idx.difference(&other).len(), 3);
    }
}
