//! Transcript commitment configuration.

use std::{collections::HashSet, fmt, ops::Range};

use crate::{
    hash::HashAlgId,
    transcript::{Direction, Idx, Transcript},
};

/// Configuration for transcript commitments made in addition to the
/// per-record commitments.
#[derive(Debug, Clone)]
pub struct TranscriptCommitConfig {
    hash_alg: HashAlgId,
    commits: Vec<(Direction, Range<usize>)>,
}

impl TranscriptCommitConfig {
    /// Creates a new commit config builder.
    pub fn builder(transcript: &Transcript) -> TranscriptCommitConfigBuilder<'_> {
        TranscriptCommitConfigBuilder::new(transcript)
    }

    /// Returns the hash algorithm to use for commitments.
    pub fn hash_alg(&self) -> &HashAlgId {
        &self.hash_alg
    }

    /// Returns an iterator over the committed ranges, in the order they will
    /// be appended to the commitment tree.
    pub fn iter(&self) -> impl Iterator<Item = &(Direction, Range<usize>)> {
        self.commits.iter()
    }

    /// Returns the number of range commitments.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Returns whether there are no range commitments.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// A builder for [`TranscriptCommitConfig`].
///
/// The default hash algorithm is [`HashAlgId::BLAKE3`].
#[derive(Debug)]
pub struct TranscriptCommitConfigBuilder<'a> {
    transcript: &'a Transcript,
    hash_alg: HashAlgId,
    seen: HashSet<(Direction, Range<usize>)>,
    commits: Vec<(Direction, Range<usize>)>,
}

impl<'a> TranscriptCommitConfigBuilder<'a> {
    /// Creates a new commit config builder.
    pub fn new(transcript: &'a Transcript) -> Self {
        Self {
            transcript,
            hash_alg: HashAlgId::BLAKE3,
            seen: HashSet::default(),
            commits: Vec::default(),
        }
    }

    /// Sets the hash algorithm to use for commitments.
    pub fn hash_alg(&mut self, alg: HashAlgId) -> &mut Self {
        self.hash_alg = alg;
        self
    }

    /// Adds a commitment to a contiguous range.
    ///
    /// Empty ranges are ignored, duplicates are committed once.
    pub fn commit(
        &mut self,
        range: Range<usize>,
        direction: Direction,
    ) -> Result<&mut Self, TranscriptCommitError> {
        if range.start > range.end {
            return Err(TranscriptCommitError::new(
                ErrorKind::Index,
                format!("range is inverted: {range:?}"),
            ));
        }

        let len = self.transcript.len_of_direction(direction);
        if range.end > len {
            return Err(TranscriptCommitError::new(
                ErrorKind::Index,
                format!(
                    "range is out of bounds of the transcript ({direction}): {} > {len}",
                    range.end
                ),
            ));
        }

        if !range.is_empty() && self.seen.insert((direction, range.clone())) {
            self.commits.push((direction, range));
        }

        Ok(self)
    }

    /// Adds a commitment to every range of an index.
    pub fn commit_idx(
        &mut self,
        idx: &Idx,
        direction: Direction,
    ) -> Result<&mut Self, TranscriptCommitError> {
        for range in idx.iter_ranges() {
            self.commit(range, direction)?;
        }

        Ok(self)
    }

    /// Adds a commitment to the sent data transcript.
    pub fn commit_sent(&mut self, range: Range<usize>) -> Result<&mut Self, TranscriptCommitError> {
        self.commit(range, Direction::Sent)
    }

    /// Adds a commitment to the received data transcript.
    pub fn commit_recv(&mut self, range: Range<usize>) -> Result<&mut Self, TranscriptCommitError> {
        self.commit(range, Direction::Received)
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<TranscriptCommitConfig, TranscriptCommitError> {
        Ok(TranscriptCommitConfig {
            hash_alg: self.hash_alg,
            commits: self.commits,
        })
    }
}

/// Error for [`TranscriptCommitConfigBuilder`].
#[derive(Debug, thiserror::Error)]
pub struct TranscriptCommitError {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TranscriptCommitError {
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
    Index,
}

impl fmt::Display for TranscriptCommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Index => f.write_str("index error")?,
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

    #[test]
    fn test_range_out_of_bounds() {
        let transcript = Transcript::new([0; 8], [0; 8]);
        let mut builder = TranscriptCommitConfig::builder(&transcript);

        assert!(builder.commit_sent(4..9).is_err());
        assert!(builder.commit_recv(0..8).is_ok());
    }

    #[test]
    fn test_duplicates_and_empty_ranges_are_dropped() {
        let transcript = Transcript::new([0; 8], [0; 8]);
        let mut builder = TranscriptCommitConfig::builder(&transcript);

        builder
            .commit_sent(0..4)
            .unwrap()
            .commit_sent(0..4)
            .unwrap()
            .commit_sent(5..5)
            .unwrap()
            .commit_recv(0..4)
            .unwrap();

        let config = builder.build().unwrap();

        assert_eq!(
            config.iter().cloned().collect::<Vec<_>>(),
            vec![(Direction::Sent, 0..4), (Direction::Received, 0..4)]
        );
    }
}
