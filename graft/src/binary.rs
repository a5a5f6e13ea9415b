// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Compact encodings of binary file changes.
//!
//! Each direction of a binary change is stored either as the whole target compressed
//! ([`BinaryKind::Literal`]) or as a compressed [delta](crate::delta) against the other side
//! ([`BinaryKind::Delta`]), whichever is smaller.

use tracing::debug;

use crate::{
    delta,
    error::{Error, Result},
};

/// How one direction of a binary change is stored
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum BinaryKind {
    /// Nothing stored
    #[default]
    None,
    /// The whole target, compressed
    Literal,
    /// A delta against the other side, compressed
    Delta,
}

/// One direction of a binary change
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BinaryFile {
    /// How `data` is to be interpreted
    pub kind: BinaryKind,
    /// Compressed payload
    pub data: Vec<u8>,
    /// Length of the payload once decompressed
    pub inflated_len: usize,
}

impl BinaryFile {
    /// Encodes `target` as the smaller of a literal or a delta against `reference`
    ///
    /// The delta search is given the literal's compressed size as its budget, so it stops as soon
    /// as it can't win. Ties go to the literal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeOverflow`] if either buffer is too large for the delta format, or an
    /// I/O error if compression fails.
    pub fn encode(reference: &[u8], target: &[u8], compression_level: i32) -> Result<Self> {
        delta::check_len(reference.len())?;
        delta::check_len(target.len())?;

        let literal = zstd::bulk::compress(target, compression_level)?;
        delta::check_len(literal.len())?;

        let mut best = Self {
            kind: BinaryKind::Literal,
            data: literal,
            inflated_len: target.len(),
        };

        if !reference.is_empty() && !target.is_empty() {
            if let Some(instructions) = delta::compute_delta(reference, target, best.data.len())? {
                let compressed = zstd::bulk::compress(&instructions, compression_level)?;

                if compressed.len() < best.data.len() {
                    best = Self {
                        kind: BinaryKind::Delta,
                        data: compressed,
                        inflated_len: instructions.len(),
                    };
                }
            }
        }

        debug!(
            kind = ?best.kind,
            compressed = best.data.len(),
            inflated = best.inflated_len,
            "encoded binary side",
        );

        Ok(best)
    }

    /// Reconstructs the target this side encodes
    ///
    /// `reference` is the other side's content; it is only consulted for deltas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDelta`] if nothing is stored, the payload doesn't inflate to its
    /// recorded length or the delta doesn't apply to `reference`.
    pub fn inflate(&self, reference: &[u8]) -> Result<Vec<u8>> {
        if self.kind == BinaryKind::None {
            return Err(Error::malformed("no binary data stored"));
        }

        let inflated = zstd::bulk::decompress(&self.data, self.inflated_len)
            .map_err(|e| Error::malformed(format!("binary data does not inflate: {e}")))?;

        if inflated.len() != self.inflated_len {
            return Err(Error::malformed(format!(
                "binary data inflated to {} bytes, expected {}",
                inflated.len(),
                self.inflated_len,
            )));
        }

        match self.kind {
            BinaryKind::Delta => delta::apply_delta(reference, &inflated),
            _ => Ok(inflated),
        }
    }
}

/// Both directions of a binary change
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BinaryEncoding {
    /// Rebuilds the old side from the new side
    pub old_file: BinaryFile,
    /// Rebuilds the new side from the old side
    pub new_file: BinaryFile,
}

impl BinaryEncoding {
    /// Encodes the change from `old` to `new` in both directions
    ///
    /// # Errors
    ///
    /// See [`BinaryFile::encode()`].
    pub fn new(old: &[u8], new: &[u8], compression_level: i32) -> Result<Self> {
        Ok(Self {
            old_file: BinaryFile::encode(new, old, compression_level)?,
            new_file: BinaryFile::encode(old, new, compression_level)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: i32 = 3;

    // Incompressible bytes, so literals can't shrink below their input
    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    #[test]
    fn small_change_picks_delta() {
        let old = noise(8192, 0x9e37_79b9);
        let mut new = old.clone();
        new[4096] ^= 0xff;

        let side = BinaryFile::encode(&old, &new, LEVEL).unwrap();
        assert_eq!(side.kind, BinaryKind::Delta);

        let instructions = delta::compute_delta(&old, &new, 0).unwrap().unwrap();
        assert_eq!(side.inflated_len, instructions.len());
        assert_eq!(side.inflate(&old).unwrap(), new);
    }

    #[test]
    fn unrelated_content_picks_literal() {
        let old = noise(2048, 1);
        let new = noise(2048, 2);

        let side = BinaryFile::encode(&old, &new, LEVEL).unwrap();
        assert_eq!(side.kind, BinaryKind::Literal);
        assert_eq!(side.inflated_len, new.len());
        assert_eq!(side.inflate(&old).unwrap(), new);
    }

    #[test]
    fn empty_reference_forces_literal() {
        let side = BinaryFile::encode(b"", b"\0\x01\x02", LEVEL).unwrap();
        assert_eq!(side.kind, BinaryKind::Literal);
        assert_eq!(side.inflate(b"").unwrap(), b"\0\x01\x02");
    }

    #[test]
    fn both_directions_round_trip() {
        let old = noise(4096, 11);
        let mut new = old.clone();
        new.extend_from_slice(b"\0appended\0");

        let encoding = BinaryEncoding::new(&old, &new, LEVEL).unwrap();
        assert_eq!(encoding.new_file.inflate(&old).unwrap(), new);
        assert_eq!(encoding.old_file.inflate(&new).unwrap(), old);
    }

    #[test]
    fn wrong_inflated_len_is_rejected() {
        let mut side = BinaryFile::encode(b"", b"abc", LEVEL).unwrap();
        side.inflated_len = 2;
        assert!(matches!(
            side.inflate(b""),
            Err(Error::MalformedDelta { .. })
        ));
    }

    #[test]
    fn nothing_stored_does_not_inflate() {
        assert!(BinaryFile::default().inflate(b"x").is_err());
    }
}
