// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Copy/insert instruction streams that rebuild one buffer from another.
//!
//! The stream starts with the reference and target lengths as unsigned LEB128 varints, followed
//! by instructions:
//!
//! ```text
//! 1xxxxxxx [offset bytes] [size bytes]   copy from the reference
//! 0nnnnnnn <n literal bytes>             insert, 1 <= n <= 127
//! ```
//!
//! In a copy, bits 0-3 select which little-endian offset bytes follow and bits 4-6 which size
//! bytes follow. Omitted bytes are zero, and a size of zero means 0x10000.

use std::collections::HashMap;

use byteorder::ReadBytesExt;
use integer_encoding::{VarIntReader, VarIntWriter};
use tracing::trace;

use crate::error::{Error, Result};

/// Length of the reference blocks indexed for matching
const BLOCK_SIZE: usize = 16;

/// Candidate offsets kept per distinct block
const BUCKET_LIMIT: usize = 64;

const MAX_INSERT: usize = 0x7f;
const MAX_COPY: usize = 0xff_ffff;

/// Largest buffer either side of a delta may be
pub const MAX_BUFFER_LEN: usize = u32::MAX as usize;

/// Checks that a buffer length fits the delta format's offset width
///
/// # Errors
///
/// Returns [`Error::SizeOverflow`] if `len` exceeds [`MAX_BUFFER_LEN`].
pub fn check_len(len: usize) -> Result<()> {
    if len > MAX_BUFFER_LEN {
        return Err(Error::SizeOverflow {
            len,
            max: MAX_BUFFER_LEN,
        });
    }
    Ok(())
}

/// Index of every block-aligned 16-byte window of the reference
struct BlockIndex<'a> {
    reference: &'a [u8],
    blocks: HashMap<&'a [u8], Vec<usize>>,
}

impl<'a> BlockIndex<'a> {
    fn new(reference: &'a [u8]) -> Self {
        let mut blocks: HashMap<&[u8], Vec<usize>> = HashMap::new();

        for (i, block) in reference.chunks_exact(BLOCK_SIZE).enumerate() {
            let bucket = blocks.entry(block).or_default();
            if bucket.len() < BUCKET_LIMIT {
                bucket.push(i * BLOCK_SIZE);
            }
        }

        Self { reference, blocks }
    }

    /// Finds the longest reference run starting with `target[pos..pos + BLOCK_SIZE]`
    fn longest_match(&self, target: &[u8], pos: usize) -> Option<(usize, usize)> {
        let key = target.get(pos..pos + BLOCK_SIZE)?;
        let candidates = self.blocks.get(key)?;

        candidates
            .iter()
            .map(|&offset| {
                let len = self.reference[offset..]
                    .iter()
                    .zip(&target[pos..])
                    .take_while(|(a, b)| a == b)
                    .count();
                (offset, len)
            })
            .max_by_key(|&(_, len)| len)
    }
}

/// Computes a delta that rebuilds `target` from `reference`
///
/// Returns `Ok(None)` when the instruction stream would grow past `max_size` bytes, meaning no
/// delta smaller than the budget exists. A `max_size` of 0 means no budget.
///
/// # Errors
///
/// Returns [`Error::SizeOverflow`] if either buffer is longer than [`MAX_BUFFER_LEN`].
pub fn compute_delta(reference: &[u8], target: &[u8], max_size: usize) -> Result<Option<Vec<u8>>> {
    check_len(reference.len())?;
    check_len(target.len())?;

    let over_budget = |out: &Vec<u8>| max_size != 0 && out.len() > max_size;

    let mut out = Vec::new();
    out.write_varint(reference.len())?;
    out.write_varint(target.len())?;

    let index = BlockIndex::new(reference);
    let mut pos = 0;
    let mut insert_start = 0;

    while pos < target.len() {
        let Some((mut offset, mut len)) = index.longest_match(target, pos) else {
            pos += 1;
            continue;
        };

        // Pull bytes back out of the pending insert when they also precede the match
        while offset > 0 && pos > insert_start && reference[offset - 1] == target[pos - 1] {
            offset -= 1;
            pos -= 1;
            len += 1;
        }

        push_insert(&mut out, &target[insert_start..pos]);
        push_copy(&mut out, offset, len);
        pos += len;
        insert_start = pos;

        if over_budget(&out) {
            trace!(len = out.len(), max_size, "delta exceeded budget");
            return Ok(None);
        }
    }

    push_insert(&mut out, &target[insert_start..]);

    if over_budget(&out) {
        trace!(len = out.len(), max_size, "delta exceeded budget");
        return Ok(None);
    }

    Ok(Some(out))
}

fn push_insert(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(MAX_INSERT) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
}

fn push_copy(out: &mut Vec<u8>, mut offset: usize, mut len: usize) {
    while len > 0 {
        let size = len.min(MAX_COPY);
        let mut cmd = 0x80;
        let mut args = [0u8; 7];
        let mut n = 0;

        for i in 0..4 {
            let byte = (offset >> (8 * i)) as u8;
            if byte != 0 {
                cmd |= 1 << i;
                args[n] = byte;
                n += 1;
            }
        }
        for i in 0..3 {
            let byte = (size >> (8 * i)) as u8;
            if byte != 0 {
                cmd |= 0x10 << i;
                args[n] = byte;
                n += 1;
            }
        }

        out.push(cmd);
        out.extend_from_slice(&args[..n]);

        offset += size;
        len -= size;
    }
}

fn next_byte(cursor: &mut &[u8]) -> Result<u8> {
    cursor
        .read_u8()
        .map_err(|_| Error::malformed("truncated delta instruction"))
}

/// Rebuilds the target of `delta` from `reference`
///
/// # Errors
///
/// Returns [`Error::MalformedDelta`] if the delta was made against a reference of another length,
/// is truncated, copies from outside the reference or doesn't produce its declared length.
pub fn apply_delta(reference: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = delta;

    let reference_len: usize = cursor
        .read_varint()
        .map_err(|_| Error::malformed("truncated delta header"))?;
    let target_len: usize = cursor
        .read_varint()
        .map_err(|_| Error::malformed("truncated delta header"))?;

    if reference_len != reference.len() {
        return Err(Error::malformed(format!(
            "delta expects a {reference_len}-byte reference, found {} bytes",
            reference.len(),
        )));
    }

    let mut out = Vec::new();
    out.try_reserve_exact(target_len)?;

    while !cursor.is_empty() {
        let cmd = next_byte(&mut cursor)?;

        if cmd & 0x80 != 0 {
            let mut offset = 0usize;
            let mut size = 0usize;

            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    offset |= usize::from(next_byte(&mut cursor)?) << (8 * i);
                }
            }
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    size |= usize::from(next_byte(&mut cursor)?) << (8 * i);
                }
            }
            if size == 0 {
                size = 0x10000;
            }

            let source = offset
                .checked_add(size)
                .and_then(|end| reference.get(offset..end))
                .ok_or_else(|| Error::malformed("delta copies outside the reference"))?;
            out.extend_from_slice(source);
        } else if cmd != 0 {
            let n = usize::from(cmd);
            if cursor.len() < n {
                return Err(Error::malformed("truncated delta insert"));
            }
            out.extend_from_slice(&cursor[..n]);
            cursor = &cursor[n..];
        } else {
            return Err(Error::malformed("reserved delta instruction 0"));
        }

        if out.len() > target_len {
            return Err(Error::malformed("delta overruns its declared length"));
        }
    }

    if out.len() != target_len {
        return Err(Error::malformed(format!(
            "delta produced {} bytes, expected {target_len}",
            out.len(),
        )));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn small_edit_is_mostly_copies() {
        let reference = sample(4096, 1);
        let mut target = reference.clone();
        target[2000..2004].copy_from_slice(b"EDIT");

        let delta = compute_delta(&reference, &target, 0).unwrap().unwrap();
        assert!(delta.len() < 64, "delta is {} bytes", delta.len());
        assert_eq!(apply_delta(&reference, &delta).unwrap(), target);
    }

    #[test]
    fn unrelated_buffers_are_all_inserts() {
        let reference = sample(300, 7);
        let target = sample(300, 8);

        let delta = compute_delta(&reference, &target, 0).unwrap().unwrap();
        assert_eq!(apply_delta(&reference, &delta).unwrap(), target);
    }

    #[test]
    fn budget_rejects_large_delta() {
        let reference = sample(1024, 3);
        let target = sample(1024, 4);

        assert_eq!(compute_delta(&reference, &target, 100).unwrap(), None);
    }

    #[test]
    fn long_copies_are_split() {
        let reference = vec![b'z'; MAX_COPY + 100];
        let mut delta = Vec::new();
        delta.write_varint(reference.len()).unwrap();
        delta.write_varint(reference.len()).unwrap();
        push_copy(&mut delta, 0, reference.len());

        // 8 header bytes, a full-size copy (cmd + 3 size bytes), then the remainder at offset
        // 0xffffff (cmd + 3 offset bytes + 1 size byte)
        assert_eq!(delta.len(), 17);
        assert_eq!(apply_delta(&reference, &delta).unwrap(), reference);
    }

    #[test]
    fn length_width_is_enforced() {
        assert!(check_len(MAX_BUFFER_LEN).is_ok());
        assert!(matches!(
            check_len(MAX_BUFFER_LEN + 1),
            Err(Error::SizeOverflow { max: MAX_BUFFER_LEN, .. })
        ));
    }

    #[test]
    fn apply_rejects_wrong_reference() {
        let reference = sample(64, 5);
        let delta = compute_delta(&reference, b"tail", 0).unwrap().unwrap();
        let err = apply_delta(&reference[..10], &delta).unwrap_err();
        assert!(err.to_string().contains("64-byte reference"));
    }

    #[test]
    fn apply_rejects_out_of_bounds_copy() {
        // reference 4, target 8, copy offset 0 size 8
        let delta = [0x04, 0x08, 0x90, 0x08];
        let err = apply_delta(b"abcd", &delta).unwrap_err();
        assert!(matches!(err, Error::MalformedDelta { .. }));
    }

    #[test]
    fn apply_rejects_truncated_insert() {
        let delta = [0x00, 0x05, 0x05, b'a', b'b'];
        assert!(apply_delta(b"", &delta).is_err());
    }

    #[test]
    fn zero_size_copy_means_64k() {
        let reference = sample(0x10000, 9);
        // reference 0x10000, target 0x10000, copy with no offset or size bytes
        let mut delta = Vec::new();
        delta.write_varint(0x10000usize).unwrap();
        delta.write_varint(0x10000usize).unwrap();
        delta.push(0x80);
        assert_eq!(apply_delta(&reference, &delta).unwrap(), reference);
    }
}
