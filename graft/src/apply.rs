// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Applying a patch to the content of its old side.

use bytes::Bytes;
use tracing::{debug, debug_span, trace, warn};

use crate::{
    error::{Error, Result},
    line::{DiffLine, LineOrigin},
    object::{DeltaStatus, FileMode},
    patch::{Hunk, Patch, PatchFlags},
};

/// The outcome of applying a patch
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyResult {
    /// The reconstructed new-side content
    pub contents: Vec<u8>,
    /// Path of the new side, unless the patch deletes the file
    pub path: Option<String>,
    /// Mode of the new side, unless the patch deletes the file
    pub mode: Option<FileMode>,
}

/// A file under reconstruction, one entry per line
///
/// Entries point either into the lines cut from the base buffer or into the patch's own lines,
/// so splicing never copies content.
#[derive(Debug)]
struct PatchImage<'a> {
    lines: Vec<&'a DiffLine>,
}

impl<'a> PatchImage<'a> {
    fn new(base: &'a [DiffLine]) -> Result<Self> {
        let mut lines = Vec::new();
        lines.try_reserve_exact(base.len())?;
        lines.extend(base.iter());
        Ok(Self { lines })
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether `preimage` sits at `anchor`
    ///
    /// Hashes rule most mismatches out cheaply; only a full byte comparison confirms a match.
    fn matches(&self, anchor: usize, preimage: &[&DiffLine]) -> bool {
        let Some(window) = anchor
            .checked_add(preimage.len())
            .and_then(|end| self.lines.get(anchor..end))
        else {
            return false;
        };

        if window
            .iter()
            .zip(preimage)
            .any(|(line, expected)| line.hash() != expected.hash())
        {
            return false;
        }

        window.iter().zip(preimage).all(|(line, expected)| {
            line.content_len() == expected.content_len() && line.content() == expected.content()
        })
    }

    /// Replaces `removed` lines at `anchor` with `postimage`
    fn splice(&mut self, anchor: usize, removed: usize, postimage: &[&'a DiffLine]) -> Result<()> {
        if let Some(grow) = postimage.len().checked_sub(removed) {
            self.lines.try_reserve(grow)?;
        }

        self.lines
            .splice(anchor..anchor + removed, postimage.iter().copied());
        Ok(())
    }

    fn write_to(&self) -> Result<Vec<u8>> {
        let len = self.lines.iter().map(|line| line.content_len()).sum();

        let mut out = Vec::new();
        out.try_reserve_exact(len)?;
        for line in &self.lines {
            out.extend_from_slice(line.content());
        }
        Ok(out)
    }
}

/// Cuts `base` into context lines, terminators included
fn base_lines(base: &Bytes) -> Vec<DiffLine> {
    let mut lines = Vec::new();
    let mut start = 0;

    for end in line_ends(base) {
        lines.push(DiffLine::borrowed(LineOrigin::Context, base, start, end - start));
        start = end;
    }
    if start < base.len() {
        lines.push(DiffLine::borrowed(
            LineOrigin::Context,
            base,
            start,
            base.len() - start,
        ));
    }

    lines
}

/// Offsets just past each newline
fn line_ends(data: &[u8]) -> impl Iterator<Item = usize> + '_ {
    data.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'\n')
        .map(|(i, _)| i + 1)
}

/// Where a hunk is expected to sit in the image
///
/// Earlier hunks have already been spliced in, so positions are in new-file coordinates. A
/// hunk with no post-image lines names the line it follows rather than the one it starts at.
fn hunk_anchor(hunk: &Hunk) -> usize {
    if hunk.new_lines == 0 {
        hunk.new_start
    } else {
        hunk.new_start.saturating_sub(1)
    }
}

fn apply_hunks(patch: &Patch, base: &[u8]) -> Result<Vec<u8>> {
    let base = Bytes::copy_from_slice(base);
    let arena = base_lines(&base);
    let mut image = PatchImage::new(&arena)?;

    for (hunk, lines) in patch.hunks() {
        let preimage: Vec<&DiffLine> = lines
            .iter()
            .filter(|line| line.origin().in_preimage())
            .collect();
        let postimage: Vec<&DiffLine> = lines
            .iter()
            .filter(|line| line.origin().in_postimage())
            .collect();

        let anchor = hunk_anchor(hunk).min(image.len());

        if !image.matches(anchor, &preimage) {
            warn!(
                line = hunk.new_start,
                anchor,
                image_len = image.len(),
                "hunk does not match"
            );
            return Err(Error::HunkMismatch {
                line: hunk.new_start,
            });
        }

        trace!(
            anchor,
            removed = preimage.len(),
            added = postimage.len(),
            "splicing hunk"
        );
        image.splice(anchor, preimage.len(), &postimage)?;
    }

    image.write_to()
}

/// Applies `patch` to `base`, the content of its old side
///
/// Hunks are applied in order, each at exactly the position it declares. Binary patches are
/// rebuilt from their new-side encoding.
///
/// # Errors
///
/// - [`Error::HunkMismatch`] if a hunk's pre-image isn't found where it belongs
/// - [`Error::MalformedDelta`] if a deletion leaves content behind, a binary patch carries no
///   encoding, or the encoding doesn't rebuild against `base`
/// - [`Error::Allocation`] if the output can't be allocated
///
/// # Examples
///
/// ```
/// use graft::{DiffOptions, Patch};
///
/// # fn main() -> Result<(), graft::Error> {
/// let old = b"one\ntwo\nthree\n";
/// let new = b"one\n2\nthree\n";
/// let patch = Patch::from_buffers(Some(old), None, Some(new), None, &DiffOptions::new())?;
///
/// let result = graft::apply(&patch, old)?;
/// assert_eq!(result.contents, new);
/// # Ok(())
/// # }
/// ```
pub fn apply(patch: &Patch, base: &[u8]) -> Result<ApplyResult> {
    let delta = patch.delta();
    let span = debug_span!("apply", path = delta.path().unwrap_or_default());
    let _enter = span.enter();

    let contents = if let Some(binary) = patch.binary() {
        debug!(kind = ?binary.new_file.kind, "rebuilding binary content");
        binary.new_file.inflate(base)?
    } else if delta.binary == Some(true)
        && !patch.options().shows_binary()
        && patch.flags().contains(PatchFlags::DIFFABLE)
    {
        return Err(Error::malformed("patch does not contain binary data"));
    } else {
        apply_hunks(patch, base)?
    };

    if delta.status == DeltaStatus::Deleted {
        if !contents.is_empty() {
            return Err(Error::malformed("removal patch leaves file contents"));
        }

        return Ok(ApplyResult {
            contents,
            path: None,
            mode: None,
        });
    }

    Ok(ApplyResult {
        contents,
        path: delta.new_file.path.clone(),
        mode: Some(delta.new_file.mode),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        object::{DiffDelta, DiffFile},
        options::DiffOptions,
    };

    fn patch_with(status: DeltaStatus, hunk: Hunk, lines: &[(LineOrigin, &str)]) -> Patch {
        let old = if status == DeltaStatus::Added {
            DiffFile::default()
        } else {
            DiffFile::new("f.txt")
        };
        let new = if status == DeltaStatus::Deleted {
            DiffFile::default()
        } else {
            DiffFile::new("f.txt")
        };

        let mut patch = Patch::new(DiffDelta::new(status, old, new), &DiffOptions::new());
        patch.push_hunk(hunk);
        for &(origin, content) in lines {
            patch.push_line(DiffLine::new(origin, content)).unwrap();
        }
        patch
    }

    #[test]
    fn base_lines_keep_unterminated_tail() {
        let base = Bytes::from_static(b"a\nb\nc");
        let lines: Vec<_> = base_lines(&base)
            .iter()
            .map(|line| line.content().to_vec())
            .collect();
        assert_eq!(lines, [b"a\n".to_vec(), b"b\n".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn whitespace_only_difference_does_not_match() {
        // Same hash, different bytes
        let patch = patch_with(
            DeltaStatus::Modified,
            Hunk::new(1, 1, 1, 1),
            &[
                (LineOrigin::Deletion, "a b\n"),
                (LineOrigin::Addition, "c\n"),
            ],
        );

        assert!(matches!(
            apply(&patch, b"ab\n"),
            Err(Error::HunkMismatch { line: 1 })
        ));
        assert_eq!(apply(&patch, b"a b\n").unwrap().contents, b"c\n");
    }

    #[test]
    fn pure_removal_anchors_after_named_line() {
        // Third line removed with no context: new range "2,0"
        let patch = patch_with(
            DeltaStatus::Modified,
            Hunk::new(3, 1, 2, 0),
            &[(LineOrigin::Deletion, "three\n")],
        );

        let result = apply(&patch, b"one\ntwo\nthree\nfour\n").unwrap();
        assert_eq!(result.contents, b"one\ntwo\nfour\n");
        assert_eq!(result.path.as_deref(), Some("f.txt"));
        assert_eq!(result.mode, Some(FileMode::Blob));
    }

    #[test]
    fn anchor_past_end_is_clamped_then_fails() {
        let patch = patch_with(
            DeltaStatus::Modified,
            Hunk::new(50, 1, 50, 1),
            &[
                (LineOrigin::Deletion, "x\n"),
                (LineOrigin::Addition, "y\n"),
            ],
        );
        assert!(matches!(
            apply(&patch, b"short\n"),
            Err(Error::HunkMismatch { line: 50 })
        ));
    }

    #[test]
    fn deletion_must_leave_nothing() {
        let patch = patch_with(
            DeltaStatus::Deleted,
            Hunk::new(1, 1, 0, 0),
            &[(LineOrigin::Deletion, "gone\n")],
        );

        let result = apply(&patch, b"gone\n").unwrap();
        assert!(result.contents.is_empty());
        assert_eq!(result.path, None);
        assert_eq!(result.mode, None);

        let partial = patch_with(
            DeltaStatus::Deleted,
            Hunk::new(1, 1, 0, 0),
            &[(LineOrigin::Deletion, "gone\n")],
        );
        assert!(matches!(
            apply(&partial, b"gone\nstays\n"),
            Err(Error::MalformedDelta { .. })
        ));
    }

    #[test]
    fn markers_stay_out_of_the_image() {
        let patch = patch_with(
            DeltaStatus::Modified,
            Hunk::new(1, 1, 1, 1),
            &[
                (LineOrigin::Deletion, "end\n"),
                (LineOrigin::Addition, "end"),
                (
                    LineOrigin::AdditionNoNewline,
                    "\n\\ No newline at end of file\n",
                ),
            ],
        );
        assert_eq!(apply(&patch, b"end\n").unwrap().contents, b"end");
    }

    #[test]
    fn splice_grows_and_shrinks() {
        let arena: Vec<DiffLine> = ["a\n", "b\n", "c\n"]
            .into_iter()
            .map(|s| DiffLine::new(LineOrigin::Context, s))
            .collect();
        let extra: Vec<DiffLine> = ["x\n", "y\n"]
            .into_iter()
            .map(|s| DiffLine::new(LineOrigin::Addition, s))
            .collect();
        let extra: Vec<&DiffLine> = extra.iter().collect();

        let mut image = PatchImage::new(&arena).unwrap();
        image.splice(1, 1, &extra).unwrap();
        assert_eq!(image.write_to().unwrap(), b"a\nx\ny\nc\n");

        image.splice(0, 3, &[]).unwrap();
        assert_eq!(image.write_to().unwrap(), b"c\n");
    }
}
