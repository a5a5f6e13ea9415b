// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Line records shared by generated patches and apply-time images.

use std::{fmt, sync::OnceLock};

use bytes::Bytes;

/// Text emitted after a line that has no terminating newline
pub const NO_NEWLINE_MARKER: &[u8] = b"\n\\ No newline at end of file\n";

/// Classification of a line within a hunk
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LineOrigin {
    /// Present on both sides
    Context,
    /// Present only on the new side
    Addition,
    /// Present only on the old side
    Deletion,
    /// Both sides lack a newline at end of file
    ContextNoNewline,
    /// The old side has a final newline, the new side doesn't
    AdditionNoNewline,
    /// The new side has a final newline, the old side doesn't
    DeletionNoNewline,
}

impl LineOrigin {
    /// The character prefixed to this line in unified-diff text
    pub const fn as_char(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Addition => '+',
            Self::Deletion => '-',
            Self::ContextNoNewline => '=',
            Self::AdditionNoNewline => '>',
            Self::DeletionNoNewline => '<',
        }
    }

    /// Whether this line belongs to a hunk's pre-image
    pub const fn in_preimage(self) -> bool {
        matches!(self, Self::Context | Self::Deletion)
    }

    /// Whether this line belongs to a hunk's post-image
    pub const fn in_postimage(self) -> bool {
        matches!(self, Self::Context | Self::Addition)
    }

    /// Whether this is one of the end-of-file newline markers
    pub const fn is_eofnl(self) -> bool {
        matches!(
            self,
            Self::ContextNoNewline | Self::AdditionNoNewline | Self::DeletionNoNewline
        )
    }
}

/// Where a line's bytes live
///
/// Lines cut from a loaded file keep a handle on the whole buffer plus the range they cover, so a
/// patch stays valid after the source that produced it is gone.
#[derive(Clone)]
pub enum LineContent {
    /// A range of a shared buffer
    Borrowed {
        /// The buffer the line was cut from
        buffer: Bytes,
        /// Start of the line within `buffer`
        offset: usize,
        /// Length of the line in bytes
        len: usize,
    },
    /// Bytes owned by the line itself
    Owned(Vec<u8>),
}

impl LineContent {
    /// Resolves the content to a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Borrowed {
                buffer,
                offset,
                len,
            } => &buffer[*offset..*offset + *len],
            Self::Owned(bytes) => bytes,
        }
    }
}

impl fmt::Debug for LineContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// One line of a hunk or of an image under reconstruction
#[derive(Clone, Debug)]
pub struct DiffLine {
    origin: LineOrigin,
    content: LineContent,
    content_offset: Option<usize>,
    old_lineno: Option<usize>,
    new_lineno: Option<usize>,
    hash: OnceLock<u64>,
}

impl DiffLine {
    /// Creates a line owning a copy of `content`
    pub fn new(origin: LineOrigin, content: impl Into<Vec<u8>>) -> Self {
        Self::with_content(origin, LineContent::Owned(content.into()), None)
    }

    /// Creates a line covering `len` bytes of `buffer` starting at `offset`
    ///
    /// # Panics
    ///
    /// Panics if the range lies outside `buffer`.
    pub fn borrowed(origin: LineOrigin, buffer: &Bytes, offset: usize, len: usize) -> Self {
        assert!(offset + len <= buffer.len(), "line range outside buffer");

        let content = LineContent::Borrowed {
            buffer: buffer.clone(),
            offset,
            len,
        };
        Self::with_content(origin, content, Some(offset))
    }

    fn with_content(origin: LineOrigin, content: LineContent, content_offset: Option<usize>) -> Self {
        Self {
            origin,
            content,
            content_offset,
            old_lineno: None,
            new_lineno: None,
            hash: OnceLock::new(),
        }
    }

    /// Sets the line numbers this line occupies on each side
    pub fn with_line_numbers(mut self, old_lineno: Option<usize>, new_lineno: Option<usize>) -> Self {
        self.old_lineno = old_lineno;
        self.new_lineno = new_lineno;
        self
    }

    /// Line classification
    pub fn origin(&self) -> LineOrigin {
        self.origin
    }

    /// Raw bytes of the line, including its terminator if it has one
    pub fn content(&self) -> &[u8] {
        self.content.as_bytes()
    }

    /// Storage backing the line
    pub fn storage(&self) -> &LineContent {
        &self.content
    }

    /// Length of the content in bytes
    pub fn content_len(&self) -> usize {
        self.content().len()
    }

    /// Offset of the content within the buffer it came from, if any
    pub fn content_offset(&self) -> Option<usize> {
        self.content_offset
    }

    /// Line number in the old file, `None` for additions
    pub fn old_lineno(&self) -> Option<usize> {
        self.old_lineno
    }

    /// Line number in the new file, `None` for deletions
    pub fn new_lineno(&self) -> Option<usize> {
        self.new_lineno
    }

    /// Number of newline characters in the content
    pub fn num_lines(&self) -> usize {
        self.content().iter().filter(|&&b| b == b'\n').count()
    }

    /// Whitespace-insensitive hash of the content, computed on first use
    ///
    /// Two lines that differ only in where their spaces and tabs sit hash the same, so this only
    /// ever rules a match out.
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| line_hash(self.content()))
    }
}

/// Rolling `hash * 3 + byte` over every non-whitespace byte
pub fn line_hash(content: &[u8]) -> u64 {
    content
        .iter()
        .filter(|b| !is_space(**b))
        .fold(0u64, |hash, &b| hash.wrapping_mul(3).wrapping_add(u64::from(b)))
}

// Same set as C's isspace() in the "C" locale
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_whitespace() {
        let a = DiffLine::new(LineOrigin::Context, "int  x = 1;\n");
        let b = DiffLine::new(LineOrigin::Context, "int x=1;\n");
        let c = DiffLine::new(LineOrigin::Context, "\tint x =\t1;");
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash(), c.hash());
    }

    #[test]
    fn hash_depends_on_order() {
        assert_ne!(line_hash(b"ab"), line_hash(b"ba"));
    }

    #[test]
    fn hash_is_memoized() {
        let line = DiffLine::new(LineOrigin::Deletion, "value\n");
        let first = line.hash();
        assert_eq!(line.hash.get(), Some(&first));
        assert_eq!(line.hash(), first);
    }

    #[test]
    fn borrowed_line_resolves_range() {
        let buffer = Bytes::from_static(b"one\ntwo\nthree\n");
        let line = DiffLine::borrowed(LineOrigin::Context, &buffer, 4, 4);
        assert_eq!(line.content(), b"two\n");
        assert_eq!(line.content_offset(), Some(4));
        assert_eq!(line.num_lines(), 1);
        assert!(matches!(
            line.storage(),
            LineContent::Borrowed { offset: 4, len: 4, .. }
        ));
        assert!(matches!(
            DiffLine::new(LineOrigin::Addition, "x\n").storage(),
            LineContent::Owned(_)
        ));

        drop(buffer);
        assert_eq!(line.content(), b"two\n");
    }

    #[test]
    fn eofnl_origins_sit_outside_both_images() {
        for origin in [
            LineOrigin::ContextNoNewline,
            LineOrigin::AdditionNoNewline,
            LineOrigin::DeletionNoNewline,
        ] {
            assert!(origin.is_eofnl());
            assert!(!origin.in_preimage());
            assert!(!origin.in_postimage());
        }
        assert!(LineOrigin::Context.in_preimage() && LineOrigin::Context.in_postimage());
        assert!(LineOrigin::Deletion.in_preimage() && !LineOrigin::Deletion.in_postimage());
        assert!(LineOrigin::Addition.in_postimage() && !LineOrigin::Addition.in_preimage());
    }
}
