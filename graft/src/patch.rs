// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Materialized diffs of a single file pair.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    binary::BinaryEncoding,
    error::{Error, Result},
    line::{DiffLine, LineOrigin},
    list::DiffList,
    object::DiffDelta,
    observer::{DiffObserver, ObserverResult},
    options::DiffOptions,
    print,
};

/// Header of one hunk
///
/// Starts are 1-based. A range covering no lines reports the line it follows instead, so an
/// insertion at the top of a file has an old start of 0.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Hunk {
    /// First line of the range in the old file
    pub old_start: usize,
    /// Number of old-file lines the hunk covers
    pub old_lines: usize,
    /// First line of the range in the new file
    pub new_start: usize,
    /// Number of new-file lines the hunk covers
    pub new_lines: usize,
    /// Header text, including its trailing newline
    pub header: String,
}

impl Hunk {
    /// Creates a hunk covering the given ranges, formatting its header
    pub fn new(old_start: usize, old_lines: usize, new_start: usize, new_lines: usize) -> Self {
        let header = format!(
            "@@ -{} +{} @@\n",
            format_range(old_start, old_lines),
            format_range(new_start, new_lines),
        );

        Self {
            old_start,
            old_lines,
            new_start,
            new_lines,
            header,
        }
    }
}

fn format_range(start: usize, lines: usize) -> String {
    if lines == 1 {
        start.to_string()
    } else {
        format!("{start},{lines}")
    }
}

#[derive(Clone, Debug)]
struct PatchHunk {
    hunk: Hunk,
    line_start: usize,
    line_count: usize,
}

/// Progress of a patch through generation
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct PatchFlags(u8);

impl PatchFlags {
    /// Content of both sides has been loaded
    pub const LOADED: Self = Self(1);
    /// The sides differ in a way worth diffing
    pub const DIFFABLE: Self = Self(1 << 1);
    /// Hunks and lines (or the binary encoding) have been produced
    pub const DIFFED: Self = Self(1 << 2);
    /// Whether the pair is binary has been settled
    pub const BINARY_KNOWN: Self = Self(1 << 3);

    /// Whether every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets every flag in `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears every flag in `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl fmt::Debug for PatchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::LOADED, "LOADED"),
            (Self::DIFFABLE, "DIFFABLE"),
            (Self::DIFFED, "DIFFED"),
            (Self::BINARY_KNOWN, "BINARY_KNOWN"),
        ];
        f.debug_set()
            .entries(
                names
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .map(|(_, name)| name),
            )
            .finish()
    }
}

/// Counts of changed lines in a patch
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct LineStats {
    /// Unchanged lines
    pub context: usize,
    /// Added lines
    pub additions: usize,
    /// Deleted lines
    pub deletions: usize,
}

/// The diff of one file pair: its delta, hunks and lines, or its binary encoding
///
/// Lines are stored in one contiguous array in hunk order; each hunk records the slice of that
/// array it owns. Line contents share the loaded buffers they were cut from, so a patch remains
/// valid after its sources are gone.
#[derive(Clone, Debug)]
pub struct Patch {
    delta: DiffDelta,
    options: DiffOptions,
    hunks: Vec<PatchHunk>,
    lines: Vec<DiffLine>,
    binary: Option<BinaryEncoding>,
    header_size: usize,
    content_size: usize,
    context_size: usize,
    flags: PatchFlags,
    origin: Option<(Weak<DiffList>, usize)>,
}

impl Patch {
    /// Creates an empty patch for `delta`
    ///
    /// Hunks and lines are appended with [`push_hunk()`](Self::push_hunk) and
    /// [`push_line()`](Self::push_line), which is how a parser would assemble a patch read from
    /// text.
    pub fn new(delta: DiffDelta, options: &DiffOptions) -> Self {
        Self {
            delta,
            options: options.normalize(),
            hunks: Vec::new(),
            lines: Vec::new(),
            binary: None,
            header_size: 0,
            content_size: 0,
            context_size: 0,
            flags: PatchFlags::default(),
            origin: None,
        }
    }

    pub(crate) fn set_generated(&mut self, delta: DiffDelta, flags: PatchFlags) {
        self.delta = delta;
        self.flags = flags;
    }

    pub(crate) fn set_origin(&mut self, list: &Arc<DiffList>, index: usize) {
        self.origin = Some((Arc::downgrade(list), index));
    }

    /// Appends a hunk; following lines belong to it
    pub fn push_hunk(&mut self, hunk: Hunk) {
        self.header_size += hunk.header.len();
        self.hunks.push(PatchHunk {
            hunk,
            line_start: self.lines.len(),
            line_count: 0,
        });
    }

    /// Appends a line to the last hunk
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDelta`] if no hunk has been pushed yet.
    pub fn push_line(&mut self, line: DiffLine) -> Result<()> {
        let hunk = self
            .hunks
            .last_mut()
            .ok_or_else(|| Error::malformed("line pushed before any hunk"))?;

        let len = line.content_len();
        self.content_size += len;
        match line.origin() {
            LineOrigin::Addition | LineOrigin::Deletion => self.content_size += 1,
            LineOrigin::Context => {
                self.content_size += 1;
                self.context_size += len + 1;
            }
            LineOrigin::ContextNoNewline => self.context_size += len,
            LineOrigin::AdditionNoNewline | LineOrigin::DeletionNoNewline => {}
        }

        hunk.line_count += 1;
        self.lines.push(line);
        Ok(())
    }

    /// Sets the binary encoding of the pair
    pub fn set_binary(&mut self, binary: BinaryEncoding) {
        self.binary = Some(binary);
    }

    /// The delta this patch describes
    pub fn delta(&self) -> &DiffDelta {
        &self.delta
    }

    /// The options the patch was generated with
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Generation progress
    pub fn flags(&self) -> PatchFlags {
        self.flags
    }

    /// The binary encoding, for binary pairs
    pub fn binary(&self) -> Option<&BinaryEncoding> {
        self.binary.as_ref()
    }

    /// The collection this patch was made from and its position there, if it is still alive
    pub fn collection(&self) -> Option<(Arc<DiffList>, usize)> {
        let (list, index) = self.origin.as_ref()?;
        list.upgrade().map(|list| (list, *index))
    }

    /// Number of hunks
    pub fn num_hunks(&self) -> usize {
        self.hunks.len()
    }

    /// The hunk at `index` and the number of lines it owns
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if there is no such hunk.
    pub fn hunk(&self, index: usize) -> Result<(&Hunk, usize)> {
        let hunk = self.patch_hunk(index)?;
        Ok((&hunk.hunk, hunk.line_count))
    }

    /// Number of lines owned by the hunk at `index`
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if there is no such hunk.
    pub fn num_lines_in_hunk(&self, index: usize) -> Result<usize> {
        Ok(self.patch_hunk(index)?.line_count)
    }

    /// Line `line` of hunk `hunk`
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if there is no such hunk or line.
    pub fn line_in_hunk(&self, hunk: usize, line: usize) -> Result<&DiffLine> {
        self.hunk_lines(hunk)?
            .get(line)
            .ok_or_else(|| Error::out_of_range("line", line))
    }

    /// All lines of the hunk at `index`
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if there is no such hunk.
    pub fn hunk_lines(&self, index: usize) -> Result<&[DiffLine]> {
        let hunk = self.patch_hunk(index)?;
        Ok(&self.lines[hunk.line_start..hunk.line_start + hunk.line_count])
    }

    /// Iterates over hunks together with their lines
    pub fn hunks(&self) -> impl Iterator<Item = (&Hunk, &[DiffLine])> {
        self.hunks.iter().map(|hunk| {
            (
                &hunk.hunk,
                &self.lines[hunk.line_start..hunk.line_start + hunk.line_count],
            )
        })
    }

    /// Every line of every hunk, in order
    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }

    fn patch_hunk(&self, index: usize) -> Result<&PatchHunk> {
        self.hunks
            .get(index)
            .ok_or_else(|| Error::out_of_range("hunk", index))
    }

    /// Counts context, added and deleted lines
    pub fn line_stats(&self) -> LineStats {
        self.lines
            .iter()
            .fold(LineStats::default(), |mut stats, line| {
                match line.origin() {
                    LineOrigin::Context => stats.context += 1,
                    LineOrigin::Addition => stats.additions += 1,
                    LineOrigin::Deletion => stats.deletions += 1,
                    _ => {}
                }
                stats
            })
    }

    /// Total bytes of hunk header text
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Total bytes of line content, counting one origin byte per context, added and deleted line
    pub fn content_size(&self) -> usize {
        self.content_size
    }

    /// The share of [`content_size()`](Self::content_size) taken by context lines
    pub fn context_size(&self) -> usize {
        self.context_size
    }

    /// Approximate size of the patch as unified-diff text
    ///
    /// Context lines, hunk headers and the file header can each be left out of the count.
    pub fn size(
        &self,
        include_context: bool,
        include_hunk_headers: bool,
        include_file_headers: bool,
    ) -> usize {
        let mut size = self.content_size;

        if !include_context {
            size -= self.context_size;
        }
        if include_hunk_headers {
            size += self.header_size;
        }
        if include_file_headers {
            size += print::file_header(&self.delta, &self.options).len();
        }

        size
    }

    /// Delivers this patch's content to `observer` as if it were being generated
    ///
    /// The file event carries a progress of 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallbackAborted`] if the observer stops the replay.
    pub fn replay(&self, mut observer: impl DiffObserver) -> Result<()> {
        const CONTEXT: &str = "graft::Patch::replay";

        let abort = |source| Error::CallbackAborted {
            context: CONTEXT,
            source,
        };
        let interest = observer.interest();

        observer.on_file(&self.delta, 0.0).map_err(abort)?;

        if let Some(binary) = &self.binary {
            if interest.binary {
                observer.on_binary(&self.delta, binary).map_err(abort)?;
            }
            return Ok(());
        }

        if !interest.hunks && !interest.lines {
            return Ok(());
        }

        for (hunk, lines) in self.hunks() {
            if interest.hunks {
                observer.on_hunk(&self.delta, hunk).map_err(abort)?;
            }
            if interest.lines {
                for line in lines {
                    observer.on_line(&self.delta, hunk, line).map_err(abort)?;
                }
            }
        }

        Ok(())
    }
}

/// Observer that appends everything it receives to a patch
pub(crate) struct PatchCollector<'a> {
    patch: &'a mut Patch,
}

impl<'a> PatchCollector<'a> {
    pub(crate) fn new(patch: &'a mut Patch) -> Self {
        Self { patch }
    }
}

impl DiffObserver for PatchCollector<'_> {
    fn on_binary(&mut self, _delta: &DiffDelta, binary: &BinaryEncoding) -> ObserverResult {
        self.patch.set_binary(binary.clone());
        Ok(())
    }

    fn on_hunk(&mut self, _delta: &DiffDelta, hunk: &Hunk) -> ObserverResult {
        self.patch.push_hunk(hunk.clone());
        Ok(())
    }

    fn on_line(&mut self, _delta: &DiffDelta, _hunk: &Hunk, line: &DiffLine) -> ObserverResult {
        self.patch.push_line(line.clone())?;
        Ok(())
    }
}
