// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Driving one file pair from metadata to hunks, lines or a binary encoding.

use std::sync::Arc;

use bytes::Bytes;
use similar::{Algorithm, DiffOp, DiffTag};
use tracing::{debug, debug_span, trace};

use crate::{
    binary::BinaryEncoding,
    error::{Error, ObserverError, Result},
    line::{DiffLine, LineOrigin, NO_NEWLINE_MARKER},
    list::DiffList,
    object::{DeltaStatus, DiffDelta, DiffFile, FileMode, ObjectId},
    observer::{DiffObserver, Interest},
    options::DiffOptions,
    patch::{Hunk, Patch, PatchCollector, PatchFlags},
    source::{BufferSource, ContentSource, ObjectSource, ObjectStore, looks_binary},
};

/// Path reported when neither side names one
const FALLBACK_PATH: &str = "file";

/// One side of a pair under generation
#[derive(Debug, Default)]
struct Side {
    source: Option<Arc<dyn ContentSource>>,
    data: Bytes,
    loaded: bool,
}

impl Side {
    fn new(source: Option<Arc<dyn ContentSource>>) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    fn is_workdir(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_workdir())
    }
}

#[derive(Clone, Copy)]
enum Which {
    Old,
    New,
}

/// Generation state for a single file pair
#[derive(Debug)]
pub(crate) struct PatchDiff {
    delta: DiffDelta,
    old: Side,
    new: Side,
    options: DiffOptions,
    flags: PatchFlags,
    progress: f32,
}

fn wrap(context: &'static str) -> impl Fn(ObserverError) -> Error {
    move |source| Error::CallbackAborted { context, source }
}

impl PatchDiff {
    fn new(
        mut delta: DiffDelta,
        old: Option<Arc<dyn ContentSource>>,
        new: Option<Arc<dyn ContentSource>>,
        options: &DiffOptions,
        progress: f32,
    ) -> Self {
        let mut flags = PatchFlags::default();

        delta.update_binary();
        if delta.binary_known() {
            flags.insert(PatchFlags::BINARY_KNOWN);
        }

        Self {
            delta,
            old: Side::new(old),
            new: Side::new(new),
            options: options.normalize(),
            flags,
            progress,
        }
    }

    /// State for entry `index` of a collection
    pub(crate) fn from_list(list: &DiffList, index: usize) -> Result<Self> {
        let entry = list.entry(index)?;
        let progress = index as f32 / list.num_deltas() as f32;

        Ok(Self::new(
            entry.delta.clone(),
            entry.old.clone(),
            entry.new.clone(),
            list.options(),
            progress,
        ))
    }

    /// State for two standalone sources
    ///
    /// The status is derived from which sides exist and whether their ids match.
    fn from_sources(
        old: Option<Arc<dyn ContentSource>>,
        new: Option<Arc<dyn ContentSource>>,
        options: &DiffOptions,
    ) -> Result<Self> {
        let (old, new) = if options.reversed() {
            (new, old)
        } else {
            (old, new)
        };

        let mut old_file = match &old {
            Some(source) => source.describe()?,
            None => DiffFile::default(),
        };
        let mut new_file = match &new {
            Some(source) => source.describe()?,
            None => DiffFile::default(),
        };

        if old_file.path.is_none() {
            old_file.path = Some(
                new_file
                    .path
                    .clone()
                    .unwrap_or_else(|| FALLBACK_PATH.to_owned()),
            );
        }
        if new_file.path.is_none() {
            new_file.path.clone_from(&old_file.path);
        }

        let status = match (old.is_some(), new.is_some()) {
            (true, true) => DeltaStatus::Modified,
            (false, true) => DeltaStatus::Added,
            (true, false) => DeltaStatus::Deleted,
            (false, false) => DeltaStatus::Untracked,
        };
        let status = match (old_file.id, new_file.id) {
            (Some(a), Some(b)) if a == b && old_file.mode == new_file.mode => {
                DeltaStatus::Unmodified
            }
            (None, None) if old.is_none() && new.is_none() => DeltaStatus::Unmodified,
            _ => status,
        };

        let delta = DiffDelta::new(status, old_file, new_file);
        Ok(Self::new(delta, old, new, options, 1.0))
    }

    fn side(&mut self, which: Which) -> (&mut Side, &mut DiffFile) {
        match which {
            Which::Old => (&mut self.old, &mut self.delta.old_file),
            Which::New => (&mut self.new, &mut self.delta.new_file),
        }
    }

    fn load_side(&mut self, which: Which) -> Result<()> {
        let skip_binary_check = self.options.skips_binary_check();
        let (side, file) = self.side(which);

        if side.loaded {
            return Ok(());
        }

        if let Some(source) = &side.source {
            let loaded = source.load()?;

            file.id = Some(loaded.id);
            file.size = loaded.data.len() as u64;
            if file.mode == FileMode::Unreadable {
                file.mode = loaded.mode;
            }
            if file.binary.is_none() {
                file.binary = Some(if skip_binary_check {
                    false
                } else {
                    loaded
                        .binary_hint
                        .unwrap_or_else(|| looks_binary(&loaded.data))
                });
                debug!(path = file.path.as_deref(), binary = file.binary, "classified content");
            }

            side.data = loaded.data;
        } else if file.binary.is_none() {
            file.binary = Some(false);
        }

        side.loaded = true;
        Ok(())
    }

    /// Loads content for both sides and decides whether they are worth diffing
    ///
    /// Loading is skipped when no content events are wanted and either binary-ness is already
    /// settled or the binary check is disabled.
    pub(crate) fn load(&mut self, interest: Interest) -> Result<()> {
        if self.flags.contains(PatchFlags::LOADED) {
            return Ok(());
        }

        if !interest.wants_content()
            && (self.options.skips_binary_check() || self.delta.binary_known())
        {
            debug!("content not needed, skipping load");
            return Ok(());
        }

        // Working-tree sides go first
        let order = if self.new.is_workdir() && !self.old.is_workdir() {
            [Which::New, Which::Old]
        } else {
            [Which::Old, Which::New]
        };

        for which in order {
            self.load_side(which)?;
            self.delta.update_binary();

            if self.delta.binary == Some(true) && !self.options.shows_binary() && !interest.binary
            {
                debug!("binary content, not loading remaining side");
                break;
            }
        }

        if self.delta.binary_known() {
            self.flags.insert(PatchFlags::BINARY_KNOWN);
        }

        let old = &self.delta.old_file;
        let new = &self.delta.new_file;
        if self.delta.status == DeltaStatus::Modified
            && old.mode == new.mode
            && old.size == new.size
            && old.mode != FileMode::Commit
            && old.id.is_some()
            && old.id == new.id
        {
            debug!("sides are identical once loaded, downgrading to unmodified");
            self.delta.status = DeltaStatus::Unmodified;
        }

        self.flags.insert(PatchFlags::LOADED);
        if self.is_diffable() {
            self.flags.insert(PatchFlags::DIFFABLE);
        }

        Ok(())
    }

    fn is_diffable(&self) -> bool {
        let old = &self.delta.old_file;
        let new = &self.delta.new_file;

        if self.delta.status == DeltaStatus::Unmodified {
            return false;
        }
        if old.size == 0 && new.size == 0 {
            return false;
        }

        old.size != new.size || old.id.is_none() || old.id != new.id
    }

    pub(crate) fn delta(&self) -> &DiffDelta {
        &self.delta
    }

    pub(crate) fn should_skip(&self) -> bool {
        self.options.should_skip(&self.delta)
    }

    pub(crate) fn invoke_file(
        &self,
        observer: &mut dyn DiffObserver,
        context: &'static str,
    ) -> Result<()> {
        observer
            .on_file(&self.delta, self.progress)
            .map_err(wrap(context))
    }

    /// Produces hunks and lines, or a binary encoding, for the observer
    pub(crate) fn generate(
        &mut self,
        observer: &mut dyn DiffObserver,
        context: &'static str,
    ) -> Result<()> {
        if self.flags.contains(PatchFlags::DIFFED) {
            return Ok(());
        }

        let interest = observer.interest();
        if !interest.wants_content() {
            return Ok(());
        }

        self.load(interest)?;
        if !self.flags.contains(PatchFlags::DIFFABLE) {
            return Ok(());
        }

        if self.delta.binary == Some(true) && !self.options.shows_binary() {
            if interest.binary {
                self.diff_binary(observer, context)?;
            }
        } else if interest.hunks || interest.lines {
            self.diff_text(observer, interest, context)?;
        }

        self.flags.insert(PatchFlags::DIFFED);
        Ok(())
    }

    fn diff_binary(&self, observer: &mut dyn DiffObserver, context: &'static str) -> Result<()> {
        let binary = BinaryEncoding::new(
            &self.old.data,
            &self.new.data,
            self.options.compression(),
        )?;

        observer
            .on_binary(&self.delta, &binary)
            .map_err(wrap(context))
    }

    fn diff_text(
        &self,
        observer: &mut dyn DiffObserver,
        interest: Interest,
        context: &'static str,
    ) -> Result<()> {
        let old_lines = split_lines(&self.old.data);
        let new_lines = split_lines(&self.new.data);
        let old_slices: Vec<&[u8]> = old_lines.iter().map(|&(s, e)| &self.old.data[s..e]).collect();
        let new_slices: Vec<&[u8]> = new_lines.iter().map(|&(s, e)| &self.new.data[s..e]).collect();

        let ops = similar::capture_diff_slices(Algorithm::Myers, &old_slices, &new_slices);
        let groups = similar::group_diff_ops(ops, self.options.context_line_count() as usize);

        for group in groups {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;

            let hunk = Hunk::new(
                hunk_start(old_range.start, old_range.len()),
                old_range.len(),
                hunk_start(new_range.start, new_range.len()),
                new_range.len(),
            );
            trace!(header = hunk.header.trim_end(), "hunk");

            if interest.hunks {
                observer
                    .on_hunk(&self.delta, &hunk)
                    .map_err(wrap(context))?;
            }
            if !interest.lines {
                continue;
            }

            for op in &group {
                for line in self.op_lines(op, &old_lines, &new_lines) {
                    observer
                        .on_line(&self.delta, &hunk, &line)
                        .map_err(wrap(context))?;
                }
            }
        }

        Ok(())
    }

    /// Lines covered by one diff operation, each followed by its marker if it ends a file
    /// without a newline
    fn op_lines(
        &self,
        op: &DiffOp,
        old_lines: &[(usize, usize)],
        new_lines: &[(usize, usize)],
    ) -> Vec<DiffLine> {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        let mut out = Vec::new();

        let old_line = |out: &mut Vec<DiffLine>,
                        origin: LineOrigin,
                        i: usize,
                        new_lineno: Option<usize>| {
            let (start, end) = old_lines[i];
            out.push(
                DiffLine::borrowed(origin, &self.old.data, start, end - start)
                    .with_line_numbers(Some(i + 1), new_lineno),
            );
            if i + 1 == old_lines.len() && !self.old.data.ends_with(b"\n") {
                let marker = match origin {
                    LineOrigin::Context => LineOrigin::ContextNoNewline,
                    _ => LineOrigin::DeletionNoNewline,
                };
                out.push(DiffLine::new(marker, NO_NEWLINE_MARKER));
            }
        };
        let new_line = |out: &mut Vec<DiffLine>, i: usize| {
            let (start, end) = new_lines[i];
            out.push(
                DiffLine::borrowed(LineOrigin::Addition, &self.new.data, start, end - start)
                    .with_line_numbers(None, Some(i + 1)),
            );
            if i + 1 == new_lines.len() && !self.new.data.ends_with(b"\n") {
                out.push(DiffLine::new(
                    LineOrigin::AdditionNoNewline,
                    NO_NEWLINE_MARKER,
                ));
            }
        };

        match tag {
            DiffTag::Equal => {
                for (i, j) in old_range.zip(new_range) {
                    old_line(&mut out, LineOrigin::Context, i, Some(j + 1));
                }
            }
            DiffTag::Delete => {
                for i in old_range {
                    old_line(&mut out, LineOrigin::Deletion, i, None);
                }
            }
            DiffTag::Insert => {
                for j in new_range {
                    new_line(&mut out, j);
                }
            }
            DiffTag::Replace => {
                for i in old_range {
                    old_line(&mut out, LineOrigin::Deletion, i, None);
                }
                for j in new_range {
                    new_line(&mut out, j);
                }
            }
        }

        out
    }

    pub(crate) fn into_parts(self) -> (DiffDelta, PatchFlags) {
        (self.delta, self.flags)
    }
}

/// Start line printed for a range beginning at 0-based `index`
///
/// Empty ranges name the line they follow.
fn hunk_start(index: usize, len: usize) -> usize {
    if len == 0 { index } else { index + 1 }
}

/// Byte ranges of each line, terminators included
fn split_lines(data: &[u8]) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let mut start = 0;

    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            lines.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < data.len() {
        lines.push((start, data.len()));
    }

    lines
}

/// Runs a pair through file event, load and generation into a fresh patch
fn materialize(mut diff: PatchDiff, context: &'static str) -> Result<Patch> {
    let mut patch = Patch::new(diff.delta().clone(), &diff.options);

    {
        let mut collector = PatchCollector::new(&mut patch);
        diff.load(Interest::ALL)?;
        diff.invoke_file(&mut collector, context)?;
        diff.generate(&mut collector, context)?;
    }

    let (delta, flags) = diff.into_parts();
    patch.set_generated(delta, flags);
    Ok(patch)
}

/// Streams a standalone pair to an observer
fn stream(
    mut diff: PatchDiff,
    observer: &mut dyn DiffObserver,
    context: &'static str,
) -> Result<()> {
    let span = debug_span!("diff", path = diff.delta().path().unwrap_or_default());
    let _enter = span.enter();

    diff.load(observer.interest())?;

    if diff.delta().status == DeltaStatus::Unmodified && !diff.options.includes_unmodified() {
        debug!("sides are identical, nothing to report");
        return Ok(());
    }

    diff.invoke_file(observer, context)?;
    diff.generate(observer, context)
}

impl Patch {
    /// Materializes entry `index` of a collection
    ///
    /// Returns `Ok(None)` if the options the collection was built with filter the entry out.
    /// The patch keeps a weak link back to `list`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if there is no such entry, or any error raised while
    /// loading or encoding content.
    pub fn from_list(list: &Arc<DiffList>, index: usize) -> Result<Option<Self>> {
        const CONTEXT: &str = "graft::Patch::from_list";

        let diff = PatchDiff::from_list(list, index)?;
        let span = debug_span!("patch", index, path = diff.delta().path().unwrap_or_default());
        let _enter = span.enter();

        if diff.should_skip() {
            debug!(status = ?diff.delta().status, "entry filtered out");
            return Ok(None);
        }

        let mut patch = materialize(diff, CONTEXT)?;
        patch.set_origin(list, index);
        Ok(Some(patch))
    }

    /// Diffs two content sources into a patch
    ///
    /// Either side may be absent, making the patch an addition or a deletion. A patch is
    /// produced even when the sides are identical; it just has no hunks.
    ///
    /// # Errors
    ///
    /// Returns any error raised while describing, loading or encoding content.
    pub fn from_sources(
        old: Option<Arc<dyn ContentSource>>,
        new: Option<Arc<dyn ContentSource>>,
        options: &DiffOptions,
    ) -> Result<Self> {
        const CONTEXT: &str = "graft::Patch::from_sources";

        let diff = PatchDiff::from_sources(old, new, options)?;
        let span = debug_span!("patch", path = diff.delta().path().unwrap_or_default());
        let _enter = span.enter();

        materialize(diff, CONTEXT)
    }

    /// Diffs two in-memory buffers into a patch
    ///
    /// The buffers are copied, so they may be dropped as soon as this returns.
    ///
    /// # Errors
    ///
    /// See [`from_sources()`](Self::from_sources).
    pub fn from_buffers(
        old: Option<&[u8]>,
        old_path: Option<&str>,
        new: Option<&[u8]>,
        new_path: Option<&str>,
        options: &DiffOptions,
    ) -> Result<Self> {
        Self::from_sources(
            buffer_source(old, old_path),
            buffer_source(new, new_path),
            options,
        )
    }

    /// Diffs two stored blobs into a patch
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectNotFound`] if either id is missing from `store`, or see
    /// [`from_sources()`](Self::from_sources).
    pub fn from_blobs(
        store: &Arc<dyn ObjectStore>,
        old: Option<ObjectId>,
        old_path: Option<&str>,
        new: Option<ObjectId>,
        new_path: Option<&str>,
        options: &DiffOptions,
    ) -> Result<Self> {
        Self::from_sources(
            blob_source(store, old, old_path),
            blob_source(store, new, new_path),
            options,
        )
    }
}

fn buffer_source(data: Option<&[u8]>, path: Option<&str>) -> Option<Arc<dyn ContentSource>> {
    data.map(|data| {
        Arc::new(BufferSource::new(Bytes::copy_from_slice(data), path)) as Arc<dyn ContentSource>
    })
}

fn blob_source(
    store: &Arc<dyn ObjectStore>,
    id: Option<ObjectId>,
    path: Option<&str>,
) -> Option<Arc<dyn ContentSource>> {
    id.map(|id| Arc::new(ObjectSource::new(Arc::clone(store), id, path)) as Arc<dyn ContentSource>)
}

/// Diffs two content sources, streaming the result to `observer`
///
/// Identical sides produce no events unless
/// [`include_unmodified`](DiffOptions::include_unmodified) is set.
///
/// # Errors
///
/// Returns [`Error::CallbackAborted`] if the observer stops the diff, or any error raised while
/// describing, loading or encoding content.
pub fn diff_sources(
    old: Option<Arc<dyn ContentSource>>,
    new: Option<Arc<dyn ContentSource>>,
    options: &DiffOptions,
    mut observer: impl DiffObserver,
) -> Result<()> {
    let diff = PatchDiff::from_sources(old, new, options)?;
    stream(diff, &mut observer, "graft::diff_sources")
}

/// Diffs two in-memory buffers, streaming the result to `observer`
///
/// # Errors
///
/// See [`diff_sources()`].
pub fn diff_buffers(
    old: Option<&[u8]>,
    old_path: Option<&str>,
    new: Option<&[u8]>,
    new_path: Option<&str>,
    options: &DiffOptions,
    mut observer: impl DiffObserver,
) -> Result<()> {
    let diff = PatchDiff::from_sources(
        buffer_source(old, old_path),
        buffer_source(new, new_path),
        options,
    )?;
    stream(diff, &mut observer, "graft::diff_buffers")
}

/// Diffs two stored blobs, streaming the result to `observer`
///
/// # Errors
///
/// See [`diff_sources()`].
pub fn diff_blobs(
    store: &Arc<dyn ObjectStore>,
    old: Option<ObjectId>,
    old_path: Option<&str>,
    new: Option<ObjectId>,
    new_path: Option<&str>,
    options: &DiffOptions,
    mut observer: impl DiffObserver,
) -> Result<()> {
    let diff = PatchDiff::from_sources(
        blob_source(store, old, old_path),
        blob_source(store, new, new_path),
        options,
    )?;
    stream(diff, &mut observer, "graft::diff_blobs")
}
