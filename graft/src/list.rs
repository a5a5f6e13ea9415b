// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Ordered collections of file-pair changes.

use std::sync::Arc;

use tracing::{debug, debug_span};

use crate::{
    error::{Error, Result},
    generate::PatchDiff,
    object::{DeltaStatus, DiffDelta, DiffFile},
    observer::DiffObserver,
    options::DiffOptions,
    patch::Patch,
    source::ContentSource,
};

#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub(crate) delta: DiffDelta,
    pub(crate) old: Option<Arc<dyn ContentSource>>,
    pub(crate) new: Option<Arc<dyn ContentSource>>,
}

/// An ordered list of deltas, each with the sources its content loads from
///
/// Whatever compares trees, indexes or directories fills a list in; this crate turns it into
/// patches, either streamed with [`foreach()`](Self::foreach) or one at a time with
/// [`patch()`](Self::patch). Patches made from a list keep a weak link back to it.
#[derive(Clone, Debug, Default)]
pub struct DiffList {
    options: DiffOptions,
    entries: Vec<Entry>,
}

impl DiffList {
    /// Creates an empty list generating with `options`
    pub fn new(options: &DiffOptions) -> Self {
        Self {
            options: options.normalize(),
            entries: Vec::new(),
        }
    }

    /// Appends a delta with the given status between two sources, returning its index
    ///
    /// The sides are described from their sources; an absent side stays empty. With
    /// [`reverse`](DiffOptions::reverse) set the sides swap and additions become deletions.
    ///
    /// # Errors
    ///
    /// Returns an error if a source can't be described.
    pub fn push(
        &mut self,
        status: DeltaStatus,
        old: Option<Arc<dyn ContentSource>>,
        new: Option<Arc<dyn ContentSource>>,
    ) -> Result<usize> {
        let describe = |source: &Option<Arc<dyn ContentSource>>| match source {
            Some(source) => source.describe(),
            None => Ok(DiffFile::default()),
        };
        let delta = DiffDelta::new(status, describe(&old)?, describe(&new)?);

        Ok(self.push_delta(delta, old, new))
    }

    /// Appends a delta whose metadata the caller already has, returning its index
    pub fn push_delta(
        &mut self,
        mut delta: DiffDelta,
        mut old: Option<Arc<dyn ContentSource>>,
        mut new: Option<Arc<dyn ContentSource>>,
    ) -> usize {
        if self.options.reversed() {
            std::mem::swap(&mut delta.old_file, &mut delta.new_file);
            std::mem::swap(&mut old, &mut new);
            delta.status = match delta.status {
                DeltaStatus::Added => DeltaStatus::Deleted,
                DeltaStatus::Deleted => DeltaStatus::Added,
                status => status,
            };
        }

        self.entries.push(Entry { delta, old, new });
        self.entries.len() - 1
    }

    /// The options patches are generated with
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Number of deltas, including ones the options filter out
    pub fn num_deltas(&self) -> usize {
        self.entries.len()
    }

    /// The delta at `index`
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if there is no such delta.
    pub fn get_delta(&self, index: usize) -> Result<&DiffDelta> {
        Ok(&self.entry(index)?.delta)
    }

    /// Iterates over every delta in order
    pub fn deltas(&self) -> impl Iterator<Item = &DiffDelta> {
        self.entries.iter().map(|entry| &entry.delta)
    }

    pub(crate) fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries
            .get(index)
            .ok_or_else(|| Error::out_of_range("delta", index))
    }

    /// Streams every delta the options don't filter out to `observer`, in order
    ///
    /// Each file event carries the fraction of the list already processed. Content is only
    /// generated for observers that want it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallbackAborted`] as soon as the observer stops the diff, or any error
    /// raised while loading or encoding content. Deltas after the failing one are not visited.
    pub fn foreach(&self, mut observer: impl DiffObserver) -> Result<()> {
        const CONTEXT: &str = "graft::DiffList::foreach";

        let span = debug_span!("foreach", deltas = self.entries.len());
        let _enter = span.enter();

        for index in 0..self.entries.len() {
            let mut diff = PatchDiff::from_list(self, index)?;

            if diff.should_skip() {
                debug!(index, status = ?diff.delta().status, "delta filtered out");
                continue;
            }

            diff.load(observer.interest())?;
            if diff.should_skip() {
                debug!(index, "delta unmodified once loaded");
                continue;
            }

            diff.invoke_file(&mut observer, CONTEXT)?;
            diff.generate(&mut observer, CONTEXT)?;
        }

        Ok(())
    }

    /// Materializes the delta at `index` into a patch
    ///
    /// Returns `Ok(None)` if the options filter the delta out.
    ///
    /// # Errors
    ///
    /// See [`Patch::from_list()`].
    pub fn patch(self: &Arc<Self>, index: usize) -> Result<Option<Patch>> {
        Patch::from_list(self, index)
    }
}
