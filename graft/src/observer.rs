// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Receiving diff output as it is generated.

use crate::{
    binary::BinaryEncoding,
    error::ObserverError,
    line::DiffLine,
    object::DiffDelta,
    patch::Hunk,
};

/// Result type returned by observer methods
pub type ObserverResult = Result<(), ObserverError>;

/// Which content events an observer wants to receive
///
/// File events are always delivered. When an observer wants none of the content events, the
/// content of a file isn't loaded at all unless it is needed to decide whether the file is binary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Interest {
    /// Binary encodings of binary files
    pub binary: bool,
    /// Hunk headers of text files
    pub hunks: bool,
    /// Individual lines of text files
    pub lines: bool,
}

impl Interest {
    /// Every event
    pub const ALL: Self = Self {
        binary: true,
        hunks: true,
        lines: true,
    };

    /// File events only
    pub const FILES: Self = Self {
        binary: false,
        hunks: false,
        lines: false,
    };

    /// Whether any content event is wanted
    pub const fn wants_content(self) -> bool {
        self.binary || self.hunks || self.lines
    }
}

/// Receives the events of a diff, in order
///
/// For each file: one [`on_file()`](Self::on_file), then either one
/// [`on_binary()`](Self::on_binary) or, per hunk, one [`on_hunk()`](Self::on_hunk) followed by
/// one [`on_line()`](Self::on_line) per line of that hunk. Returning an error from any method
/// stops the diff; the error is handed back to the caller wrapped in
/// [`Error::CallbackAborted`](crate::Error::CallbackAborted).
pub trait DiffObserver {
    /// Which content events to deliver
    fn interest(&self) -> Interest {
        Interest::ALL
    }

    /// Called once per file with the fraction of files already processed
    fn on_file(&mut self, _delta: &DiffDelta, _progress: f32) -> ObserverResult {
        Ok(())
    }

    /// Called with the encoding of a binary file
    fn on_binary(&mut self, _delta: &DiffDelta, _binary: &BinaryEncoding) -> ObserverResult {
        Ok(())
    }

    /// Called at the start of each hunk
    fn on_hunk(&mut self, _delta: &DiffDelta, _hunk: &Hunk) -> ObserverResult {
        Ok(())
    }

    /// Called for each line of the current hunk
    fn on_line(&mut self, _delta: &DiffDelta, _hunk: &Hunk, _line: &DiffLine) -> ObserverResult {
        Ok(())
    }
}

impl<O> DiffObserver for &mut O
where
    O: DiffObserver + ?Sized,
{
    fn interest(&self) -> Interest {
        (**self).interest()
    }

    fn on_file(&mut self, delta: &DiffDelta, progress: f32) -> ObserverResult {
        (**self).on_file(delta, progress)
    }

    fn on_binary(&mut self, delta: &DiffDelta, binary: &BinaryEncoding) -> ObserverResult {
        (**self).on_binary(delta, binary)
    }

    fn on_hunk(&mut self, delta: &DiffDelta, hunk: &Hunk) -> ObserverResult {
        (**self).on_hunk(delta, hunk)
    }

    fn on_line(&mut self, delta: &DiffDelta, hunk: &Hunk, line: &DiffLine) -> ObserverResult {
        (**self).on_line(delta, hunk, line)
    }
}

type FileFn<'a> = Box<dyn FnMut(&DiffDelta, f32) -> ObserverResult + 'a>;
type BinaryFn<'a> = Box<dyn FnMut(&DiffDelta, &BinaryEncoding) -> ObserverResult + 'a>;
type HunkFn<'a> = Box<dyn FnMut(&DiffDelta, &Hunk) -> ObserverResult + 'a>;
type LineFn<'a> = Box<dyn FnMut(&DiffDelta, &Hunk, &DiffLine) -> ObserverResult + 'a>;

/// An observer assembled from closures
///
/// Only the events a closure was registered for are delivered, so registering just
/// [`on_file()`](Self::on_file) avoids loading any content.
///
/// # Examples
///
/// ```
/// use graft::{Callbacks, DiffOptions};
///
/// # fn main() -> Result<(), graft::Error> {
/// let mut added = 0;
/// let mut callbacks = Callbacks::new().on_line(|_, _, line| {
///     if line.origin() == graft::LineOrigin::Addition {
///         added += 1;
///     }
///     Ok(())
/// });
///
/// graft::diff_buffers(
///     Some(b"a\n"),
///     Some("file.txt"),
///     Some(b"a\nb\n"),
///     Some("file.txt"),
///     &DiffOptions::new(),
///     &mut callbacks,
/// )?;
/// drop(callbacks);
///
/// assert_eq!(added, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Callbacks<'a> {
    file: Option<FileFn<'a>>,
    binary: Option<BinaryFn<'a>>,
    hunk: Option<HunkFn<'a>>,
    line: Option<LineFn<'a>>,
}

impl<'a> Callbacks<'a> {
    /// Creates an observer with no callbacks registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the file callback
    pub fn on_file(mut self, f: impl FnMut(&DiffDelta, f32) -> ObserverResult + 'a) -> Self {
        self.file = Some(Box::new(f));
        self
    }

    /// Registers the binary callback
    pub fn on_binary(
        mut self,
        f: impl FnMut(&DiffDelta, &BinaryEncoding) -> ObserverResult + 'a,
    ) -> Self {
        self.binary = Some(Box::new(f));
        self
    }

    /// Registers the hunk callback
    pub fn on_hunk(mut self, f: impl FnMut(&DiffDelta, &Hunk) -> ObserverResult + 'a) -> Self {
        self.hunk = Some(Box::new(f));
        self
    }

    /// Registers the line callback
    pub fn on_line(
        mut self,
        f: impl FnMut(&DiffDelta, &Hunk, &DiffLine) -> ObserverResult + 'a,
    ) -> Self {
        self.line = Some(Box::new(f));
        self
    }
}

impl DiffObserver for Callbacks<'_> {
    fn interest(&self) -> Interest {
        Interest {
            binary: self.binary.is_some(),
            hunks: self.hunk.is_some(),
            lines: self.line.is_some(),
        }
    }

    fn on_file(&mut self, delta: &DiffDelta, progress: f32) -> ObserverResult {
        self.file.as_mut().map_or(Ok(()), |f| f(delta, progress))
    }

    fn on_binary(&mut self, delta: &DiffDelta, binary: &BinaryEncoding) -> ObserverResult {
        self.binary.as_mut().map_or(Ok(()), |f| f(delta, binary))
    }

    fn on_hunk(&mut self, delta: &DiffDelta, hunk: &Hunk) -> ObserverResult {
        self.hunk.as_mut().map_or(Ok(()), |f| f(delta, hunk))
    }

    fn on_line(&mut self, delta: &DiffDelta, hunk: &Hunk, line: &DiffLine) -> ObserverResult {
        self.line.as_mut().map_or(Ok(()), |f| f(delta, hunk, line))
    }
}
