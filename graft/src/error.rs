// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{collections::TryReserveError, io};

use thiserror::Error;

use crate::object::ObjectId;

/// Error type returned by an observer to abort a diff in progress
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Shorthand for results carrying a [`enum@Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised while generating, encoding or applying a patch
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer could not be grown
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// A buffer is too large for the primitive it was handed to
    #[error("buffer of {len} bytes exceeds the maximum of {max} bytes")]
    SizeOverflow {
        /// Length of the offending buffer
        len: usize,
        /// Largest length the primitive accepts
        max: usize,
    },

    /// An observer asked for the diff to stop
    #[error("callback aborted in {context}: {source}")]
    CallbackAborted {
        /// Entry point that was driving the observer
        context: &'static str,
        /// Error returned by the observer
        source: ObserverError,
    },

    /// A hunk's pre-image was not found at its expected position
    #[error("hunk at line {line} did not apply")]
    HunkMismatch {
        /// New-file start line declared by the hunk
        line: usize,
    },

    /// A patch or delta stream is internally inconsistent
    #[error("malformed delta: {reason}")]
    MalformedDelta {
        /// What was wrong with it
        reason: String,
    },

    /// An accessor was handed an index past the end
    #[error("{what} index {index} out of range")]
    IndexOutOfRange {
        /// Kind of thing indexed ("delta", "hunk", "line")
        what: &'static str,
        /// Index requested
        index: usize,
    },

    /// A content source referred to an object that doesn't exist
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDelta {
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(what: &'static str, index: usize) -> Self {
        Self::IndexOutOfRange { what, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hunk_mismatch_names_line() {
        let err = Error::HunkMismatch { line: 50 };
        assert_eq!(err.to_string(), "hunk at line 50 did not apply");
    }

    #[test]
    fn callback_abort_keeps_source() {
        let err = Error::CallbackAborted {
            context: "graft::diff_buffers",
            source: "stop here".into(),
        };
        let message = err.to_string();
        assert!(message.contains("graft::diff_buffers"));
        assert!(message.contains("stop here"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
