// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Structured diffs between file versions, binary deltas, and hunk-exact patch application.
//!
//! This crate turns pairs of file versions into [`Patch`]es: ordered hunks of context, added and
//! deleted lines for text, or a compact [`BinaryEncoding`] for binary content. Diffs can be
//! materialized into a patch or streamed to a [`DiffObserver`] as they are generated, and a patch
//! can be [applied](apply()) back to its old side to reconstruct the new one.
//!
//! # Examples
//!
//! Diffing two buffers and printing the result:
//!
//! ```
//! use graft::{DiffOptions, Patch};
//!
//! # fn main() -> Result<(), graft::Error> {
//! let old = b"fn main() {\n    println!(\"hello\");\n}\n";
//! let new = b"fn main() {\n    println!(\"goodbye\");\n}\n";
//!
//! let patch = Patch::from_buffers(
//!     Some(old),
//!     Some("src/main.rs"),
//!     Some(new),
//!     Some("src/main.rs"),
//!     &DiffOptions::new(),
//! )?;
//! assert_eq!(patch.num_hunks(), 1);
//!
//! print!("{}", patch.to_text()?);
//! # Ok(())
//! # }
//! ```
//!
//! Applying a patch to get the new version back:
//!
//! ```
//! use graft::{DiffOptions, Patch};
//!
//! # fn main() -> Result<(), graft::Error> {
//! let old = b"a\nb\nc\n";
//! let new = b"a\nB\nc\nd\n";
//! let patch = Patch::from_buffers(Some(old), None, Some(new), None, &DiffOptions::new())?;
//!
//! let result = graft::apply(&patch, old)?;
//! assert_eq!(result.contents, new);
//! # Ok(())
//! # }
//! ```

mod apply;
mod binary;
pub mod delta;
mod error;
mod generate;
mod line;
mod list;
mod object;
mod observer;
mod options;
mod patch;
mod print;
mod source;

pub use apply::{ApplyResult, apply};
pub use binary::{BinaryEncoding, BinaryFile, BinaryKind};
pub use error::{Error, ObserverError, Result};
pub use generate::{diff_blobs, diff_buffers, diff_sources};
pub use line::{DiffLine, LineContent, LineOrigin, NO_NEWLINE_MARKER, line_hash};
pub use list::DiffList;
pub use object::{DeltaStatus, DiffDelta, DiffFile, FileMode, ObjectId};
pub use observer::{Callbacks, DiffObserver, Interest, ObserverResult};
pub use options::DiffOptions;
pub use patch::{Hunk, LineStats, Patch, PatchFlags};
pub use print::{UnifiedPrinter, file_header};
pub use source::{
    BINARY_PROBE_LEN, BufferSource, ContentSource, LoadedContent, MemoryObjectStore, ObjectSource,
    ObjectStore, WorkdirSource, looks_binary,
};
