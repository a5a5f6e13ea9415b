// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Object ids and the metadata describing one file-pair change.

use std::fmt::{self, Display, Formatter};

/// Identifier of a stored blob
///
/// An id is the BLAKE3 digest of a `blob <len>\0` header followed by the content, so equal
/// content always yields equal ids.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Computes the id of a blob with the given content
    pub fn for_blob(content: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format!("blob {}\0", content.len()).as_bytes());
        hasher.update(content);
        Self(*hasher.finalize().as_bytes())
    }

    /// Abbreviated hex form, as printed in patch headers
    pub fn short(&self) -> String {
        self.to_string()[..7].to_owned()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// File mode recorded for each side of a delta
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum FileMode {
    /// No file on this side
    #[default]
    Unreadable,
    /// A directory
    Tree,
    /// A regular file
    Blob,
    /// A regular file with the executable bit
    BlobExecutable,
    /// A symbolic link
    Link,
    /// A submodule commit
    Commit,
}

impl FileMode {
    /// The octal mode value
    pub const fn bits(self) -> u32 {
        match self {
            Self::Unreadable => 0,
            Self::Tree => 0o040000,
            Self::Blob => 0o100644,
            Self::BlobExecutable => 0o100755,
            Self::Link => 0o120000,
            Self::Commit => 0o160000,
        }
    }

    /// Parses an octal mode value
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Unreadable),
            0o040000 => Some(Self::Tree),
            0o100644 => Some(Self::Blob),
            0o100755 => Some(Self::BlobExecutable),
            0o120000 => Some(Self::Link),
            0o160000 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// What happened to a file between the two sides
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeltaStatus {
    /// No change
    Unmodified,
    /// Only present on the new side
    Added,
    /// Only present on the old side
    Deleted,
    /// Content or mode changed
    Modified,
    /// Moved to a new path
    Renamed,
    /// Copied from another path
    Copied,
    /// Present in the working tree but not tracked
    Untracked,
}

impl DeltaStatus {
    /// Single-letter abbreviation, as `git diff --name-status` prints it
    pub const fn as_char(self) -> char {
        match self {
            Self::Unmodified => ' ',
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::Untracked => '?',
        }
    }
}

/// One side of a delta
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffFile {
    /// Path of the file, relative to the repository root
    pub path: Option<String>,
    /// Object id of the content, once known
    pub id: Option<ObjectId>,
    /// Size of the content in bytes
    pub size: u64,
    /// File mode
    pub mode: FileMode,
    /// Whether the content is binary, once known
    pub binary: Option<bool>,
}

impl DiffFile {
    /// Creates a regular-file side at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            mode: FileMode::Blob,
            ..Self::default()
        }
    }
}

/// Metadata describing one file's change
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffDelta {
    /// What happened to the file
    pub status: DeltaStatus,
    /// Old side
    pub old_file: DiffFile,
    /// New side
    pub new_file: DiffFile,
    /// Whether the pair is binary, once known
    pub binary: Option<bool>,
}

impl DiffDelta {
    /// Creates a delta between the two sides
    pub fn new(status: DeltaStatus, old_file: DiffFile, new_file: DiffFile) -> Self {
        Self {
            status,
            old_file,
            new_file,
            binary: None,
        }
    }

    /// The path this delta is reported under
    ///
    /// Added, renamed and copied files go by their new path; everything else by the old one,
    /// falling back to the new path when the old side has none.
    pub fn path(&self) -> Option<&str> {
        match self.status {
            DeltaStatus::Added | DeltaStatus::Renamed | DeltaStatus::Copied => {
                self.new_file.path.as_deref()
            }
            _ => self
                .old_file
                .path
                .as_deref()
                .or(self.new_file.path.as_deref()),
        }
    }

    /// Folds per-side binary knowledge into the delta
    ///
    /// The pair is binary as soon as either side is, and text only once both sides are known to
    /// be text.
    pub(crate) fn update_binary(&mut self) {
        if self.binary.is_some() {
            return;
        }

        if self.old_file.binary == Some(true) || self.new_file.binary == Some(true) {
            self.binary = Some(true);
        } else if self.old_file.binary == Some(false) && self.new_file.binary == Some(false) {
            self.binary = Some(false);
        }
    }

    /// Whether this delta's binary-ness has been settled
    pub fn binary_known(&self) -> bool {
        self.binary.is_some()
    }
}
