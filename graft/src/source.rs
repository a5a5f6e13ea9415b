// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Places file content is loaded from.

use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use bytes::Bytes;

use crate::{
    error::{Error, Result},
    object::{DiffFile, FileMode, ObjectId},
};

/// How many leading bytes are probed for NUL when classifying content
pub const BINARY_PROBE_LEN: usize = 8000;

/// Whether content looks binary
///
/// Content is binary when a NUL byte appears among its first [`BINARY_PROBE_LEN`] bytes.
pub fn looks_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_PROBE_LEN)].contains(&0)
}

/// Content and metadata produced by loading a source
#[derive(Clone, Debug)]
pub struct LoadedContent {
    /// The raw bytes
    pub data: Bytes,
    /// Object id of the bytes
    pub id: ObjectId,
    /// File mode of the source
    pub mode: FileMode,
    /// Binary classification the source already knows, if any
    pub binary_hint: Option<bool>,
}

/// A place file content can be loaded from
pub trait ContentSource: Send + Sync + fmt::Debug {
    /// Describes the file without loading its content
    ///
    /// Whatever is cheap to know (path, size, mode, sometimes the id) is filled in; the rest is
    /// left at its default until [`load()`](Self::load) runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the source can't be inspected.
    fn describe(&self) -> Result<DiffFile>;

    /// Loads the content
    ///
    /// # Errors
    ///
    /// Returns an error if the content can't be read.
    fn load(&self) -> Result<LoadedContent>;

    /// Whether the content lives in the working tree
    ///
    /// Working-tree sources are loaded first so that at most one filtered copy is alive while the
    /// other side loads.
    fn is_workdir(&self) -> bool {
        false
    }
}

/// Content held in memory
#[derive(Clone, Debug)]
pub struct BufferSource {
    data: Bytes,
    path: Option<String>,
    mode: FileMode,
}

impl BufferSource {
    /// Wraps a buffer, optionally reported under `path`
    pub fn new(data: impl Into<Bytes>, path: Option<&str>) -> Self {
        Self {
            data: data.into(),
            path: path.map(str::to_owned),
            mode: FileMode::Blob,
        }
    }

    /// Sets the file mode reported for the buffer
    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }
}

impl ContentSource for BufferSource {
    fn describe(&self) -> Result<DiffFile> {
        Ok(DiffFile {
            path: self.path.clone(),
            id: Some(ObjectId::for_blob(&self.data)),
            size: self.data.len() as u64,
            mode: self.mode,
            binary: None,
        })
    }

    fn load(&self) -> Result<LoadedContent> {
        Ok(LoadedContent {
            data: self.data.clone(),
            id: ObjectId::for_blob(&self.data),
            mode: self.mode,
            binary_hint: None,
        })
    }
}

/// Storage for blobs addressed by [`ObjectId`]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Reads a blob
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectNotFound`] if no blob has this id.
    fn read(&self, id: &ObjectId) -> Result<Bytes>;

    /// Stores a blob, returning its id
    ///
    /// # Errors
    ///
    /// Returns an error if the blob can't be written.
    fn write(&self, content: &[u8]) -> Result<ObjectId>;
}

/// An [`ObjectStore`] kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Bytes>>,
}

impl MemoryObjectStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn read(&self, id: &ObjectId) -> Result<Bytes> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        objects.get(id).cloned().ok_or(Error::ObjectNotFound(*id))
    }

    fn write(&self, content: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::for_blob(content);
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects
            .entry(id)
            .or_insert_with(|| Bytes::copy_from_slice(content));
        Ok(id)
    }
}

/// A blob read from an [`ObjectStore`]
#[derive(Clone, Debug)]
pub struct ObjectSource {
    store: Arc<dyn ObjectStore>,
    id: ObjectId,
    path: Option<String>,
    mode: FileMode,
}

impl ObjectSource {
    /// Refers to blob `id` in `store`, optionally reported under `path`
    pub fn new(store: Arc<dyn ObjectStore>, id: ObjectId, path: Option<&str>) -> Self {
        Self {
            store,
            id,
            path: path.map(str::to_owned),
            mode: FileMode::Blob,
        }
    }

    /// Sets the file mode reported for the blob
    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }
}

impl ContentSource for ObjectSource {
    fn describe(&self) -> Result<DiffFile> {
        let size = self.store.read(&self.id)?.len() as u64;

        Ok(DiffFile {
            path: self.path.clone(),
            id: Some(self.id),
            size,
            mode: self.mode,
            binary: None,
        })
    }

    fn load(&self) -> Result<LoadedContent> {
        Ok(LoadedContent {
            data: self.store.read(&self.id)?,
            id: self.id,
            mode: self.mode,
            binary_hint: None,
        })
    }
}

/// A file in the working tree
#[derive(Clone, Debug)]
pub struct WorkdirSource {
    root: PathBuf,
    path: String,
}

impl WorkdirSource {
    /// Refers to `path` relative to the working tree at `root`
    pub fn new(root: impl AsRef<Path>, path: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            path: path.into(),
        }
    }

    fn full_path(&self) -> PathBuf {
        self.root.join(&self.path)
    }

    fn mode_of(metadata: &fs::Metadata) -> FileMode {
        if metadata.file_type().is_symlink() {
            return FileMode::Link;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            if metadata.permissions().mode() & 0o111 != 0 {
                return FileMode::BlobExecutable;
            }
        }

        FileMode::Blob
    }
}

impl ContentSource for WorkdirSource {
    fn describe(&self) -> Result<DiffFile> {
        let metadata = fs::symlink_metadata(self.full_path())?;

        Ok(DiffFile {
            path: Some(self.path.clone()),
            id: None,
            size: metadata.len(),
            mode: Self::mode_of(&metadata),
            binary: None,
        })
    }

    fn load(&self) -> Result<LoadedContent> {
        let full_path = self.full_path();
        let metadata = fs::symlink_metadata(&full_path)?;
        let mode = Self::mode_of(&metadata);

        // A link's content is its target
        let data = if mode == FileMode::Link {
            Bytes::from(
                fs::read_link(&full_path)?
                    .to_string_lossy()
                    .into_owned()
                    .into_bytes(),
            )
        } else {
            Bytes::from(fs::read(&full_path)?)
        };

        Ok(LoadedContent {
            id: ObjectId::for_blob(&data),
            data,
            mode,
            binary_hint: None,
        })
    }

    fn is_workdir(&self) -> bool {
        true
    }
}
