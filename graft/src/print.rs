// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Rendering patches as unified-diff text.

use std::{
    fmt,
    io::{self, Write},
};

use crate::{
    error::Result,
    line::{DiffLine, LineOrigin},
    object::{DeltaStatus, DiffDelta, DiffFile, ObjectId},
    observer::{DiffObserver, Interest, ObserverResult},
    options::DiffOptions,
    patch::{Hunk, Patch},
};

const DEV_NULL: &str = "/dev/null";

fn side_path<'a>(file: &'a DiffFile, other: &'a DiffFile) -> &'a str {
    file.path
        .as_deref()
        .or(other.path.as_deref())
        .unwrap_or_default()
}

fn short_id(id: Option<ObjectId>) -> String {
    id.map_or_else(|| "0".repeat(7), |id| id.short())
}

/// Whether the pair is printed as a "Binary files differ" line
fn prints_as_binary(delta: &DiffDelta, options: &DiffOptions) -> bool {
    delta.binary == Some(true) && !options.shows_binary()
}

/// The file header of a delta, rendered through [`Display`](fmt::Display)
struct FileHeader<'a> {
    delta: &'a DiffDelta,
    options: &'a DiffOptions,
}

impl fmt::Display for FileHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delta = self.delta;
        let old = &delta.old_file;
        let new = &delta.new_file;
        let old_path = side_path(old, new);
        let new_path = side_path(new, old);
        let old_prefix = self.options.old_path_prefix();
        let new_prefix = self.options.new_path_prefix();

        writeln!(f, "diff --git {old_prefix}{old_path} {new_prefix}{new_path}")?;

        match delta.status {
            DeltaStatus::Added | DeltaStatus::Untracked => {
                writeln!(f, "new file mode {:o}", new.mode.bits())?;
            }
            DeltaStatus::Deleted => writeln!(f, "deleted file mode {:o}", old.mode.bits())?,
            _ if old.mode != new.mode => {
                writeln!(f, "old mode {:o}", old.mode.bits())?;
                writeln!(f, "new mode {:o}", new.mode.bits())?;
            }
            _ => {}
        }

        let changed = old.id != new.id || old.id.is_none();
        if changed {
            write!(f, "index {}..{}", short_id(old.id), short_id(new.id))?;
            if old.mode == new.mode {
                write!(f, " {:o}", old.mode.bits())?;
            }
            writeln!(f)?;
        }

        let old_label = match delta.status {
            DeltaStatus::Added | DeltaStatus::Untracked => DEV_NULL.to_owned(),
            _ => format!("{old_prefix}{old_path}"),
        };
        let new_label = match delta.status {
            DeltaStatus::Deleted => DEV_NULL.to_owned(),
            _ => format!("{new_prefix}{new_path}"),
        };

        if prints_as_binary(delta, self.options) {
            writeln!(f, "Binary files {old_label} and {new_label} differ")?;
        } else if changed {
            writeln!(f, "--- {old_label}")?;
            writeln!(f, "+++ {new_label}")?;
        }

        Ok(())
    }
}

/// Renders the file header of `delta`
///
/// This covers everything before the first hunk: the `diff --git` line, mode changes, the
/// `index` line and the `---`/`+++` pair, or the "Binary files differ" line for binary pairs.
pub fn file_header(delta: &DiffDelta, options: &DiffOptions) -> String {
    FileHeader { delta, options }.to_string()
}

fn write_line(out: &mut impl Write, line: &DiffLine) -> io::Result<()> {
    match line.origin() {
        LineOrigin::Context | LineOrigin::Addition | LineOrigin::Deletion => {
            let mut prefix = [0; 4];
            out.write_all(line.origin().as_char().encode_utf8(&mut prefix).as_bytes())?;
            out.write_all(line.content())
        }
        // Markers carry their own text, starting with the newline the previous line lacked
        _ => out.write_all(line.content()),
    }
}

/// An observer that writes unified-diff text as the diff streams by
///
/// Binary payloads aren't rendered; binary pairs are summarized by a "Binary files differ" line.
#[derive(Debug)]
pub struct UnifiedPrinter<W> {
    out: W,
    options: DiffOptions,
}

impl<W: Write> UnifiedPrinter<W> {
    /// Creates a printer writing to `out`, labelling paths with the prefixes in `options`
    pub fn new(out: W, options: &DiffOptions) -> Self {
        Self {
            out,
            options: options.normalize(),
        }
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DiffObserver for UnifiedPrinter<W> {
    fn interest(&self) -> Interest {
        Interest {
            binary: false,
            hunks: true,
            lines: true,
        }
    }

    fn on_file(&mut self, delta: &DiffDelta, _progress: f32) -> ObserverResult {
        let header = FileHeader {
            delta,
            options: &self.options,
        };
        write!(self.out, "{header}")?;
        Ok(())
    }

    fn on_hunk(&mut self, _delta: &DiffDelta, hunk: &Hunk) -> ObserverResult {
        self.out.write_all(hunk.header.as_bytes())?;
        Ok(())
    }

    fn on_line(&mut self, _delta: &DiffDelta, _hunk: &Hunk, line: &DiffLine) -> ObserverResult {
        write_line(&mut self.out, line)?;
        Ok(())
    }
}

impl Patch {
    /// Writes the patch as unified-diff text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if writing fails.
    pub fn print(&self, mut out: impl Write) -> Result<()> {
        let header = FileHeader {
            delta: self.delta(),
            options: self.options(),
        };
        write!(out, "{header}")?;

        if !prints_as_binary(self.delta(), self.options()) {
            for (hunk, lines) in self.hunks() {
                out.write_all(hunk.header.as_bytes())?;
                for line in lines {
                    write_line(&mut out, line)?;
                }
            }
        }

        Ok(())
    }

    /// Renders the patch as unified-diff text
    ///
    /// Content that isn't valid UTF-8 is replaced with U+FFFD; use [`print()`](Self::print) to
    /// get the exact bytes.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`print()`](Self::print).
    pub fn to_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.print(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        line::NO_NEWLINE_MARKER,
        object::{FileMode, ObjectId},
    };

    fn modified() -> DiffDelta {
        let mut old = DiffFile::new("src/lib.rs");
        old.id = Some(ObjectId::for_blob(b"old"));
        let mut new = DiffFile::new("src/lib.rs");
        new.id = Some(ObjectId::for_blob(b"new"));
        DiffDelta::new(DeltaStatus::Modified, old, new)
    }

    #[test]
    fn modified_header() {
        let delta = modified();
        let header = file_header(&delta, &DiffOptions::new());
        let expected = format!(
            "diff --git a/src/lib.rs b/src/lib.rs\n\
             index {}..{} 100644\n\
             --- a/src/lib.rs\n\
             +++ b/src/lib.rs\n",
            ObjectId::for_blob(b"old").short(),
            ObjectId::for_blob(b"new").short(),
        );
        assert_eq!(header, expected);
    }

    #[test]
    fn added_header_uses_dev_null() {
        let mut new = DiffFile::new("new.txt");
        new.id = Some(ObjectId::for_blob(b"x\n"));
        let delta = DiffDelta::new(DeltaStatus::Added, DiffFile::default(), new);

        let header = file_header(&delta, &DiffOptions::new());
        assert!(header.starts_with("diff --git a/new.txt b/new.txt\nnew file mode 100644\n"));
        assert!(header.contains("index 0000000.."));
        assert!(header.ends_with("--- /dev/null\n+++ b/new.txt\n"));
    }

    #[test]
    fn mode_change_and_prefixes() {
        let mut delta = modified();
        delta.new_file.mode = FileMode::BlobExecutable;
        let mut options = DiffOptions::new();
        options.old_prefix("old/").new_prefix("new/");

        let header = file_header(&delta, &options);
        assert!(header.contains("old mode 100644\nnew mode 100755\n"));
        assert!(header.contains("--- old/src/lib.rs\n+++ new/src/lib.rs\n"));
    }

    #[test]
    fn deleted_header_uses_old_mode() {
        let mut old = DiffFile::new("gone.sh");
        old.id = Some(ObjectId::for_blob(b"bye\n"));
        old.mode = FileMode::BlobExecutable;
        let delta = DiffDelta::new(DeltaStatus::Deleted, old, DiffFile::default());

        let header = file_header(&delta, &DiffOptions::new());
        assert!(header.starts_with("diff --git a/gone.sh b/gone.sh\ndeleted file mode 100755\n"));
        assert!(header.ends_with("--- a/gone.sh\n+++ /dev/null\n"));
    }

    #[test]
    fn binary_pairs_are_summarized() {
        let mut delta = modified();
        delta.binary = Some(true);
        let header = file_header(&delta, &DiffOptions::new());
        assert!(header.ends_with("Binary files a/src/lib.rs and b/src/lib.rs differ\n"));
        assert!(!header.contains("---"));
    }

    #[test]
    fn patch_text_prefixes_lines() {
        let mut patch = Patch::new(modified(), &DiffOptions::new());
        patch.push_hunk(Hunk::new(1, 2, 1, 2));
        for line in [
            DiffLine::new(LineOrigin::Context, "keep\n"),
            DiffLine::new(LineOrigin::Deletion, "old"),
            DiffLine::new(LineOrigin::DeletionNoNewline, NO_NEWLINE_MARKER),
            DiffLine::new(LineOrigin::Addition, "new\n"),
        ] {
            patch.push_line(line).unwrap();
        }

        let text = patch.to_text().unwrap();
        let body = text.split_once("@@ -1,2 +1,2 @@\n").unwrap().1;
        assert_eq!(body, " keep\n-old\n\\ No newline at end of file\n+new\n");
    }

    #[test]
    fn streaming_printer_matches_patch_text() {
        let mut patch = Patch::new(modified(), &DiffOptions::new());
        patch.push_hunk(Hunk::new(1, 1, 1, 1));
        patch
            .push_line(DiffLine::new(LineOrigin::Deletion, "a\n"))
            .unwrap();
        patch
            .push_line(DiffLine::new(LineOrigin::Addition, "b\n"))
            .unwrap();

        let mut printer = UnifiedPrinter::new(Vec::new(), &DiffOptions::new());
        patch.replay(&mut printer).unwrap();

        assert_eq!(
            String::from_utf8(printer.into_inner()).unwrap(),
            patch.to_text().unwrap()
        );
    }
}
