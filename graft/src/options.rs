// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use crate::object::{DeltaStatus, DiffDelta};

/// Configuration for generating diffs.
///
/// The defaults match what `git diff` prints: three lines of context and `a/`/`b/` path
/// prefixes. Every entry point takes its own normalized copy of these options, so the caller is
/// free to drop or change them as soon as a call returns.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DiffOptions {
    context_lines: u32,
    old_prefix: Option<String>,
    new_prefix: Option<String>,
    reverse: bool,
    show_binary: bool,
    skip_binary_check: bool,
    include_unmodified: bool,
    include_untracked: bool,
    compression_level: i32,
}

impl DiffOptions {
    /// Creates a new set of options with the defaults
    pub const fn new() -> Self {
        Self {
            context_lines: Self::DEFAULT_CONTEXT_LINES,
            old_prefix: None,
            new_prefix: None,
            reverse: false,
            show_binary: false,
            skip_binary_check: false,
            include_unmodified: false,
            include_untracked: false,
            compression_level: Self::DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Sets the number of unchanged lines shown around each change
    pub fn context_lines(&mut self, lines: u32) -> &mut Self {
        self.context_lines = lines;
        self
    }

    /// Sets the prefix printed before old-side paths
    pub fn old_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.old_prefix = Some(prefix.into());
        self
    }

    /// Sets the prefix printed before new-side paths
    pub fn new_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.new_prefix = Some(prefix.into());
        self
    }

    /// Swaps which side is treated as old
    pub fn reverse(&mut self, reverse: bool) -> &mut Self {
        self.reverse = reverse;
        self
    }

    /// Diffs binary content line by line instead of encoding it
    pub fn show_binary(&mut self, show: bool) -> &mut Self {
        self.show_binary = show;
        self
    }

    /// Assumes all content is text without probing it
    ///
    /// This skips loading content entirely when only file-level events are observed, at the cost
    /// of treating binary content as text.
    pub fn skip_binary_check(&mut self, skip: bool) -> &mut Self {
        self.skip_binary_check = skip;
        self
    }

    /// Reports files whose sides are identical
    pub fn include_unmodified(&mut self, include: bool) -> &mut Self {
        self.include_unmodified = include;
        self
    }

    /// Reports untracked files
    pub fn include_untracked(&mut self, include: bool) -> &mut Self {
        self.include_untracked = include;
        self
    }

    /// Sets the zstd level used for binary encodings
    ///
    /// Any value zstd accepts (-7 through 22) is allowed; out-of-range values are clamped by zstd
    /// itself.
    pub fn compression_level(&mut self, level: i32) -> &mut Self {
        self.compression_level = level;
        self
    }

    /// Returns an owned copy with every default filled in
    pub fn normalize(&self) -> Self {
        let mut out = self.clone();
        out.old_prefix
            .get_or_insert_with(|| Self::DEFAULT_OLD_PREFIX.to_owned());
        out.new_prefix
            .get_or_insert_with(|| Self::DEFAULT_NEW_PREFIX.to_owned());
        out
    }

    /// Number of context lines
    pub fn context_line_count(&self) -> u32 {
        self.context_lines
    }

    /// Prefix for old-side paths
    pub fn old_path_prefix(&self) -> &str {
        self.old_prefix.as_deref().unwrap_or(Self::DEFAULT_OLD_PREFIX)
    }

    /// Prefix for new-side paths
    pub fn new_path_prefix(&self) -> &str {
        self.new_prefix.as_deref().unwrap_or(Self::DEFAULT_NEW_PREFIX)
    }

    /// Whether sides are swapped
    pub fn reversed(&self) -> bool {
        self.reverse
    }

    /// Whether binary content is diffed as text
    pub fn shows_binary(&self) -> bool {
        self.show_binary
    }

    /// Whether the binary probe is skipped
    pub fn skips_binary_check(&self) -> bool {
        self.skip_binary_check
    }

    /// Whether unmodified files are reported
    pub fn includes_unmodified(&self) -> bool {
        self.include_unmodified
    }

    /// Whether untracked files are reported
    pub fn includes_untracked(&self) -> bool {
        self.include_untracked
    }

    /// zstd level for binary encodings
    pub fn compression(&self) -> i32 {
        self.compression_level
    }

    /// Whether a delta is filtered out by these options
    pub fn should_skip(&self, delta: &DiffDelta) -> bool {
        match delta.status {
            DeltaStatus::Unmodified => !self.include_unmodified,
            DeltaStatus::Untracked => !self.include_untracked,
            _ => false,
        }
    }

    /// The default number of context lines
    pub const DEFAULT_CONTEXT_LINES: u32 = 3;

    /// The default old-side path prefix
    pub const DEFAULT_OLD_PREFIX: &'static str = "a/";

    /// The default new-side path prefix
    pub const DEFAULT_NEW_PREFIX: &'static str = "b/";

    /// The default compression level for binary encodings
    ///
    /// 19 gets the best ratio zstd offers before levels 20-22 start costing significantly more
    /// memory.
    pub const DEFAULT_COMPRESSION_LEVEL: i32 = 19;
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DiffFile;

    #[test]
    fn normalize_fills_prefixes() {
        let normalized = DiffOptions::new().normalize();
        assert_eq!(normalized.old_prefix.as_deref(), Some("a/"));
        assert_eq!(normalized.new_prefix.as_deref(), Some("b/"));
        assert_eq!(normalized.context_line_count(), 3);
    }

    #[test]
    fn normalize_keeps_caller_values() {
        let mut options = DiffOptions::new();
        options.old_prefix("old/").context_lines(0);
        let normalized = options.normalize();
        drop(options);
        assert_eq!(normalized.old_path_prefix(), "old/");
        assert_eq!(normalized.new_path_prefix(), "b/");
        assert_eq!(normalized.context_line_count(), 0);
    }

    #[test]
    fn setters_read_back() {
        let mut options = DiffOptions::new();
        assert!(!options.reversed() && !options.shows_binary() && !options.skips_binary_check());

        options
            .reverse(true)
            .show_binary(true)
            .skip_binary_check(true)
            .compression_level(3);
        assert!(options.reversed());
        assert!(options.shows_binary());
        assert!(options.skips_binary_check());
        assert_eq!(options.compression(), 3);
        assert_eq!(
            DiffOptions::new().compression(),
            DiffOptions::DEFAULT_COMPRESSION_LEVEL
        );
    }

    #[test]
    fn unmodified_and_untracked_are_skipped_by_default() {
        let mut delta = DiffDelta::new(
            DeltaStatus::Unmodified,
            DiffFile::new("a"),
            DiffFile::new("a"),
        );
        let mut options = DiffOptions::new();
        assert!(options.should_skip(&delta));
        options.include_unmodified(true);
        assert!(!options.should_skip(&delta));

        delta.status = DeltaStatus::Untracked;
        assert!(options.should_skip(&delta));
        options.include_untracked(true);
        assert!(!options.should_skip(&delta));

        delta.status = DeltaStatus::Modified;
        assert!(!DiffOptions::new().should_skip(&delta));
    }
}
