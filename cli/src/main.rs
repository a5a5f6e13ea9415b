// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use graft::{DiffOptions, Patch};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Stands in for a file that doesn't exist on one side
const DEV_NULL: &str = "/dev/null";

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Increase log verbosity (repeatable); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a unified diff between two files
    Diff {
        old: PathBuf,
        new: PathBuf,
        #[command(flatten)]
        options: DiffArgs,
    },
    /// Print the change status with added and deleted line counts
    Stat {
        old: PathBuf,
        new: PathBuf,
        #[command(flatten)]
        options: DiffArgs,
    },
    /// Diff two files, apply the patch to the old one and verify the result
    Check {
        old: PathBuf,
        new: PathBuf,
        #[command(flatten)]
        options: DiffArgs,
    },
}

#[derive(Args)]
struct DiffArgs {
    /// Lines of context around each change
    #[arg(short = 'U', long = "unified", default_value_t = DiffOptions::DEFAULT_CONTEXT_LINES)]
    context_lines: u32,

    /// Swap the old and new sides
    #[arg(long)]
    reverse: bool,

    /// Diff binary files line by line
    #[arg(long)]
    text: bool,

    /// Treat all content as text without probing it
    #[arg(long)]
    no_binary_check: bool,

    /// Prefix for old-side paths
    #[arg(long, default_value = DiffOptions::DEFAULT_OLD_PREFIX)]
    src_prefix: String,

    /// Prefix for new-side paths
    #[arg(long, default_value = DiffOptions::DEFAULT_NEW_PREFIX)]
    dst_prefix: String,
}

impl DiffArgs {
    fn to_options(&self) -> DiffOptions {
        let mut options = DiffOptions::new();
        options
            .context_lines(self.context_lines)
            .reverse(self.reverse)
            .show_binary(self.text)
            .skip_binary_check(self.no_binary_check)
            .old_prefix(&self.src_prefix)
            .new_prefix(&self.dst_prefix);
        options
    }
}

fn read_side(path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
    if path == Path::new(DEV_NULL) {
        return Ok(None);
    }

    fs::read(path)
        .map(Some)
        .with_context(|| format!("Failed to read file '{}'", path.display()))
}

fn make_patch(
    old: &Path,
    new: &Path,
    options: &DiffOptions,
) -> anyhow::Result<(Patch, Vec<u8>, Vec<u8>)> {
    let old_data = read_side(old)?;
    let new_data = read_side(new)?;
    let old_name = old.to_string_lossy();
    let new_name = new.to_string_lossy();

    let patch = Patch::from_buffers(
        old_data.as_deref(),
        old_data.is_some().then_some(&*old_name),
        new_data.as_deref(),
        new_data.is_some().then_some(&*new_name),
        options,
    )
    .context("Failed to generate patch")?;

    debug!(
        status = ?patch.delta().status,
        hunks = patch.num_hunks(),
        "generated patch"
    );

    Ok((
        patch,
        old_data.unwrap_or_default(),
        new_data.unwrap_or_default(),
    ))
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Diff { old, new, options } => {
            let (patch, _, _) = make_patch(&old, &new, &options.to_options())?;
            if patch.num_hunks() > 0 || patch.binary().is_some() {
                patch
                    .print(io::stdout().lock())
                    .context("Failed to write patch")?;
            }
        }
        Command::Stat { old, new, options } => {
            let (patch, _, _) = make_patch(&old, &new, &options.to_options())?;
            let delta = patch.delta();
            let status = delta.status.as_char();
            let path = delta.path().unwrap_or_default();
            let mut stdout = io::stdout().lock();

            let written = if patch.binary().is_some() {
                writeln!(stdout, "{status}\t-\t-\t{path}")
            } else {
                let stats = patch.line_stats();
                writeln!(
                    stdout,
                    "{status}\t{}\t{}\t{path}",
                    stats.additions, stats.deletions
                )
            };
            written.context("Failed to write statistics")?;
        }
        Command::Check { old, new, options } => {
            let options = options.to_options();
            let (patch, old_data, new_data) = make_patch(&old, &new, &options)?;

            // With the sides swapped the patch rebuilds the old file from the new one
            let (base, expected) = if options.reversed() {
                (new_data, old_data)
            } else {
                (old_data, new_data)
            };

            let result = graft::apply(&patch, &base).context("Failed to apply patch")?;
            let expected_hash = blake3::hash(&expected);
            let result_hash = blake3::hash(&result.contents);

            if result_hash != expected_hash {
                bail!(
                    "Reconstructed content does not match: expected {expected_hash}, got {result_hash}"
                );
            }

            info!(hunks = patch.num_hunks(), "patch verified");
            println!("OK {result_hash}");
        }
    }

    Ok(())
}
