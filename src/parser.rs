//! The public parser API (§6): opens a seekable byte source, accepts
//! target paths, and runs a complete parse against a caller-supplied
//! [`ParseHandler`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

use crate::error::{IoSnafu, Result};
use crate::handler::ParseHandler;
use crate::path::TargetPathSet;
use crate::reader::ReadSeek;
use crate::tag::Tag;
use crate::walker::Walker;
use snafu::ResultExt;

/// A parser bound to one byte source, configured with a set of target
/// tag paths before running.
///
/// Mirrors the `parser_create` / `parser_add_target_path` / `parser_run`
/// lifecycle from the format's reference interface, but as an owned,
/// builder-style value rather than an opaque handle.
pub struct DicomStreamParser<S> {
    walker: Walker<S>,
    targets: TargetPathSet,
}

impl DicomStreamParser<BufReader<File>> {
    /// Open a file at `path` for parsing, buffering reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(IoSnafu { position: 0 })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<S: ReadSeek> DicomStreamParser<S> {
    /// Wrap an already-open seekable source.
    pub fn new(source: S) -> Self {
        DicomStreamParser {
            walker: Walker::new(source),
            targets: TargetPathSet::new(),
        }
    }

    /// Wrap a source with a path-depth bound other than the default
    /// ([`crate::path::DEFAULT_MAX_DEPTH`]).
    pub fn with_max_depth(source: S, max_depth: usize) -> Self {
        DicomStreamParser {
            walker: Walker::with_max_depth(source, max_depth),
            targets: TargetPathSet::new(),
        }
    }

    /// Register a nested tag path to extract. The walker descends into
    /// any sequence or item that is a prefix of a registered path, and
    /// delivers every leaf attribute regardless of registration (see
    /// [`crate::path::TargetPathSet`]).
    pub fn add_target_path(&mut self, path: impl Into<Vec<Tag>>) -> &mut Self {
        self.targets.add(path);
        self
    }

    /// Run the parse to completion, delivering callbacks to `handler`.
    ///
    /// Consumes nothing on success but the underlying source's read
    /// position; on failure, no further guarantees are made about where
    /// the source is positioned.
    pub fn run(&mut self, handler: &mut dyn ParseHandler) -> Result<()> {
        info!(has_targets = !self.targets.is_empty(), "starting parse");
        self.walker.run(&self.targets, handler)
    }
}
