//! The nested tag path and the caller-supplied set of target paths that
//! drive selective extraction (§4.4).

use crate::error::{PathOverflowSnafu, Result};
use crate::tag::Tag;
use smallvec::SmallVec;

/// The default nesting depth bound. The format does not nest deeply in
/// practice; exceeding this is treated as a fatal malformation rather than
/// growing the stack unboundedly.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// A fixed-capacity stack of tags describing the current element's nesting
/// relative to the dataset root.
#[derive(Debug, Clone)]
pub struct PathStack {
    tags: SmallVec<[Tag; DEFAULT_MAX_DEPTH]>,
    max_depth: usize,
}

impl PathStack {
    pub fn new(max_depth: usize) -> Self {
        PathStack {
            tags: SmallVec::new(),
            max_depth,
        }
    }

    /// Push a tag onto the path, at the given byte offset (used only to
    /// report where an overflow occurred).
    pub fn push(&mut self, tag: Tag, position: u64) -> Result<()> {
        if self.tags.len() >= self.max_depth {
            return PathOverflowSnafu {
                bound: self.max_depth,
                position,
            }
            .fail();
        }
        self.tags.push(tag);
        Ok(())
    }

    /// Pop the most recently pushed tag.
    pub fn pop(&mut self) {
        self.tags.pop();
    }

    /// The number of tags currently on the path.
    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// The most recently pushed tag, if any.
    #[inline]
    pub fn last(&self) -> Option<Tag> {
        self.tags.last().copied()
    }

    /// Reset the path to empty.
    pub fn clear(&mut self) {
        self.tags.clear();
    }

    /// The path as an ordered slice of tags, root first.
    #[inline]
    pub fn as_slice(&self) -> &[Tag] {
        &self.tags
    }
}

/// An unordered collection of target tag paths supplied by the caller
/// before parsing, tested against the walker's current path for equality
/// (deliver the element) and prefix-match (descend into the container).
#[derive(Debug, Clone, Default)]
pub struct TargetPathSet {
    paths: Vec<Vec<Tag>>,
}

impl TargetPathSet {
    pub fn new() -> Self {
        TargetPathSet { paths: Vec::new() }
    }

    /// Register a target path. Sequence of tags from dataset root to the
    /// selected attribute (or sequence) inclusive.
    pub fn add(&mut self, path: impl Into<Vec<Tag>>) {
        self.paths.push(path.into());
    }

    /// Whether the set has no registered target paths.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `current` exactly equals one of the registered target
    /// paths — the element at `current` must be delivered.
    pub fn contains_equal(&self, current: &[Tag]) -> bool {
        self.paths.iter().any(|p| p.as_slice() == current)
    }

    /// Whether some registered target path is a prefix of, or equal to,
    /// `current` — the walker must descend into this container.
    pub fn contains_prefix_of(&self, current: &[Tag]) -> bool {
        self.paths
            .iter()
            .any(|p| p.len() >= current.len() && p[..current.len()] == *current)
    }
}
