use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{FamilyTreeError, Result};

const DEFAULT_MAX_ANCESTORS: usize = 10_000;
const DEFAULT_MAX_DEPTH: usize = 256;

/// Cancellation, deadline and size bounds for one traversal.
///
/// Engine loops call [`checkpoint`](Self::checkpoint) once per step; the
/// bounds are consulted by the tree builder as it grows.
#[derive(Debug, Clone)]
pub struct TraversalControl {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    max_ancestors: usize,
    max_depth: usize,
}

impl Default for TraversalControl {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl TraversalControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
            max_ancestors: DEFAULT_MAX_ANCESTORS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Abort once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_limits(mut self, max_ancestors: usize, max_depth: usize) -> Self {
        self.max_ancestors = max_ancestors.max(1);
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_ancestors(&self) -> usize {
        self.max_ancestors
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Fail fast if the caller gave up or the deadline passed.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FamilyTreeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(FamilyTreeError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
