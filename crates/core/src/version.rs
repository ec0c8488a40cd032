//! Optimistic concurrency primitive.

/// Version expectation for a conditional (compare-and-set) commit.
///
/// A commit against a stock record or reservation book succeeds only if the
/// target's current version satisfies the expectation; otherwise the caller
/// re-reads and retries (bounded).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (useful for idempotent replays, migrations).
    Any,
    /// Require the target to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}
