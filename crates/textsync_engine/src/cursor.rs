//! Version Cursor.

use tracing::warn;

/// The highest version a client has fully incorporated.
///
/// Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionCursor {
    current: u64,
}

impl VersionCursor {
    /// Creates a cursor at `version`.
    pub fn new(version: u64) -> Self {
        Self { current: version }
    }

    /// Returns the current version.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Moves the cursor to `version`. Lower values are ignored.
    pub fn advance_to(&mut self, version: u64) {
        if version < self.current {
            warn!(
                current = self.current,
                requested = version,
                "ignoring attempt to move version cursor backwards"
            );
            return;
        }
        self.current = version;
    }

    /// Moves the cursor forward by `count` versions.
    pub fn advance_by(&mut self, count: u64) {
        self.advance_to(self.current.saturating_add(count));
    }
}
