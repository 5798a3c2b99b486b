use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Change-tracking state of one entity inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// New entity that will be inserted on commit.
    Added,
    /// Persisted entity with at least one changed field.
    Modified,
    /// Persisted entity that will be removed on commit.
    Deleted,
    /// Persisted entity with no pending changes.
    Unchanged,
    /// Entity no longer tracked by the unit of work.
    Detached,
}

impl EntityState {
    /// Returns a stable storage value for this state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
            Self::Detached => "detached",
        }
    }

    /// Returns whether committing this state writes to storage.
    #[must_use]
    pub fn is_pending_write(&self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl Display for EntityState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
