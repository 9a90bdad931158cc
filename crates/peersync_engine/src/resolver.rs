//! Conflict resolution hook.

use crate::mapping::EntityId;
use peersync_protocol::{Classification, Record};
use serde::{Deserialize, Serialize};

/// Reported versions of one entity that do not agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Entity in conflict.
    pub entity: EntityId,
    /// One `(member, record)` per reporting member.
    pub entries: Vec<(String, Record)>,
    /// Worst pairwise classification.
    pub classification: Classification,
}

/// What to do about a [`Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Write this member's version to every other member.
    Choose(String),
    /// Keep the first version and fork the others into new entities.
    Duplicate,
    /// Write nothing; the conflict is reported again next run.
    Ignore,
}

/// Decides conflicts. Policies live outside the engine.
pub trait ConflictResolver: Send + Sync {
    /// Resolves one conflict.
    fn resolve(&self, conflict: &Conflict) -> Resolution;
}

/// Leaves every conflict unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreConflicts;

impl ConflictResolver for IgnoreConflicts {
    fn resolve(&self, _conflict: &Conflict) -> Resolution {
        Resolution::Ignore
    }
}

impl<F> ConflictResolver for F
where
    F: Fn(&Conflict) -> Resolution + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict) -> Resolution {
        self(conflict)
    }
}
