use thiserror::Error;

use crate::domain::{ResourceLocator, Revision, RoleSet, TrackId};

/// Why a record of an ingest batch was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("track title is empty")]
    MissingTitle,

    #[error("resource locator is empty")]
    MissingResource,

    #[error("rating {0} is above 10")]
    RatingOutOfRange(u8),

    #[error("duration does not fit the store")]
    DurationOutOfRange,

    #[error("modification time does not fit the store")]
    TimestampOutOfRange,

    #[error("resource is already used by track {0}")]
    LocatorInUse(TrackId),

    #[error("identity or resource repeated within the batch")]
    DuplicateInBatch,
}

/// What happened to one record of an ingest batch, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Added(TrackId),
    Modified { id: TrackId, roles: RoleSet },
    Unchanged(TrackId),
    Rejected {
        resource: ResourceLocator,
        reason: Rejection,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// store revision after the call
    pub revision: Revision,
    pub outcomes: Vec<ItemOutcome>,
}

impl IngestReport {
    pub fn added(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Added(_)))
    }

    pub fn modified(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Modified { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Unchanged(_)))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Rejected { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    pub revision: Revision,
    pub removed: Vec<TrackId>,
    /// locators that matched no track
    pub ignored: Vec<ResourceLocator>,
}
