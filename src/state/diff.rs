//! Current/desired diff engine.
//!
//! Records are matched by name only; kind and namespace are fixed for a single
//! unit invocation. The two delete computations are separate operations:
//! [`delete_for_update`] removes what is no longer desired, while
//! [`delete_for_full_teardown`] removes everything that currently exists and is
//! only used when the owning cluster itself is being removed.

use std::fmt;

use super::record::{RecordCollection, RecordSpec};

/// The {create, update, delete} output of a diff.
///
/// A name appears in at most one of the three sets.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch<S> {
    pub to_create: RecordCollection<S>,
    pub to_update: RecordCollection<S>,
    pub to_delete: RecordCollection<S>,
}

impl<S: RecordSpec> Default for Patch<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: RecordSpec> Patch<S> {
    pub fn empty() -> Self {
        Self {
            to_create: RecordCollection::empty(),
            to_update: RecordCollection::empty(),
            to_delete: RecordCollection::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn summary(&self) -> PatchSummary {
        PatchSummary {
            created: self.to_create.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
        }
    }
}

/// Change counts of an applied patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl PatchSummary {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl std::ops::AddAssign for PatchSummary {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

impl fmt::Display for PatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "no changes needed")
        } else {
            write!(
                f,
                "{} created, {} updated, {} deleted",
                self.created, self.updated, self.deleted
            )
        }
    }
}

/// Desired records with no current record of the same name.
pub fn to_create<S: RecordSpec>(
    current: &RecordCollection<S>,
    desired: &RecordCollection<S>,
) -> RecordCollection<S> {
    RecordCollection::from_unique(
        desired
            .iter()
            .filter(|d| !current.contains(&d.name))
            .cloned()
            .collect(),
    )
}

/// Desired records whose current counterpart differs in spec or labels.
pub fn to_update<S: RecordSpec>(
    current: &RecordCollection<S>,
    desired: &RecordCollection<S>,
) -> RecordCollection<S> {
    RecordCollection::from_unique(
        desired
            .iter()
            .filter(|d| current.get(&d.name).is_some_and(|c| !c.is_equivalent(d)))
            .cloned()
            .collect(),
    )
}

/// Current records that are no longer desired.
pub fn delete_for_update<S: RecordSpec>(
    current: &RecordCollection<S>,
    desired: &RecordCollection<S>,
) -> RecordCollection<S> {
    RecordCollection::from_unique(
        current
            .iter()
            .filter(|c| !desired.contains(&c.name))
            .cloned()
            .collect(),
    )
}

/// Every current record, regardless of what is desired.
pub fn delete_for_full_teardown<S: RecordSpec>(
    current: &RecordCollection<S>,
) -> RecordCollection<S> {
    current.clone()
}

/// Patch converging `current` onto `desired`.
pub fn new_update_patch<S: RecordSpec>(
    current: &RecordCollection<S>,
    desired: &RecordCollection<S>,
) -> Patch<S> {
    Patch {
        to_create: to_create(current, desired),
        to_update: to_update(current, desired),
        to_delete: delete_for_update(current, desired),
    }
}

/// Patch tearing down everything in `current`. `desired` is not consulted.
pub fn new_delete_patch<S: RecordSpec>(
    current: &RecordCollection<S>,
    _desired: &RecordCollection<S>,
) -> Patch<S> {
    Patch {
        to_create: RecordCollection::empty(),
        to_update: RecordCollection::empty(),
        to_delete: delete_for_full_teardown(current),
    }
}
