//! Assignment storage and variant bucketing
//!
//! The store enforces at-most-one assignment per (user, experiment):
//! insertion goes through the map's entry API, so two concurrent calls
//! for the same user resolve to a single winner and everyone observes
//! the same variant.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use experiment_types::{Assignment, Experiment};
use uuid::Uuid;

use crate::hashing::bucket_hash;

/// Key for the assignment map
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignmentKey {
    pub user_id: String,
    pub experiment_id: Uuid,
}

impl AssignmentKey {
    pub fn new(user_id: impl Into<String>, experiment_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            experiment_id,
        }
    }
}

/// Outcome of an insert-if-absent attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The assignment was created; counters should be incremented once
    Inserted(Uuid),
    /// An assignment already existed; its variant is returned unchanged
    Existing(Uuid),
}

impl InsertOutcome {
    pub fn variant_id(self) -> Uuid {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Existing(id) => id,
        }
    }
}

/// In-memory map of (user, experiment) -> assignment
#[derive(Default)]
pub struct AssignmentStore {
    assignments: DashMap<AssignmentKey, Assignment>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing variant for the pair, if assigned
    pub fn variant_for(&self, key: &AssignmentKey) -> Option<Uuid> {
        self.assignments.get(key).map(|a| a.variant_id)
    }

    /// Clone the full assignment record
    pub fn get(&self, key: &AssignmentKey) -> Option<Assignment> {
        self.assignments.get(key).map(|a| a.clone())
    }

    /// Atomically insert unless an assignment already exists.
    pub fn insert_if_absent(&self, key: AssignmentKey, assignment: Assignment) -> InsertOutcome {
        match self.assignments.entry(key) {
            Entry::Occupied(existing) => InsertOutcome::Existing(existing.get().variant_id),
            Entry::Vacant(slot) => {
                let variant_id = assignment.variant_id;
                slot.insert(assignment);
                InsertOutcome::Inserted(variant_id)
            }
        }
    }

    /// Mutate an existing assignment under the shard lock.
    ///
    /// Returns false without calling `f` when no assignment exists.
    pub fn update<F>(&self, key: &AssignmentKey, f: F) -> bool
    where
        F: FnOnce(&mut Assignment),
    {
        match self.assignments.get_mut(key) {
            Some(mut assignment) => {
                f(&mut assignment);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Pick a variant by walking cumulative allocations in declaration order.
///
/// The first variant whose cumulative allocation exceeds the user's
/// bucket hash wins. If floating-point drift leaves the hash above the
/// final cumulative sum, the control variant is used.
pub fn bucket_variant(experiment: &Experiment, user_id: &str) -> Uuid {
    let hash = bucket_hash(user_id, &experiment.id);

    let mut cumulative = 0.0;
    for variant in &experiment.variants {
        cumulative += variant.allocation;
        if hash < cumulative {
            return variant.id;
        }
    }

    experiment
        .control_variant()
        .map(|v| v.id)
        // validation guarantees exactly one control; first variant is the
        // last-resort fallback for a malformed value that bypassed it
        .unwrap_or_else(|| experiment.variants[0].id)
}
