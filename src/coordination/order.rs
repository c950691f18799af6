// ============================================================================
// spark-properties - Order Dependencies
// Phases and the bidirectional constraint maps the coordinator consults
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::types::PropertyId;

// =============================================================================
// PHASE
// =============================================================================

/// The two steps every value goes through when a bulk transaction ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Pending value becomes the current value; nobody is told yet
    Finalize,
    /// Listeners are told about the finalized value
    Notify,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Finalize, Phase::Notify];

    fn index(self) -> usize {
        match self {
            Phase::Finalize => 0,
            Phase::Notify => 1,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Finalize => f.write_str("finalize"),
            Phase::Notify => f.write_str("notify"),
        }
    }
}

/// Slot of the (before, after) phase combination in the coordinator's table
pub(crate) fn pair_index(before: Phase, after: Phase) -> usize {
    before.index() * 2 + after.index()
}

// =============================================================================
// MAP PAIR
// =============================================================================

/// All constraints for one (before phase, after phase) combination.
///
/// Indexed both ways so either side can be looked up or purged without a
/// scan.
#[derive(Debug)]
pub struct OrderDependencyMapPair {
    before_phase: Phase,
    after_phase: Phase,

    /// before -> every value that must wait for it
    before_map: HashMap<PropertyId, HashSet<PropertyId>>,

    /// after -> every value it waits for
    after_map: HashMap<PropertyId, HashSet<PropertyId>>,
}

impl OrderDependencyMapPair {
    pub fn new(before_phase: Phase, after_phase: Phase) -> Self {
        Self {
            before_phase,
            after_phase,
            before_map: HashMap::new(),
            after_map: HashMap::new(),
        }
    }

    pub fn before_phase(&self) -> Phase {
        self.before_phase
    }

    pub fn after_phase(&self) -> Phase {
        self.after_phase
    }

    /// Record `before` -> `after`; false if it was already present
    pub fn add(&mut self, before: PropertyId, after: PropertyId) -> bool {
        let added = self.before_map.entry(before).or_default().insert(after);
        self.after_map.entry(after).or_default().insert(before);
        added
    }

    /// Drop every constraint mentioning `value`; returns how many went
    pub fn remove_value(&mut self, value: PropertyId) -> usize {
        let mut removed = 0;
        if let Some(afters) = self.before_map.remove(&value) {
            for after in afters {
                removed += 1;
                Self::unlink(&mut self.after_map, after, value);
            }
        }
        if let Some(befores) = self.after_map.remove(&value) {
            for before in befores {
                // A self edge was already counted above
                if before == value {
                    continue;
                }
                removed += 1;
                Self::unlink(&mut self.before_map, before, value);
            }
        }
        removed
    }

    fn unlink(map: &mut HashMap<PropertyId, HashSet<PropertyId>>, key: PropertyId, value: PropertyId) {
        if let Some(set) = map.get_mut(&key) {
            set.remove(&value);
            if set.is_empty() {
                map.remove(&key);
            }
        }
    }

    /// Values `after` must wait for
    pub fn befores_of(&self, after: PropertyId) -> impl Iterator<Item = PropertyId> + '_ {
        self.after_map.get(&after).into_iter().flatten().copied()
    }

    /// Values waiting for `before`
    pub fn afters_of(&self, before: PropertyId) -> impl Iterator<Item = PropertyId> + '_ {
        self.before_map.get(&before).into_iter().flatten().copied()
    }

    pub fn contains(&self, before: PropertyId, after: PropertyId) -> bool {
        self.before_map
            .get(&before)
            .is_some_and(|afters| afters.contains(&after))
    }

    /// Every (before, after) edge, sorted
    pub fn edges(&self) -> Vec<(PropertyId, PropertyId)> {
        let mut edges: Vec<_> = self
            .before_map
            .iter()
            .flat_map(|(before, afters)| afters.iter().map(move |after| (*before, *after)))
            .collect();
        edges.sort();
        edges
    }

    pub fn len(&self) -> usize {
        self.before_map.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.before_map.is_empty()
    }

    pub fn clear(&mut self) {
        self.before_map.clear();
        self.after_map.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
