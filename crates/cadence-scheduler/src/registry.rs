//! Identity-keyed registries of scheduled targets.

use std::collections::HashMap;

use crate::TargetId;
use crate::entry::{Bucket, SelectorEntry, UpdateEntry};
use crate::types::TargetRef;

/// Target -> interval timers.
#[derive(Default)]
pub(crate) struct SelectorRegistry {
    entries: HashMap<TargetId, SelectorEntry>,
}

impl SelectorRegistry {
    pub(crate) fn get(&self, id: TargetId) -> Option<&SelectorEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TargetId) -> Option<&mut SelectorEntry> {
        self.entries.get_mut(&id)
    }

    /// The target's entry, created with `paused` if absent.
    pub(crate) fn get_or_insert(&mut self, target: TargetRef, paused: bool) -> &mut SelectorEntry {
        self.entries
            .entry(target.id())
            .or_insert_with(|| SelectorEntry::new(target, paused))
    }

    pub(crate) fn remove(&mut self, id: TargetId) -> Option<SelectorEntry> {
        self.entries.remove(&id)
    }

    /// Point-in-time list of registered targets.
    pub(crate) fn snapshot(&self) -> Vec<TargetId> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn timer_count(&self) -> usize {
        self.entries.values().map(|e| e.timers.len()).sum()
    }
}

/// Target -> update entry, plus the three priority buckets.
///
/// The map gives O(1) lookup for pause/resume; the buckets hold walk order.
/// Both change together so they always agree on membership.
#[derive(Default)]
pub(crate) struct UpdateRegistry {
    entries: HashMap<TargetId, UpdateEntry>,
    buckets: [Vec<TargetId>; 3],
}

impl UpdateRegistry {
    pub(crate) fn contains(&self, id: TargetId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn get(&self, id: TargetId) -> Option<&UpdateEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TargetId) -> Option<&mut UpdateEntry> {
        self.entries.get_mut(&id)
    }

    /// Append to the end of the entry's bucket.
    ///
    /// Replaces any existing entry for the same target and returns it.
    pub(crate) fn insert(&mut self, entry: UpdateEntry) -> Option<UpdateEntry> {
        let id = entry.target.id();
        let replaced = self.remove(id);
        self.buckets[entry.bucket().index()].push(id);
        self.entries.insert(id, entry);
        replaced
    }

    pub(crate) fn remove(&mut self, id: TargetId) -> Option<UpdateEntry> {
        let entry = self.entries.remove(&id)?;
        self.buckets[entry.bucket().index()].retain(|member| *member != id);
        Some(entry)
    }

    /// Walk order for one tick: negative, zero, then positive bucket,
    /// each in registration order, with the serial of each entry.
    pub(crate) fn snapshot(&self) -> Vec<(TargetId, u64)> {
        Bucket::ORDER
            .iter()
            .flat_map(|bucket| self.buckets[bucket.index()].iter())
            .filter_map(|id| self.entries.get(id).map(|e| (*id, e.serial)))
            .collect()
    }

    pub(crate) fn ids(&self) -> Vec<TargetId> {
        self.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    pub(crate) fn bucket_len(&self, bucket: Bucket) -> usize {
        self.buckets[bucket.index()].len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
