//! The scheduler's two indexed collections: due-time map and idle map.
//!
//! Every schedule entry resides in exactly one of the two maps. The due-time
//! map is ordered by absolute deadline and is the dispatcher's sole source of
//! "what runs next"; the idle map parks entries addressable by stable id.
//!
//! # Correctness Invariants
//!
//! - **Exactly-one residency**: an entry is in the due-time map or the idle
//!   map, never both, never neither (until destroyed).
//! - **Distinct deadlines**: due-time keys are unique; a colliding insert is
//!   bumped forward by 1 ns until the key is free. Entries submitted for the
//!   same instant therefore dispatch in submission order.
//! - **Flag coherence**: `entry.scheduled` is true iff the entry is in the
//!   due-time map; the id index tracks exactly the queued entries.
//!
//! All methods are called with the scheduler mutex held; the registry itself
//! has no interior locking.

use std::collections::BTreeMap;

use ahash::AHashMap;

use super::schedule::Entry;

pub(crate) struct Registry {
    /// Due-time map: absolute deadline (ns) → entry. Keys are unique.
    queue: BTreeMap<u64, Entry>,
    /// Idle map: schedule id → entry.
    idle: BTreeMap<u64, Entry>,
    /// Id → current deadline for queued entries. Stands in for the intrusive
    /// back-pointer a C implementation would keep on the entry itself.
    queued_starts: AHashMap<u64, u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            idle: BTreeMap::new(),
            queued_starts: AHashMap::new(),
        }
    }

    /// Inserts `entry` into the due-time map, bumping its deadline by 1 ns
    /// until the key is unique. Returns true iff the entry is now the front
    /// (earliest) of the map.
    pub fn queue_add(&mut self, mut entry: Entry) -> bool {
        while self.queue.contains_key(&entry.start) {
            entry.start += 1;
        }
        entry.scheduled = true;
        let start = entry.start;
        self.queued_starts.insert(entry.id, start);
        self.queue.insert(start, entry);
        self.queue.keys().next() == Some(&start)
    }

    /// Removes a queued entry by id. Returns `None` if the id is not queued.
    pub fn queue_remove(&mut self, id: u64) -> Option<Entry> {
        let start = self.queued_starts.remove(&id)?;
        let mut entry = self
            .queue
            .remove(&start)
            .expect("queued-start index out of sync with due-time map");
        entry.scheduled = false;
        Some(entry)
    }

    /// Moves a queued entry to deadline `next`. Returns is-front as
    /// [`queue_add`](Self::queue_add), or `None` if the id is not queued.
    pub fn queue_update(&mut self, id: u64, next: u64) -> Option<bool> {
        let mut entry = self.queue_remove(id)?;
        entry.start = next;
        Some(self.queue_add(entry))
    }

    /// Parks an entry in the idle map.
    pub fn idle_add(&mut self, mut entry: Entry) {
        entry.scheduled = false;
        self.idle.insert(entry.id, entry);
    }

    /// Removes an idle entry by id.
    pub fn idle_remove(&mut self, id: u64) -> Option<Entry> {
        self.idle.remove(&id)
    }

    /// Deadline of the earliest queued entry.
    pub fn front_start(&self) -> Option<u64> {
        self.queue.keys().next().copied()
    }

    /// Removes and returns the earliest queued entry.
    pub fn pop_front(&mut self) -> Option<Entry> {
        let (_, mut entry) = self.queue.pop_first()?;
        self.queued_starts.remove(&entry.id);
        entry.scheduled = false;
        Some(entry)
    }

    /// Whether the id is currently in the due-time map.
    pub fn is_scheduled(&self, id: u64) -> bool {
        self.queued_starts.contains_key(&id)
    }

    /// Mutable access to an entry in whichever map holds it.
    pub fn entry_mut(&mut self, id: u64) -> Option<&mut Entry> {
        if let Some(&start) = self.queued_starts.get(&id) {
            return self.queue.get_mut(&start);
        }
        self.idle.get_mut(&id)
    }

    /// Removes an entry from whichever map holds it.
    pub fn remove(&mut self, id: u64) -> Option<Entry> {
        self.queue_remove(id).or_else(|| self.idle_remove(id))
    }

    /// Drains both maps, queued entries first in deadline order.
    pub fn drain(&mut self) -> Vec<Entry> {
        self.queued_starts.clear();
        let mut out: Vec<Entry> = std::mem::take(&mut self.queue).into_values().collect();
        out.extend(std::mem::take(&mut self.idle).into_values());
        out
    }

    #[cfg(test)]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// Deadlines in iteration order, for assertions on ordering.
    #[cfg(test)]
    pub fn queued_starts_ordered(&self) -> Vec<u64> {
        self.queue.keys().copied().collect()
    }

    /// Queued ids in deadline order.
    #[cfg(test)]
    pub fn queued_ids_ordered(&self) -> Vec<u64> {
        self.queue.values().map(|e| e.id).collect()
    }
}
