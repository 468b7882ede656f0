//! ProgressiveMap: chained hash index with incremental resizing.
//!
//! Entries are arena slots that embed a [`HashLink`] (stored hash code plus
//! the next key in the bucket chain). The map owns only bucket arrays; the
//! caller owns the entries, computes their hashes, and supplies equality per
//! call as a closure over the arena.
//!
//! Growing or shrinking never rehashes in one pass. A resize installs a new
//! `primary` table and keeps the old one as `stale`; every insert, lookup and
//! remove then moves at most `migration_quota` entries from `stale` into
//! `primary`. While a migration is in flight an entry may live in either
//! table, so probes check both.

use crate::invariant::InvariantViolation;
use slotmap::{Key, SlotMap};
use tracing::{debug, trace};

/// Chain linkage embedded in an entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HashLink<K> {
    pub(crate) hcode: u64,
    pub(crate) next: Option<K>,
}

impl<K> HashLink<K> {
    /// A detached link for an entry whose key hashes to `hcode`.
    pub const fn new(hcode: u64) -> Self {
        Self { hcode, next: None }
    }

    pub fn hcode(&self) -> u64 {
        self.hcode
    }
}

/// Arena view used by the map: resolve a key to its chain link.
pub trait HashNodes {
    type Key: Copy + Eq;

    fn chain(&self, key: Self::Key) -> &HashLink<Self::Key>;
    fn chain_mut(&mut self, key: Self::Key) -> &mut HashLink<Self::Key>;
}

/// A value that embeds chain linkage, so a `SlotMap` of it is a map arena.
pub trait HashMember<K> {
    fn chain(&self) -> &HashLink<K>;
    fn chain_mut(&mut self) -> &mut HashLink<K>;
}

impl<K: Key, V: HashMember<K>> HashNodes for SlotMap<K, V> {
    type Key = K;

    #[inline]
    fn chain(&self, key: K) -> &HashLink<K> {
        self[key].chain()
    }

    #[inline]
    fn chain_mut(&mut self, key: K) -> &mut HashLink<K> {
        self[key].chain_mut()
    }
}

/// Sizing knobs. The defaults start at 4 buckets, grow at an average chain
/// length of 8, shrink at 4, and migrate up to 128 entries per operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResizePolicy {
    pub initial_capacity: usize,
    pub max_load_factor: usize,
    pub min_load_factor: usize,
    pub migration_quota: usize,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            initial_capacity: 4,
            max_load_factor: 8,
            min_load_factor: 4,
            migration_quota: 128,
        }
    }
}

// Where a key is referenced from: a bucket head or the previous entry.
#[derive(Copy, Clone)]
enum Slot<K> {
    Head(usize),
    After(K),
}

#[derive(Debug)]
struct Table<K> {
    buckets: Box<[Option<K>]>,
    mask: usize,
    size: usize,
}

impl<K: Copy + Eq> Table<K> {
    fn unallocated() -> Self {
        Self {
            buckets: Box::default(),
            mask: 0,
            size: 0,
        }
    }

    fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "table capacity must be a power of two, got {capacity}"
        );
        Self {
            buckets: vec![None; capacity].into_boxed_slice(),
            mask: capacity - 1,
            size: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket(&self, hcode: u64) -> usize {
        (hcode as usize) & self.mask
    }

    fn get<N: HashNodes<Key = K>>(&self, nodes: &N, slot: Slot<K>) -> Option<K> {
        match slot {
            Slot::Head(pos) => self.buckets[pos],
            Slot::After(prev) => nodes.chain(prev).next,
        }
    }

    fn set<N: HashNodes<Key = K>>(&mut self, nodes: &mut N, slot: Slot<K>, key: Option<K>) {
        match slot {
            Slot::Head(pos) => self.buckets[pos] = key,
            Slot::After(prev) => nodes.chain_mut(prev).next = key,
        }
    }

    fn push<N: HashNodes<Key = K>>(&mut self, nodes: &mut N, key: K) {
        let pos = self.bucket(nodes.chain(key).hcode);
        nodes.chain_mut(key).next = self.buckets[pos];
        self.buckets[pos] = Some(key);
        self.size += 1;
    }

    fn find<N, F>(&self, nodes: &N, hcode: u64, eq: &mut F) -> Option<Slot<K>>
    where
        N: HashNodes<Key = K>,
        F: FnMut(&N, K) -> bool,
    {
        if self.buckets.is_empty() {
            return None;
        }
        let mut slot = Slot::Head(self.bucket(hcode));
        while let Some(key) = self.get(nodes, slot) {
            if nodes.chain(key).hcode == hcode && eq(nodes, key) {
                return Some(slot);
            }
            slot = Slot::After(key);
        }
        None
    }

    fn detach<N: HashNodes<Key = K>>(&mut self, nodes: &mut N, slot: Slot<K>) -> K {
        let key = self
            .get(&*nodes, slot)
            .expect("detach requires an occupied chain slot");
        let next = nodes.chain(key).next;
        self.set(nodes, slot, next);
        nodes.chain_mut(key).next = None;
        self.size -= 1;
        key
    }

    fn keys<'a, N: HashNodes<Key = K>>(&'a self, nodes: &'a N) -> impl Iterator<Item = K> + 'a {
        self.buckets
            .iter()
            .flat_map(move |&head| std::iter::successors(head, move |&k| nodes.chain(k).next))
    }

    fn validate<N: HashNodes<Key = K>>(&self, nodes: &N) -> Result<(), InvariantViolation> {
        let mut counted = 0;
        for (bucket, &head) in self.buckets.iter().enumerate() {
            for key in std::iter::successors(head, |&k| nodes.chain(k).next) {
                let expected = self.bucket(nodes.chain(key).hcode);
                if expected != bucket {
                    return Err(InvariantViolation::MisplacedEntry { bucket, expected });
                }
                counted += 1;
            }
        }
        if counted != self.size {
            return Err(InvariantViolation::TableSize {
                recorded: self.size,
                counted,
            });
        }
        Ok(())
    }
}

/// Chained hash index over arena keys with pause-free resizing.
#[derive(Debug)]
pub struct ProgressiveMap<K> {
    primary: Table<K>,
    // Present only while a migration is in flight.
    stale: Option<Table<K>>,
    cursor: usize,
    policy: ResizePolicy,
}

impl<K: Copy + Eq> Default for ProgressiveMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq> ProgressiveMap<K> {
    pub fn new() -> Self {
        Self::with_policy(ResizePolicy::default())
    }

    pub fn with_policy(policy: ResizePolicy) -> Self {
        assert!(
            policy.initial_capacity.is_power_of_two(),
            "initial capacity must be a power of two"
        );
        assert!(policy.migration_quota > 0, "migration quota must be non-zero");
        Self {
            primary: Table::unallocated(),
            stale: None,
            cursor: 0,
            policy,
        }
    }

    pub fn policy(&self) -> ResizePolicy {
        self.policy
    }

    /// Live entries across both tables.
    pub fn len(&self) -> usize {
        self.primary.size + self.stale.as_ref().map_or(0, |t| t.size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket count of the primary table (0 before the first insert).
    pub fn capacity(&self) -> usize {
        self.primary.capacity()
    }

    pub fn is_resizing(&self) -> bool {
        self.stale.is_some()
    }

    /// Link `key` into the map. Its `HashLink` must already carry the hash.
    ///
    /// Keys are not deduplicated; callers look up first when uniqueness
    /// matters.
    pub fn insert<N: HashNodes<Key = K>>(&mut self, nodes: &mut N, key: K) {
        if self.primary.capacity() == 0 {
            self.primary = Table::with_capacity(self.policy.initial_capacity);
        }
        self.primary.push(nodes, key);

        if self.stale.is_none() {
            let capacity = self.primary.capacity();
            let load = self.primary.size / capacity;
            if capacity > self.policy.initial_capacity && load <= self.policy.min_load_factor {
                self.start_resizing(capacity / 2);
            } else if load >= self.policy.max_load_factor {
                self.start_resizing(capacity * 2);
            }
        }
        self.help_resizing(nodes);
    }

    /// Find the entry with hash `hcode` for which `eq` holds.
    pub fn lookup<N, F>(&mut self, nodes: &mut N, hcode: u64, mut eq: F) -> Option<K>
    where
        N: HashNodes<Key = K>,
        F: FnMut(&N, K) -> bool,
    {
        self.help_resizing(nodes);
        let nodes = &*nodes;
        if let Some(slot) = self.primary.find(nodes, hcode, &mut eq) {
            return self.primary.get(nodes, slot);
        }
        let stale = self.stale.as_ref()?;
        let slot = stale.find(nodes, hcode, &mut eq)?;
        stale.get(nodes, slot)
    }

    /// Unlink and return the entry with hash `hcode` for which `eq` holds.
    pub fn remove<N, F>(&mut self, nodes: &mut N, hcode: u64, mut eq: F) -> Option<K>
    where
        N: HashNodes<Key = K>,
        F: FnMut(&N, K) -> bool,
    {
        self.help_resizing(nodes);
        if let Some(slot) = self.primary.find(&*nodes, hcode, &mut eq) {
            return Some(self.primary.detach(nodes, slot));
        }
        let stale = self.stale.as_mut()?;
        let slot = stale.find(&*nodes, hcode, &mut eq)?;
        Some(stale.detach(nodes, slot))
    }

    /// Every stored key, primary table first.
    pub fn keys<'a, N: HashNodes<Key = K>>(&'a self, nodes: &'a N) -> impl Iterator<Item = K> + 'a {
        self.primary
            .keys(nodes)
            .chain(self.stale.iter().flat_map(move |t| t.keys(nodes)))
    }

    /// Release both bucket arrays. Entries stay in the caller's arena with
    /// dangling chain links; the caller is expected to drop them too.
    pub fn clear(&mut self) {
        self.primary = Table::unallocated();
        self.stale = None;
        self.cursor = 0;
    }

    /// Check bucket placement and per-table counts.
    pub fn validate<N: HashNodes<Key = K>>(&self, nodes: &N) -> Result<(), InvariantViolation> {
        self.primary.validate(nodes)?;
        if let Some(stale) = &self.stale {
            stale.validate(nodes)?;
        }
        Ok(())
    }

    fn start_resizing(&mut self, capacity: usize) {
        debug_assert!(self.stale.is_none(), "resize started during a migration");
        debug!(
            from = self.primary.capacity(),
            to = capacity,
            entries = self.primary.size,
            "starting progressive resize"
        );
        let old = std::mem::replace(&mut self.primary, Table::with_capacity(capacity));
        self.stale = Some(old);
        self.cursor = 0;
    }

    fn help_resizing<N: HashNodes<Key = K>>(&mut self, nodes: &mut N) {
        let Some(stale) = self.stale.as_mut() else {
            return;
        };
        let mut moved = 0;
        while moved < self.policy.migration_quota && stale.size > 0 {
            let head = Slot::Head(self.cursor);
            if stale.get(&*nodes, head).is_none() {
                self.cursor += 1;
                continue;
            }
            let key = stale.detach(nodes, head);
            self.primary.push(nodes, key);
            moved += 1;
        }
        trace!(moved, remaining = stale.size, "migration step");

        if stale.size == 0 {
            debug!(capacity = self.primary.capacity(), "progressive resize finished");
            self.stale = None;
            self.cursor = 0;
        }
    }
}
