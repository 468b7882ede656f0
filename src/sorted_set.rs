//! SortedSet: named members ordered by (score, name).
//!
//! Each member is one slot in a `SlotMap` that embeds both a tree link and a
//! chain link. The AVL tree orders slots by (score, name) for range, rank and
//! count queries; the progressive map indexes the same slots by name hash for
//! O(1) lookup. Every public operation leaves each live member reachable from
//! both, and a popped member is unlinked from both before it is handed back.

use crate::avl::{self, AvlLink, AvlMember};
use crate::invariant::InvariantViolation;
use crate::progressive_map::{HashLink, HashMember, ProgressiveMap, ResizePolicy};
use core::fmt;
use core::hash::BuildHasher;
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashSet;
use slotmap::SlotMap;
use tracing::debug;

slotmap::new_key_type! {
    /// Arena slot of a member.
    pub struct MemberKey;
}

/// One member of a sorted set.
#[derive(Clone, Debug)]
pub struct Member {
    avl: AvlLink<MemberKey>,
    chain: HashLink<MemberKey>,
    score: f64,
    name: Box<[u8]>,
}

impl Member {
    fn new(name: &[u8], score: f64, hcode: u64) -> Self {
        Self {
            avl: AvlLink::new(),
            chain: HashLink::new(hcode),
            score,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Strict (score, name) order. Slice comparison is lexicographic over the
    /// shared prefix with the shorter name first, which is the name tiebreak.
    #[inline]
    fn precedes(&self, score: f64, name: &[u8]) -> bool {
        if self.score != score {
            return self.score < score;
        }
        &self.name[..] < name
    }
}

impl AvlMember<MemberKey> for Member {
    #[inline]
    fn avl(&self) -> &AvlLink<MemberKey> {
        &self.avl
    }
    #[inline]
    fn avl_mut(&mut self) -> &mut AvlLink<MemberKey> {
        &mut self.avl
    }
}

impl HashMember<MemberKey> for Member {
    #[inline]
    fn chain(&self) -> &HashLink<MemberKey> {
        &self.chain
    }
    #[inline]
    fn chain_mut(&mut self) -> &mut HashLink<MemberKey> {
        &mut self.chain
    }
}

/// What [`SortedSet::add`] did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// A new member was created.
    Inserted,
    /// The name already existed; its score now equals the requested one.
    Updated,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddError {
    /// NaN has no position in the (score, name) order.
    NanScore,
}

impl fmt::Display for AddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddError::NanScore => f.write_str("score is NaN"),
        }
    }
}

impl std::error::Error for AddError {}

/// Members indexed by name and ordered by (score, name).
pub struct SortedSet<S = DefaultHashBuilder> {
    hasher: S,
    root: Option<MemberKey>,
    index: ProgressiveMap<MemberKey>,
    members: SlotMap<MemberKey, Member>, // sole owner of every member
}

impl SortedSet {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SortedSet<S> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// First member not ordered before `(score, name)`, moved `offset`
    /// positions along the order. `None` if there is no such first member or
    /// the offset runs off either end.
    pub fn query(&self, score: f64, name: &[u8], offset: i64) -> Option<&Member> {
        self.seek(score, name, offset).map(|key| &self.members[key])
    }

    /// Up to `limit` members in order, starting where [`query`](Self::query)
    /// lands.
    pub fn range(&self, score: f64, name: &[u8], offset: i64, limit: usize) -> Iter<'_> {
        Iter {
            members: &self.members,
            next: self.seek(score, name, offset),
            remaining: limit,
        }
    }

    /// Number of members with `low <= score < high`. Bounds are compared by
    /// numeric value against the floating-point scores.
    pub fn count(&self, low: i64, high: i64) -> usize {
        self.count_below(high as f64)
            .saturating_sub(self.count_below(low as f64))
    }

    /// All members in (score, name) order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            members: &self.members,
            next: avl::first(&self.members, self.root),
            remaining: self.members.len(),
        }
    }

    /// Release every member (children before parents) and both bucket
    /// arrays. The set stays usable.
    pub fn clear(&mut self) {
        let released = self.release(self.root);
        debug_assert!(self.members.is_empty(), "member not reachable from tree");
        self.root = None;
        self.index.clear();
        debug!(released, "sorted set cleared");
    }

    fn release(&mut self, node: Option<MemberKey>) -> usize {
        let Some(key) = node else {
            return 0;
        };
        let link = self.members[key].avl;
        let released = self.release(link.left) + self.release(link.right);
        self.members.remove(key);
        released + 1
    }

    fn seek(&self, score: f64, name: &[u8], offset: i64) -> Option<MemberKey> {
        let mut found = None;
        let mut cur = self.root;
        while let Some(key) = cur {
            let member = &self.members[key];
            if member.precedes(score, name) {
                cur = member.avl.right;
            } else {
                found = Some(key);
                cur = member.avl.left;
            }
        }
        avl::offset(&self.members, found?, offset)
    }

    // Members with score strictly below `bound`.
    fn count_below(&self, bound: f64) -> usize {
        let mut count = 0;
        let mut cur = self.root;
        while let Some(key) = cur {
            let member = &self.members[key];
            if member.score < bound {
                count += 1 + avl::subtree_size(&self.members, member.avl.left);
                cur = member.avl.right;
            } else {
                cur = member.avl.left;
            }
        }
        count
    }

    fn tree_add(&mut self, key: MemberKey) {
        self.root = Some(avl::insert(&mut self.members, self.root, key, |members, a, b| {
            let other = &members[b];
            members[a].precedes(other.score, &other.name)
        }));
    }
}

impl<S: BuildHasher> SortedSet<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_policy(hasher, ResizePolicy::default())
    }

    pub fn with_policy(hasher: S, policy: ResizePolicy) -> Self {
        Self {
            hasher,
            root: None,
            index: ProgressiveMap::with_policy(policy),
            members: SlotMap::with_key(),
        }
    }

    fn hash(&self, name: &[u8]) -> u64 {
        self.hasher.hash_one(name)
    }

    fn find(&mut self, name: &[u8], hcode: u64) -> Option<MemberKey> {
        self.index.lookup(&mut self.members, hcode, |members, key| {
            &members[key].name[..] == name
        })
    }

    /// Insert `name` with `score`, or move an existing member to `score`.
    pub fn add(&mut self, name: &[u8], score: f64) -> Result<AddOutcome, AddError> {
        if score.is_nan() {
            return Err(AddError::NanScore);
        }
        let hcode = self.hash(name);
        if let Some(key) = self.find(name, hcode) {
            if self.members[key].score != score {
                // Name is unchanged, so only the tree position moves.
                self.root = avl::delete(&mut self.members, key);
                self.members[key].score = score;
                self.tree_add(key);
            }
            return Ok(AddOutcome::Updated);
        }
        let key = self.members.insert(Member::new(name, score, hcode));
        self.index.insert(&mut self.members, key);
        self.tree_add(key);
        Ok(AddOutcome::Inserted)
    }

    pub fn lookup(&mut self, name: &[u8]) -> Option<&Member> {
        let hcode = self.hash(name);
        let key = self.find(name, hcode)?;
        Some(&self.members[key])
    }

    pub fn contains(&mut self, name: &[u8]) -> bool {
        self.lookup(name).is_some()
    }

    pub fn score(&mut self, name: &[u8]) -> Option<f64> {
        self.lookup(name).map(Member::score)
    }

    /// Remove `name` from the set and hand the member back.
    pub fn pop(&mut self, name: &[u8]) -> Option<Member> {
        let hcode = self.hash(name);
        let key = self.index.remove(&mut self.members, hcode, |members, key| {
            &members[key].name[..] == name
        })?;
        self.root = avl::delete(&mut self.members, key);
        self.members.remove(key)
    }

    /// 1-based position of `name` in the order, 0 when absent.
    pub fn rank(&mut self, name: &[u8]) -> usize {
        let hcode = self.hash(name);
        match self.find(name, hcode) {
            Some(key) => avl::rank(&self.members, key),
            None => 0,
        }
    }

    /// Full audit: tree shape, member order, hash placement, and that tree,
    /// index and arena hold exactly the same members.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let tree = avl::validate(&self.members, self.root)?;
        self.index.validate(&self.members)?;

        let mut prev: Option<&Member> = None;
        for (position, member) in self.iter().enumerate() {
            if let Some(prev) = prev {
                if !prev.precedes(member.score, &member.name) {
                    return Err(InvariantViolation::OutOfOrder { position });
                }
            }
            prev = Some(member);
        }

        let indexed: HashSet<MemberKey> = self.index.keys(&self.members).collect();
        let arena = self.members.len();
        let reachable = tree == arena
            && self.index.len() == arena
            && indexed.len() == arena
            && indexed.iter().all(|&key| {
                self.members
                    .get(key)
                    .is_some_and(|m| m.chain.hcode == self.hash(&m.name))
            });
        if !reachable {
            return Err(InvariantViolation::Unreachable {
                tree,
                index: self.index.len(),
                arena,
            });
        }
        Ok(())
    }
}

impl<S> fmt::Debug for SortedSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.iter()
                    .map(|m| (String::from_utf8_lossy(&m.name), m.score)),
            )
            .finish()
    }
}

/// In-order iterator over members.
pub struct Iter<'a> {
    members: &'a SlotMap<MemberKey, Member>,
    next: Option<MemberKey>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Member;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let key = self.next?;
        self.remaining -= 1;
        self.next = avl::successor(self.members, key);
        Some(&self.members[key])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<'a>(it: impl Iterator<Item = &'a Member>) -> Vec<String> {
        it.map(|m| String::from_utf8(m.name().to_vec()).unwrap())
            .collect()
    }

    /// Invariant: equal scores order by name bytes, shorter name first on a
    /// shared prefix.
    #[test]
    fn ties_break_on_name_then_length() {
        let mut z = SortedSet::new();
        for name in ["b", "ab", "a", "abc", "B"] {
            z.add(name.as_bytes(), 1.0).unwrap();
        }
        z.add(b"z", 0.5).unwrap();
        assert_eq!(names(z.iter()), ["z", "B", "a", "ab", "abc", "b"]);
        z.validate().unwrap();
    }

    /// Invariant: re-adding with a new score moves the member in the order
    /// without touching the index or the member count.
    #[test]
    fn update_moves_member() {
        let mut z = SortedSet::new();
        z.add(b"a", 1.0).unwrap();
        z.add(b"b", 2.0).unwrap();
        z.add(b"c", 3.0).unwrap();
        assert_eq!(z.add(b"a", 10.0), Ok(AddOutcome::Updated));
        assert_eq!(names(z.iter()), ["b", "c", "a"]);
        assert_eq!(z.len(), 3);
        assert_eq!(z.score(b"a"), Some(10.0));
        assert_eq!(z.rank(b"a"), 3);
        z.validate().unwrap();
    }

    /// Invariant: re-adding with the same score is reported as an update and
    /// changes nothing.
    #[test]
    fn same_score_is_noop_update() {
        let mut z = SortedSet::new();
        assert_eq!(z.add(b"a", 1.0), Ok(AddOutcome::Inserted));
        let root = z.root;
        assert_eq!(z.add(b"a", 1.0), Ok(AddOutcome::Updated));
        assert_eq!(z.root, root);
        assert_eq!(z.len(), 1);
    }

    /// Invariant: NaN scores are rejected and leave the set untouched.
    #[test]
    fn nan_score_rejected() {
        let mut z = SortedSet::new();
        z.add(b"a", 1.0).unwrap();
        assert_eq!(z.add(b"a", f64::NAN), Err(AddError::NanScore));
        assert_eq!(z.add(b"b", f64::NAN), Err(AddError::NanScore));
        assert_eq!(z.score(b"a"), Some(1.0));
        assert!(!z.contains(b"b"));
        assert_eq!(z.len(), 1);
    }

    /// Invariant: a popped member is unlinked from both structures.
    #[test]
    fn pop_unlinks_member() {
        let mut z = SortedSet::new();
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            z.add(name.as_bytes(), i as f64).unwrap();
        }
        let m = z.pop(b"c").expect("present");
        assert_eq!(m.name(), b"c");
        assert_eq!(m.score(), 2.0);
        assert!(z.pop(b"c").is_none());
        assert!(z.lookup(b"c").is_none());
        assert_eq!(z.rank(b"d"), 3);
        assert_eq!(names(z.iter()), ["a", "b", "d", "e"]);
        z.validate().unwrap();
    }

    /// Invariant: query lands on the first member not before the bound;
    /// negative offsets walk backwards.
    #[test]
    fn query_seeks_then_offsets() {
        let mut z = SortedSet::new();
        for (name, score) in [("a", 1.0), ("b", 2.0), ("c", 2.0), ("d", 4.0)] {
            z.add(name.as_bytes(), score).unwrap();
        }
        assert_eq!(z.query(2.0, b"", 0).unwrap().name(), b"b");
        assert_eq!(z.query(2.0, b"bb", 0).unwrap().name(), b"c");
        assert_eq!(z.query(3.0, b"", 0).unwrap().name(), b"d");
        assert_eq!(z.query(3.0, b"", -1).unwrap().name(), b"c");
        assert_eq!(z.query(3.0, b"", -3).unwrap().name(), b"a");
        assert!(z.query(3.0, b"", -4).is_none());
        assert!(z.query(3.0, b"", 1).is_none());
        assert!(z.query(5.0, b"", -1).is_none(), "no starting member");
    }

    /// Invariant: range yields at most `limit` members from the query point.
    #[test]
    fn range_limits_scan() {
        let mut z = SortedSet::new();
        for i in 0..10 {
            z.add(format!("m{i}").as_bytes(), i as f64).unwrap();
        }
        assert_eq!(names(z.range(3.0, b"", 0, 3)), ["m3", "m4", "m5"]);
        assert_eq!(names(z.range(8.0, b"", 1, 5)), ["m9"]);
        assert_eq!(z.range(3.0, b"", 0, 0).count(), 0);
        assert_eq!(z.range(11.0, b"", 0, 5).count(), 0);
    }

    /// Invariant: count is a half-open score interval; inverted bounds give 0.
    #[test]
    fn count_half_open_interval() {
        let mut z = SortedSet::new();
        for (name, score) in [("a", -1.5), ("b", 0.0), ("c", 0.5), ("d", 1.0)] {
            z.add(name.as_bytes(), score).unwrap();
        }
        assert_eq!(z.count(-2, 0), 1);
        assert_eq!(z.count(0, 1), 2);
        assert_eq!(z.count(-5, 5), 4);
        assert_eq!(z.count(1, 0), 0);
        assert_eq!(SortedSet::new().count(0, 10), 0);
    }

    /// Invariant: clear releases every member and leaves a usable empty set.
    #[test]
    fn clear_then_reuse() {
        let mut z = SortedSet::new();
        for i in 0..100 {
            z.add(format!("m{i}").as_bytes(), (i % 7) as f64).unwrap();
        }
        z.clear();
        assert!(z.is_empty());
        assert_eq!(z.iter().count(), 0);
        assert!(z.lookup(b"m1").is_none());
        assert_eq!(z.add(b"m1", 1.0), Ok(AddOutcome::Inserted));
        assert_eq!(z.len(), 1);
        z.validate().unwrap();
    }

    /// Invariant: operations on an empty set report absence.
    #[test]
    fn empty_set_reports_absent() {
        let mut z = SortedSet::new();
        assert!(z.lookup(b"x").is_none());
        assert!(z.pop(b"x").is_none());
        assert_eq!(z.rank(b"x"), 0);
        assert!(z.query(0.0, b"", 0).is_none());
        z.validate().unwrap();
    }

    /// Invariant: Debug lists members in order.
    #[test]
    fn debug_lists_in_order() {
        let mut z = SortedSet::new();
        z.add(b"b", 2.0).unwrap();
        z.add(b"a", 1.0).unwrap();
        assert_eq!(format!("{z:?}"), r#"[("a", 1.0), ("b", 2.0)]"#);
    }
}
