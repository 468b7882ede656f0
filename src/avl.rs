//! Order-statistics AVL tree over arena-resident nodes.
//!
//! The tree has no storage of its own. Each node is a slot in some arena (see
//! [`AvlNodes`]) that embeds an [`AvlLink`]; links are arena keys, never
//! owners. `parent` is a back-reference used only for upward walks.
//!
//! Every node carries its subtree `height` (for AVL balance) and subtree
//! `size` (for rank and offset navigation). Any function here that changes
//! the shape of the tree restores both before returning, and functions that
//! may move the root return the new root.
//!
//! Ordering is the caller's business: [`insert`] takes a strict comparator and
//! everything else is position based.

use crate::invariant::InvariantViolation;
use slotmap::{Key, SlotMap};

/// Tree linkage embedded in a node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AvlLink<K> {
    pub(crate) parent: Option<K>,
    pub(crate) left: Option<K>,
    pub(crate) right: Option<K>,
    pub(crate) height: u32,
    pub(crate) size: usize,
}

impl<K> AvlLink<K> {
    /// A detached single-node subtree.
    pub const fn new() -> Self {
        Self {
            parent: None,
            left: None,
            right: None,
            height: 1,
            size: 1,
        }
    }
}

impl<K: Copy> AvlLink<K> {
    pub fn parent(&self) -> Option<K> {
        self.parent
    }
    pub fn left(&self) -> Option<K> {
        self.left
    }
    pub fn right(&self) -> Option<K> {
        self.right
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<K> Default for AvlLink<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena view used by the tree algorithms: resolve a key to its links.
pub trait AvlNodes {
    type Key: Copy + Eq;

    fn link(&self, key: Self::Key) -> &AvlLink<Self::Key>;
    fn link_mut(&mut self, key: Self::Key) -> &mut AvlLink<Self::Key>;
}

/// A value that embeds tree linkage, so a `SlotMap` of it is a tree arena.
pub trait AvlMember<K> {
    fn avl(&self) -> &AvlLink<K>;
    fn avl_mut(&mut self) -> &mut AvlLink<K>;
}

impl<K: Key, V: AvlMember<K>> AvlNodes for SlotMap<K, V> {
    type Key = K;

    #[inline]
    fn link(&self, key: K) -> &AvlLink<K> {
        self[key].avl()
    }

    #[inline]
    fn link_mut(&mut self, key: K) -> &mut AvlLink<K> {
        self[key].avl_mut()
    }
}

/// Height of an optional subtree; absent is 0.
#[inline]
pub fn subtree_height<N: AvlNodes>(nodes: &N, key: Option<N::Key>) -> u32 {
    key.map_or(0, |k| nodes.link(k).height)
}

/// Node count of an optional subtree; absent is 0.
#[inline]
pub fn subtree_size<N: AvlNodes>(nodes: &N, key: Option<N::Key>) -> usize {
    key.map_or(0, |k| nodes.link(k).size)
}

fn update<N: AvlNodes>(nodes: &mut N, key: N::Key) {
    let link = *nodes.link(key);
    let height = 1 + subtree_height(nodes, link.left).max(subtree_height(nodes, link.right));
    let size = 1 + subtree_size(nodes, link.left) + subtree_size(nodes, link.right);
    let link = nodes.link_mut(key);
    link.height = height;
    link.size = size;
}

// Point whichever child slot of `parent` holds `old` at `new`.
fn replace_child<N: AvlNodes>(nodes: &mut N, parent: N::Key, old: N::Key, new: Option<N::Key>) {
    let link = nodes.link_mut(parent);
    if link.left == Some(old) {
        link.left = new;
    } else {
        debug_assert!(link.right == Some(old), "`old` is not a child of `parent`");
        link.right = new;
    }
}

// The right child takes `node`'s place; returns it.
fn rotate_left<N: AvlNodes>(nodes: &mut N, node: N::Key) -> N::Key {
    let link = *nodes.link(node);
    let pivot = link.right.expect("rotate_left requires a right child");
    let inner = nodes.link(pivot).left;
    if let Some(inner) = inner {
        nodes.link_mut(inner).parent = Some(node);
    }
    nodes.link_mut(node).right = inner;
    nodes.link_mut(node).parent = Some(pivot);
    let pivot_link = nodes.link_mut(pivot);
    pivot_link.left = Some(node);
    pivot_link.parent = link.parent;
    update(nodes, node);
    update(nodes, pivot);
    pivot
}

// The left child takes `node`'s place; returns it.
fn rotate_right<N: AvlNodes>(nodes: &mut N, node: N::Key) -> N::Key {
    let link = *nodes.link(node);
    let pivot = link.left.expect("rotate_right requires a left child");
    let inner = nodes.link(pivot).right;
    if let Some(inner) = inner {
        nodes.link_mut(inner).parent = Some(node);
    }
    nodes.link_mut(node).left = inner;
    nodes.link_mut(node).parent = Some(pivot);
    let pivot_link = nodes.link_mut(pivot);
    pivot_link.right = Some(node);
    pivot_link.parent = link.parent;
    update(nodes, node);
    update(nodes, pivot);
    pivot
}

fn fix_left_heavy<N: AvlNodes>(nodes: &mut N, node: N::Key) -> N::Key {
    let left = nodes.link(node).left.expect("left-heavy node has a left child");
    let left_link = *nodes.link(left);
    if subtree_height(nodes, left_link.left) < subtree_height(nodes, left_link.right) {
        let new_left = rotate_left(nodes, left);
        nodes.link_mut(node).left = Some(new_left);
    }
    rotate_right(nodes, node)
}

fn fix_right_heavy<N: AvlNodes>(nodes: &mut N, node: N::Key) -> N::Key {
    let right = nodes.link(node).right.expect("right-heavy node has a right child");
    let right_link = *nodes.link(right);
    if subtree_height(nodes, right_link.right) < subtree_height(nodes, right_link.left) {
        let new_right = rotate_right(nodes, right);
        nodes.link_mut(node).right = Some(new_right);
    }
    rotate_left(nodes, node)
}

/// Recompute `node`'s height and size, then walk to the root restoring
/// balance and statistics on every ancestor. Returns the root of the whole
/// tree.
///
/// Must run after any structural change below `node` (a new leaf linked in,
/// a subtree spliced out).
pub fn rebalance<N: AvlNodes>(nodes: &mut N, mut node: N::Key) -> N::Key {
    loop {
        update(nodes, node);
        let link = *nodes.link(node);
        // Side of the parent this subtree hangs from, before any rotation.
        let slot = link
            .parent
            .map(|parent| (parent, nodes.link(parent).left == Some(node)));
        let left = subtree_height(nodes, link.left);
        let right = subtree_height(nodes, link.right);
        if left == right + 2 {
            node = fix_left_heavy(nodes, node);
        } else if left + 2 == right {
            node = fix_right_heavy(nodes, node);
        }
        let Some((parent, is_left)) = slot else {
            return node;
        };
        let parent_link = nodes.link_mut(parent);
        if is_left {
            parent_link.left = Some(node);
        } else {
            parent_link.right = Some(node);
        }
        node = parent;
    }
}

/// Link `node` into the tree rooted at `root` below the first empty slot its
/// ordering selects, then rebalance. Returns the new root.
///
/// `less(nodes, a, b)` must be a strict order; equal nodes go right.
pub fn insert<N, F>(nodes: &mut N, root: Option<N::Key>, node: N::Key, mut less: F) -> N::Key
where
    N: AvlNodes,
    F: FnMut(&N, N::Key, N::Key) -> bool,
{
    *nodes.link_mut(node) = AvlLink::new();
    let Some(mut cur) = root else {
        return node;
    };
    loop {
        let go_left = less(nodes, node, cur);
        let link = nodes.link(cur);
        let next = if go_left { link.left } else { link.right };
        match next {
            Some(child) => cur = child,
            None => {
                let link = nodes.link_mut(cur);
                if go_left {
                    link.left = Some(node);
                } else {
                    link.right = Some(node);
                }
                nodes.link_mut(node).parent = Some(cur);
                return rebalance(nodes, node);
            }
        }
    }
}

/// Unlink `node` from its tree. Returns the new root, `None` once the tree is
/// empty. `node` comes back detached.
///
/// A node with a right child is replaced by its in-order successor: the
/// successor is first deleted from its own position, then its slot takes
/// over `node`'s links. Only tree linkage moves; each slot keeps its payload.
pub fn delete<N: AvlNodes>(nodes: &mut N, node: N::Key) -> Option<N::Key> {
    let link = *nodes.link(node);
    let root = match link.right {
        None => {
            if let Some(left) = link.left {
                nodes.link_mut(left).parent = link.parent;
            }
            match link.parent {
                Some(parent) => {
                    replace_child(nodes, parent, node, link.left);
                    Some(rebalance(nodes, parent))
                }
                None => link.left,
            }
        }
        Some(right) => {
            let mut successor = right;
            while let Some(left) = nodes.link(successor).left {
                successor = left;
            }
            let root = delete(nodes, successor);

            // Re-read: removing the successor may have rotated around `node`.
            let link = *nodes.link(node);
            *nodes.link_mut(successor) = link;
            if let Some(left) = link.left {
                nodes.link_mut(left).parent = Some(successor);
            }
            if let Some(right) = link.right {
                nodes.link_mut(right).parent = Some(successor);
            }
            match link.parent {
                Some(parent) => {
                    replace_child(nodes, parent, node, Some(successor));
                    root
                }
                None => Some(successor),
            }
        }
    };
    *nodes.link_mut(node) = AvlLink::new();
    root
}

/// The node `offset` in-order positions away from `node` (negative moves
/// toward smaller nodes), or `None` when that runs off either end.
pub fn offset<N: AvlNodes>(nodes: &N, mut node: N::Key, offset: i64) -> Option<N::Key> {
    let mut pos: i64 = 0;
    while pos != offset {
        let link = nodes.link(node);
        match (link.left, link.right) {
            (_, Some(right)) if pos < offset && pos + nodes.link(right).size as i64 >= offset => {
                node = right;
                pos += subtree_size(nodes, nodes.link(right).left) as i64 + 1;
            }
            (Some(left), _) if pos > offset && pos - nodes.link(left).size as i64 <= offset => {
                node = left;
                pos -= subtree_size(nodes, nodes.link(left).right) as i64 + 1;
            }
            _ => {
                let parent = link.parent?;
                if nodes.link(parent).right == Some(node) {
                    pos -= subtree_size(nodes, link.left) as i64 + 1;
                } else {
                    pos += subtree_size(nodes, link.right) as i64 + 1;
                }
                node = parent;
            }
        }
    }
    Some(node)
}

/// 1-based in-order position of `node` within its tree.
pub fn rank<N: AvlNodes>(nodes: &N, node: N::Key) -> usize {
    let link = nodes.link(node);
    let mut rank = link.size - subtree_size(nodes, link.right);
    let mut cur = node;
    let mut parent = link.parent;
    while let Some(p) = parent {
        let parent_link = nodes.link(p);
        if parent_link.right == Some(cur) {
            rank += parent_link.size - nodes.link(cur).size;
        }
        cur = p;
        parent = parent_link.parent;
    }
    rank
}

/// Leftmost node below `root`.
pub fn first<N: AvlNodes>(nodes: &N, root: Option<N::Key>) -> Option<N::Key> {
    let mut cur = root?;
    while let Some(left) = nodes.link(cur).left {
        cur = left;
    }
    Some(cur)
}

/// Rightmost node below `root`.
pub fn last<N: AvlNodes>(nodes: &N, root: Option<N::Key>) -> Option<N::Key> {
    let mut cur = root?;
    while let Some(right) = nodes.link(cur).right {
        cur = right;
    }
    Some(cur)
}

/// Next node in order.
pub fn successor<N: AvlNodes>(nodes: &N, node: N::Key) -> Option<N::Key> {
    if let Some(right) = nodes.link(node).right {
        return first(nodes, Some(right));
    }
    let mut cur = node;
    while let Some(parent) = nodes.link(cur).parent {
        if nodes.link(parent).left == Some(cur) {
            return Some(parent);
        }
        cur = parent;
    }
    None
}

/// Previous node in order.
pub fn predecessor<N: AvlNodes>(nodes: &N, node: N::Key) -> Option<N::Key> {
    if let Some(left) = nodes.link(node).left {
        return last(nodes, Some(left));
    }
    let mut cur = node;
    while let Some(parent) = nodes.link(cur).parent {
        if nodes.link(parent).right == Some(cur) {
            return Some(parent);
        }
        cur = parent;
    }
    None
}

/// Check parent back-links, stored heights and sizes, and AVL balance for
/// the whole tree. Returns the node count.
pub fn validate<N: AvlNodes>(nodes: &N, root: Option<N::Key>) -> Result<usize, InvariantViolation> {
    let Some(root) = root else {
        return Ok(0);
    };
    if nodes.link(root).parent.is_some() {
        return Err(InvariantViolation::BrokenParentLink);
    }
    validate_at(nodes, root).map(|(_, size)| size)
}

fn validate_at<N: AvlNodes>(nodes: &N, node: N::Key) -> Result<(u32, usize), InvariantViolation> {
    let link = *nodes.link(node);
    let mut heights = [0u32; 2];
    let mut sizes = [0usize; 2];
    for (side, child) in [link.left, link.right].into_iter().enumerate() {
        if let Some(child) = child {
            if nodes.link(child).parent != Some(node) {
                return Err(InvariantViolation::BrokenParentLink);
            }
            (heights[side], sizes[side]) = validate_at(nodes, child)?;
        }
    }
    let [left, right] = heights;
    if left.abs_diff(right) > 1 {
        return Err(InvariantViolation::Unbalanced { left, right });
    }
    let height = 1 + left.max(right);
    if link.height != height {
        return Err(InvariantViolation::StaleHeight {
            stored: link.height,
            actual: height,
        });
    }
    let size = 1 + sizes[0] + sizes[1];
    if link.size != size {
        return Err(InvariantViolation::StaleSize {
            stored: link.size,
            actual: size,
        });
    }
    Ok((height, size))
}
