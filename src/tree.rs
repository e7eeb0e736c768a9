//! # Search Tree
//!
//! One long-lived root [`Node`] plus one [`NodeAllocator`] per worker. The
//! tree owns all structural operations; the search controller only walks and
//! updates nodes through it.
//!
//! ```text
//!                 root (never reallocated)
//!                /         |          \
//!   allocator 0 block   allocator 1   allocator 2 ...
//!   [c0 c1 c2]          [d0 d1]       [e0 e1 e2 e3]
//! ```
//!
//! A node is reachable iff it is the root or lies in the live range of
//! exactly one allocator. Every node with a non-zero child count points at a
//! contiguous block of exactly that many children, all in one allocator.
//!
//! Operations taking `&self` are safe to call from many workers during a
//! search: each worker only allocates from its own allocator. Operations that
//! overwrite or reclaim nodes (`prune`, `swap`, `clear`, the copy targets)
//! take `&mut self` and run between searches.

use crate::allocator::NodeAllocator;
use crate::error::TreeError;
use crate::node::{Color, Move, MoveInfo, Node, NodeId, ProvenType};
use std::time::{Duration, Instant};

/// Copies check the clock once per this many nodes.
const COPY_TIME_CHECK_INTERVAL: usize = 256;

#[derive(Debug)]
pub struct SearchTree {
    root: Node,
    allocators: Vec<NodeAllocator>,
}

/// Iterator over the children of a node, in block order.
pub struct Children<'a> {
    tree: &'a SearchTree,
    first: NodeId,
    next: usize,
    count: usize,
}

impl<'a> Iterator for Children<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let id = self.first.offset(self.next);
        self.next += 1;
        Some((id, self.tree.node(id)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Children<'_> {}

/// Bookkeeping shared by the recursive copy.
struct CopyContext {
    min_count: f64,
    keep_proven: bool,
    deadline: Option<Instant>,
    next_allocator: usize,
    nodes_copied: usize,
    truncated: bool,
}

impl CopyContext {
    fn new(min_count: f64, keep_proven: bool, max_time: Option<Duration>) -> Self {
        Self {
            min_count,
            keep_proven,
            deadline: max_time.map(|t| Instant::now() + t),
            next_allocator: 0,
            nodes_copied: 0,
            truncated: false,
        }
    }

    fn out_of_time(&mut self) -> bool {
        self.nodes_copied += 1;
        if self.nodes_copied % COPY_TIME_CHECK_INTERVAL != 0 {
            return false;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Round-robin choice of a target allocator that can hold `n` nodes.
    fn pick_allocator(&mut self, target: &SearchTree, n: usize) -> Option<usize> {
        let count = target.allocators.len();
        for attempt in 0..count {
            let index = (self.next_allocator + attempt) % count;
            if target.allocators[index].has_capacity(n) {
                self.next_allocator = index + 1;
                return Some(index);
            }
        }
        None
    }
}

impl SearchTree {
    /// Creates a tree with `num_allocators` allocators of `capacity` nodes each.
    pub fn new(num_allocators: usize, capacity: usize) -> Self {
        let mut tree = Self {
            root: Node::default(),
            allocators: Vec::new(),
        };
        tree.set_capacity(num_allocators, capacity);
        tree
    }

    /// Replaces all allocators, discarding every node except the root data.
    pub fn set_capacity(&mut self, num_allocators: usize, capacity: usize) {
        self.allocators = (0..num_allocators)
            .map(|id| {
                let mut allocator = NodeAllocator::new(id);
                allocator.set_capacity(capacity);
                allocator
            })
            .collect();
        self.root.clear_children();
    }

    pub fn allocator_count(&self) -> usize {
        self.allocators.len()
    }

    pub fn allocator(&self, id: usize) -> &NodeAllocator {
        &self.allocators[id]
    }

    /// Capacity of each allocator.
    pub fn capacity_per_allocator(&self) -> usize {
        self.allocators.first().map_or(0, NodeAllocator::capacity)
    }

    /// Total node capacity, excluding the root.
    pub fn max_nodes(&self) -> usize {
        self.allocators.iter().map(NodeAllocator::capacity).sum()
    }

    /// Number of allocated slots across all allocators.
    pub fn node_count(&self) -> usize {
        self.allocators.iter().map(NodeAllocator::len).sum()
    }

    pub fn max_memory_touched(&self) -> usize {
        self.allocators
            .iter()
            .map(NodeAllocator::max_memory_touched)
            .sum()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Resets the root to an unexpanded node and drops all other nodes.
    pub fn clear(&mut self) {
        for allocator in &mut self.allocators {
            allocator.clear();
        }
        self.root.reset(Move::NULL, NodeId::NONE, Color::Black);
    }

    pub fn set_root_color(&self, color: Color) {
        self.root.set_color(color);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        if id.is_root() {
            return true;
        }
        self.allocators
            .get(id.allocator())
            .is_some_and(|allocator| allocator.contains(id))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        if id.is_root() {
            return &self.root;
        }
        debug_assert!(self.contains(id), "stale node handle {id:?}");
        self.allocators[id.allocator()].node(id.index())
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        let (first, count) = self.node(id).children().unwrap_or((NodeId::NONE, 0));
        Children {
            tree: self,
            first,
            next: 0,
            count,
        }
    }

    pub fn has_capacity(&self, allocator: usize, n: usize) -> bool {
        self.allocators[allocator].has_capacity(n)
    }

    /// Expands a childless node into a new generation of children.
    ///
    /// The child data is written completely before the block is published
    /// (first child, then count, both with release ordering), so concurrent
    /// readers observe either no children or all of them.
    ///
    /// # Arguments
    /// * `allocator` - Allocator of the calling worker
    /// * `id` - Node to expand
    /// * `infos` - One entry per child, in block order
    pub fn create_children(
        &self,
        allocator: usize,
        id: NodeId,
        infos: &[MoveInfo],
    ) -> Result<(), TreeError> {
        debug_assert!(!infos.is_empty());
        let parent = self.node(id);
        debug_assert!(!parent.has_children(), "{id:?} already expanded");
        let (first, count) = self.allocators[allocator].create_batch(infos, id, parent.color())?;
        if count > parent.pos_count() {
            parent.set_pos_count(count);
        }
        parent.publish_children(first, infos.len());
        Ok(())
    }

    /// Returns the child of `parent` for `mv`, creating it if needed.
    ///
    /// When the move is missing, the existing children are copied into a
    /// fresh block together with the new child. The old block is abandoned
    /// until the allocator is cleared.
    pub fn create_child_if_absent(
        &self,
        allocator: usize,
        parent_id: NodeId,
        mv: Move,
    ) -> Result<NodeId, TreeError> {
        if let Some((id, _)) = self.children(parent_id).find(|(_, child)| child.mv() == mv) {
            return Ok(id);
        }
        let parent = self.node(parent_id);
        let existing = parent.children();
        let count = existing.map_or(0, |(_, count)| count);
        let color = parent.color().opponent();
        let first = self.allocators[allocator].create_n(count + 1, parent_id, color)?;
        if let Some((old_first, _)) = existing {
            for i in 0..count {
                let copy = first.offset(i);
                self.node(copy).copy_with_links_from(self.node(old_first.offset(i)));
                for (_, grandchild) in self.children(copy) {
                    grandchild.set_parent(copy);
                }
            }
        }
        let child = first.offset(count);
        self.node(child).reset(mv, parent_id, color);
        parent.publish_children(first, count + 1);
        Ok(child)
    }

    /// Collapses `parent` to the single child `keep`.
    ///
    /// `keep` is moved into the first slot of the block and the rest of the
    /// block becomes the allocator's reusable hole. Children of `keep` are
    /// re-parented to the new slot.
    pub fn prune(&mut self, parent_id: NodeId, keep: NodeId) -> Result<(), TreeError> {
        let (first, count) = self
            .node(parent_id)
            .children()
            .ok_or(TreeError::NotExpanded)?;
        let in_block = keep.allocator() == first.allocator()
            && keep.generation() == first.generation()
            && keep.index() >= first.index()
            && keep.index() < first.index() + count;
        if !in_block {
            return Err(TreeError::NotAChild);
        }
        let kept = Node::default();
        kept.copy_with_links_from(self.node(keep));
        self.allocators[first.allocator()].compact_except(first, count, &kept);
        self.node(first).set_parent(parent_id);
        self.node(parent_id).set_child_count(1);
        for (_, grandchild) in self.children(first) {
            grandchild.set_parent(first);
        }
        Ok(())
    }

    /// Copies this tree into `target`, dropping the children of nodes with
    /// fewer than `min_count` games.
    ///
    /// Proven nodes keep their children if `keep_proven` is set. The copy
    /// stops early when `max_time` elapses or `target` runs out of capacity;
    /// nodes whose children were dropped lose their proven status.
    ///
    /// # Returns
    /// `true` if the copy was truncated by time or capacity.
    pub fn copy_prune_low_count(
        &self,
        target: &mut SearchTree,
        min_count: f64,
        keep_proven: bool,
        max_time: Option<Duration>,
    ) -> bool {
        target.clear();
        let mut ctx = CopyContext::new(min_count, keep_proven, max_time);
        self.copy_subtree(target, NodeId::ROOT, NodeId::ROOT, &mut ctx);
        ctx.truncated
    }

    /// Makes the subtree below `node` the whole content of `target`.
    ///
    /// # Returns
    /// `true` if the copy was truncated by time or capacity.
    pub fn extract_subtree(
        &self,
        target: &mut SearchTree,
        node: NodeId,
        max_time: Option<Duration>,
    ) -> bool {
        target.clear();
        let mut ctx = CopyContext::new(0.0, true, max_time);
        self.copy_subtree(target, NodeId::ROOT, node, &mut ctx);
        ctx.truncated
    }

    fn copy_subtree(
        &self,
        target: &SearchTree,
        target_id: NodeId,
        source_id: NodeId,
        ctx: &mut CopyContext,
    ) {
        let source = self.node(source_id);
        let dest = target.node(target_id);
        dest.copy_data_from(source);
        dest.clear_children();
        let Some((first, count)) = source.children() else {
            return;
        };
        if source.move_count() < ctx.min_count && !(ctx.keep_proven && source.is_proven()) {
            dest.set_proven(ProvenType::None);
            return;
        }
        if ctx.truncated || ctx.out_of_time() {
            ctx.truncated = true;
            dest.set_proven(ProvenType::None);
            return;
        }
        let created = ctx.pick_allocator(target, count).and_then(|index| {
            target.allocators[index]
                .create_n(count, target_id, source.color().opponent())
                .ok()
        });
        let Some(new_first) = created else {
            ctx.truncated = true;
            dest.set_proven(ProvenType::None);
            return;
        };
        for i in 0..count {
            self.copy_subtree(target, new_first.offset(i), first.offset(i), ctx);
        }
        dest.publish_children(new_first, count);
    }

    /// Exchanges the contents of two trees of the same shape in O(1).
    pub fn swap(&mut self, other: &mut SearchTree) -> Result<(), TreeError> {
        if self.allocator_count() != other.allocator_count()
            || self.capacity_per_allocator() != other.capacity_per_allocator()
        {
            return Err(TreeError::ShapeMismatch);
        }
        std::mem::swap(&mut self.root, &mut other.root);
        std::mem::swap(&mut self.allocators, &mut other.allocators);
        for tree in [&*self, &*other] {
            for (_, child) in tree.children(NodeId::ROOT) {
                child.set_parent(NodeId::ROOT);
            }
        }
        Ok(())
    }

    /// Walks every reachable node and verifies that it lies in a live
    /// allocator range and links back to its parent.
    pub fn check_consistency(&self) -> Result<(), TreeError> {
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let Some((first, count)) = self.node(id).children() else {
                continue;
            };
            for i in 0..count {
                let child = NodeId::new(first.allocator(), first.index() + i, first.generation());
                if !self.contains(child) {
                    return Err(TreeError::Inconsistent(format!(
                        "child {i} of {id:?} ({child:?}) is outside every live allocator range"
                    )));
                }
                let parent = self.node(child).parent();
                if parent != id {
                    return Err(TreeError::Inconsistent(format!(
                        "{child:?} links to parent {parent:?} instead of {id:?}"
                    )));
                }
                stack.push(child);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(ids: &[u32]) -> Vec<MoveInfo> {
        ids.iter().map(|&m| MoveInfo::new(Move(m))).collect()
    }

    fn child_moves(tree: &SearchTree, id: NodeId) -> Vec<Move> {
        tree.children(id).map(|(_, node)| node.mv()).collect()
    }

    /// Root with three children; the second has two children of its own.
    fn sample_tree() -> SearchTree {
        let tree = SearchTree::new(2, 32);
        tree.root().add_game_result(0.5, 10.0);
        tree.create_children(0, NodeId::ROOT, &moves(&[1, 2, 3])).unwrap();
        let ids: Vec<NodeId> = tree.children(NodeId::ROOT).map(|(id, _)| id).collect();
        tree.node(ids[0]).add_game_result(0.2, 2.0);
        tree.node(ids[1]).add_game_result(0.7, 7.0);
        tree.node(ids[2]).add_game_result(0.4, 1.0);
        tree.create_children(1, ids[1], &moves(&[20, 21])).unwrap();
        tree
    }

    #[test]
    fn test_create_children_publishes_block_in_order() {
        let tree = SearchTree::new(1, 16);
        tree.create_children(0, NodeId::ROOT, &moves(&[9, 4, 7])).unwrap();
        assert_eq!(tree.root().child_count(), 3);
        assert_eq!(child_moves(&tree, NodeId::ROOT), vec![Move(9), Move(4), Move(7)]);
        for (_, child) in tree.children(NodeId::ROOT) {
            assert_eq!(child.parent(), NodeId::ROOT);
            assert_eq!(child.color(), Color::White);
        }
        tree.check_consistency().unwrap();
    }

    #[test]
    fn test_create_children_out_of_capacity() {
        let tree = SearchTree::new(1, 2);
        let err = tree
            .create_children(0, NodeId::ROOT, &moves(&[1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, TreeError::CapacityExceeded { requested: 3, .. }));
        assert!(!tree.root().has_children());
    }

    #[test]
    fn test_create_child_if_absent_is_idempotent() {
        let tree = sample_tree();
        let existing = tree
            .create_child_if_absent(0, NodeId::ROOT, Move(2))
            .unwrap();
        assert_eq!(tree.node(existing).mv(), Move(2));
        assert_eq!(tree.root().child_count(), 3);

        let added = tree
            .create_child_if_absent(0, NodeId::ROOT, Move(5))
            .unwrap();
        assert_eq!(tree.root().child_count(), 4);
        assert_eq!(
            child_moves(&tree, NodeId::ROOT),
            vec![Move(1), Move(2), Move(3), Move(5)]
        );
        assert_eq!(
            tree.create_child_if_absent(0, NodeId::ROOT, Move(5)).unwrap(),
            added
        );
        let moved = tree
            .children(NodeId::ROOT)
            .find(|(_, node)| node.mv() == Move(2))
            .map(|(id, _)| id)
            .unwrap();
        assert_eq!(child_moves(&tree, moved), vec![Move(20), Move(21)]);
        tree.check_consistency().unwrap();
    }

    #[test]
    fn test_prune_keeps_single_child_and_reparents() {
        let mut tree = sample_tree();
        let keep = tree.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        let before = tree.node(keep).statistics();
        let grandchildren = child_moves(&tree, keep);

        tree.prune(NodeId::ROOT, keep).unwrap();

        assert_eq!(tree.root().child_count(), 1);
        let (only, node) = tree.children(NodeId::ROOT).next().unwrap();
        assert_eq!(node.mv(), Move(2));
        assert_eq!(node.statistics(), before);
        assert_eq!(child_moves(&tree, only), grandchildren);
        for (_, grandchild) in tree.children(only) {
            assert_eq!(grandchild.parent(), only);
        }
        tree.check_consistency().unwrap();
        assert!(tree.allocator(0).has_capacity(2));
    }

    #[test]
    fn test_prune_rejects_non_child() {
        let mut tree = sample_tree();
        let second = tree.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        let grandchild = tree.children(second).next().map(|(id, _)| id).unwrap();
        assert_eq!(tree.prune(NodeId::ROOT, grandchild), Err(TreeError::NotAChild));
        let leaf = tree.children(NodeId::ROOT).next().map(|(id, _)| id).unwrap();
        assert_eq!(tree.prune(leaf, grandchild), Err(TreeError::NotExpanded));
    }

    #[test]
    fn test_copy_with_high_threshold_keeps_only_root() {
        let tree = sample_tree();
        tree.root().set_proven(ProvenType::Win);
        let mut target = SearchTree::new(2, 32);
        let truncated = tree.copy_prune_low_count(&mut target, 1000.0, false, None);
        assert!(!truncated);
        assert!(!target.root().has_children());
        assert_eq!(target.root().proven(), ProvenType::None);
        assert_eq!(target.node_count(), 0);
    }

    #[test]
    fn test_copy_drops_low_count_branches() {
        let tree = sample_tree();
        let mut target = SearchTree::new(2, 32);
        assert!(!tree.copy_prune_low_count(&mut target, 5.0, false, None));
        assert_eq!(child_moves(&target, NodeId::ROOT), vec![Move(1), Move(2), Move(3)]);
        let second = target.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        assert_eq!(child_moves(&target, second), vec![Move(20), Move(21)]);
        assert!((target.node(second).mean() - 0.7).abs() < 1e-12);
        target.check_consistency().unwrap();

        assert!(!tree.copy_prune_low_count(&mut target, 8.0, false, None));
        let second = target.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        assert!(!target.node(second).has_children());
    }

    #[test]
    fn test_copy_out_of_time_drops_proven_status_of_cut_branches() {
        let tree = SearchTree::new(1, 600);
        let ids: Vec<u32> = (0..300).collect();
        tree.create_children(0, NodeId::ROOT, &moves(&ids)).unwrap();
        let children: Vec<NodeId> = tree.children(NodeId::ROOT).map(|(id, _)| id).collect();
        for &id in &children {
            tree.create_children(0, id, &moves(&[0])).unwrap();
            tree.node(id).set_proven(ProvenType::Win);
        }

        let mut target = SearchTree::new(1, 600);
        assert!(tree.copy_prune_low_count(&mut target, 0.0, true, Some(Duration::ZERO)));
        assert_eq!(target.root().child_count(), 300);
        let (kept, cut): (Vec<&Node>, Vec<&Node>) = target
            .children(NodeId::ROOT)
            .map(|(_, node)| node)
            .partition(|node| node.has_children());
        assert!(!kept.is_empty());
        assert!(!cut.is_empty());
        assert!(kept.iter().all(|node| node.proven() == ProvenType::Win));
        assert!(cut.iter().all(|node| node.proven() == ProvenType::None));
        target.check_consistency().unwrap();

        let mut extracted = SearchTree::new(1, 600);
        assert!(tree.extract_subtree(&mut extracted, NodeId::ROOT, Some(Duration::ZERO)));
        assert!(extracted
            .children(NodeId::ROOT)
            .any(|(_, node)| !node.has_children() && node.proven() == ProvenType::None));
    }

    #[test]
    fn test_copy_keeps_proven_branches() {
        let tree = sample_tree();
        let second = tree.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        tree.node(second).set_proven(ProvenType::Loss);
        let mut target = SearchTree::new(2, 32);
        tree.copy_prune_low_count(&mut target, 8.0, true, None);
        let copied = target.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        assert_eq!(target.node(copied).proven(), ProvenType::Loss);
        assert_eq!(target.node(copied).child_count(), 2);
    }

    #[test]
    fn test_copy_truncates_on_capacity() {
        let tree = sample_tree();
        let mut target = SearchTree::new(1, 3);
        assert!(tree.copy_prune_low_count(&mut target, 0.0, false, None));
        assert_eq!(target.root().child_count(), 3);
        let second = target.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        assert!(!target.node(second).has_children());
        assert_eq!(target.node(second).proven(), ProvenType::None);
        target.check_consistency().unwrap();
    }

    #[test]
    fn test_extract_subtree_and_swap() {
        let mut tree = sample_tree();
        let second = tree.children(NodeId::ROOT).nth(1).map(|(id, _)| id).unwrap();
        let mut target = SearchTree::new(2, 32);
        assert!(!tree.extract_subtree(&mut target, second, None));
        assert_eq!(target.root().mv(), Move(2));
        assert_eq!(child_moves(&target, NodeId::ROOT), vec![Move(20), Move(21)]);
        assert!((target.root().move_count() - 7.0).abs() < 1e-12);

        tree.swap(&mut target).unwrap();
        assert_eq!(child_moves(&tree, NodeId::ROOT), vec![Move(20), Move(21)]);
        assert_eq!(child_moves(&target, NodeId::ROOT), vec![Move(1), Move(2), Move(3)]);
        tree.check_consistency().unwrap();
        target.check_consistency().unwrap();
    }

    #[test]
    fn test_swap_requires_same_shape() {
        let mut a = SearchTree::new(2, 32);
        let mut b = SearchTree::new(2, 16);
        assert_eq!(a.swap(&mut b), Err(TreeError::ShapeMismatch));
    }

    #[test]
    fn test_consistency_detects_bad_parent_link() {
        let tree = sample_tree();
        let (first, _) = tree.children(NodeId::ROOT).next().unwrap();
        let (second, _) = tree.children(NodeId::ROOT).nth(1).unwrap();
        tree.node(first).set_parent(second);
        assert!(matches!(
            tree.check_consistency(),
            Err(TreeError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_clear_resets_tree() {
        let mut tree = sample_tree();
        let old = tree.children(NodeId::ROOT).next().map(|(id, _)| id).unwrap();
        tree.clear();
        assert!(!tree.root().has_children());
        assert!(!tree.contains(old));
        assert_eq!(tree.node_count(), 0);
        assert!(!tree.root().has_mean());
    }
}
