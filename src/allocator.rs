//! # Node Allocator
//!
//! A fixed-capacity arena of [`Node`]s owned by one worker. Nodes are handed
//! out in contiguous blocks and never freed individually:
//!
//! ```text
//!   0                hole_start   hole_end          end            capacity
//!   ├──── live ──────┼──── hole ───┼──── live ───────┼──── free ─────┤
//! ```
//!
//! Blocks come from the reusable hole first (if it is large enough) and from
//! the free tail otherwise. At most one hole is tracked; compacting again
//! before the hole is consumed forgets the previous one.
//!
//! Only the owning worker allocates, but every worker may read any node, so
//! the bookkeeping fields are atomics and the node storage is shared through
//! `&self`. [`set_capacity`](NodeAllocator::set_capacity) and
//! [`clear`](NodeAllocator::clear) need exclusive access.

use crate::error::TreeError;
use crate::node::{Color, MoveInfo, Node, NodeId, GENERATION_LIMIT};
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Arena of nodes with a single reusable hole.
#[derive(Debug)]
pub struct NodeAllocator {
    id: usize,
    generation: u32,
    nodes: Box<[Node]>,
    end: AtomicUsize,
    hole_start: AtomicUsize,
    hole_end: AtomicUsize,
    high_water: AtomicUsize,
}

impl NodeAllocator {
    /// Creates an allocator without storage. Call
    /// [`set_capacity`](Self::set_capacity) before the first allocation.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            generation: 0,
            nodes: Box::new([]),
            end: AtomicUsize::new(0),
            hole_start: AtomicUsize::new(0),
            hole_end: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pre-allocates storage for exactly `capacity` nodes, discarding all
    /// existing nodes.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.nodes = (0..capacity).map(|_| Node::default()).collect();
        self.high_water.store(0, Ordering::Relaxed);
        self.reset_ranges();
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Destroys all live nodes. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.reset_ranges();
    }

    fn reset_ranges(&mut self) {
        self.generation = (self.generation + 1) % GENERATION_LIMIT;
        *self.end.get_mut() = 0;
        *self.hole_start.get_mut() = 0;
        *self.hole_end.get_mut() = 0;
    }

    /// Number of slots in the live range, holes included.
    pub fn len(&self) -> usize {
        self.end.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hole_len(&self) -> usize {
        self.hole_end.load(Ordering::Relaxed) - self.hole_start.load(Ordering::Relaxed)
    }

    /// Whether `n` more nodes fit, either into the hole or at the tail.
    pub fn has_capacity(&self, n: usize) -> bool {
        self.hole_len() >= n || self.capacity() - self.len() >= n
    }

    /// Peak number of bytes of node storage ever handed out.
    pub fn max_memory_touched(&self) -> usize {
        self.high_water.load(Ordering::Relaxed) * size_of::<Node>()
    }

    /// Whether `id` refers to a live node of this allocator.
    pub fn contains(&self, id: NodeId) -> bool {
        if id.is_none() || id.is_root() {
            return false;
        }
        if id.allocator() != self.id || id.generation() != self.generation {
            return false;
        }
        let index = id.index();
        let hole_start = self.hole_start.load(Ordering::Relaxed);
        let hole_end = self.hole_end.load(Ordering::Relaxed);
        index < self.len() && !(hole_start <= index && index < hole_end)
    }

    /// The node at slot `index`.
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn handle(&self, index: usize) -> NodeId {
        NodeId::new(self.id, index, self.generation)
    }

    /// Reserves `n` consecutive slots and returns the first index.
    fn reserve(&self, n: usize) -> Result<usize, TreeError> {
        debug_assert!(n > 0);
        let hole_start = self.hole_start.load(Ordering::Relaxed);
        if self.hole_len() >= n {
            self.hole_start.store(hole_start + n, Ordering::Relaxed);
            return Ok(hole_start);
        }
        let end = self.len();
        let available = self.capacity() - end;
        if available < n {
            return Err(TreeError::CapacityExceeded {
                requested: n,
                available: available.max(self.hole_len()),
            });
        }
        self.high_water.fetch_max(end + n, Ordering::Relaxed);
        Ok(end)
    }

    /// Makes slots `[start, start + n)` part of the published live range.
    fn commit(&self, start: usize, n: usize) {
        if start + n > self.len() {
            self.end.store(start + n, Ordering::Release);
        }
    }

    /// Creates one fresh node.
    pub fn create_one(&self, parent: NodeId, color: Color) -> Result<NodeId, TreeError> {
        self.create_n(1, parent, color)
    }

    /// Creates `n` fresh nodes and returns a handle to the first one.
    pub fn create_n(&self, n: usize, parent: NodeId, color: Color) -> Result<NodeId, TreeError> {
        let start = self.reserve(n)?;
        for node in &self.nodes[start..start + n] {
            node.reset(crate::node::Move::NULL, parent, color);
        }
        self.commit(start, n);
        Ok(self.handle(start))
    }

    /// Creates one node per [`MoveInfo`], colored as the opponent of
    /// `parent_color`. Returns the first handle and the sum of the
    /// supplied visit counts.
    pub fn create_batch(
        &self,
        infos: &[MoveInfo],
        parent: NodeId,
        parent_color: Color,
    ) -> Result<(NodeId, f64), TreeError> {
        let start = self.reserve(infos.len())?;
        let color = parent_color.opponent();
        let mut count = 0.0;
        for (node, info) in self.nodes[start..start + infos.len()].iter().zip(infos) {
            node.init_from(info, parent, color);
            count += info.count;
        }
        self.commit(start, infos.len());
        Ok((self.handle(start), count))
    }

    /// Overwrites the block `[first, first + len)` with a copy of `keep`
    /// (links included) in its first slot and turns the remainder into the
    /// reusable hole.
    pub fn compact_except(&mut self, first: NodeId, len: usize, keep: &Node) {
        debug_assert_eq!(first.allocator(), self.id);
        let start = first.index();
        self.nodes[start].copy_with_links_from(keep);
        *self.hole_start.get_mut() = start + 1;
        *self.hole_end.get_mut() = start + len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Move;

    fn infos(moves: &[u32]) -> Vec<MoveInfo> {
        moves.iter().map(|&m| MoveInfo::new(Move(m))).collect()
    }

    #[test]
    fn test_fill_to_capacity_then_fail() {
        let mut alloc = NodeAllocator::new(0);
        alloc.set_capacity(8);
        let first = alloc.create_n(8, NodeId::ROOT, Color::Black).unwrap();
        assert_eq!(first.index(), 0);
        assert!(!alloc.has_capacity(1));
        let err = alloc.create_one(NodeId::ROOT, Color::Black).unwrap_err();
        assert_eq!(
            err,
            TreeError::CapacityExceeded {
                requested: 1,
                available: 0
            }
        );
        assert_eq!(alloc.len(), 8);
    }

    #[test]
    fn test_create_batch_sets_color_and_count() {
        let mut alloc = NodeAllocator::new(3);
        alloc.set_capacity(16);
        let mut batch = infos(&[4, 5, 6]);
        batch[0] = batch[0].with_knowledge(0.5, 2.0);
        batch[2] = batch[2].with_knowledge(1.0, 3.0);
        let (first, count) = alloc.create_batch(&batch, NodeId::ROOT, Color::Black).unwrap();
        assert_eq!(first.allocator(), 3);
        assert!((count - 5.0).abs() < 1e-12);
        for i in 0..3 {
            let node = alloc.node(first.index() + i);
            assert_eq!(node.color(), Color::White);
            assert_eq!(node.mv(), Move(4 + i as u32));
            assert!(alloc.contains(first.offset(i)));
        }
    }

    #[test]
    fn test_hole_is_reused() {
        let mut alloc = NodeAllocator::new(0);
        alloc.set_capacity(10);
        let (first, _) = alloc
            .create_batch(&infos(&[1, 2, 3, 4]), NodeId::ROOT, Color::Black)
            .unwrap();
        let keep = Node::default();
        keep.copy_data_from(alloc.node(2));
        alloc.compact_except(first, 4, &keep);
        assert_eq!(alloc.node(0).mv(), Move(3));
        assert!(!alloc.contains(first.offset(1)));
        assert!(!alloc.contains(first.offset(3)));
        assert!(alloc.has_capacity(3));

        let (reused, _) = alloc
            .create_batch(&infos(&[7, 8]), NodeId::ROOT, Color::Black)
            .unwrap();
        assert_eq!(reused.index(), 1);
        assert!(alloc.contains(reused));
        assert_eq!(alloc.len(), 4);

        let (tail, _) = alloc
            .create_batch(&infos(&[9, 10]), NodeId::ROOT, Color::Black)
            .unwrap();
        assert_eq!(tail.index(), 4);
    }

    #[test]
    fn test_second_compaction_drops_unused_hole() {
        let mut alloc = NodeAllocator::new(0);
        alloc.set_capacity(8);
        let a = alloc.create_n(4, NodeId::ROOT, Color::Black).unwrap();
        let b = alloc.create_n(4, NodeId::ROOT, Color::Black).unwrap();
        let keep = Node::default();
        alloc.compact_except(a, 4, &keep);
        assert!(!alloc.contains(a.offset(1)));
        alloc.compact_except(b, 4, &keep);
        // The first hole is forgotten and stays occupied.
        assert!(alloc.contains(a.offset(1)));
        assert!(!alloc.contains(b.offset(1)));

        let reused = alloc.create_n(3, NodeId::ROOT, Color::Black).unwrap();
        assert_eq!(reused.index(), 5);
        assert!(!alloc.has_capacity(1));
        assert!(alloc.create_one(NodeId::ROOT, Color::Black).is_err());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut alloc = NodeAllocator::new(1);
        alloc.set_capacity(4);
        let id = alloc.create_one(NodeId::ROOT, Color::Black).unwrap();
        assert!(alloc.contains(id));
        alloc.clear();
        assert!(alloc.is_empty());
        assert!(!alloc.contains(id));
        let again = alloc.create_one(NodeId::ROOT, Color::Black).unwrap();
        assert_eq!(again.index(), id.index());
        assert_ne!(again, id);
    }

    #[test]
    fn test_max_memory_touched_is_high_water_mark() {
        let mut alloc = NodeAllocator::new(0);
        alloc.set_capacity(10);
        alloc.create_n(6, NodeId::ROOT, Color::Black).unwrap();
        assert_eq!(alloc.max_memory_touched(), 6 * size_of::<Node>());
        alloc.clear();
        alloc.create_n(2, NodeId::ROOT, Color::Black).unwrap();
        assert_eq!(alloc.max_memory_touched(), 6 * size_of::<Node>());
    }
}
