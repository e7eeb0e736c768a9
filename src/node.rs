//! # Search Tree Nodes
//!
//! A [`Node`] is one vertex of the search tree. All of its fields are atomics,
//! so any worker may read or update any node through a shared reference while
//! other workers do the same. Nodes never own their children: a node refers to
//! a contiguous block of `child_count` nodes starting at `first_child`, stored
//! in one of the tree's allocators.
//!
//! ## Child Publication
//! A child block becomes visible in two steps, both release stores:
//! ```text
//!   write child data ──► store first_child (Release) ──► store child_count (Release)
//! ```
//! Readers load `child_count` with acquire ordering before `first_child`, so a
//! reader that observes a non-zero count also observes the initialized block.
//!
//! ## Handles
//! [`NodeId`] packs the allocator index, slot index and the allocator's
//! generation into 64 bits so it can be stored atomically in parent and child
//! links. Clearing an allocator bumps its generation, which turns stale
//! handles into detectable errors instead of silent aliasing.

use crate::value::{AtomicF64, AtomicStatistics, Statistics};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Largest number of allocators (and therefore worker threads) a tree supports.
pub const MAX_ALLOCATORS: usize = 4094;

const INDEX_BITS: u32 = 32;
const ALLOCATOR_BITS: u32 = 12;
const ALLOCATOR_MASK: u64 = (1 << ALLOCATOR_BITS) - 1;
const GENERATION_BITS: u32 = 20;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Generation counters wrap at this value.
pub const GENERATION_LIMIT: u32 = 1 << GENERATION_BITS;

/// Opaque move identifier. The meaning is up to the simulator.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Move(pub u32);

impl Move {
    /// Placeholder move of the root node.
    pub const NULL: Move = Move(u32::MAX);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NULL")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Player tag stored on each node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }

    fn from_u8(value: u8) -> Color {
        if value == 0 {
            Color::Black
        } else {
            Color::White
        }
    }
}

/// Game-theoretic status of a node, from the point of view of the player
/// to move at that node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ProvenType {
    None,
    Win,
    Loss,
}

impl ProvenType {
    fn to_u8(self) -> u8 {
        match self {
            ProvenType::None => 0,
            ProvenType::Win => 1,
            ProvenType::Loss => 2,
        }
    }

    fn from_u8(value: u8) -> ProvenType {
        match value {
            1 => ProvenType::Win,
            2 => ProvenType::Loss,
            _ => ProvenType::None,
        }
    }

    /// The same result seen from the other player.
    pub fn inverse(self) -> ProvenType {
        match self {
            ProvenType::None => ProvenType::None,
            ProvenType::Win => ProvenType::Loss,
            ProvenType::Loss => ProvenType::Win,
        }
    }
}

/// Handle to a node in a [`SearchTree`](crate::tree::SearchTree).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub const NONE: NodeId = NodeId(u64::MAX);
    pub const ROOT: NodeId = NodeId(u64::MAX - 1);

    pub(crate) fn new(allocator: usize, index: usize, generation: u32) -> NodeId {
        debug_assert!(allocator < MAX_ALLOCATORS);
        debug_assert!(index <= u32::MAX as usize);
        NodeId(
            ((generation as u64 & GENERATION_MASK) << (INDEX_BITS + ALLOCATOR_BITS))
                | ((allocator as u64) << INDEX_BITS)
                | index as u64,
        )
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// Allocator owning the node. Meaningless for `ROOT` and `NONE`.
    pub fn allocator(self) -> usize {
        ((self.0 >> INDEX_BITS) & ALLOCATOR_MASK) as usize
    }

    pub fn index(self) -> usize {
        (self.0 & u32::MAX as u64) as usize
    }

    pub fn generation(self) -> u32 {
        (self.0 >> (INDEX_BITS + ALLOCATOR_BITS)) as u32
    }

    /// Handle of the node `offset` slots after this one in the same allocator.
    pub(crate) fn offset(self, offset: usize) -> NodeId {
        debug_assert!(!self.is_root() && !self.is_none());
        NodeId::new(self.allocator(), self.index() + offset, self.generation())
    }

    fn to_bits(self) -> u64 {
        self.0
    }

    fn from_bits(bits: u64) -> NodeId {
        NodeId(bits)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NodeId(none)")
        } else if self.is_root() {
            write!(f, "NodeId(root)")
        } else {
            write!(
                f,
                "NodeId({}:{}@{})",
                self.allocator(),
                self.index(),
                self.generation()
            )
        }
    }
}

/// Data for one child of a new generation created by
/// [`SearchTree::create_children`](crate::tree::SearchTree::create_children).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveInfo {
    pub mv: Move,
    /// Initial value estimate, used if `count > 0`.
    pub value: f64,
    /// Pseudo visit count attached to `value`.
    pub count: f64,
    pub rave_value: f64,
    pub rave_count: f64,
    /// Policy prior in `[0, 1]`.
    pub prior: f64,
}

impl MoveInfo {
    pub fn new(mv: Move) -> Self {
        Self {
            mv,
            value: 0.0,
            count: 0.0,
            rave_value: 0.0,
            rave_count: 0.0,
            prior: 0.0,
        }
    }

    pub fn with_prior(mv: Move, prior: f64) -> Self {
        Self {
            prior,
            ..Self::new(mv)
        }
    }

    /// Adds prior knowledge as if `count` games with the given value had
    /// been played.
    pub fn with_knowledge(mut self, value: f64, count: f64) -> Self {
        self.value = value;
        self.count = count;
        self
    }
}

/// A vertex of the search tree.
#[derive(Debug)]
pub struct Node {
    stats: AtomicStatistics,
    rave: AtomicStatistics,
    pos_count: AtomicF64,
    prior: AtomicF64,
    mv: AtomicU32,
    color: AtomicU8,
    proven: AtomicU8,
    expanding: AtomicBool,
    virtual_loss: AtomicU32,
    parent: AtomicU64,
    first_child: AtomicU64,
    child_count: AtomicU32,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            stats: AtomicStatistics::new(),
            rave: AtomicStatistics::new(),
            pos_count: AtomicF64::new(0.0),
            prior: AtomicF64::new(0.0),
            mv: AtomicU32::new(Move::NULL.0),
            color: AtomicU8::new(0),
            proven: AtomicU8::new(0),
            expanding: AtomicBool::new(false),
            virtual_loss: AtomicU32::new(0),
            parent: AtomicU64::new(NodeId::NONE.to_bits()),
            first_child: AtomicU64::new(NodeId::NONE.to_bits()),
            child_count: AtomicU32::new(0),
        }
    }
}

impl Node {
    /// Resets the node to a fresh, childless state.
    pub fn reset(&self, mv: Move, parent: NodeId, color: Color) {
        self.stats.clear();
        self.rave.clear();
        self.pos_count.store(0.0, Ordering::Relaxed);
        self.prior.store(0.0, Ordering::Relaxed);
        self.mv.store(mv.0, Ordering::Relaxed);
        self.color.store(color.to_u8(), Ordering::Relaxed);
        self.proven.store(ProvenType::None.to_u8(), Ordering::Relaxed);
        self.expanding.store(false, Ordering::Relaxed);
        self.virtual_loss.store(0, Ordering::Relaxed);
        self.parent.store(parent.to_bits(), Ordering::Relaxed);
        self.child_count.store(0, Ordering::Relaxed);
        self.first_child.store(NodeId::NONE.to_bits(), Ordering::Relaxed);
    }

    /// Initializes a freshly allocated child from a [`MoveInfo`].
    pub(crate) fn init_from(&self, info: &MoveInfo, parent: NodeId, color: Color) {
        self.reset(info.mv, parent, color);
        self.prior.store(info.prior, Ordering::Relaxed);
        if info.count > 0.0 {
            self.stats.add(info.value, info.count);
        }
        if info.rave_count > 0.0 {
            self.rave.add(info.rave_value, info.rave_count);
        }
    }

    /// Copies all per-node data except the parent and child links.
    pub fn copy_data_from(&self, other: &Node) {
        self.stats.copy_from(&other.stats);
        self.rave.copy_from(&other.rave);
        self.pos_count.store(other.pos_count(), Ordering::Relaxed);
        self.prior.store(other.prior(), Ordering::Relaxed);
        self.mv.store(other.mv().0, Ordering::Relaxed);
        self.color.store(other.color().to_u8(), Ordering::Relaxed);
        self.proven.store(other.proven().to_u8(), Ordering::Relaxed);
        self.expanding.store(false, Ordering::Relaxed);
        self.virtual_loss.store(0, Ordering::Relaxed);
    }

    /// Copies everything, including the child links, but not the parent link.
    pub(crate) fn copy_with_links_from(&self, other: &Node) {
        self.copy_data_from(other);
        match other.children() {
            Some((first, count)) => self.publish_children(first, count),
            None => self.clear_children(),
        }
    }

    pub fn mv(&self) -> Move {
        Move(self.mv.load(Ordering::Relaxed))
    }

    pub fn color(&self) -> Color {
        Color::from_u8(self.color.load(Ordering::Relaxed))
    }

    pub(crate) fn set_color(&self, color: Color) {
        self.color.store(color.to_u8(), Ordering::Relaxed);
    }

    pub fn prior(&self) -> f64 {
        self.prior.load(Ordering::Relaxed)
    }

    /// Number of game results added to this node.
    pub fn move_count(&self) -> f64 {
        self.stats.count()
    }

    pub fn has_mean(&self) -> bool {
        self.stats.is_defined()
    }

    /// Mean value of the move leading to this node, from the point of view
    /// of the player who made it.
    pub fn mean(&self) -> f64 {
        self.stats.mean()
    }

    pub fn statistics(&self) -> Statistics<f64> {
        self.stats.snapshot()
    }

    pub fn add_game_result(&self, value: f64, count: f64) {
        self.stats.add(value, count);
    }

    pub fn remove_game_result(&self, value: f64, count: f64) {
        self.stats.remove(value, count);
    }

    pub fn has_rave_value(&self) -> bool {
        self.rave.is_defined()
    }

    pub fn rave_count(&self) -> f64 {
        self.rave.count()
    }

    pub fn rave_value(&self) -> f64 {
        self.rave.mean()
    }

    pub fn add_rave_value(&self, value: f64, weight: f64) {
        self.rave.add(value, weight);
    }

    /// Number of times the position of this node was visited.
    pub fn pos_count(&self) -> f64 {
        self.pos_count.load(Ordering::Relaxed)
    }

    pub fn inc_pos_count(&self, count: f64) {
        let value = self.pos_count() + count;
        self.pos_count.store(value, Ordering::Relaxed);
    }

    pub(crate) fn set_pos_count(&self, count: f64) {
        self.pos_count.store(count, Ordering::Relaxed);
    }

    pub fn proven(&self) -> ProvenType {
        ProvenType::from_u8(self.proven.load(Ordering::Relaxed))
    }

    pub fn is_proven(&self) -> bool {
        self.proven() != ProvenType::None
    }

    pub fn set_proven(&self, proven: ProvenType) {
        self.proven.store(proven.to_u8(), Ordering::Relaxed);
    }

    pub fn virtual_loss_count(&self) -> u32 {
        self.virtual_loss.load(Ordering::Relaxed)
    }

    pub fn add_virtual_loss(&self) {
        self.virtual_loss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove_virtual_loss(&self) {
        let _ = self
            .virtual_loss
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Claims the right to expand this node. Only one caller gets `true`
    /// until [`end_expansion`](Self::end_expansion) is called.
    pub fn try_begin_expansion(&self) -> bool {
        self.expanding
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn end_expansion(&self) {
        self.expanding.store(false, Ordering::Release);
    }

    pub fn parent(&self) -> NodeId {
        NodeId::from_bits(self.parent.load(Ordering::Relaxed))
    }

    pub fn set_parent(&self, parent: NodeId) {
        self.parent.store(parent.to_bits(), Ordering::Relaxed);
    }

    pub fn child_count(&self) -> usize {
        self.child_count.load(Ordering::Acquire) as usize
    }

    pub fn has_children(&self) -> bool {
        self.child_count() > 0
    }

    /// First child and number of children, if the node has published any.
    pub fn children(&self) -> Option<(NodeId, usize)> {
        let count = self.child_count.load(Ordering::Acquire);
        if count == 0 {
            return None;
        }
        let first = NodeId::from_bits(self.first_child.load(Ordering::Acquire));
        Some((first, count as usize))
    }

    /// Makes a fully initialized child block visible to other threads.
    pub(crate) fn publish_children(&self, first: NodeId, count: usize) {
        debug_assert!(count > 0 && count <= u32::MAX as usize);
        self.first_child.store(first.to_bits(), Ordering::Release);
        self.child_count.store(count as u32, Ordering::Release);
    }

    /// Detaches the child block. Readers that already loaded it keep a
    /// valid view until the storage is reused.
    pub(crate) fn clear_children(&self) {
        self.child_count.store(0, Ordering::Release);
        self.first_child.store(NodeId::NONE.to_bits(), Ordering::Release);
    }

    /// Shrinks the published child count, keeping the first child.
    pub(crate) fn set_child_count(&self, count: usize) {
        debug_assert!(count > 0);
        self.child_count.store(count as u32, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_packing() {
        let id = NodeId::new(17, 123_456, 99);
        assert_eq!(id.allocator(), 17);
        assert_eq!(id.index(), 123_456);
        assert_eq!(id.generation(), 99);
        assert!(!id.is_root());
        assert!(!id.is_none());
        let next = id.offset(4);
        assert_eq!(next.index(), 123_460);
        assert_eq!(next.allocator(), 17);
        assert_eq!(next.generation(), 99);
        assert_ne!(NodeId::ROOT, NodeId::NONE);
    }

    #[test]
    fn test_generation_wraps_into_field() {
        let id = NodeId::new(MAX_ALLOCATORS - 1, 0, GENERATION_LIMIT - 1);
        assert_eq!(id.generation(), GENERATION_LIMIT - 1);
        assert_eq!(id.allocator(), MAX_ALLOCATORS - 1);
        assert_ne!(id, NodeId::ROOT);
        assert_ne!(id, NodeId::NONE);
    }

    #[test]
    fn test_init_from_move_info() {
        let node = Node::default();
        let info = MoveInfo::with_prior(Move(7), 0.25).with_knowledge(0.8, 3.0);
        node.init_from(&info, NodeId::ROOT, Color::White);
        assert_eq!(node.mv(), Move(7));
        assert_eq!(node.color(), Color::White);
        assert_eq!(node.parent(), NodeId::ROOT);
        assert!((node.prior() - 0.25).abs() < 1e-12);
        assert!((node.move_count() - 3.0).abs() < 1e-12);
        assert!((node.mean() - 0.8).abs() < 1e-12);
        assert!(!node.has_children());
    }

    #[test]
    fn test_virtual_loss_never_underflows() {
        let node = Node::default();
        node.add_virtual_loss();
        node.add_virtual_loss();
        assert_eq!(node.virtual_loss_count(), 2);
        node.remove_virtual_loss();
        node.remove_virtual_loss();
        node.remove_virtual_loss();
        assert_eq!(node.virtual_loss_count(), 0);
    }

    #[test]
    fn test_expansion_claim() {
        let node = Node::default();
        assert!(node.try_begin_expansion());
        assert!(!node.try_begin_expansion());
        node.end_expansion();
        assert!(node.try_begin_expansion());
    }

    #[test]
    fn test_proven_inverse() {
        assert_eq!(ProvenType::Win.inverse(), ProvenType::Loss);
        assert_eq!(ProvenType::Loss.inverse(), ProvenType::Win);
        assert_eq!(ProvenType::None.inverse(), ProvenType::None);
        let node = Node::default();
        node.set_proven(ProvenType::Loss);
        assert!(node.is_proven());
        assert_eq!(node.proven(), ProvenType::Loss);
    }
}
