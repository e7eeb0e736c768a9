//! Selection policy.
//!
//! During descent a worker picks the child maximizing
//! `estimate(child) + bound(child, parent)` (+ an optional bias term). After
//! the search the controller picks the final move by the configured
//! [`MoveSelect`] criterion.
//!
//! Child means are stored from the point of view of the player who made the
//! move, which is the player to move at the parent, so larger is always
//! better for the selecting player.

use crate::config::{BoundKind, MoveSelect, SearchConfig, ValueEstimate};
use crate::node::{Move, Node, NodeId, ProvenType};
use crate::tree::SearchTree;

pub(crate) struct Policy<'a> {
    config: &'a SearchConfig,
}

impl<'a> Policy<'a> {
    pub(crate) fn new(config: &'a SearchConfig) -> Self {
        Self { config }
    }

    /// Value estimate of a child without exploration bonus, `None` if
    /// nothing is known about it.
    pub(crate) fn value_estimate(&self, child: &Node) -> Option<f64> {
        match self.config.estimate {
            ValueEstimate::Mean => child.has_mean().then(|| child.mean()),
            ValueEstimate::Rave => self.rave_estimate(child),
            ValueEstimate::PriorBlend => self.prior_blend(child),
        }
    }

    /// Mean blended with the RAVE value. The RAVE weight starts at 1 and
    /// decays as the move count grows:
    /// `w = rave / (n * (1/initial + rave/final) + rave)`.
    fn rave_estimate(&self, child: &Node) -> Option<f64> {
        let has_mean = child.has_mean();
        if !child.has_rave_value() {
            return has_mean.then(|| child.mean());
        }
        let rave_value = child.rave_value();
        if !has_mean {
            return Some(rave_value);
        }
        let n = child.move_count();
        let rave_count = child.rave_count();
        let weight = rave_count
            / (n * (1.0 / self.config.rave_weight_initial
                + rave_count / self.config.rave_weight_final)
                + rave_count);
        Some(weight * rave_value + (1.0 - weight) * child.mean())
    }

    /// `(n * mean + k * prior) / (n + k)` with the decaying pseudo-count
    /// `k = prior_weight * prior_decay / (prior_decay + n)`.
    fn prior_blend(&self, child: &Node) -> Option<f64> {
        let n = if child.has_mean() { child.move_count() } else { 0.0 };
        let k = self.config.prior_weight * self.config.prior_decay / (self.config.prior_decay + n);
        if n + k <= 0.0 {
            return None;
        }
        let mean = if n > 0.0 { child.mean() } else { 0.0 };
        Some((n * mean + k * child.prior()) / (n + k))
    }

    fn bound(&self, child: &Node, parent_count: f64, log_parent: f64, visits: f64) -> f64 {
        let c = self.config.exploration_constant;
        match self.config.bound {
            BoundKind::None => 0.0,
            BoundKind::Ucb => c * (log_parent / visits.max(1.0)).sqrt(),
            BoundKind::Puct => c * child.prior() * parent_count.sqrt() / (1.0 + visits),
        }
    }

    /// Selection value of one child during descent.
    fn selection_value(&self, child: &Node, parent_count: f64, log_parent: f64, bias: bool) -> f64 {
        let virtual_loss = if self.config.virtual_loss {
            child.virtual_loss_count() as f64
        } else {
            0.0
        };
        let n = if child.has_mean() { child.move_count() } else { 0.0 };
        let estimate = match child.proven() {
            ProvenType::Loss => 1.0,
            ProvenType::Win => 0.0,
            ProvenType::None => match self.value_estimate(child) {
                Some(value) if virtual_loss > 0.0 => value * n / (n + virtual_loss),
                Some(value) => value,
                None if virtual_loss > 0.0 => 0.0,
                None => {
                    return self.config.first_play_urgency
                        + self.bound_for_unvisited(child, parent_count);
                }
            },
        };
        let visits = n + virtual_loss;
        let mut value = estimate + self.bound(child, parent_count, log_parent, visits);
        if bias {
            value += self.config.bias_term_constant * (log_parent / (visits + 1.0)).sqrt();
        }
        value
    }

    /// Priors still order unvisited children under PUCT.
    fn bound_for_unvisited(&self, child: &Node, parent_count: f64) -> f64 {
        match self.config.bound {
            BoundKind::Puct => {
                self.config.exploration_constant * child.prior() * parent_count.max(1.0).sqrt()
            }
            _ => 0.0,
        }
    }

    fn use_bias_term(&self, game_index: u64, depth: usize) -> bool {
        self.config.bias_term_constant > 0.0
            && (self.config.bias_term_depth == 0 || depth <= self.config.bias_term_depth)
            && game_index % self.config.bias_term_frequency == 0
    }

    /// The child to descend into. Ties go to the earlier child.
    ///
    /// # Arguments
    /// * `game_index` - Index of the current game, for the bias frequency
    /// * `depth` - Depth of `parent` below the root
    pub(crate) fn select_child(
        &self,
        tree: &SearchTree,
        parent: NodeId,
        game_index: u64,
        depth: usize,
    ) -> Option<NodeId> {
        let parent_node = tree.node(parent);
        let parent_count = parent_node.pos_count().max(parent_node.move_count());
        let log_parent = parent_count.max(1.0).ln();
        let bias = self.use_bias_term(game_index, depth);
        let mut best = None;
        let mut best_value = f64::NEG_INFINITY;
        for (id, child) in tree.children(parent) {
            let value = self.selection_value(child, parent_count, log_parent, bias);
            if value > best_value {
                best_value = value;
                best = Some(id);
            }
        }
        best
    }

    fn move_select_value(&self, child: &Node, log_parent: f64) -> Option<f64> {
        if !child.has_mean() {
            return None;
        }
        let n = child.move_count();
        Some(match self.config.move_select {
            MoveSelect::Count => n,
            MoveSelect::Value => child.mean(),
            MoveSelect::Bound => {
                child.mean() - self.config.exploration_constant * (log_parent / n.max(1.0)).sqrt()
            }
            MoveSelect::PriorBlend => self.prior_blend(child).unwrap_or(child.mean()),
            MoveSelect::Estimate => self.value_estimate(child).unwrap_or(child.mean()),
        })
    }

    /// The final choice at `parent`.
    ///
    /// A child proven lost for the opponent is always chosen and children
    /// proven won for the opponent are avoided while alternatives exist.
    /// Without any visited child the highest prior wins, so an immediately
    /// aborted search still answers.
    pub(crate) fn best_child(&self, tree: &SearchTree, parent: NodeId) -> Option<NodeId> {
        let children: Vec<(NodeId, &Node)> = tree.children(parent).collect();
        if children.is_empty() {
            return None;
        }
        if let Some((id, _)) = children.iter().find(|(_, c)| c.proven() == ProvenType::Loss) {
            return Some(*id);
        }
        let parent_node = tree.node(parent);
        let log_parent = parent_node.pos_count().max(1.0).ln();
        let candidates: Vec<&(NodeId, &Node)> = {
            let open: Vec<_> = children
                .iter()
                .filter(|(_, c)| c.proven() != ProvenType::Win)
                .collect();
            if open.is_empty() {
                children.iter().collect()
            } else {
                open
            }
        };
        let mut best = None;
        let mut best_value = f64::NEG_INFINITY;
        for (id, child) in &candidates {
            if let Some(value) = self.move_select_value(child, log_parent) {
                if value > best_value {
                    best_value = value;
                    best = Some(*id);
                }
            }
        }
        best.or_else(|| {
            candidates
                .iter()
                .fold(None::<(NodeId, f64)>, |acc, (id, child)| match acc {
                    Some((_, p)) if p >= child.prior() => acc,
                    _ => Some((*id, child.prior())),
                })
                .map(|(id, _)| id)
        })
    }

    /// Moves of repeated best-child selection from the root.
    pub(crate) fn principal_variation(&self, tree: &SearchTree, max_length: usize) -> Vec<Move> {
        let mut sequence = Vec::new();
        let mut node = NodeId::ROOT;
        while sequence.len() < max_length {
            let Some(child) = self.best_child(tree, node) else {
                break;
            };
            if !tree.node(child).has_mean() {
                break;
            }
            sequence.push(tree.node(child).mv());
            node = child;
        }
        sequence
    }
}
