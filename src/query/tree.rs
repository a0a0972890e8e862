#![forbid(unsafe_code)]

//! Arena-backed predicate trees.
//!
//! Every node lives in one `Vec` and is addressed by [`NodeId`]. A node's
//! `next` link continues the AND chain at its level; OR, NOT and subtable
//! conditions point at the heads of nested chains. The tree is immutable
//! while sessions evaluate it.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use super::condition::Condition;

/// Stable handle to a node inside one [`PredicateTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena slot of the node.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Condition plus its AND continuation.
#[derive(Clone, Debug)]
pub struct Node {
    /// Predicate evaluated by this node.
    pub condition: Condition,
    /// Next node ANDed at the same level.
    pub next: Option<NodeId>,
}

/// Structural or literal defects reported by [`PredicateTree::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// First OR operand absent.
    #[error("Missing left-hand side of OR")]
    OrMissingLeft,
    /// Last OR operand absent.
    #[error("Missing final right-hand side of OR")]
    OrMissingRight,
    /// An inner OR operand absent.
    #[error("Missing operand {0} of OR")]
    OrMissingOperand(usize),
    /// OR with fewer than two operands.
    #[error("OR requires at least two operands")]
    OrTooFewOperands,
    /// NOT without operand.
    #[error("Missing argument to Not")]
    NotMissingOperand,
    /// Subtable condition without inner query.
    #[error("Unbalanced subtable/end_subtable block")]
    UnbalancedSubtable,
    /// String literal is not valid UTF-8.
    #[error("Malformed UTF-8: {0}")]
    MalformedUtf8(String),
    /// A reference points outside the arena.
    #[error("node {0} does not exist")]
    DanglingNode(NodeId),
    /// A node is reachable along more than one path, including cycles.
    #[error("node {0} is referenced more than once")]
    SharedNode(NodeId),
}

/// Owned graph of condition nodes.
#[derive(Clone, Debug, Default)]
pub struct PredicateTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl PredicateTree {
    /// Creates an empty tree. An empty tree matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree holding a single condition as its root.
    pub fn single(condition: Condition) -> Self {
        let mut tree = Self::new();
        let id = tree.push(condition);
        tree.set_root(id);
        tree
    }

    /// Number of nodes in the arena, reachable or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds an unlinked node.
    pub fn push(&mut self, condition: Condition) -> NodeId {
        self.nodes.push(Node {
            condition,
            next: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Sets the head of the top-level AND chain.
    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Head of the top-level AND chain.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Node behind `id`.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Mutable node behind `id`.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Appends `next` to the tail of the chain starting at `chain`.
    pub fn and(&mut self, chain: NodeId, next: NodeId) {
        let mut tail = chain;
        let mut steps = 0;
        while let Some(following) = self.nodes.get(tail.0).and_then(|node| node.next) {
            if following == next || steps > self.nodes.len() {
                return;
            }
            tail = following;
            steps += 1;
        }
        if let Some(node) = self.nodes.get_mut(tail.0) {
            node.next = Some(next);
        }
    }

    /// Links `ids` into one AND chain and returns its head.
    pub fn chain(&mut self, ids: &[NodeId]) -> Option<NodeId> {
        for pair in ids.windows(2) {
            if let Some(node) = self.nodes.get_mut(pair[0].0) {
                node.next = Some(pair[1]);
            }
        }
        ids.first().copied()
    }

    /// Nodes ANDed at the level headed by `head`, in chain order.
    pub fn level(&self, head: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut level = SmallVec::new();
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if level.len() > self.nodes.len() || id.0 >= self.nodes.len() {
                break;
            }
            level.push(id);
            cursor = self.nodes[id.0].next;
        }
        level
    }

    /// Checks operands, literals and reachability from the root.
    ///
    /// Every reachable node must exist and be reachable exactly once.
    pub fn validate(&self) -> Result<(), TreeError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(id.0).ok_or(TreeError::DanglingNode(id))?;
            if std::mem::replace(&mut seen[id.0], true) {
                return Err(TreeError::SharedNode(id));
            }
            validate_condition(&node.condition)?;
            stack.extend(node.next);
            stack.extend(node.condition.children().into_iter().flatten());
        }
        Ok(())
    }

    /// Deep copy of the subtree reachable from `root`, as a new tree.
    pub fn clone_subtree(&self, root: NodeId) -> Result<PredicateTree, TreeError> {
        let mut tree = PredicateTree::new();
        let new_root = tree.import(self, root)?;
        tree.set_root(new_root);
        Ok(tree)
    }

    /// Copies the subtree of `other` reachable from `root` into this arena.
    ///
    /// The translation table is complete before any reference is rewritten.
    pub fn import(&mut self, other: &PredicateTree, root: NodeId) -> Result<NodeId, TreeError> {
        let order = other.reachable(root)?;
        let base = self.nodes.len();
        let translation: FxHashMap<NodeId, NodeId> = order
            .iter()
            .enumerate()
            .map(|(offset, &old)| (old, NodeId(base + offset)))
            .collect();
        for &old in &order {
            let source = other.node(old);
            let mut condition = source.condition.clone();
            condition.remap(&translation);
            self.nodes.push(Node {
                condition,
                next: source.next.and_then(|next| translation.get(&next).copied()),
            });
        }
        Ok(NodeId(base))
    }

    fn reachable(&self, root: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(id.0).ok_or(TreeError::DanglingNode(id))?;
            if std::mem::replace(&mut seen[id.0], true) {
                return Err(TreeError::SharedNode(id));
            }
            order.push(id);
            let children = node.condition.children();
            stack.extend(children.into_iter().flatten().rev());
            stack.extend(node.next);
        }
        Ok(order)
    }
}

fn validate_condition(condition: &Condition) -> Result<(), TreeError> {
    match condition {
        Condition::Or { branches } => {
            if branches.len() < 2 {
                return Err(TreeError::OrTooFewOperands);
            }
            let last = branches.len() - 1;
            match branches.iter().position(Option::is_none) {
                Some(0) => Err(TreeError::OrMissingLeft),
                Some(i) if i == last => Err(TreeError::OrMissingRight),
                Some(i) => Err(TreeError::OrMissingOperand(i)),
                None => Ok(()),
            }
        }
        Condition::Not { operand: None } => Err(TreeError::NotMissingOperand),
        Condition::Subtable { inner: None, .. } => Err(TreeError::UnbalancedSubtable),
        Condition::String { literal, .. } => match literal.utf8_error() {
            Some(err) => Err(TreeError::MalformedUtf8(err.to_owned())),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}
