//! The opaque pair of parallel arrays produced by an external sequence-to-graph
//! aligner and consumed by [`Graph::add_alignment`](super::graph::Graph::add_alignment).

use super::node::NodeId;

/// For each step of a new sequence against the existing graph: which node (if
/// any) it aligns to, and which position of the new sequence (if any) it
/// consumes. The spec's `-1` sentinel is `None` here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub node_ids: Vec<Option<NodeId>>,
    pub seq_ids: Vec<Option<usize>>,
}

impl Alignment {
    pub fn new(node_ids: Vec<Option<NodeId>>, seq_ids: Vec<Option<usize>>) -> Self {
        let a = Self { node_ids, seq_ids };
        a.debug_validate();
        a
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    /// Checks the shape invariants the core relies on (equal lengths,
    /// non-decreasing indices where present). This is a programmer-error
    /// surface — a malformed `Alignment` indicates a bug in the caller's
    /// aligner, not a recoverable condition, so violations assert rather
    /// than return a `Result`.
    fn debug_validate(&self) {
        debug_assert_eq!(
            self.node_ids.len(),
            self.seq_ids.len(),
            "alignment arrays must have equal length"
        );
        let mut last_seq: Option<usize> = None;
        for seq_id in self.seq_ids.iter().flatten() {
            if let Some(last) = last_seq {
                debug_assert!(*seq_id >= last, "seq_ids must be non-decreasing");
            }
            last_seq = Some(*seq_id);
        }
        let mut last_node: Option<usize> = None;
        for node_id in self.node_ids.iter().flatten() {
            if let Some(last) = last_node {
                debug_assert!(node_id.index() >= last, "node_ids must be non-decreasing");
            }
            last_node = Some(node_id.index());
        }
    }
}
