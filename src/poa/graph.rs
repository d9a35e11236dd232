//! The partial-order alignment graph: construction and sequence incorporation.

use std::collections::BTreeSet;

use crate::error::{PoaError, Result};

use super::consensus;
use super::edge::{Edge, SeqId};
use super::msa;
use super::node::{EdgeId, Node, NodeId, NodeType};
use super::topology;
use super::Alignment;

/// A DAG whose paths spell every sequence admitted so far.
///
/// Nodes and edges live in append-only arenas (`nodes`, `edges`) addressed by
/// dense integer ids, in place of a pointer graph — a DAG node routinely has
/// more than one in-edge and would otherwise need shared ownership.
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) alphabet: BTreeSet<u8>,
    pub(crate) num_sequences: usize,
    pub(crate) start_nodes: Vec<NodeId>,
    pub(crate) order: Vec<NodeId>,
    pub(crate) dirty: bool,
    pub(crate) consensus_cache: Option<Vec<NodeId>>,
}

impl Graph {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            alphabet: BTreeSet::new(),
            num_sequences: 0,
            start_nodes: Vec::new(),
            order: Vec::new(),
            dirty: false,
            consensus_cache: None,
        }
    }

    // ---- constructors ------------------------------------------------

    /// Seeds the graph with `sequence`, every position weighted `uniform_weight`.
    ///
    /// ```
    /// let graph = poagraph::poa::Graph::new_uniform(b"ACGT", 1.0).unwrap();
    /// assert_eq!(graph.num_nodes(), 4);
    /// ```
    pub fn new_uniform(sequence: &[u8], uniform_weight: f64) -> Result<Self> {
        if sequence.is_empty() {
            return Err(PoaError::EmptyInput);
        }
        let weights = vec![uniform_weight; sequence.len()];
        Self::new_weighted(sequence, &weights)
    }

    /// Seeds the graph with per-position weights derived from a PHRED-style
    /// quality string: `weight = (quality_byte - 33) as f64`.
    pub fn new_from_quality(sequence: &[u8], quality: &[u8]) -> Result<Self> {
        if sequence.len() != quality.len() {
            return Err(PoaError::LengthMismatch {
                seq_len: sequence.len(),
                weight_len: quality.len(),
            });
        }
        let weights: Vec<f64> = quality.iter().map(|&q| quality_to_weight(q)).collect();
        Self::new_weighted(sequence, &weights)
    }

    /// Seeds the graph with explicit per-position weights.
    pub fn new_weighted(sequence: &[u8], weights: &[f64]) -> Result<Self> {
        if sequence.is_empty() || weights.is_empty() {
            return Err(PoaError::EmptyInput);
        }
        if sequence.len() != weights.len() {
            return Err(PoaError::LengthMismatch {
                seq_len: sequence.len(),
                weight_len: weights.len(),
            });
        }

        let mut graph = Self::empty();
        let label = SeqId(0);
        let (first, _last) = graph.simple_chain(sequence, weights, label);
        graph.start_nodes.push(first.expect("non-empty seed produces a chain"));
        graph.num_sequences = 1;
        graph.alphabet.extend(sequence.iter().copied());
        graph.dirty = true;
        graph.resort()?;
        Ok(graph)
    }

    // ---- mutation ------------------------------------------------------

    pub fn add_alignment_uniform(&mut self, alignment: &Alignment, sequence: &[u8], uniform_weight: f64) -> Result<()> {
        if sequence.is_empty() {
            return Err(PoaError::EmptyInput);
        }
        let weights = vec![uniform_weight; sequence.len()];
        self.add_alignment(alignment, sequence, &weights)
    }

    pub fn add_alignment_from_quality(&mut self, alignment: &Alignment, sequence: &[u8], quality: &[u8]) -> Result<()> {
        if sequence.len() != quality.len() {
            return Err(PoaError::LengthMismatch {
                seq_len: sequence.len(),
                weight_len: quality.len(),
            });
        }
        let weights: Vec<f64> = quality.iter().map(|&q| quality_to_weight(q)).collect();
        self.add_alignment(alignment, sequence, &weights)
    }

    pub fn add_alignment_weighted(&mut self, alignment: &Alignment, sequence: &[u8], weights: &[f64]) -> Result<()> {
        self.add_alignment(alignment, sequence, weights)
    }

    /// Incorporates `sequence` into the graph given an `alignment` produced
    /// against this graph's current state.
    pub fn add_alignment(&mut self, alignment: &Alignment, sequence: &[u8], weights: &[f64]) -> Result<()> {
        if sequence.is_empty() {
            return Err(PoaError::EmptyInput);
        }
        if sequence.len() != weights.len() {
            return Err(PoaError::LengthMismatch {
                seq_len: sequence.len(),
                weight_len: weights.len(),
            });
        }

        let label = SeqId(self.num_sequences);

        let start = if alignment.is_empty() {
            let (first, _last) = self.simple_chain(sequence, weights, label);
            first.expect("non-empty sequence produces a chain")
        } else {
            self.add_alignment_body(alignment, sequence, weights, label)
        };

        self.start_nodes.push(start);
        self.num_sequences += 1;
        self.alphabet.extend(sequence.iter().copied());
        self.dirty = true;
        self.resort()?;
        Ok(())
    }

    /// Implements the head-chain / body / tail-chain incorporation of a
    /// non-empty alignment: unaligned prefix and suffix are chained as fresh
    /// nodes, and aligned positions either reuse, fork from, or extend the
    /// existing node they're anchored to.
    fn add_alignment_body(&mut self, alignment: &Alignment, sequence: &[u8], weights: &[f64], label: SeqId) -> NodeId {
        let valid: Vec<usize> = alignment.seq_ids.iter().filter_map(|s| *s).collect();
        debug_assert!(!valid.is_empty(), "a non-empty alignment must anchor at least one position");
        let front = *valid.first().unwrap();
        let back = *valid.last().unwrap();

        // Head chain: sequence[0 .. front)
        let (head_first, head_last) = self.simple_chain(&sequence[..front], &weights[..front], label);
        let mut head_node_id = head_last;
        let mut start_node_id = head_first;
        let mut prev_weight = if front > 0 { weights[front - 1] } else { 0.0 };

        // Body: walk the alignment, skipping graph-side deletions.
        for i in 0..alignment.len() {
            let Some(seq_idx) = alignment.seq_ids[i] else {
                continue;
            };
            let letter = sequence[seq_idx];

            let new_node_id = match alignment.node_ids[i] {
                None => self.create_node(letter, NodeType::Representative),
                Some(anchor) => self.resolve_against_class(anchor, letter),
            };

            if start_node_id.is_none() {
                start_node_id = Some(new_node_id);
            }

            if let Some(head) = head_node_id {
                self.add_edge(head, new_node_id, label, prev_weight + weights[seq_idx]);
            }

            head_node_id = Some(new_node_id);
            prev_weight = weights[seq_idx];
        }

        // Tail chain: sequence[back+1 .. end)
        if back + 1 < sequence.len() {
            let (tail_first, _tail_last) = self.simple_chain(&sequence[back + 1..], &weights[back + 1..], label);
            let tail_node_id = tail_first.expect("non-empty tail slice produces a chain");
            let head = head_node_id.expect("body or head always precedes a non-empty tail");
            self.add_edge(head, tail_node_id, label, prev_weight + weights[back + 1]);
        }

        start_node_id.expect("alignment resolves to at least one node")
    }

    /// Resolves the node a new letter should reuse or fork against an
    /// existing anchor: same letter reuses the anchor, a matching letter
    /// elsewhere in its aligned class reuses that member, otherwise a fresh
    /// secondary node joins the class.
    fn resolve_against_class(&mut self, anchor: NodeId, letter: u8) -> NodeId {
        if self.nodes[anchor.index()].letter == letter {
            return anchor;
        }
        if let Some(&found) = self.nodes[anchor.index()]
            .aligned_to
            .iter()
            .find(|&&member| self.nodes[member.index()].letter == letter)
        {
            return found;
        }

        let new_id = self.create_node(letter, NodeType::Secondary);
        let mut class = self.nodes[anchor.index()].aligned_to.clone();
        class.push(anchor);
        for member in class {
            self.nodes[member.index()].add_aligned(new_id);
            self.nodes[new_id.index()].add_aligned(member);
        }
        new_id
    }

    /// Builds a simple chain of fresh nodes over `bases`/`weights` (equal
    /// length, index-aligned), wiring `weights[i] + weights[i+1]` edges
    /// between consecutive nodes. Returns `(first, last)`, both `None` if
    /// `bases` is empty.
    fn simple_chain(&mut self, bases: &[u8], weights: &[f64], label: SeqId) -> (Option<NodeId>, Option<NodeId>) {
        if bases.is_empty() {
            return (None, None);
        }
        let mut prev: Option<NodeId> = None;
        let mut first: Option<NodeId> = None;
        for (i, &base) in bases.iter().enumerate() {
            let node = self.create_node(base, NodeType::Representative);
            if first.is_none() {
                first = Some(node);
            }
            if let Some(p) = prev {
                self.add_edge(p, node, label, weights[i - 1] + weights[i]);
            }
            prev = Some(node);
        }
        (first, prev)
    }

    fn create_node(&mut self, letter: u8, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, letter, node_type));
        id
    }

    /// Adds a sequence label with `weight` to the edge `(begin, end)`,
    /// coalescing into an existing edge if present.
    fn add_edge(&mut self, begin: NodeId, end: NodeId, label: SeqId, weight: f64) {
        for &eid in &self.nodes[begin.index()].out_edges {
            if self.edges[eid.0].end == end {
                self.edges[eid.0].add_sequence(label, weight);
                return;
            }
        }
        let eid = EdgeId(self.edges.len());
        self.edges.push(Edge::new(begin, end, label, weight));
        self.nodes[begin.index()].push_out_edge(eid);
        self.nodes[end.index()].push_in_edge(eid);
    }

    // ---- topology --------------------------------------------------------

    /// Rebuilds the cached plain topological order if it is marked dirty.
    pub fn resort(&mut self) -> Result<()> {
        if self.dirty {
            self.order = topology::plain_sort(&self.nodes, &self.edges)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// The cached plain topological order, rebuilding first if dirty.
    pub fn order(&mut self) -> Result<&[NodeId]> {
        self.resort()?;
        Ok(&self.order)
    }

    /// The rigorous topological order: a plain order in which every aligned
    /// equivalence class sits contiguously, representative first. Computed
    /// fresh every call; never cached, since it depends on traversal order
    /// rather than being a simple function of the dirty bit.
    pub fn rigorous_order(&self) -> Result<Vec<NodeId>> {
        topology::rigorous_sort(&self.nodes, &self.edges)
    }

    /// The cached plain topological order, without rebuilding it.
    ///
    /// Every public mutator resorts before returning, so a
    /// `Graph` reached through this crate's API always satisfies
    /// `!self.dirty` here; callers that only read (the bundled aligner)
    /// never need a `&mut Graph` just to fetch the order.
    pub fn topological_order(&self) -> &[NodeId] {
        debug_assert!(!self.dirty, "topological order requested while stale");
        &self.order
    }

    // ---- accessors ---------------------------------------------------

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_sequences(&self) -> usize {
        self.num_sequences
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn start_node_ids(&self) -> &[NodeId] {
        &self.start_nodes
    }

    pub fn alphabet(&self) -> &BTreeSet<u8> {
        &self.alphabet
    }

    /// The single out-edge of `node` whose label set contains `label`, if any.
    /// A sequence is a simple path, so at most one such edge exists.
    pub(crate) fn next_on_path(&self, node: NodeId, label: SeqId) -> Option<NodeId> {
        self.nodes[node.index()]
            .out_edges
            .iter()
            .map(|&eid| &self.edges[eid.0])
            .find(|e| e.carries(label))
            .map(|e| e.end)
    }

    /// Runs the heaviest-bundle traversal and returns the consensus
    /// string. Overwrites the cached consensus path on every call.
    pub fn generate_consensus(&mut self) -> Result<String> {
        self.resort()?;
        let path = consensus::heaviest_bundle(&self.order, &self.nodes, &self.edges);
        let letters: Vec<u8> = path.iter().map(|&id| self.nodes[id.index()].letter).collect();
        self.consensus_cache = Some(path);
        Ok(String::from_utf8(letters).expect("node letters are always valid ASCII bytes"))
    }

    /// One row per admitted sequence, in admission order, each of identical
    /// length equal to the aligned-equivalence class count. When
    /// `include_consensus` is set, one further row is appended for the
    /// heaviest-bundle consensus.
    pub fn generate_msa(&mut self, include_consensus: bool) -> Result<Vec<String>> {
        let order = self.rigorous_order()?;
        let (col, num_cols) = msa::assign_columns(&order, &self.nodes);

        let mut rows: Vec<String> = self
            .start_nodes
            .iter()
            .enumerate()
            .map(|(s, &start)| msa::extract_row(self, start, SeqId(s), &col, num_cols))
            .collect();

        if include_consensus {
            self.generate_consensus()?;
            let path = self.consensus_cache.as_ref().expect("just computed");
            rows.push(msa::extract_row_from_path(path, &self.nodes, &col, num_cols));
        }

        Ok(rows)
    }

    /// Diagnostic: the gap-stripped MSA row at `i` must equal
    /// `originals[indices[i]]`. Returns the first mismatch found, if any.
    pub fn check_msa(&self, msa: &[String], originals: &[Vec<u8>], indices: &[usize]) -> Result<()> {
        for (i, row) in msa.iter().enumerate() {
            let stripped: Vec<u8> = row.bytes().filter(|&b| b != b'-').collect();
            let expected = &originals[indices[i]];
            if &stripped != expected {
                return Err(PoaError::CheckMsaMismatch {
                    index: i,
                    expected: expected.clone(),
                    actual: stripped,
                });
            }
        }
        Ok(())
    }

    /// Dumps the graph as DOT: node labels `"id|letter"`, directed edges
    /// labelled with aggregate weight to 3 decimals, and a dotted undirected
    /// edge (lower id to higher id, drawn once) between every aligned pair.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph poa {\n");
        for node in &self.nodes {
            out.push_str(&format!(
                "  {} [label=\"{}|{}\"];\n",
                node.id.index(),
                node.id.index(),
                node.letter as char
            ));
        }
        for edge in &self.edges {
            out.push_str(&format!(
                "  {} -> {} [label=\"{:.3}\"];\n",
                edge.begin.index(),
                edge.end.index(),
                edge.total_weight
            ));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            for &aligned in &node.aligned_to {
                let pair = if node.id.index() < aligned.index() {
                    (node.id.index(), aligned.index())
                } else {
                    (aligned.index(), node.id.index())
                };
                if seen.insert(pair) {
                    out.push_str(&format!("  {} -> {} [style=dotted, dir=none];\n", pair.0, pair.1));
                }
            }
        }
        out.push_str("}\n");
        out
    }
}

/// `weight = (quality_byte - 33) as f64`, the fixed PHRED-style convention
/// used wherever a quality string is converted at the I/O boundary.
pub fn quality_to_weight(q: u8) -> f64 {
    q as f64 - 33.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_alignment(node_ids: &[i64], seq_ids: &[i64]) -> Alignment {
        let nodes = node_ids
            .iter()
            .map(|&n| if n < 0 { None } else { Some(NodeId(n as usize)) })
            .collect();
        let seqs = seq_ids.iter().map(|&s| if s < 0 { None } else { Some(s as usize) }).collect();
        Alignment::new(nodes, seqs)
    }

    #[test]
    fn seed_chain() {
        let graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.num_edges(), 3);
        for edge in graph.edges() {
            assert_eq!(edge.total_weight(), 2.0);
        }
    }

    #[test]
    fn identical_sequence_reuses_nodes() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let alignment = linear_alignment(&[0, 1, 2, 3], &[0, 1, 2, 3]);
        graph.add_alignment_uniform(&alignment, b"ACGT", 1.0).unwrap();

        assert_eq!(graph.num_nodes(), 4);
        for edge in graph.edges() {
            assert_eq!(edge.labels().len(), 2);
            assert_eq!(edge.total_weight(), 4.0);
        }
    }

    #[test]
    fn mismatch_creates_secondary_node() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let alignment = linear_alignment(&[0, 1, 2, 3], &[0, 1, 2, 3]);
        graph.add_alignment_uniform(&alignment, b"AGGT", 1.0).unwrap();

        assert_eq!(graph.num_nodes(), 5);
        let secondary = graph.node(NodeId(4));
        assert_eq!(secondary.letter(), b'G');
        assert_eq!(secondary.node_type(), NodeType::Secondary);
        assert_eq!(secondary.aligned_to(), &[NodeId(1)]);
        assert_eq!(graph.node(NodeId(1)).aligned_to(), &[NodeId(4)]);
    }

    #[test]
    fn insertion_adds_fresh_representative() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let alignment = linear_alignment(&[0, 1, -1, 2, 3], &[0, 1, 2, 3, 4]);
        graph.add_alignment_uniform(&alignment, b"ACCGT", 1.0).unwrap();

        assert_eq!(graph.num_nodes(), 5);
        assert_eq!(graph.node(NodeId(4)).node_type(), NodeType::Representative);
        assert!(graph.node(NodeId(4)).aligned_to().is_empty());
    }

    #[test]
    fn deletion_skips_graph_node() {
        let mut graph = Graph::new_uniform(b"AT", 1.0).unwrap();
        let alignment = linear_alignment(&[0, -1, 1], &[0, 1, 2]);
        graph.add_alignment_uniform(&alignment, b"AGT", 1.0).unwrap();

        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_sequences(), 2);
    }

    #[test]
    fn empty_alignment_is_disjoint_chain() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        graph.add_alignment_uniform(&Alignment::empty(), b"GGGG", 1.0).unwrap();

        assert_eq!(graph.num_nodes(), 8);
        assert_eq!(graph.start_node_ids().len(), 2);
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(Graph::new_uniform(b"", 1.0).unwrap_err(), PoaError::EmptyInput);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Graph::new_weighted(b"ACGT", &[1.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            PoaError::LengthMismatch {
                seq_len: 4,
                weight_len: 2
            }
        );
    }

    #[test]
    fn quality_weight_convention() {
        assert_eq!(quality_to_weight(b'!'), 0.0); // 33 - 33
        assert_eq!(quality_to_weight(b'5'), 20.0); // 53 - 33
    }

    #[test]
    fn check_msa_accepts_matching_rows() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let alignment = linear_alignment(&[0, 1, -1, 2, 3], &[0, 1, 2, 3, 4]);
        graph.add_alignment_uniform(&alignment, b"ACCGT", 1.0).unwrap();

        let msa = graph.generate_msa(false).unwrap();
        let originals = vec![b"ACGT".to_vec(), b"ACCGT".to_vec()];
        graph.check_msa(&msa, &originals, &[0, 1]).unwrap();
    }

    #[test]
    fn edge_weight_conservation() {
        use approx::assert_relative_eq;

        // Seed "ACGT", then admit "ACGT" again via the identity alignment.
        // Every edge's first-added weight sums to
        // the per-sequence sum of `weights[i] + weights[i+1]` along its path.
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let alignment = linear_alignment(&[0, 1, 2, 3], &[0, 1, 2, 3]);
        graph.add_alignment_uniform(&alignment, b"ACGT", 1.0).unwrap();

        let total_edge_weight: f64 = graph.edges().iter().map(Edge::total_weight).sum();
        // Two sequences, each contributing (1+1)+(1+1)+(1+1) = 6.0 across its 3 edges.
        assert_relative_eq!(total_edge_weight, 12.0);
    }

    #[test]
    fn check_msa_reports_mismatch() {
        let graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let msa = vec!["AGGT".to_string()];
        let originals = vec![b"ACGT".to_vec()];
        let err = graph.check_msa(&msa, &originals, &[0]).unwrap_err();
        assert!(matches!(err, PoaError::CheckMsaMismatch { index: 0, .. }));
    }
}
