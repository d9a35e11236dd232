//! MSA column assignment and row extraction.

use super::edge::SeqId;
use super::graph::Graph;
use super::node::{Node, NodeId};

/// Walks a rigorous topological order left to right, allocating one column
/// per aligned-equivalence class. A type-0 (representative) node opens a
/// class; by the rigorous-sort invariant the following `aligned_to.len()`
/// entries are exactly its class, so they share the same column without
/// needing to look anything up.
pub fn assign_columns(order: &[NodeId], nodes: &[Node]) -> (Vec<usize>, usize) {
    let mut col = vec![0usize; nodes.len()];
    let mut k = 0usize;
    let mut i = 0usize;
    while i < order.len() {
        let node = order[i];
        col[node.index()] = k;
        let class_len = nodes[node.index()].aligned_to().len();
        for offset in 1..=class_len {
            col[order[i + offset].index()] = k;
        }
        i += 1 + class_len;
        k += 1;
    }
    (col, k)
}

/// Builds one MSA row for `seq` by walking its path from `start`, placing
/// each letter at its node's column and filling every other column with '-'.
pub fn extract_row(graph: &Graph, start: NodeId, seq: SeqId, col: &[usize], num_cols: usize) -> String {
    let mut row = vec![b'-'; num_cols];
    let mut current = Some(start);
    while let Some(node) = current {
        row[col[node.index()]] = graph.node(node).letter();
        current = graph.next_on_path(node, seq);
    }
    String::from_utf8(row).expect("MSA letters are always valid ASCII bytes")
}

/// Builds the consensus MSA row from its node path (no sequence label to
/// follow edges by — the path is already a concrete node sequence).
pub fn extract_row_from_path(path: &[NodeId], nodes: &[Node], col: &[usize], num_cols: usize) -> String {
    let mut row = vec![b'-'; num_cols];
    for &node in path {
        row[col[node.index()]] = nodes[node.index()].letter();
    }
    String::from_utf8(row).expect("MSA letters are always valid ASCII bytes")
}
