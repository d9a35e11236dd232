//! Heaviest-bundle consensus with branch completion.

use std::collections::HashSet;

use super::edge::Edge;
use super::node::{Node, NodeId};

/// Resets and recomputes `score`/`pred` in place for every node in `segment`,
/// in the order given. Nodes outside `segment` are left untouched.
/// `disqualified` nodes are treated as if they had no out-edges: no in-edge
/// sourced from one is ever considered.
fn update_scores(segment: &[NodeId], nodes: &[Node], edges: &[Edge], disqualified: &HashSet<NodeId>, score: &mut [f64], pred: &mut [Option<NodeId>]) {
    for &v in segment {
        score[v.index()] = 0.0;
        pred[v.index()] = None;

        let mut best_weight = -1.0f64;
        let mut best_pred: Option<NodeId> = None;
        for &eid in nodes[v.index()].in_edges() {
            let edge = &edges[eid.0];
            let u = edge.begin();
            if disqualified.contains(&u) {
                continue;
            }
            let w = edge.total_weight();
            let better = match best_pred {
                None => true,
                Some(p) => w > best_weight || (w == best_weight && score[u.index()] >= score[p.index()]),
            };
            if better {
                best_weight = w;
                best_pred = Some(u);
            }
        }
        if let Some(p) = best_pred {
            score[v.index()] = best_weight + score[p.index()];
            pred[v.index()] = Some(p);
        }
    }
}

/// Score and chosen predecessor for every node, computed fresh over `order`.
fn score_nodes(order: &[NodeId], nodes: &[Node], edges: &[Edge], disqualified: &HashSet<NodeId>) -> (Vec<f64>, Vec<Option<NodeId>>) {
    let n = nodes.len();
    let mut score = vec![0.0f64; n];
    let mut pred: Vec<Option<NodeId>> = vec![None; n];
    update_scores(order, nodes, edges, disqualified, &mut score, &mut pred);
    (score, pred)
}

fn is_sink(node: NodeId, nodes: &[Node]) -> bool {
    nodes[node.index()].out_edges().is_empty()
}

/// Runs the heaviest-bundle traversal over `order` (must be a valid plain
/// topological order) and returns the consensus path as a node sequence.
///
/// The greedy max-weight-prefix-sum walk can terminate at an interior node
/// whose best predecessor chain doesn't continue to a sink. Branch
/// completion repairs this: every sibling predecessor of `max_id`'s
/// children is disqualified, scores for everything downstream of `max_id`
/// are recomputed under that restriction, and the new maximum among them
/// replaces `max_id`. `max_id`'s topological rank strictly increases each
/// repair, so the loop always terminates.
pub fn heaviest_bundle(order: &[NodeId], nodes: &[Node], edges: &[Edge]) -> Vec<NodeId> {
    if order.is_empty() {
        return Vec::new();
    }

    let rank: Vec<usize> = {
        let mut r = vec![0usize; nodes.len()];
        for (i, &n) in order.iter().enumerate() {
            r[n.index()] = i;
        }
        r
    };

    let disqualified: HashSet<NodeId> = HashSet::new();
    let (mut score, mut pred) = score_nodes(order, nodes, edges, &disqualified);
    let mut max_id = *order.iter().max_by(|&&a, &&b| score[a.index()].partial_cmp(&score[b.index()]).unwrap()).unwrap();

    let mut disqualified = disqualified;
    while !is_sink(max_id, nodes) {
        for &eid in nodes[max_id.index()].out_edges() {
            let w = edges[eid.0].end();
            for &in_eid in nodes[w.index()].in_edges() {
                let src = edges[in_eid.0].begin();
                if src != max_id {
                    disqualified.insert(src);
                }
            }
        }

        let my_rank = rank[max_id.index()];
        let downstream = &order[my_rank + 1..];
        update_scores(downstream, nodes, edges, &disqualified, &mut score, &mut pred);

        max_id = *downstream
            .iter()
            .max_by(|&&a, &&b| score[a.index()].partial_cmp(&score[b.index()]).unwrap())
            .expect("max_id is not a sink, so some downstream node exists");
    }

    let mut path = Vec::new();
    let mut current = Some(max_id);
    while let Some(node) = current {
        path.push(node);
        current = pred[node.index()];
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poa::alignment::Alignment;
    use crate::poa::graph::Graph;

    #[test]
    fn single_sequence_consensus_is_itself() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        assert_eq!(graph.generate_consensus().unwrap(), "ACGT");
    }

    #[test]
    fn heavier_branch_wins_consensus() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let alignment = Alignment::new(
            vec![Some(NodeId(0)), Some(NodeId(1)), Some(NodeId(2)), Some(NodeId(3))],
            vec![Some(0), Some(1), Some(2), Some(3)],
        );
        // Two more votes for "ACGT" over the lone "AGGT" fork.
        graph.add_alignment_uniform(&alignment, b"ACGT", 1.0).unwrap();
        graph.add_alignment_uniform(&alignment, b"ACGT", 1.0).unwrap();
        graph.add_alignment_uniform(&alignment, b"AGGT", 1.0).unwrap();

        assert_eq!(graph.generate_consensus().unwrap(), "ACGT");
    }

    #[test]
    fn branch_completion_reaches_a_sink() {
        // S5: seed "AT"; admit "AGT" with node_ids=[0,-1,1], seq_ids=[0,1,2].
        // The new edges (A->G, G->T) outweigh the direct A->T edge, so the
        // greedy walk from A must be pushed through G to reach T.
        let mut graph = Graph::new_uniform(b"AT", 1.0).unwrap();
        let alignment = Alignment::new(vec![Some(NodeId(0)), None, Some(NodeId(1))], vec![Some(0), Some(1), Some(2)]);
        graph.add_alignment_uniform(&alignment, b"AGT", 1.0).unwrap();
        graph.add_alignment_uniform(&alignment, b"AGT", 1.0).unwrap();

        let consensus = graph.generate_consensus().unwrap();
        assert_eq!(consensus.len(), 3);
        assert_eq!(consensus, "AGT");
    }

    #[test]
    fn consensus_is_a_source_to_sink_path() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        graph.add_alignment_uniform(&Alignment::empty(), b"GGGG", 1.0).unwrap();

        let consensus = graph.generate_consensus().unwrap();
        assert!(consensus == "ACGT" || consensus == "GGGG");
    }
}
