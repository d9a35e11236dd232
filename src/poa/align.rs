//! The bundled sequence-to-graph aligner.
//!
//! The graph core itself only requires an [`Alignment`] view built against
//! its current state; this engine is the crate's own supplier of such
//! views, grounded on the teacher's
//! `libs/poa/align.rs` `ScalarAlignmentEngine` — an affine-gap DP aligner
//! over the topologically sorted node list — generalized here to walk this
//! crate's arena [`Graph`] (a node may have several predecessors; this is a
//! partial order, not a line) instead of a `petgraph::DiGraph`.

use std::collections::HashMap;

use super::alignment::Alignment;
use super::graph::Graph;
use super::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentType {
    /// Free ends on the graph side only; the whole new sequence is consumed.
    Global,
    /// Free ends on both sides; only the best-scoring local region aligns.
    Local,
    /// Free ends on both sides, sequence fully consumed (overlap alignment).
    SemiGlobal,
}

#[derive(Debug, Clone, Copy)]
pub struct AlignmentParams {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            match_score: 5,
            mismatch_score: -4,
            gap_open: -8,
            gap_extend: -6,
        }
    }
}

pub trait AlignmentEngine {
    fn align(&self, sequence: &[u8], graph: &Graph) -> Alignment;
}

/// Affine-gap DP over `M` (match/mismatch), `E` (insertion, consumes
/// sequence only), `F` (deletion, consumes graph only) matrices, one row
/// per node in topological order, one column per sequence position.
pub struct ScalarAlignmentEngine {
    pub params: AlignmentParams,
    pub align_type: AlignmentType,
}

impl ScalarAlignmentEngine {
    pub fn new(params: AlignmentParams, align_type: AlignmentType) -> Self {
        Self { params, align_type }
    }
}

const NEG_INF: i32 = i32::MIN / 4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Match,
    Insert,
    Delete,
}

impl AlignmentEngine for ScalarAlignmentEngine {
    fn align(&self, sequence: &[u8], graph: &Graph) -> Alignment {
        let order = graph.topological_order();
        let n_nodes = order.len();
        let n_seq = sequence.len();

        if n_nodes == 0 || n_seq == 0 {
            return Alignment::empty();
        }

        let pos: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let preds: Vec<Vec<usize>> = order
            .iter()
            .map(|&n| graph.node(n).in_edges().iter().map(|&eid| pos[&graph.edge(eid).begin()]).collect())
            .collect();

        let is_local = self.align_type == AlignmentType::Local;
        let is_semi = self.align_type == AlignmentType::SemiGlobal;
        let free_start = is_local || is_semi;

        let mut m = vec![vec![NEG_INF; n_seq + 1]; n_nodes];
        let mut e = vec![vec![NEG_INF; n_seq + 1]; n_nodes];
        let mut f = vec![vec![NEG_INF; n_seq + 1]; n_nodes];

        for i in 0..n_nodes {
            let is_start = preds[i].is_empty();

            // Column 0: sequence consumed so far is empty.
            if free_start {
                f[i][0] = 0;
            } else if is_start {
                f[i][0] = self.params.gap_open;
            } else {
                let best = preds[i].iter().filter_map(|&u| (f[u][0] > NEG_INF).then_some(f[u][0])).max();
                f[i][0] = best.map_or(NEG_INF, |b| b + self.params.gap_extend);
            }

            let node_base = graph.node(order[i]).letter();

            for j in 1..=n_seq {
                let match_score = if sequence[j - 1] == node_base {
                    self.params.match_score
                } else {
                    self.params.mismatch_score
                };

                let from_m = checked_add(m[i][j - 1], self.params.gap_open);
                let from_e = checked_add(e[i][j - 1], self.params.gap_extend);
                let from_f = checked_add(f[i][j - 1], self.params.gap_open);
                e[i][j] = from_m.max(from_e).max(from_f);

                let mut max_m = if is_start {
                    if j == 1 {
                        match_score
                    } else {
                        checked_add(self.params.gap_open + (j as i32 - 2) * self.params.gap_extend, match_score)
                    }
                } else {
                    let best = preds[i]
                        .iter()
                        .map(|&u| m[u][j - 1].max(e[u][j - 1]).max(f[u][j - 1]))
                        .filter(|&s| s > NEG_INF)
                        .max();
                    best.map_or(NEG_INF, |b| checked_add(b, match_score))
                };
                if free_start && j == 1 {
                    max_m = max_m.max(match_score);
                }
                if is_local && max_m < 0 {
                    max_m = 0;
                }
                m[i][j] = max_m;

                f[i][j] = if is_start {
                    NEG_INF
                } else {
                    preds[i]
                        .iter()
                        .map(|&u| {
                            checked_add(m[u][j], self.params.gap_open)
                                .max(checked_add(f[u][j], self.params.gap_extend))
                                .max(checked_add(e[u][j], self.params.gap_open))
                        })
                        .max()
                        .unwrap_or(NEG_INF)
                };
            }
        }

        let (best_i, best_j, best_state, best_score) = find_best_end(&m, &e, &f, is_local, is_semi, n_seq);
        if best_score <= NEG_INF / 2 {
            return Alignment::empty();
        }

        let bases: Vec<u8> = order.iter().map(|&n| graph.node(n).letter()).collect();
        let path = backtrack(sequence, order, &bases, &preds, &m, &e, &f, self.params, is_local, is_semi, best_i, best_j, best_state);
        build_alignment(&path)
    }
}

fn checked_add(a: i32, b: i32) -> i32 {
    if a <= NEG_INF / 2 {
        NEG_INF
    } else {
        a + b
    }
}

#[allow(clippy::too_many_arguments)]
fn find_best_end(m: &[Vec<i32>], e: &[Vec<i32>], f: &[Vec<i32>], is_local: bool, is_semi: bool, n_seq: usize) -> (usize, usize, State, i32) {
    let n_nodes = m.len();
    let mut best_score = if is_local { 0 } else { NEG_INF };
    let mut best = (0usize, n_seq, State::Match);

    if is_local {
        for i in 0..n_nodes {
            for j in 1..=n_seq {
                let s = m[i][j].max(e[i][j]).max(f[i][j]);
                if s >= best_score {
                    best_score = s;
                    best = (i, j, state_of(s, m[i][j], e[i][j]));
                }
            }
        }
    } else {
        for i in 0..n_nodes {
            let s = m[i][n_seq].max(e[i][n_seq]).max(f[i][n_seq]);
            if s > best_score {
                best_score = s;
                best = (i, n_seq, state_of(s, m[i][n_seq], e[i][n_seq]));
            }
            let _ = is_semi;
        }
    }

    (best.0, best.1, best.2, best_score)
}

fn state_of(score: i32, m: i32, e: i32) -> State {
    if score == m {
        State::Match
    } else if score == e {
        State::Insert
    } else {
        State::Delete
    }
}

/// One step of the traceback: `(Some(seq_idx), Some(pos))` is a match/mismatch,
/// `(Some(seq_idx), None)` an insertion, `(None, Some(pos))` a deletion. `pos`
/// indexes into the topological `order`, resolved to a `NodeId` by the caller.
#[allow(clippy::too_many_arguments)]
fn backtrack(
    sequence: &[u8],
    order: &[NodeId],
    bases: &[u8],
    preds: &[Vec<usize>],
    m: &[Vec<i32>],
    e: &[Vec<i32>],
    f: &[Vec<i32>],
    params: AlignmentParams,
    is_local: bool,
    is_semi: bool,
    start_i: usize,
    start_j: usize,
    start_state: State,
) -> Vec<(Option<usize>, Option<NodeId>)> {
    let mut path = Vec::new();
    let mut i = start_i;
    let mut j = start_j;
    let mut state = start_state;

    loop {
        let is_start = preds[i].is_empty();

        if is_local {
            let s = match state {
                State::Match => m[i][j],
                State::Insert => e[i][j],
                State::Delete => f[i][j],
            };
            if s <= 0 {
                break;
            }
        }
        if j == 0 && is_start {
            break;
        }

        match state {
            State::Match => {
                if j == 0 {
                    break;
                }
                let match_score = if sequence[j - 1] == bases[i] {
                    params.match_score
                } else {
                    params.mismatch_score
                };
                if (is_local || is_semi) && j == 1 && m[i][j] == match_score {
                    path.push((Some(j - 1), Some(order[i])));
                    break;
                }
                if is_start {
                    path.push((Some(j - 1), Some(order[i])));
                    j -= 1;
                    break;
                }
                let target = m[i][j] - match_score;
                let mut advanced = false;
                for &u in &preds[i] {
                    if m[u][j - 1] == target {
                        path.push((Some(j - 1), Some(order[i])));
                        i = u;
                        j -= 1;
                        state = State::Match;
                        advanced = true;
                        break;
                    }
                    if e[u][j - 1] == target {
                        path.push((Some(j - 1), Some(order[i])));
                        i = u;
                        j -= 1;
                        state = State::Insert;
                        advanced = true;
                        break;
                    }
                    if f[u][j - 1] == target {
                        path.push((Some(j - 1), Some(order[i])));
                        i = u;
                        j -= 1;
                        state = State::Delete;
                        advanced = true;
                        break;
                    }
                }
                if !advanced {
                    break;
                }
            }
            State::Insert => {
                let target = e[i][j];
                path.push((Some(j - 1), None));
                if e[i][j - 1] + params.gap_extend == target {
                    j -= 1;
                    state = State::Insert;
                } else if m[i][j - 1] + params.gap_open == target {
                    j -= 1;
                    state = State::Match;
                } else {
                    j -= 1;
                    state = State::Delete;
                }
            }
            State::Delete => {
                let target = f[i][j];
                let mut advanced = false;
                for &u in &preds[i] {
                    if f[u][j] + params.gap_extend == target {
                        path.push((None, Some(order[i])));
                        i = u;
                        state = State::Delete;
                        advanced = true;
                        break;
                    }
                    if m[u][j] + params.gap_open == target {
                        path.push((None, Some(order[i])));
                        i = u;
                        state = State::Match;
                        advanced = true;
                        break;
                    }
                    if e[u][j] + params.gap_open == target {
                        path.push((None, Some(order[i])));
                        i = u;
                        state = State::Insert;
                        advanced = true;
                        break;
                    }
                }
                if !advanced {
                    path.push((None, Some(order[i])));
                    break;
                }
            }
        }
    }

    if !is_local && !is_semi {
        while j > 0 {
            path.push((Some(j - 1), None));
            j -= 1;
        }
    }

    path.reverse();
    path
}

/// Splits a traceback path into the two parallel arrays `Alignment` expects.
fn build_alignment(path: &[(Option<usize>, Option<NodeId>)]) -> Alignment {
    let seq_ids = path.iter().map(|&(s, _)| s).collect();
    let node_ids = path.iter().map(|&(_, n)| n).collect();
    Alignment::new(node_ids, seq_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poa::Graph;

    fn apply(graph: &mut Graph, engine: &ScalarAlignmentEngine, sequence: &[u8]) {
        let alignment = engine.align(sequence, graph);
        graph.add_alignment_uniform(&alignment, sequence, 1.0).unwrap();
    }

    #[test]
    fn exact_match_reuses_every_node() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Global);
        apply(&mut graph, &engine, b"ACGT");
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.num_sequences(), 2);
    }

    #[test]
    fn mismatch_forks_one_node() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Global);
        apply(&mut graph, &engine, b"AGGT");
        assert_eq!(graph.num_nodes(), 5);
    }

    #[test]
    fn insertion_adds_a_node() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Global);
        apply(&mut graph, &engine, b"ACAGT");
        assert_eq!(graph.num_nodes(), 5);
    }

    #[test]
    fn deletion_keeps_node_count() {
        let mut graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Global);
        apply(&mut graph, &engine, b"ACT");
        assert_eq!(graph.num_nodes(), 4);
    }

    #[test]
    fn branching_picks_the_matching_side() {
        let mut graph = Graph::new_uniform(b"A", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Global);
        apply(&mut graph, &engine, b"AG");
        apply(&mut graph, &engine, b"AT");
        let msa = graph.generate_msa(false).unwrap();
        assert_eq!(msa.len(), 3);
    }

    #[test]
    fn local_alignment_finds_an_internal_match() {
        let graph = Graph::new_uniform(b"AAATTAA", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Local);
        let alignment = engine.align(b"CCTTGG", &graph);
        assert!(!alignment.is_empty());
    }

    #[test]
    fn empty_sequence_yields_no_alignment() {
        let graph = Graph::new_uniform(b"ACGT", 1.0).unwrap();
        let engine = ScalarAlignmentEngine::new(AlignmentParams::default(), AlignmentType::Global);
        let alignment = engine.align(b"", &graph);
        assert!(alignment.is_empty());
    }
}
