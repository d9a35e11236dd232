//! The partial-order alignment (POA) graph engine core.
//!
//! `node`/`edge`/`alignment` hold the data model, `graph` is the arena that
//! owns them and drives construction, `topology` supplies the plain and
//! rigorous topological sorts, `msa` and `consensus` are the two read-side
//! views of the graph, and `align` is the bundled DP aligner that produces
//! the `Alignment` views `Graph::add_alignment` consumes.

pub mod align;
pub mod alignment;
pub mod consensus;
pub mod edge;
pub mod graph;
pub mod msa;
pub mod node;
pub mod topology;

pub use align::{AlignmentEngine, AlignmentParams, AlignmentType, ScalarAlignmentEngine};
pub use alignment::Alignment;
pub use edge::{Edge, SeqId};
pub use graph::Graph;
pub use node::{EdgeId, Node, NodeId, NodeType};
