//! Typed errors for the POA graph engine.
//!
//! Grounded on `BioFabric-rs`'s `crates/core/src/error.rs`: a single
//! `thiserror`-derived enum callers can match on, covering the
//! caller-triggerable kinds from the invariant catalogue. Conditions that
//! can only arise from a bug in this crate's own construction logic stay as
//! `assert!`/`debug_assert!`, matching the teacher crate's own posture of
//! `panic!`/`unwrap()` for "this would be a bug" states.

use crate::poa::NodeId;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoaError {
    #[error("empty input sequence")]
    EmptyInput,

    #[error("sequence length {seq_len} does not match weights length {weight_len}")]
    LengthMismatch { seq_len: usize, weight_len: usize },

    #[error("graph is not a DAG: revisited on-stack node {0:?} while sorting")]
    NonDag(NodeId),

    #[error("MSA row {index} mismatch: expected {expected:?}, got {actual:?}")]
    CheckMsaMismatch {
        index: usize,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
}

pub type Result<T> = std::result::Result<T, PoaError>;
