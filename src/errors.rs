use thiserror::Error;

/// Error types for the hstrat-core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HstratError {
    /// Differentia bit width must be in 1..=64.
    #[error("invalid differentia bit width: {0} (must be 1..=64)")]
    InvalidBitWidth(u8),

    /// A policy parameter is out of its valid domain.
    #[error("invalid policy parameter '{param}': {value}")]
    InvalidPolicyParam { param: &'static str, value: f64 },

    /// Comparison confidence must lie in [0, 1].
    #[error("confidence level {0} outside [0, 1]")]
    InvalidConfidenceLevel(f64),

    /// Two columns with different differentia widths cannot be compared.
    #[error("differentia bit widths differ: {first} vs {second}")]
    MismatchedBitWidths { first: u8, second: u8 },

    /// No parameter in the searched range meets the requested target.
    #[error("no parameter in [{lower}, {upper}] satisfies target {target}")]
    UnsatisfiableParameterization {
        lower: u64,
        upper: u64,
        target: String,
    },

    /// Rank elision needs a policy that computes ranks in closed form.
    #[error("{0} cannot recompute ranks, so they must be stored")]
    RankElisionUnsupported(&'static str),

    /// Policy algorithm identifier is not recognized.
    #[error("unknown policy algorithm '{0}'")]
    UnknownPolicyAlgorithm(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// A trie table row lacks a required field.
    #[error("trie row {row}: missing required field '{field}'")]
    MissingSchemaField { row: usize, field: &'static str },

    /// A trie table field is present but malformed.
    #[error("trie row {row}: field '{field}' {reason}")]
    InvalidSchemaField {
        row: usize,
        field: &'static str,
        reason: String,
    },

    /// Trie ids must equal their 0-based row position.
    #[error("trie row {row}: id {id} breaks contiguous 0-based numbering")]
    NonContiguousTrieIds { row: usize, id: u64 },

    /// Ancestors must precede descendants.
    #[error("trie row {row}: ancestor {ancestor_id} does not precede id {id}")]
    UnsortedTrieRows {
        row: usize,
        id: u64,
        ancestor_id: u64,
    },
}

impl HstratError {
    pub(crate) fn invalid_param(param: &'static str, value: f64) -> Self {
        Self::InvalidPolicyParam { param, value }
    }
}

impl From<serde_json::Error> for HstratError {
    fn from(err: serde_json::Error) -> Self {
        Self::DeserializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HstratError>;
