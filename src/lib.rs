//! Hereditary stratigraphy: compact per-lineage annotations from which the
//! divergence time of any two lineages can be estimated after the fact.
//!
//! A [`HereditaryStratigraphicColumn`] accumulates one random fingerprint per
//! generation, keeping only the ranks its [`StratumRetentionPolicy`] selects.
//! [`reconstruction`] compares two columns to bound the rank of their most
//! recent common ancestor, and [`parameterizer`] searches policy parameters
//! that meet a space or uncertainty target.
//!
//! [`StratumRetentionPolicy`]: policies::StratumRetentionPolicy

pub mod column;
pub mod differentia;
pub mod errors;
pub mod parameterizer;
pub mod policies;
pub mod reconstruction;
pub mod schema;
pub mod serialization;
pub mod stores;

pub use column::HereditaryStratigraphicColumn;
pub use column::Stratum;
pub use differentia::Differentia;
pub use errors::{HstratError, Result};

/// Largest power of 2 less than or equal to `x`. Returns 0 for input 0.
#[inline]
pub fn bit_floor(x: u64) -> u64 {
    if x == 0 {
        0
    } else {
        1u64 << (63 - x.leading_zeros() as u64)
    }
}

/// Number of bits needed to represent `x`; 0 for input 0.
#[inline]
pub fn bit_length(x: u64) -> u64 {
    u64::from(64 - x.leading_zeros())
}
