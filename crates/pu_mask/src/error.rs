use thiserror::Error;

/// Errors that can occur when processing cpulist strings or building masks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The input string was not a well-formed cpulist.
    #[error("invalid cpulist syntax: '{invalid_value}' is invalid: {problem}")]
    InvalidSyntax {
        /// The part of the input that failed to parse.
        invalid_value: String,

        /// Human-readable description of what went wrong.
        problem: String,
    },

    /// An index was too large for the mask it was applied to.
    #[error("index {index} is out of bounds for a mask over {num_pus} processing units")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,

        /// The width of the mask.
        num_pus: usize,
    },
}

/// Shorthand for fallible operations of this crate.
pub type Result<T> = std::result::Result<T, crate::Error>;
