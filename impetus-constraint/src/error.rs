//! LCP solver error kinds.

use thiserror::Error;

/// Failure modes of the pivoting LCP solvers.
///
/// All of these are recoverable at the wrapper level: the regularized driver
/// retries with a larger Tikhonov factor, and only persistent failure
/// propagates to the simulation driver.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LcpError {
    /// The basis matrix was singular and every solver in the LU →
    /// least-squares → regularized least-squares cascade failed.
    #[error("singular basis matrix in LCP pivot")]
    SingularBasis,

    /// No pivot candidate with positive direction: secondary ray
    /// termination.
    #[error("ray termination: no admissible pivot")]
    RayTermination,

    /// The pivot iteration cap (min(1000, 50n)) was exceeded.
    #[error("LCP iteration cap exceeded")]
    IterationExhausted,

    /// The ratio-test candidate set became empty; the zero tolerance is
    /// likely too low for the problem's conditioning.
    #[error("empty ratio-test candidate set (zero tolerance too low)")]
    ToleranceTooLow,
}
