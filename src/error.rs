use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Error {
    /// Gauss-Jordan elimination (or the pivoted QR back substitution)
    /// found no usable pivot: the system is singular and no solution
    /// can be trusted. Callers must branch on this rather than consume
    /// a partial result.
    #[error("singular matrix: no non-zero pivot")]
    SingularMatrix,

    /// The symmetric eigendecomposition was handed an asymmetric matrix.
    #[error("eigendecomposition requires a symmetric matrix")]
    NotSymmetric,

    /// Cholesky factorization hit a non-positive diagonal: the input is
    /// not positive definite.
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    /// Fewer than 4 usable satellites remain: neither the receiver
    /// clock bias nor the relative baseline can be estimated for this
    /// epoch. Non-fatal, the epoch is skipped.
    #[error("not enough usable satellites (4 required)")]
    NotEnoughSatellites,

    /// The receiver clock bias estimate moved too far from the
    /// receiver-reported value to be believable; the previous bias
    /// (propagated by drift) should be used instead.
    #[error("receiver clock bias estimate diverged")]
    ClockBiasDiverged,

    /// The two receivers share no satellite at this epoch, so no
    /// difference can be formed.
    #[error("no satellite observed by both receivers")]
    NoCommonSatellites,

    /// PRN outside the supported 1..=71 range.
    #[error("invalid PRN {0} (supported range is 1..=71)")]
    InvalidPrn(u8),
}
