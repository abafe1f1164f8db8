//! Error type shared by every stage of the order tracer.

use thiserror::Error;

/// Errors raised while tracing spectral orders.
///
/// `Type` and `Value` come from input validation and abort the call before any
/// array work. `Fit` describes a single cluster that could not be fitted; the
/// tracer skips such clusters and reports them in
/// [`OrderTraces::fit_failures`](crate::OrderTraces::fit_failures).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    /// An input has the wrong kind of value (not a 2-D array, not an integer, ...).
    #[error("type error: {0}")]
    Type(String),

    /// An input has the right kind but an out-of-domain magnitude.
    #[error("value error: {0}")]
    Value(String),

    /// A cluster's centroid profile has too few columns for the requested degree.
    #[error(
        "cannot fit a degree {degree} polynomial to cluster {cluster}: only {points} column(s) available"
    )]
    Fit {
        /// Arena id of the offending cluster.
        cluster: usize,
        /// Requested polynomial degree.
        degree: usize,
        /// Number of profile points the cluster provided.
        points: usize,
    },

    /// A manual trace editor failed or returned traces that break the output invariants.
    #[error("manual edit rejected: {0}")]
    Edit(String),
}

impl TraceError {
    pub(crate) fn type_err(msg: impl Into<String>) -> Self {
        TraceError::Type(msg.into())
    }

    pub(crate) fn value_err(msg: impl Into<String>) -> Self {
        TraceError::Value(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
