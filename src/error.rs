//! Errors of declaring metric families.

use crate::metric::Kind;

/// Errors possible when declaring a [`Family`] in a [`Registry`].
///
/// [`Family`]: crate::Family
/// [`Registry`]: crate::Registry
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The name is already bound to a [`Family`] of a different [`Kind`].
    ///
    /// [`Family`]: crate::Family
    #[error(
        "metric family `{name}` already exists with different type: \
         registered as {existing}, requested as {requested}"
    )]
    TypeConflict {
        /// Name of the conflicting metric family.
        name: String,

        /// [`Kind`] the name is already bound to.
        existing: Kind,

        /// [`Kind`] the registration was requested for.
        requested: Kind,
    },

    /// Metric name doesn't match `[a-zA-Z_:][a-zA-Z0-9_:]*` or is reserved.
    #[error("invalid metric name: `{0}`")]
    InvalidMetricName(String),

    /// Label name doesn't match `[a-zA-Z_][a-zA-Z0-9_]*` or is reserved.
    #[error("invalid label name: `{0}`")]
    InvalidLabelName(String),
}

/// Shortcut for a [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
