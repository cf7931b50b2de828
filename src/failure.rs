//! Definitions for dealing with an [`Error`] inside a [`Recorder`].
//!
//! [`Recorder`]: crate::Recorder

use crate::Error;

#[doc(inline)]
pub use self::strategy::Strategy;

/// Possible actions on an encountered [`Error`] inside [`metrics::Recorder`]
/// methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Return a no-op metric implementation (see [`metrics::Counter::noop()`]
    /// for example).
    NoOp,

    /// Panic with the encountered [`Error`].
    Panic,
}

/// Strategies for dealing with an [`Error`].
pub mod strategy {
    use super::{Action, Error};

    /// Strategy deciding which [`Action`] should be performed on an encountered
    /// [`Error`] inside [`metrics::Recorder`] methods.
    pub trait Strategy {
        /// Inspects the encountered [`Error`] and returns the [`Action`] to be
        /// performed.
        fn decide(&self, err: &Error) -> Action;
    }

    /// [`Strategy`] returning always [`Action::NoOp`].
    #[derive(Clone, Copy, Debug, Default)]
    pub struct NoOp;

    impl Strategy for NoOp {
        fn decide(&self, err: &Error) -> Action {
            tracing::warn!(%err, "ignoring metric registration failure");
            Action::NoOp
        }
    }

    /// [`Strategy`] returning always [`Action::Panic`].
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Panic;

    impl Strategy for Panic {
        fn decide(&self, _: &Error) -> Action {
            Action::Panic
        }
    }

    /// [`Strategy`] returning an [`Action::Panic`] in debug mode, and
    /// [`Action::NoOp`] in release mode.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct PanicInDebugNoOpInRelease;

    impl Strategy for PanicInDebugNoOpInRelease {
        fn decide(&self, err: &Error) -> Action {
            if cfg!(debug_assertions) {
                Action::Panic
            } else {
                NoOp.decide(err)
            }
        }
    }

    /// [`Strategy`] ignoring [`Error::TypeConflict`]s, while panicking on
    /// invalid names, as these are bugs at the declaration site.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct NoOpOnTypeConflict;

    impl Strategy for NoOpOnTypeConflict {
        fn decide(&self, err: &Error) -> Action {
            match err {
                Error::TypeConflict { .. } => NoOp.decide(err),
                Error::InvalidMetricName(_) | Error::InvalidLabelName(_) => {
                    Action::Panic
                }
            }
        }
    }
}
