use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct an invariant violation for a specific origin.
    pub fn invariant(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, origin, message.into())
    }

    /// Construct a gateway-origin transport failure.
    ///
    /// Transport failures are never fatal to engine state; callers surface
    /// them and leave the grid usable.
    pub fn gateway_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Gateway, message.into())
    }

    /// Construct a standardized unsupported-operation error.
    pub fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message.into())
    }

    pub fn not_found(origin: ErrorOrigin, what: impl Into<String>) -> Self {
        let what = what.into();

        Self::new(ErrorClass::NotFound, origin, format!("not found: {what}"))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Grid,
    Reconcile,
    Selection,
    Pagination,
    Config,
    Gateway,
    Layout,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Grid => "grid",
            Self::Reconcile => "reconcile",
            Self::Selection => "selection",
            Self::Pagination => "pagination",
            Self::Config => "config",
            Self::Gateway => "gateway",
            Self::Layout => "layout",
        };
        write!(f, "{label}")
    }
}
