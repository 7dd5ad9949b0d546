//! Error types for the berth controllers
//!
//! Errors are structured so callers can tell expected outcomes (not found,
//! already exists, conflict) from real failures without string matching.
//! Every stage wraps what it returns with a short context message, and
//! independent failures are combined instead of dropped.

use std::fmt;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for berth operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A lookup by identity matched nothing
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Resource kind that was looked up
        kind: String,
        /// Name or selector that matched nothing
        name: String,
    },

    /// A lookup by identity matched more than one object, or related
    /// objects disagree with each other
    #[error("{message}")]
    Inconsistent {
        /// Description of the inconsistency
        message: String,
    },

    /// Validation error for CR specs or configuration
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client")
        context: String,
    },

    /// An error wrapped with the stage that produced it
    #[error("{context}: {source}")]
    Context {
        /// Short stage description, e.g. "failed to update statefulset"
        context: String,
        /// The wrapped error
        #[source]
        source: Box<Error>,
    },

    /// Several independent failures
    #[error(transparent)]
    Combined(#[from] CombinedError),
}

impl Error {
    /// Create a not-found error for a resource kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an inconsistency error with the given message
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap this error with a stage description
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through context wrappers and the
    /// primary error of a combined failure
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            Error::Combined(combined) => combined.primary.root(),
            other => other,
        }
    }

    /// The Kubernetes API status code and reason, if the root cause is an
    /// API error response
    pub fn api_status(&self) -> Option<(u16, &str)> {
        match self.root() {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some((ae.code, ae.reason.as_str())),
            _ => None,
        }
    }

    /// True if the object (or any object matching an identity) does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound { .. })
            || matches!(self.api_status(), Some((404, _)))
    }

    /// True if a create failed because the object already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self.api_status(), Some((409, "AlreadyExists")))
    }

    /// True if an update lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self.api_status(), Some((409, reason)) if reason != "AlreadyExists")
    }

    /// The stage context if this error was wrapped
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Context { context, .. } => Some(context),
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// A primary failure plus the failures of the steps attempted after it
///
/// Produced when a compensating action fails after the original error, or
/// when independent reconcile steps each fail.
#[derive(Debug)]
pub struct CombinedError {
    /// The first failure
    pub primary: Box<Error>,
    /// Failures that followed it
    pub secondary: Vec<Error>,
}

impl CombinedError {
    /// Combine a primary failure with one follow-up failure
    pub fn new(primary: Error, secondary: Error) -> Self {
        Self {
            primary: Box::new(primary),
            secondary: vec![secondary],
        }
    }

    /// Every failure, primary first
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        std::iter::once(self.primary.as_ref()).chain(self.secondary.iter())
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred: {}", self.secondary.len() + 1, self.primary)?;
        for err in &self.secondary {
            write!(f, "; {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CombinedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.primary.as_ref())
    }
}

/// Collects failures from steps that must all be attempted
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<Error>,
}

impl ErrorAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a step, keeping its error if it failed
    pub fn record<T>(&mut self, result: Result<T, Error>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Number of failures recorded so far
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True if nothing failed
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` if nothing failed, the single error if one failed, otherwise a
    /// [`CombinedError`] with the first failure as primary
    pub fn into_result(self) -> Result<(), Error> {
        let mut errors = self.errors.into_iter();
        match errors.next() {
            None => Ok(()),
            Some(primary) => {
                let secondary: Vec<Error> = errors.collect();
                if secondary.is_empty() {
                    Err(primary)
                } else {
                    Err(Error::Combined(CombinedError {
                        primary: Box::new(primary),
                        secondary,
                    }))
                }
            }
        }
    }
}

/// Attach a stage description to a failed result
pub trait ErrorContext<T> {
    /// Wrap the error, if any, with `context`
    fn context(self, context: &str) -> Result<T, Error>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| e.into().wrap(context))
    }
}
