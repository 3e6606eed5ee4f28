//! Error types for fallible livequiz operations.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::SessionId;

/// This enum contains all error messages this library can return. Most fallible API
/// functions return a [`QuizResult`].
///
/// [`QuizResult`]: crate::QuizResult
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuizError {
    /// A store operation (create/query/subscribe/update) failed. This usually means
    /// the remote document store is unreachable or rejected the request.
    Store {
        /// A description of the failed store operation.
        context: String,
    },
    /// The requested session does not exist in the store.
    SessionNotFound {
        /// The session id that could not be resolved.
        id: SessionId,
    },
    /// The session exists but has already passed its end time.
    SessionExpired {
        /// The session id that has expired.
        id: SessionId,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// Encoding or decoding a store document failed.
    Serialization {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// The explanation generator failed. Callers substitute fallback text;
    /// this error never affects grading or retake eligibility.
    Explanation {
        /// A description of the generator failure.
        context: String,
    },
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    Internal {
        /// A description of the internal error.
        context: String,
    },
}

impl Display for QuizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuizError::Store { context } => {
                write!(f, "Store error: {}", context)
            }
            QuizError::SessionNotFound { id } => {
                write!(f, "Session {} was not found", id)
            }
            QuizError::SessionExpired { id } => {
                write!(f, "Session {} has already ended", id)
            }
            QuizError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            QuizError::Serialization { context } => {
                write!(f, "Serialization error: {}", context)
            }
            QuizError::Explanation { context } => {
                write!(f, "Explanation generator error: {}", context)
            }
            QuizError::Internal { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            }
        }
    }
}

impl Error for QuizError {}

impl QuizError {
    /// Convenience constructor for [`QuizError::Store`] from any displayable cause.
    pub fn store(context: impl Display) -> Self {
        QuizError::Store {
            context: context.to_string(),
        }
    }

    /// Convenience constructor for [`QuizError::Serialization`] from any displayable cause.
    pub fn serialization(context: impl Display) -> Self {
        QuizError::Serialization {
            context: context.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = QuizError::Store {
            context: "connection refused".to_owned(),
        };
        assert!(err.to_string().contains("connection refused"));

        let err = QuizError::InvalidRequest {
            info: "duration must be positive".to_owned(),
        };
        assert!(err.to_string().contains("duration must be positive"));
    }

    #[test]
    fn display_session_not_found_names_id() {
        let err = QuizError::SessionNotFound {
            id: SessionId::new("sess-7"),
        };
        assert!(err.to_string().contains("sess-7"));
    }

    #[test]
    fn constructors_wrap_cause() {
        let err = QuizError::serialization("missing field `status`");
        assert_eq!(
            err,
            QuizError::Serialization {
                context: "missing field `status`".to_owned()
            }
        );
    }
}
