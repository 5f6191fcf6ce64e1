//! Error types for the `domain` layer.
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field is used to hold the original error that caused
/// the domain error. Errors coming up from `entity_api` are translated here so that
/// callers of the engine never depend on `entity_api` directly.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
    /// Input rejected before anything was persisted.
    Validation(ValidationErrorKind),
    /// A well-formed request the engine refuses to carry out.
    Rejected(RejectionKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Entity(EntityErrorKind),
    Config,
    Other(String),
}

/// Enum representing the various kinds of entity errors that can bubble up from the "Entity" layer (`entity_api` and `entity`).
/// These errors are translated from the `entity_api` layer to the `domain` layer and reduced to a subset of error kinds
/// that are relevant to the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum EntityErrorKind {
    NotFound,
    Invalid,
    DbTransaction,
    Other(String),
}

/// Enum representing the various kinds of external errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    Network,
    Other(String),
}

/// Criteria and action validation failures. Rule and action positions are zero-based.
#[derive(Debug, PartialEq)]
pub enum ValidationErrorKind {
    EmptyCriteria,
    UnknownField {
        index: usize,
        field: String,
    },
    IllegalOperator {
        index: usize,
        field: String,
        operator: String,
    },
    InvalidValue {
        index: usize,
        field: String,
        reason: String,
    },
    MissingActionParameter {
        index: usize,
        parameter: &'static str,
    },
    BlankName,
}

#[derive(Debug, PartialEq)]
pub enum RejectionKind {
    SystemSegmentImmutable,
    /// Only `failed` executions can be handed back to the scheduler.
    ExecutionNotRetryable,
}

impl Error {
    pub(crate) fn validation(kind: ValidationErrorKind) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Validation(kind),
        }
    }

    pub(crate) fn rejected(kind: RejectionKind) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Rejected(kind),
        }
    }

    pub(crate) fn not_found() -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Entity(
                EntityErrorKind::NotFound,
            )),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.error_kind
            == DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationErrorKind::EmptyCriteria => write!(f, "criteria must contain at least one rule"),
            ValidationErrorKind::UnknownField { index, field } => {
                write!(f, "rule {index}: unknown field `{field}`")
            }
            ValidationErrorKind::IllegalOperator {
                index,
                field,
                operator,
            } => write!(f, "rule {index}: operator `{operator}` is not allowed on `{field}`"),
            ValidationErrorKind::InvalidValue {
                index,
                field,
                reason,
            } => write!(f, "rule {index}: invalid value for `{field}`: {reason}"),
            ValidationErrorKind::MissingActionParameter { index, parameter } => {
                write!(f, "action {index}: `{parameter}` is required")
            }
            ValidationErrorKind::BlankName => write!(f, "name must not be blank"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            DomainErrorKind::Validation(kind) => write!(f, "Validation Error: {kind}"),
            kind => match &self.source {
                Some(source) => write!(f, "Domain Error: {kind:?}: {source}"),
                None => write!(f, "Domain Error: {kind:?}"),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `entity_api` layer to the `domain` layer.
impl From<EntityApiError> for Error {
    fn from(err: EntityApiError) -> Self {
        let entity_error_kind = match err.error_kind {
            EntityApiErrorKind::RecordNotFound => EntityErrorKind::NotFound,
            EntityApiErrorKind::InvalidQueryTerm => EntityErrorKind::Invalid,
            EntityApiErrorKind::SystemError => EntityErrorKind::DbTransaction,
            _ => EntityErrorKind::Other("EntityErrorKind".to_string()),
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Entity(entity_error_kind)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Errors that result from issues building the reqwest::Client instance. This
        // type of error will occur prior to any network calls being made.
        if err.is_builder() {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                    "Failed to build reqwest client".to_string(),
                )),
            }
        // Errors that result from issues with the network call itself.
        } else {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "JSON serialization error".to_string(),
            )),
        }
    }
}
