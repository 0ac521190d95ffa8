use thiserror::Error;

use crate::calc::policy::ClarificationRequest;
use crate::factors::TableError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error("invalid input for `{field}`: {message}")]
    InvalidInput { field: String, message: String },
    #[error("{}", .0.message)]
    UnknownCategory(ClarificationRequest),
    #[error("calculation configuration error: {0}")]
    Configuration(String),
}

impl CalculationError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput { field: field.into(), message: message.into() }
    }

    pub fn clarification(&self) -> Option<&ClarificationRequest> {
        match self {
            Self::UnknownCategory(request) => Some(request),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Calculation(#[from] CalculationError),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

impl From<TableError> for ApplicationError {
    fn from(value: TableError) -> Self {
        Self::Configuration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, field: Option<String>, correlation_id: String },
    #[error("clarification required: {}", .clarification.message)]
    ClarificationRequired { clarification: ClarificationRequest, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Message safe to show the requester. Always names the failing field,
    /// category or collaborator.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } => message.clone(),
            Self::ClarificationRequired { clarification, .. } => clarification.message.clone(),
            Self::ServiceUnavailable { message, .. } => {
                format!("Narrative generation is unavailable ({message}). The numbers above are unaffected.")
            }
            Self::Internal { message, .. } => format!("Configuration problem: {message}"),
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "invalid_input",
            Self::ClarificationRequired { .. } => "clarification_required",
            Self::ServiceUnavailable { .. } => "collaborator_unavailable",
            Self::Internal { .. } => "configuration",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ClarificationRequired { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ClarificationRequired { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Calculation(CalculationError::InvalidInput { field, message }) => {
                Self::BadRequest {
                    message: format!("Invalid `{field}`: {message}"),
                    field: Some(field),
                    correlation_id,
                }
            }
            ApplicationError::Calculation(CalculationError::UnknownCategory(clarification)) => {
                Self::ClarificationRequired { clarification, correlation_id }
            }
            ApplicationError::Calculation(CalculationError::Configuration(message))
            | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id }
            }
            ApplicationError::CollaboratorUnavailable(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}
