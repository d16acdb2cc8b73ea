use thiserror::Error;

/// A domain value was constructed from input that breaks its invariant.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Why a chat turn could not be answered. Translation, execution and
/// completion failures never get here; they become reply text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
    #[error("conversation log unavailable: {0}")]
    Persistence(String),
}

/// A failure as an inbound surface reports it, tagged with the request's
/// correlation id.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("[{correlation_id}] bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("[{correlation_id}] service unavailable: {detail}")]
    ServiceUnavailable { detail: String, correlation_id: String },
}

const UNAVAILABLE_MESSAGE: &str =
    "The conversation service is temporarily unavailable. Please retry shortly.";

impl InterfaceError {
    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }

    /// Caller-facing text. Bad requests say what was wrong; unavailability
    /// never exposes the internal detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } => UNAVAILABLE_MESSAGE.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::InvalidInput(DomainError::InvariantViolation(message)) => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::Persistence(detail) => InterfaceError::ServiceUnavailable { detail, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::message::UserId;
    use crate::errors::{ApplicationError, InterfaceError};

    #[test]
    fn invalid_user_id_becomes_bad_request_with_its_reason() {
        let error = UserId::parse("   ").expect_err("blank id");
        let interface = ApplicationError::from(error).into_interface("req-1");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert!(!interface.is_unavailable());
        assert_eq!(interface.correlation_id(), "req-1");
        assert_eq!(interface.public_message(), "user_id must not be empty");
    }

    #[test]
    fn persistence_failure_is_unavailable_and_hides_detail() {
        let interface = ApplicationError::Persistence("database is locked".to_string())
            .into_interface("req-2");

        assert!(interface.is_unavailable());
        assert_eq!(interface.correlation_id(), "req-2");
        assert!(!interface.public_message().contains("locked"));
        assert!(interface.to_string().contains("database is locked"));
        assert!(interface.to_string().starts_with("[req-2]"));
    }
}
