use thiserror::Error;

use crate::letter::LetterId;

#[derive(Debug, Error)]
pub enum LetterError {
    #[error("letter {0} not found")]
    NotFound(LetterId),
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),
    #[error("{service} request failed: {source}")]
    ExternalService {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl LetterError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Classifies a collaborator failure, keeping typed errors raised below the seam.
    pub fn from_service(service: &'static str, err: anyhow::Error) -> Self {
        match err.downcast::<LetterError>() {
            Ok(typed) => typed,
            Err(source) => Self::ExternalService { service, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn from_service_keeps_typed_not_found() {
        let id = LetterId::from("abc");
        let err = anyhow::Error::new(LetterError::NotFound(id.clone()));
        assert_matches!(
            LetterError::from_service("store", err),
            LetterError::NotFound(found) if found == id
        );
    }

    #[test]
    fn from_service_wraps_opaque_failures() {
        let err = anyhow::anyhow!("disk on fire");
        let classified = LetterError::from_service("store", err);
        assert_matches!(classified, LetterError::ExternalService { service: "store", .. });
        assert!(classified.to_string().contains("disk on fire"));
    }
}
