use thiserror::Error;

use crate::models::NormalizedEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("code is required")]
    MissingCode,
    #[error("code is {len} characters, limit is {max}")]
    CodeTooLong { len: usize, max: usize },
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Rejects events that must never reach the store
#[derive(Debug, Clone)]
pub struct Validator {
    max_code_length: usize,
}

impl Validator {
    pub fn new(max_code_length: usize) -> Self {
        Self { max_code_length }
    }

    pub fn validate(&self, event: &NormalizedEvent) -> Result<(), ValidationError> {
        if event.code.is_empty() {
            return Err(ValidationError::MissingCode);
        }

        let len = event.code.chars().count();
        if len > self.max_code_length {
            return Err(ValidationError::CodeTooLong {
                len,
                max: self.max_code_length,
            });
        }

        let categorical = [
            ("browser", &event.browser),
            ("os", &event.os),
            ("country", &event.country),
            ("state", &event.state),
        ];
        for (field, value) in categorical {
            if value.is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }

        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(50)
    }
}
