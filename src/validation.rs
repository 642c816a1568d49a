use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Per-field messages rendered inline next to a form.
#[derive(Debug, Serialize, Clone, Default)]
#[serde(transparent)]
pub struct FormErrors {
    pub errors: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Maps an application error raised while handling a form onto the field
    /// it concerns. Errors that are not about a single field land on `form`.
    #[instrument]
    pub fn from_app_error(field: &str, error: AppError) -> Self {
        error.log_and_record("Form submission");
        match &error {
            AppError::Validation(_) => Self::with_error(field, &error.user_message()),
            _ => Self::with_error("form", &error.user_message()),
        }
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form_errors = FormErrors::new();

        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Invalid value".into());
                form_errors.add(&field, &message);
            }
        }

        form_errors
    }
}

pub trait ValidateFormExt {
    fn validate_form(&self) -> Result<(), FormErrors>;
}

impl<T: Validate> ValidateFormExt for T {
    fn validate_form(&self) -> Result<(), FormErrors> {
        self.validate().map_err(|errors| {
            let form_errors = FormErrors::from(errors);
            tracing::warn!(errors = ?form_errors, "Form validation failed");
            form_errors
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "Title is required."))]
        title: String,
        #[validate(range(min = 1, max = 5, message = "Out of range."))]
        score: i64,
    }

    #[test]
    fn test_collects_messages_per_field() {
        let sample = Sample {
            title: String::new(),
            score: 9,
        };

        let errors = sample.validate_form().unwrap_err();
        assert_eq!(errors.field("title"), ["Title is required."]);
        assert_eq!(errors.field("score"), ["Out of range."]);
        assert!(errors.field("other").is_empty());
    }

    #[test]
    fn test_valid_form_passes() {
        let sample = Sample {
            title: "ok".to_string(),
            score: 3,
        };
        assert!(sample.validate_form().is_ok());
    }

    #[test]
    fn test_app_error_mapping() {
        let errors = FormErrors::from_app_error(
            "username",
            AppError::Validation("Username 'a' already exists".to_string()),
        );
        assert_eq!(errors.field("username"), ["Username 'a' already exists"]);

        let errors = FormErrors::from_app_error("username", AppError::Internal("boom".into()));
        assert!(errors.field("username").is_empty());
        assert_eq!(errors.field("form").len(), 1);
    }
}
