//! Validation failures and their 422 rendering.
//!
//! The validator itself is external; it reports each violated constraint as
//! a [`FieldViolation`] (dotted namespace rooted at the validated type, field
//! name, rule tag). Messages are looked up by `"<path>.<rule>"`.

use std::collections::HashMap;
use std::error::Error as StdError;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::response::{AdaptError, Response};

/// One violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path including the root type, e.g. `SignupRequest.user.email`.
    pub namespace: String,
    /// Field name as declared, e.g. `Email`.
    pub field: String,
    /// Rule tag, e.g. `required`.
    pub rule: String,
}

impl FieldViolation {
    pub fn new(
        namespace: impl Into<String>,
        field: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            field: field.into(),
            rule: rule.into(),
        }
    }

    /// Namespace with the root type segment removed.
    pub fn path(&self) -> &str {
        self.namespace
            .split_once('.')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.namespace)
    }
}

/// The collection of violations a validator returns on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{} field constraint(s) violated", .0.len())]
pub struct ValidationErrors(Vec<FieldViolation>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.0.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }
}

impl FromIterator<FieldViolation> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = FieldViolation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One entry of the 422 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub property: String,
    pub path: String,
    pub rule: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponseBody {
    pub errors: Vec<ValidationError>,
}

/// Map each violation to a body entry, in validator order.
pub fn to_validation_errors(
    errors: &ValidationErrors,
    messages: &HashMap<String, String>,
) -> Vec<ValidationError> {
    errors
        .violations()
        .iter()
        .map(|violation| {
            let path = violation.path().to_string();
            let message = messages
                .get(&format!("{}.{}", path, violation.rule))
                .cloned()
                .unwrap_or_default();

            ValidationError {
                property: violation.field.clone(),
                path,
                rule: violation.rule.clone(),
                message,
            }
        })
        .collect()
}

/// Render `errors` as a 422 response.
pub fn unprocessable_entity(
    errors: &ValidationErrors,
    messages: &HashMap<String, String>,
) -> Result<Response, AdaptError> {
    let body = ValidationResponseBody {
        errors: to_validation_errors(errors, messages),
    };
    Response::json(StatusCode::UNPROCESSABLE_ENTITY, &body)
}

/// Render a validator failure as a 422 response.
///
/// # Panics
/// Any failure that is not a [`ValidationErrors`] is re-raised as a panic
/// carrying the original error, for the recovery middleware to report.
pub fn validation_failure_response(
    err: Box<dyn StdError + Send + Sync>,
    messages: &HashMap<String, String>,
) -> Result<Response, AdaptError> {
    match err.downcast::<ValidationErrors>() {
        Ok(errors) => unprocessable_entity(&errors, messages),
        Err(other) => std::panic::panic_any(other),
    }
}
