// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Uniform validation result type

use crate::error::RegistryError;
use std::fmt;
use std::sync::Arc;

/// Status severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StatusKind {
    /// Operation completed as requested
    #[default]
    Success,
    /// Operation completed but something deserves attention
    Warning,
    /// Operation did not complete
    Failure,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Success => write!(f, "success"),
            StatusKind::Warning => write!(f, "warning"),
            StatusKind::Failure => write!(f, "failure"),
        }
    }
}

/// Result of a validation or cache operation.
///
/// `context` records the chain of structures the status travelled through,
/// innermost first, e.g. `["Road", "roads", "http://example.org/roads"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// Severity
    pub kind: StatusKind,
    /// Human-readable message
    pub message: String,
    /// Underlying error, if any
    pub cause: Option<Arc<RegistryError>>,
    /// Structures that produced or forwarded this status
    pub context: Vec<String>,
}

impl Status {
    /// Create a success status
    pub fn success(message: impl Into<String>) -> Self {
        StatusBuilder::new(StatusKind::Success, message).build()
    }

    /// Create a warning status
    pub fn warning(message: impl Into<String>) -> Self {
        StatusBuilder::new(StatusKind::Warning, message).build()
    }

    /// Create a failure status
    pub fn failure(message: impl Into<String>) -> Self {
        StatusBuilder::new(StatusKind::Failure, message).build()
    }

    /// Create a failure status caused by an error
    pub fn failure_with(message: impl Into<String>, cause: RegistryError) -> Self {
        StatusBuilder::new(StatusKind::Failure, message)
            .with_cause(cause)
            .build()
    }

    /// Append a context frame
    pub fn with_context(mut self, frame: impl Into<String>) -> Self {
        self.context.push(frame.into());
        self
    }

    /// Copy this status with a new message, keeping kind, cause and context
    pub fn clone_with_message(&self, message: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            message: message.into(),
            cause: self.cause.clone(),
            context: self.context.clone(),
        }
    }

    /// Check if this is a success
    pub fn is_success(&self) -> bool {
        self.kind == StatusKind::Success
    }

    /// Check if this is a warning
    pub fn is_warning(&self) -> bool {
        self.kind == StatusKind::Warning
    }

    /// Check if this is a failure
    pub fn is_failure(&self) -> bool {
        self.kind == StatusKind::Failure
    }

    /// Convert a failure into a configuration error, anything else into `Ok`
    pub fn into_result(self) -> crate::error::Result<Self> {
        if self.is_failure() {
            Err(RegistryError::configuration(self.to_string()))
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (at {})", self.context.join(" < "))?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Builder for [`Status`] values
#[derive(Debug)]
pub struct StatusBuilder {
    status: Status,
}

impl StatusBuilder {
    /// Start a status of the given kind
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            status: Status {
                kind,
                message: message.into(),
                cause: None,
                context: Vec::new(),
            },
        }
    }

    /// Attach a cause
    pub fn with_cause(mut self, cause: RegistryError) -> Self {
        self.status.cause = Some(Arc::new(cause));
        self
    }

    /// Append a context frame
    pub fn with_context(mut self, frame: impl Into<String>) -> Self {
        self.status.context.push(frame.into());
        self
    }

    /// Finish
    pub fn build(self) -> Status {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_kinds() {
        assert!(Status::success("ok").is_success());
        assert!(Status::warning("hmm").is_warning());
        assert!(Status::failure("no").is_failure());
    }

    #[test]
    fn test_clone_with_message_keeps_cause_and_context() {
        let status = Status::failure_with("attach refused", RegistryError::state("disposed"))
            .with_context("Road");
        let copy = status.clone_with_message("Road not cached");

        assert_eq!(copy.kind, StatusKind::Failure);
        assert_eq!(copy.message, "Road not cached");
        assert_eq!(copy.context, vec!["Road".to_string()]);
        assert_eq!(copy.cause, status.cause);
    }

    #[test]
    fn test_into_result() {
        assert!(Status::warning("partial").into_result().is_ok());
        let err = Status::failure("missing class").into_result().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_display() {
        let status = StatusBuilder::new(StatusKind::Failure, "class Road not found")
            .with_context("Road")
            .with_context("roads")
            .build();
        assert_eq!(
            status.to_string(),
            "[failure] class Road not found (at Road < roads)"
        );
    }
}
