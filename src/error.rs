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

//! Error types for the structure registry
//!
//! Validation mismatches are not errors: they are reported as failed
//! [`Status`](crate::status::Status) values. The variants here cover
//! construction and mutation problems, lifecycle violations and filter
//! encoding failures.

use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error type for registry operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Structure could not be built or mutated with the given configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message
        message: String,
    },

    /// Node accessed in a state that does not permit it
    #[error("State error: {message}")]
    State {
        /// Human-readable error message
        message: String,
    },

    /// Filter construct that has no native predicate equivalent
    #[error("Encoding error at {node}: {message}")]
    Encoding {
        /// Offending filter node
        node: String,
        /// Human-readable error message
        message: String,
    },

    /// CRS code unknown to the resolver
    #[error("CRS '{code}' not found")]
    CrsNotFound {
        /// Requested code
        code: String,
    },

    /// CRS resolver failed while building the reference system
    #[error("CRS factory failed for '{code}': {message}")]
    CrsFactory {
        /// Requested code
        code: String,
        /// Human-readable error message
        message: String,
    },

    /// Operation not supported by this object
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Operation name
        operation: String,
    },

    /// Iterator exhausted
    #[error("No more elements")]
    NoSuchElement,

    /// Live object model rejected a request
    #[error("Model error: {message}")]
    Model {
        /// Human-readable error message
        message: String,
    },
}

impl RegistryError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create an encoding error naming the offending node
    pub fn encoding(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a CRS not found error
    pub fn crs_not_found(code: impl Into<String>) -> Self {
        Self::CrsNotFound { code: code.into() }
    }

    /// Create a CRS factory error
    pub fn crs_factory(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CrsFactory {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Check if this is a state error
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is an encoding error
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("invalid JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::encoding("PropertyIsEqualTo", "functions are not supported");
        assert_eq!(
            err.to_string(),
            "Encoding error at PropertyIsEqualTo: functions are not supported"
        );
        assert!(err.is_encoding());

        let err = RegistryError::crs_not_found("NOT-A-CODE");
        assert_eq!(err.to_string(), "CRS 'NOT-A-CODE' not found");
    }

    #[test]
    fn test_json_error_maps_to_configuration() {
        let err: RegistryError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.is_configuration());
    }
}
