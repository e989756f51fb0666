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

//! Registry configuration and structure construction hints

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// SRID used when no hint overrides it
pub const DEFAULT_SRID: &str = "EPSG:4326";

/// Geometry attribute name preferred as default when present
pub const DEFAULT_GEOMETRY_NAME: &str = "geometry";

/// How a context identifies live objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// IDs are minted and tracked per resource
    #[default]
    Tracked,
    /// No-op identity: ID attributes are never registered
    Void,
}

/// Hints consulted when a feature structure is built from a live class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureHints {
    /// SRID assigned to new structures
    pub default_srid: String,

    /// Candidate ID attribute names, first match on the class wins
    pub id_attributes: Vec<String>,

    /// Candidate SRID attribute names, first match on the class wins
    pub srid_attributes: Vec<String>,

    /// Preferred default geometry names, first owned geometry wins
    pub default_geometry_names: Vec<String>,
}

impl StructureHints {
    /// Parse hints from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the default SRID
    pub fn with_default_srid(mut self, srid: impl Into<String>) -> Self {
        self.default_srid = srid.into();
        self
    }

    /// Add a candidate ID attribute name
    pub fn with_id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attributes.push(name.into());
        self
    }

    /// Add a candidate SRID attribute name
    pub fn with_srid_attribute(mut self, name: impl Into<String>) -> Self {
        self.srid_attributes.push(name.into());
        self
    }

    /// Put a preferred default geometry name in front of the existing ones
    pub fn with_default_geometry(mut self, name: impl Into<String>) -> Self {
        self.default_geometry_names.insert(0, name.into());
        self
    }
}

impl Default for StructureHints {
    fn default() -> Self {
        Self {
            default_srid: DEFAULT_SRID.to_string(),
            id_attributes: Vec::new(),
            srid_attributes: Vec::new(),
            default_geometry_names: vec![DEFAULT_GEOMETRY_NAME.to_string()],
        }
    }
}

/// Top-level registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capacity of the CRS resolution cache
    pub crs_cache_capacity: usize,

    /// Identity strategy for new contexts
    pub identity: IdentityMode,

    /// Hints applied to every structure built by the registry
    pub hints: StructureHints,
}

impl RegistryConfig {
    /// Create a configuration with custom settings
    pub fn new(crs_cache_capacity: usize, identity: IdentityMode, hints: StructureHints) -> Self {
        Self {
            crs_cache_capacity,
            identity,
            hints,
        }
    }

    /// Create a configuration for testing
    pub fn testing() -> Self {
        Self {
            crs_cache_capacity: 8,
            identity: IdentityMode::Tracked,
            hints: StructureHints::default(),
        }
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            crs_cache_capacity: 64,
            identity: IdentityMode::Tracked,
            hints: StructureHints::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_config_default() {
        let config = RegistryConfig::default();
        assert_eq!(config.crs_cache_capacity, 64);
        assert_eq!(config.identity, IdentityMode::Tracked);
        assert_eq!(config.hints.default_srid, DEFAULT_SRID);
        assert_eq!(config.hints.default_geometry_names, vec!["geometry"]);
    }

    #[test]
    fn test_registry_config_testing() {
        let config = RegistryConfig::testing();
        assert_eq!(config.crs_cache_capacity, 8);
    }

    #[test]
    fn test_hints_from_json_fills_defaults() {
        let hints = StructureHints::from_json(r#"{"id_attributes": ["code"]}"#).unwrap();
        assert_eq!(hints.id_attributes, vec!["code"]);
        assert_eq!(hints.default_srid, DEFAULT_SRID);
        assert_eq!(hints.default_geometry_names, vec!["geometry"]);
    }

    #[test]
    fn test_registry_config_from_json() {
        let config = RegistryConfig::from_json(
            r#"{"identity": "void", "hints": {"default_srid": "EPSG:3857"}}"#,
        )
        .unwrap();
        assert_eq!(config.identity, IdentityMode::Void);
        assert_eq!(config.hints.default_srid, "EPSG:3857");
        assert_eq!(config.crs_cache_capacity, 64);
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let err = RegistryConfig::from_json("not json").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_hint_builders() {
        let hints = StructureHints::default()
            .with_id_attribute("code")
            .with_srid_attribute("srid")
            .with_default_geometry("centerline");
        assert_eq!(hints.id_attributes, vec!["code"]);
        assert_eq!(hints.srid_attributes, vec!["srid"]);
        assert_eq!(hints.default_geometry_names, vec!["centerline", "geometry"]);
    }
}
