//! Author-time portal configuration, loaded from JSON.

use std::{collections::HashSet, fmt, fs, io, path::Path};

use bevy::prelude::{Resource, Vec2};
use serde::{Deserialize, Serialize};

use crate::portal::{
    lifecycle::RenderTargetExtent, ConfigError, ConnectionGraph, ConnectionRule, PortalArchetype,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeConfig {
    pub name: PortalArchetype,
    pub width: f32,
    pub height: f32,
}

impl ArchetypeConfig {
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

/// How big the offscreen image of a connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderTargetPolicy {
    /// Pixels along the longer edge of the source portal.
    pub max_dimension: u32,
    pub min_dimension: u32,
}

impl Default for RenderTargetPolicy {
    fn default() -> Self {
        RenderTargetPolicy {
            max_dimension: 1024,
            min_dimension: 16,
        }
    }
}

impl RenderTargetPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_dimension == 0 || self.min_dimension > self.max_dimension {
            return Err(ConfigError::InvalidRenderTargetPolicy {
                max_dimension: self.max_dimension,
                min_dimension: self.min_dimension,
            });
        }
        Ok(())
    }

    /// Extent for a portal with the given width / height ratio. The longer edge gets
    /// `max_dimension`.
    pub fn extent_for(&self, aspect_ratio: f32) -> RenderTargetExtent {
        let max = self.max_dimension;
        let scaled = |fraction: f32| {
            let pixels = (max as f32 * fraction).round();
            if pixels.is_finite() {
                (pixels as u32).clamp(self.min_dimension, max)
            } else {
                self.min_dimension
            }
        };
        if aspect_ratio >= 1. {
            RenderTargetExtent {
                width: max,
                height: scaled(aspect_ratio.recip()),
            }
        } else {
            RenderTargetExtent {
                width: scaled(aspect_ratio),
                height: max,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
pub struct PortalConfig {
    pub archetypes: Vec<ArchetypeConfig>,
    #[serde(default)]
    pub rules: Vec<ConnectionRule>,
    #[serde(default)]
    pub render_targets: RenderTargetPolicy,
}

#[derive(Debug)]
pub enum ConfigLoadError {
    Read { path: String, source: io::Error },
    Parse(serde_json::Error),
    Invalid(ConfigError),
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "could not read {path}: {source}"),
            Self::Parse(err) => write!(f, "ill-formed portal configuration: {err}"),
            Self::Invalid(err) => write!(f, "invalid portal configuration: {err}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ConfigLoadError {
    fn from(err: ConfigError) -> Self {
        ConfigLoadError::Invalid(err)
    }
}

impl PortalConfig {
    /// Parse and validate a configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigLoadError> {
        let config: PortalConfig = serde_json::from_str(json).map_err(ConfigLoadError::Parse)?;
        config.build_graph()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn archetype(&self, name: &PortalArchetype) -> Option<&ArchetypeConfig> {
        self.archetypes
            .iter()
            .find(|archetype| archetype.name == *name)
    }

    /// Check the archetype table and policy, then compile the rules.
    pub fn build_graph(&self) -> Result<ConnectionGraph, ConfigError> {
        let mut declared = HashSet::with_capacity(self.archetypes.len());
        for archetype in &self.archetypes {
            let size = archetype.size();
            if !(size.is_finite() && size.x > 0. && size.y > 0.) {
                return Err(ConfigError::InvalidArchetypeSize {
                    archetype: archetype.name.clone(),
                    width: archetype.width,
                    height: archetype.height,
                });
            }
            if !declared.insert(&archetype.name) {
                return Err(ConfigError::DuplicateArchetype(archetype.name.clone()));
            }
        }
        self.render_targets.validate()?;

        let graph = ConnectionGraph::build(&self.rules)?;
        for (index, rule) in self.rules.iter().enumerate() {
            for archetype in [&rule.source, &rule.target].into_iter().flatten() {
                if !declared.contains(archetype) {
                    return Err(ConfigError::UnknownArchetype {
                        rule: index,
                        archetype: archetype.clone(),
                    });
                }
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use bevy::prelude::Vec2;

    use super::{ConfigLoadError, PortalConfig, RenderTargetPolicy};
    use crate::portal::{lifecycle::RenderTargetExtent, ConfigError, PortalArchetype};

    const CONFIG: &str = r#"{
        "archetypes": [
            { "name": "orange", "width": 1.0, "height": 2.0 },
            { "name": "blue", "width": 1.0, "height": 2.0 }
        ],
        "rules": [
            { "source": "orange", "target": "blue" }
        ]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let config = PortalConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.render_targets, RenderTargetPolicy::default());
        assert!(!config.rules[0].directional);
        let orange = config.archetype(&PortalArchetype::new("orange")).unwrap();
        assert_eq!(orange.size(), Vec2::new(1., 2.));
        assert!(config.archetype(&PortalArchetype::new("green")).is_none());
        assert_eq!(config.build_graph().unwrap().len(), 2);
    }

    #[test]
    fn rules_must_name_declared_archetypes() {
        let json = CONFIG.replace(r#""target": "blue""#, r#""target": "green""#);
        match PortalConfig::from_json_str(&json) {
            Err(ConfigLoadError::Invalid(ConfigError::UnknownArchetype { rule: 0, archetype })) => {
                assert_eq!(archetype, PortalArchetype::new("green"))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn missing_rule_endpoint_fails_to_load() {
        let json = CONFIG.replace(r#", "target": "blue""#, "");
        assert!(matches!(
            PortalConfig::from_json_str(&json),
            Err(ConfigLoadError::Invalid(ConfigError::MissingEndpoint { rule: 0 }))
        ));
    }

    #[test]
    fn ill_formed_json_is_a_parse_error() {
        assert!(matches!(
            PortalConfig::from_json_str("{ \"archetypes\": 3 }"),
            Err(ConfigLoadError::Parse(_))
        ));
    }

    #[test]
    fn duplicate_and_degenerate_archetypes_are_rejected() {
        let duplicate = CONFIG.replace(r#""name": "blue""#, r#""name": "orange""#);
        assert!(matches!(
            PortalConfig::from_json_str(&duplicate),
            Err(ConfigLoadError::Invalid(ConfigError::DuplicateArchetype(_)))
        ));
        let flat = CONFIG.replacen(r#""height": 2.0"#, r#""height": 0.0"#, 1);
        assert!(matches!(
            PortalConfig::from_json_str(&flat),
            Err(ConfigLoadError::Invalid(ConfigError::InvalidArchetypeSize { .. }))
        ));
    }

    #[test]
    fn extent_keeps_the_aspect_ratio() {
        let policy = RenderTargetPolicy::default();
        assert_eq!(
            policy.extent_for(2.),
            RenderTargetExtent {
                width: 1024,
                height: 512
            }
        );
        assert_eq!(
            policy.extent_for(0.5),
            RenderTargetExtent {
                width: 512,
                height: 1024
            }
        );
        assert_eq!(policy.extent_for(1000.).height, 16);
    }

    #[test]
    fn policy_bounds_are_validated() {
        let policy = RenderTargetPolicy {
            max_dimension: 8,
            min_dimension: 16,
        };
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::InvalidRenderTargetPolicy { .. })
        ));
    }
}
