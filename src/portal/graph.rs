//! Archetype pairing table.
//!
//! Rules are author-time data: which archetype shows which, and whether the pairing works both
//! ways. They are validated once and compiled into a map giving, for every archetype, the one
//! archetype it pairs with and in which directions connections flow.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use super::PortalArchetype;

/// One line of the pairing table. Endpoints are optional because the table comes from
/// configuration files, a missing endpoint is reported when the graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRule {
    pub source: Option<PortalArchetype>,
    pub target: Option<PortalArchetype>,
    /// One-way rules only let `source` portals show `target` portals.
    #[serde(default)]
    pub directional: bool,
}

impl ConnectionRule {
    pub fn one_way(source: impl Into<PortalArchetype>, target: impl Into<PortalArchetype>) -> Self {
        ConnectionRule {
            source: Some(source.into()),
            target: Some(target.into()),
            directional: true,
        }
    }

    pub fn two_way(a: impl Into<PortalArchetype>, b: impl Into<PortalArchetype>) -> Self {
        ConnectionRule {
            source: Some(a.into()),
            target: Some(b.into()),
            directional: false,
        }
    }
}

/// What the graph knows about one archetype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalLink {
    pub paired: PortalArchetype,
    /// Portals of this archetype show portals of the paired archetype.
    pub outgoing: bool,
    /// Portals of the paired archetype show portals of this archetype.
    pub incoming: bool,
}

impl PortalLink {
    pub fn is_bidirectional(&self) -> bool {
        self.outgoing && self.incoming
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingEndpoint {
        rule: usize,
    },
    ConflictingDirectionality {
        rule: usize,
        previous: usize,
        a: PortalArchetype,
        b: PortalArchetype,
    },
    DirectionalSelfPairing {
        rule: usize,
        archetype: PortalArchetype,
    },
    AmbiguousPairing {
        rule: usize,
        archetype: PortalArchetype,
        existing: PortalArchetype,
        requested: PortalArchetype,
    },
    UnknownArchetype {
        rule: usize,
        archetype: PortalArchetype,
    },
    DuplicateArchetype(PortalArchetype),
    InvalidArchetypeSize {
        archetype: PortalArchetype,
        width: f32,
        height: f32,
    },
    InvalidRenderTargetPolicy {
        max_dimension: u32,
        min_dimension: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEndpoint { rule } => {
                write!(f, "connection rule #{rule} is missing an archetype")
            }
            Self::ConflictingDirectionality {
                rule,
                previous,
                a,
                b,
            } => write!(
                f,
                "connection rule #{rule} pairs '{a}' and '{b}' with a different direction than rule #{previous}"
            ),
            Self::DirectionalSelfPairing { rule, archetype } => write!(
                f,
                "connection rule #{rule} pairs '{archetype}' with itself one way, self pairings must be two way"
            ),
            Self::AmbiguousPairing {
                rule,
                archetype,
                existing,
                requested,
            } => write!(
                f,
                "connection rule #{rule} pairs '{archetype}' with '{requested}' but it is already paired with '{existing}'"
            ),
            Self::UnknownArchetype { rule, archetype } => write!(
                f,
                "connection rule #{rule} references undeclared archetype '{archetype}'"
            ),
            Self::DuplicateArchetype(archetype) => {
                write!(f, "archetype '{archetype}' is declared twice")
            }
            Self::InvalidArchetypeSize {
                archetype,
                width,
                height,
            } => write!(f, "archetype '{archetype}' has invalid size {width}x{height}"),
            Self::InvalidRenderTargetPolicy {
                max_dimension,
                min_dimension,
            } => write!(
                f,
                "invalid render target policy: min dimension {min_dimension}, max dimension {max_dimension}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pairing {
    TwoWay,
    OneWay { source: PortalArchetype },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionGraph {
    links: HashMap<PortalArchetype, PortalLink>,
}

impl ConnectionGraph {
    /// Validate `rules` and compile them. Nothing is built unless every rule is valid.
    pub fn build(rules: &[ConnectionRule]) -> Result<Self, ConfigError> {
        let mut pairs: HashMap<(PortalArchetype, PortalArchetype), (usize, Pairing)> =
            HashMap::new();
        let mut partners: HashMap<PortalArchetype, PortalArchetype> = HashMap::new();
        // Insertion order of `pairs`, so the compiled links do not depend on hashing.
        let mut order = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            let (Some(source), Some(target)) = (&rule.source, &rule.target) else {
                return Err(ConfigError::MissingEndpoint { rule: index });
            };
            if source == target && rule.directional {
                return Err(ConfigError::DirectionalSelfPairing {
                    rule: index,
                    archetype: source.clone(),
                });
            }

            let pairing = if rule.directional {
                Pairing::OneWay {
                    source: source.clone(),
                }
            } else {
                Pairing::TwoWay
            };
            let key = if source <= target {
                (source.clone(), target.clone())
            } else {
                (target.clone(), source.clone())
            };

            if let Some((previous, existing)) = pairs.get(&key) {
                if *existing == pairing {
                    continue;
                }
                return Err(ConfigError::ConflictingDirectionality {
                    rule: index,
                    previous: *previous,
                    a: key.0,
                    b: key.1,
                });
            }

            for (archetype, other) in [(source, target), (target, source)] {
                let existing = partners
                    .entry(archetype.clone())
                    .or_insert_with(|| other.clone());
                if *existing != *other {
                    return Err(ConfigError::AmbiguousPairing {
                        rule: index,
                        archetype: archetype.clone(),
                        existing: existing.clone(),
                        requested: other.clone(),
                    });
                }
            }

            order.push(key.clone());
            pairs.insert(key, (index, pairing));
        }

        let mut links = HashMap::with_capacity(partners.len());
        for key in order {
            let (_, pairing) = &pairs[&key];
            let (a, b) = key;
            match pairing {
                Pairing::TwoWay => {
                    let both = |paired: &PortalArchetype| PortalLink {
                        paired: paired.clone(),
                        outgoing: true,
                        incoming: true,
                    };
                    links.insert(a.clone(), both(&b));
                    links.insert(b.clone(), both(&a));
                }
                Pairing::OneWay { source } => {
                    let target = if *source == a { b } else { a };
                    links.insert(
                        source.clone(),
                        PortalLink {
                            paired: target.clone(),
                            outgoing: true,
                            incoming: false,
                        },
                    );
                    links.insert(
                        target,
                        PortalLink {
                            paired: source.clone(),
                            outgoing: false,
                            incoming: true,
                        },
                    );
                }
            }
        }

        Ok(ConnectionGraph { links })
    }

    pub fn lookup(&self, archetype: &PortalArchetype) -> Option<&PortalLink> {
        self.links.get(archetype)
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &PortalArchetype> {
        self.links.keys()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ConnectionGraph, ConnectionRule};
    use crate::portal::PortalArchetype;

    fn archetype(name: &str) -> PortalArchetype {
        PortalArchetype::new(name)
    }

    #[test]
    fn two_way_rules_link_both_archetypes() {
        let graph = ConnectionGraph::build(&[ConnectionRule::two_way("orange", "blue")]).unwrap();
        let orange = graph.lookup(&archetype("orange")).unwrap();
        let blue = graph.lookup(&archetype("blue")).unwrap();
        assert_eq!(orange.paired, archetype("blue"));
        assert_eq!(blue.paired, archetype("orange"));
        assert!(orange.is_bidirectional());
        assert!(blue.is_bidirectional());
        assert!(graph.lookup(&archetype("green")).is_none());
    }

    #[test]
    fn one_way_rules_are_visible_from_both_ends() {
        let graph = ConnectionGraph::build(&[ConnectionRule::one_way("camera", "screen")]).unwrap();
        let camera = graph.lookup(&archetype("camera")).unwrap();
        let screen = graph.lookup(&archetype("screen")).unwrap();
        assert!(camera.outgoing && !camera.incoming);
        assert!(!screen.outgoing && screen.incoming);
        assert_eq!(screen.paired, archetype("camera"));
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let rules = [
            ConnectionRule::two_way("a", "b"),
            ConnectionRule {
                source: Some(archetype("c")),
                target: None,
                directional: false,
            },
        ];
        assert_eq!(
            ConnectionGraph::build(&rules),
            Err(ConfigError::MissingEndpoint { rule: 1 })
        );
    }

    #[test]
    fn conflicting_directionality_is_rejected() {
        let rules = [
            ConnectionRule::two_way("a", "b"),
            ConnectionRule::one_way("b", "a"),
        ];
        assert!(matches!(
            ConnectionGraph::build(&rules),
            Err(ConfigError::ConflictingDirectionality {
                rule: 1,
                previous: 0,
                ..
            })
        ));

        let opposite = [
            ConnectionRule::one_way("a", "b"),
            ConnectionRule::one_way("b", "a"),
        ];
        assert!(matches!(
            ConnectionGraph::build(&opposite),
            Err(ConfigError::ConflictingDirectionality { .. })
        ));
    }

    #[test]
    fn identical_duplicates_are_accepted() {
        let rules = [
            ConnectionRule::one_way("a", "b"),
            ConnectionRule::one_way("a", "b"),
        ];
        let graph = ConnectionGraph::build(&rules).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn archetypes_pair_with_a_single_partner() {
        let rules = [
            ConnectionRule::two_way("a", "b"),
            ConnectionRule::two_way("a", "c"),
        ];
        assert_eq!(
            ConnectionGraph::build(&rules),
            Err(ConfigError::AmbiguousPairing {
                rule: 1,
                archetype: archetype("a"),
                existing: archetype("b"),
                requested: archetype("c"),
            })
        );
    }

    #[test]
    fn self_pairing_must_be_two_way() {
        let graph = ConnectionGraph::build(&[ConnectionRule::two_way("gate", "gate")]).unwrap();
        let gate = graph.lookup(&archetype("gate")).unwrap();
        assert_eq!(gate.paired, archetype("gate"));
        assert!(gate.is_bidirectional());

        assert!(matches!(
            ConnectionGraph::build(&[ConnectionRule::one_way("gate", "gate")]),
            Err(ConfigError::DirectionalSelfPairing { rule: 0, .. })
        ));
    }
}
