//! Gate strategy configuration.
//!
//! A strategy document is a TOML file holding one or more keyed
//! strategies, each with an ordered gate sequence:
//!
//! ```toml
//! [strategy.care_navigation]
//! gate_order = ["availability", "history"]
//!
//! [strategy.care_navigation.gates.availability]
//! question = "Are you available this week?"
//! expected_categories = ["Yes", "No"]
//! limiting_values = ["No"]
//! required = true
//! stop_message = "We can't continue without availability."
//! ```
//!
//! Documents are parsed and validated once at load time; invalid
//! configuration is rejected at this boundary, never deep in the
//! decision path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

/// Strategy configuration errors. All are fatal: the engine refuses to
/// proceed rather than guess a default.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No strategy registered under the requested key.
    #[error("strategy not found: {key}")]
    StrategyNotFound {
        /// The requested strategy key.
        key: String,
    },
    /// `gate_order` is missing or empty.
    #[error("strategy {key}: gate_order must be a non-empty list")]
    MissingGateOrder {
        /// The offending strategy key.
        key: String,
    },
    /// `gate_order` names a gate with no definition.
    #[error("strategy {key}: gate_order references undefined gate {gate}")]
    UndefinedGate {
        /// The offending strategy key.
        key: String,
        /// The undefined gate key.
        gate: String,
    },
    /// A gate definition is not reachable from `gate_order`.
    #[error("strategy {key}: gate {gate} is defined but missing from gate_order")]
    UnorderedGate {
        /// The offending strategy key.
        key: String,
        /// The unlisted gate key.
        gate: String,
    },
    /// A gate has no expected categories.
    #[error("strategy {key}: gate {gate} has no expected_categories")]
    EmptyCategories {
        /// The offending strategy key.
        key: String,
        /// The offending gate key.
        gate: String,
    },
    /// A limiting value is not one of the gate's expected categories.
    #[error("strategy {key}: gate {gate} limiting value {value:?} is not an expected category")]
    LimitingValueNotExpected {
        /// The offending strategy key.
        key: String,
        /// The offending gate key.
        gate: String,
        /// The stray limiting value.
        value: String,
    },
    /// The document is not valid TOML.
    #[error("failed to parse strategy document: {0}")]
    Parse(#[from] toml::de::Error),
    /// The document could not be read.
    #[error("failed to read strategy document {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Static definition of one gate, config-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GateDefinition {
    /// Question text shown when this gate is asked.
    pub question: String,
    /// Finite set of valid normalized answers.
    pub expected_categories: Vec<String>,
    /// Subset of `expected_categories` that force immediate termination.
    #[serde(default)]
    pub limiting_values: Vec<String>,
    /// Whether this gate must be answered for the dialogue to pass.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Message shown when a limiting value terminates the dialogue.
    #[serde(default)]
    pub stop_message: Option<String>,
}

fn default_required() -> bool {
    true
}

impl GateDefinition {
    /// Whether `category` is one of this gate's limiting values.
    pub fn is_limiting(&self, category: &str) -> bool {
        self.limiting_values.iter().any(|v| v == category)
    }
}

/// A validated gate strategy: ordered gate keys plus their definitions.
///
/// Immutable after load; freely shared read-only across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// The strategy key this config was registered under.
    pub strategy_key: String,
    /// Total order over gate keys. Ordering is the tie-break for
    /// "next gate".
    pub gate_order: Vec<String>,
    gates: HashMap<String, GateDefinition>,
}

impl GateConfig {
    /// Look up a gate definition by key.
    pub fn gate(&self, key: &str) -> Option<&GateDefinition> {
        self.gates.get(key)
    }

    /// Whether `key` names a configured gate.
    pub fn has_gate(&self, key: &str) -> bool {
        self.gates.contains_key(key)
    }

    /// The first gate in `gate_order` with its definition.
    ///
    /// Validation guarantees a non-empty order, but the accessor stays
    /// total for callers.
    pub fn first_gate(&self) -> Option<(&str, &GateDefinition)> {
        let key = self.gate_order.first()?;
        Some((key.as_str(), self.gates.get(key)?))
    }

    /// Iterate gates in `gate_order` sequence.
    pub fn ordered_gates(&self) -> impl Iterator<Item = (&str, &GateDefinition)> {
        self.gate_order
            .iter()
            .filter_map(|k| self.gates.get(k).map(|d| (k.as_str(), d)))
    }
}

/// Supplies gate configuration for a strategy key.
pub trait StrategyProvider: Send + Sync {
    /// Resolve the gate configuration for `strategy_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StrategyNotFound`] for unknown keys.
    fn load_gate_config(&self, strategy_key: &str) -> Result<Arc<GateConfig>, ConfigError>;
}

// ---------------------------------------------------------------------------
// TOML-backed provider
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    strategy: HashMap<String, RawStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    #[serde(default)]
    gate_order: Vec<String>,
    #[serde(default)]
    gates: HashMap<String, GateDefinition>,
}

/// Strategy provider backed by a TOML document parsed once at load time.
#[derive(Debug)]
pub struct TomlStrategyProvider {
    strategies: HashMap<String, Arc<GateConfig>>,
}

impl TomlStrategyProvider {
    /// Parse and validate a strategy document from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document fails to parse or any
    /// strategy fails validation.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument = toml::from_str(document)?;

        let mut strategies = HashMap::new();
        for (key, strategy) in raw.strategy {
            let config = validate_strategy(&key, strategy)?;
            strategies.insert(key, Arc::new(config));
        }

        Ok(Self { strategies })
    }

    /// Load and validate a strategy document from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any
    /// validation error from [`Self::from_toml`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Registered strategy keys, for diagnostics.
    pub fn strategy_keys(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}

impl StrategyProvider for TomlStrategyProvider {
    fn load_gate_config(&self, strategy_key: &str) -> Result<Arc<GateConfig>, ConfigError> {
        self.strategies
            .get(strategy_key)
            .cloned()
            .ok_or_else(|| ConfigError::StrategyNotFound {
                key: strategy_key.to_owned(),
            })
    }
}

fn validate_strategy(key: &str, raw: RawStrategy) -> Result<GateConfig, ConfigError> {
    if raw.gate_order.is_empty() {
        return Err(ConfigError::MissingGateOrder {
            key: key.to_owned(),
        });
    }

    for gate in &raw.gate_order {
        if !raw.gates.contains_key(gate) {
            return Err(ConfigError::UndefinedGate {
                key: key.to_owned(),
                gate: gate.clone(),
            });
        }
    }

    for (gate, definition) in &raw.gates {
        if !raw.gate_order.iter().any(|k| k == gate) {
            return Err(ConfigError::UnorderedGate {
                key: key.to_owned(),
                gate: gate.clone(),
            });
        }
        if definition.expected_categories.is_empty() {
            return Err(ConfigError::EmptyCategories {
                key: key.to_owned(),
                gate: gate.clone(),
            });
        }
        for value in &definition.limiting_values {
            if !definition.expected_categories.iter().any(|c| c == value) {
                return Err(ConfigError::LimitingValueNotExpected {
                    key: key.to_owned(),
                    gate: gate.clone(),
                    value: value.clone(),
                });
            }
        }
    }

    Ok(GateConfig {
        strategy_key: key.to_owned(),
        gate_order: raw.gate_order,
        gates: raw.gates,
    })
}
