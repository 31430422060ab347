use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Describes how dependency task generation works in relation to the
/// parametric seed of a partial pipeline.
///
/// A parametrized task is one that directly or indirectly depends on a
/// seed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParametrizationPolicy {
    /// Generates all output and indirect dependency tasks.
    AllDependencies,
    /// Generates output tasks and parametrized dependency tasks.
    #[default]
    ParametrizedOrDirectDependencies,
    /// Generates only parametrized dependency tasks.
    ParametrizedDependencies,
}

impl ParametrizationPolicy {
    /// The policy applied to the dependencies of a task selected under this
    /// policy.
    pub(crate) fn indirect(self) -> Self {
        match self {
            ParametrizationPolicy::AllDependencies => ParametrizationPolicy::AllDependencies,
            _ => ParametrizationPolicy::ParametrizedDependencies,
        }
    }
}

/// Options controlling pipeline resolution.
///
/// ```
/// use tessera::{PlanOptions, ParametrizationPolicy};
///
/// let options = PlanOptions::from_json(r#"{ "strict": true }"#).unwrap();
/// assert!(options.strict);
/// assert_eq!(options.policy, ParametrizationPolicy::ParametrizedOrDirectDependencies);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Reject properties that no task produces and that were not declared
    /// as fixed inputs, instead of silently treating them as inputs.
    pub strict: bool,
    /// Task selection policy of partial pipelines. Full pipelines ignore it.
    pub policy: ParametrizationPolicy,
}

impl PlanOptions {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn policy(mut self, policy: ParametrizationPolicy) -> Self {
        self.policy = policy;
        self
    }
}
