use thiserror::Error;

use crate::core::ArcStr;
use crate::params::TypeToken;
use crate::pipeline::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("Alias cycle while resolving '{name}': {}", .chain.join(" -> "))]
    Cycle { name: ArcStr, chain: Vec<ArcStr> },
}

#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    Alias(#[from] AliasError),

    #[error(
        "Property '{name}' was first used as {} by {first_by}, but later as {} by {later_by}",
        .first.short_name(),
        .later.short_name()
    )]
    TypeMismatch {
        name: ArcStr,
        first: TypeToken,
        first_by: String,
        later: TypeToken,
        later_by: String,
    },

    #[error("Property '{name}' was consumed, but also depended on later in the pipeline by {by}")]
    ConsumedThenRequired { name: ArcStr, by: String },

    #[error("Dependency cycle through '{name}': {}", .path.join(" -> "))]
    DependencyCycle { name: ArcStr, path: Vec<ArcStr> },

    #[error("No task produces '{name}' and it was not declared as a fixed input")]
    MissingProducer { name: ArcStr },

    #[error("Scope '{scope}': desired output '{name}' must be aliased")]
    NotAliased { scope: String, name: ArcStr },

    #[error("Scope '{scope}': desired output '{name}' is {role}")]
    Classification {
        scope: String,
        name: ArcStr,
        role: Role,
    },

    #[error("Scope '{scope}': desired output '{name}' not found")]
    OutputNotFound { scope: String, name: ArcStr },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't parse pipeline options.\n{0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "logging")]
#[derive(Debug, Error)]
#[error("Couldn't install the tracing subscriber.\n{0}")]
pub struct LoggingError(#[from] pub(crate) Box<dyn std::error::Error + Send + Sync + 'static>);
