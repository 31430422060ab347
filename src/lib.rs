#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod config;
mod core;
mod error;
mod utils;

pub mod engine;
pub mod params;
pub mod pipeline;
pub mod scoped;

pub use crate::config::{ParametrizationPolicy, PlanOptions};
pub use crate::core::ArcStr;
pub use crate::engine::{Method, MethodBuilder, MethodCollection, Stage, StaticTask, Task, TaskDef, TaskRef};
pub use crate::error::*;
pub use crate::params::{ParamAliases, ParamAliasesBuilder, PropertyList, PropertySpec, TypeToken};
pub use crate::pipeline::{
    Binding, Pipeline, PipelineBuilder, PipelineCache, PipelineKey, PipelineSummary, Role,
    SpecSummary,
};
pub use crate::scoped::{ScopedPlan, ScopedTask};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
