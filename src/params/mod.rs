//! Property descriptors and the name-aliasing system.

mod aliases;
mod list;
mod spec;

pub use crate::params::aliases::{ParamAliases, ParamAliasesBuilder};
pub use crate::params::list::PropertyList;
pub use crate::params::spec::{PropertySpec, TypeToken};
