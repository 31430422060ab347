//! Task descriptors and the registries resolving producers for properties.

mod collection;
mod method;
mod task;

pub use crate::engine::collection::{MethodCollection, Stage};
pub use crate::engine::method::{Method, MethodBuilder};
pub use crate::engine::task::{StaticTask, Task, TaskDef, TaskRef};
