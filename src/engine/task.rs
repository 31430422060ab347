use std::borrow::Cow;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::params::{ParamAliases, PropertyList, PropertySpec};

/// Shared reference to a type-erased task.
pub type TaskRef = Arc<dyn Task>;

/// The core trait for all tasks known to the resolver.
///
/// A task declares which properties it reads, filters in place, consumes and
/// produces. The resolver never runs a task; it only asks these questions, and
/// the answers must be pure functions of the alias context. Outputs are
/// alias-independent because they are what a [`Method`](crate::Method) is
/// indexed by.
pub trait Task: Send + Sync {
    /// User-friendly name, used in logs, errors and exports.
    fn name(&self) -> &str;

    /// Properties set by the task. They usually don't exist before the task
    /// runs.
    fn output_specs(&self) -> &PropertyList;

    /// Properties read by the task and never modified, so they can still be
    /// inputs for following tasks.
    fn input_specs(&self, aliases: &ParamAliases<'_>) -> Cow<'_, PropertyList>;

    /// Properties that exist both before and after the task and are usually
    /// modified by it.
    fn filter_specs(&self, aliases: &ParamAliases<'_>) -> Cow<'_, PropertyList>;

    /// Properties read by the task which don't exist anymore after it ran.
    fn consuming_specs(&self, aliases: &ParamAliases<'_>) -> Cow<'_, PropertyList>;

    /// Called by the resolver before any alias-dependent spec is queried
    /// under `aliases`. Tasks whose specs depend on a nested pipeline build
    /// it here.
    #[inline]
    fn prepare(&self, _aliases: &ParamAliases<'_>) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Drops anything [`prepare`](Task::prepare) built for `aliases`, so the
    /// next preparation starts from scratch.
    #[inline]
    fn invalidate(&self, _aliases: &ParamAliases<'_>) {}
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.name())
    }
}

/// A task with fixed, alias-independent property lists.
///
/// This is the descriptor most shading and compositing steps reduce to: the
/// executor knows what the step does, the resolver only needs the lists.
pub struct StaticTask {
    name: Cow<'static, str>,
    inputs: PropertyList,
    filters: PropertyList,
    consuming: PropertyList,
    outputs: PropertyList,
}

impl StaticTask {
    /// The entry point for defining a task.
    pub fn define(name: impl Into<Cow<'static, str>>) -> TaskDef {
        TaskDef {
            task: StaticTask {
                name: name.into(),
                inputs: PropertyList::new(),
                filters: PropertyList::new(),
                consuming: PropertyList::new(),
                outputs: PropertyList::new(),
            },
        }
    }
}

impl Task for StaticTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_specs(&self) -> &PropertyList {
        &self.outputs
    }

    fn input_specs(&self, _: &ParamAliases<'_>) -> Cow<'_, PropertyList> {
        Cow::Borrowed(&self.inputs)
    }

    fn filter_specs(&self, _: &ParamAliases<'_>) -> Cow<'_, PropertyList> {
        Cow::Borrowed(&self.filters)
    }

    fn consuming_specs(&self, _: &ParamAliases<'_>) -> Cow<'_, PropertyList> {
        Cow::Borrowed(&self.consuming)
    }
}

/// Builder returned by [`StaticTask::define`].
pub struct TaskDef {
    task: StaticTask,
}

impl TaskDef {
    pub fn input(mut self, spec: PropertySpec) -> Self {
        self.task.inputs.insert_back(spec);
        self
    }

    pub fn filter(mut self, spec: PropertySpec) -> Self {
        self.task.filters.insert_back(spec);
        self
    }

    pub fn consume(mut self, spec: PropertySpec) -> Self {
        self.task.consuming.insert_back(spec);
        self
    }

    pub fn output(mut self, spec: PropertySpec) -> Self {
        self.task.outputs.insert_back(spec);
        self
    }

    pub fn finish(self) -> TaskRef {
        Arc::new(self.task)
    }
}
