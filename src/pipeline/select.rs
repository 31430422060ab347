use std::collections::{BTreeMap, HashSet};

use crate::config::ParametrizationPolicy;
use crate::core::ArcStr;
use crate::engine::{Method, Task, TaskRef};
use crate::error::PipelineError;
use crate::params::{ParamAliases, PropertyList, PropertySpec};
use crate::pipeline::resolve_name;

/// Result of dependency selection.
pub(crate) struct Selection {
    /// Tasks in execution order.
    pub items: Vec<TaskRef>,
    /// Redirections applied while walking the dependencies.
    pub used: BTreeMap<ArcStr, ArcStr>,
    /// Desired outputs a partial walk could not reach from the seeds.
    pub unsatisfied: PropertyList,
}

/// The declared property lists of a task under one alias context, cloned
/// out so the walk can recurse without holding a borrow of the task.
struct Declared {
    outputs: Vec<ArcStr>,
    dependencies: Vec<PropertySpec>,
    consuming: Vec<ArcStr>,
}

/// Walks backwards from the desired outputs and appends every task after
/// its dependencies.
pub(crate) struct Selector<'a, 'p> {
    method: &'a Method,
    aliases: &'a ParamAliases<'p>,
    fixed: &'a PropertyList,
    desired: &'a PropertyList,
    /// Names produced by selected tasks or deemed external.
    visited: HashSet<ArcStr>,
    /// Outputs of tasks whose dependencies are still being walked.
    active: HashSet<ArcStr>,
    /// Requested names leading to the current task, for cycle reports.
    path: Vec<ArcStr>,
    items: Vec<TaskRef>,
    used: BTreeMap<ArcStr, ArcStr>,
    unsatisfied: PropertyList,
}

impl<'a, 'p> Selector<'a, 'p> {
    pub fn new(
        method: &'a Method,
        aliases: &'a ParamAliases<'p>,
        fixed: &'a PropertyList,
        desired: &'a PropertyList,
    ) -> Self {
        Self {
            method,
            aliases,
            fixed,
            desired,
            visited: HashSet::new(),
            active: HashSet::new(),
            path: Vec::new(),
            items: Vec::new(),
            used: BTreeMap::new(),
            unsatisfied: PropertyList::new(),
        }
    }

    /// Selects every task needed for the desired outputs.
    pub fn full(mut self, strict: bool) -> Result<Selection, PipelineError> {
        self.visited.extend(self.fixed.names().cloned());

        for spec in self.desired {
            self.visit(spec, strict)?;
        }

        Ok(self.finish())
    }

    /// Selects only the tasks that depend on one of `seeds`, under `policy`.
    pub fn partial(
        mut self,
        seeds: &[ArcStr],
        policy: ParametrizationPolicy,
    ) -> Result<Selection, PipelineError> {
        self.visited.extend(seeds.iter().cloned());

        for spec in self.desired {
            if !self.visit_parametrized(spec, policy)? {
                self.unsatisfied.insert_back(spec.clone());
            }
        }

        Ok(self.finish())
    }

    fn finish(self) -> Selection {
        tracing::debug!(
            items = self.items.len(),
            unsatisfied = self.unsatisfied.len(),
            "selected tasks"
        );

        Selection {
            items: self.items,
            used: self.used,
            unsatisfied: self.unsatisfied,
        }
    }

    fn resolve(&mut self, name: &ArcStr) -> Result<ArcStr, PipelineError> {
        resolve_name(name, self.aliases, &mut self.used)
    }

    fn declared(&mut self, task: &dyn Task) -> Result<Declared, PipelineError> {
        task.prepare(self.aliases)?;

        let mut outputs = Vec::new();
        for name in task.output_specs().names() {
            outputs.push(self.resolve(name)?);
        }

        let mut dependencies = Vec::new();
        dependencies.extend(task.input_specs(self.aliases).iter().cloned());
        dependencies.extend(task.filter_specs(self.aliases).iter().cloned());

        let mut consuming = Vec::new();
        for spec in task.consuming_specs(self.aliases).iter() {
            consuming.push(self.resolve(&spec.name)?);
            dependencies.push(spec.clone());
        }

        Ok(Declared {
            outputs,
            dependencies,
            consuming,
        })
    }

    fn cycle(&self, name: ArcStr) -> PipelineError {
        let mut path = self.path.clone();
        path.push(name.clone());
        PipelineError::DependencyCycle { name, path }
    }

    fn enter(&mut self, name: ArcStr, declared: &Declared) {
        self.path.push(name);
        self.active.extend(declared.outputs.iter().cloned());
    }

    fn leave(&mut self, declared: &Declared) {
        self.path.pop();
        for name in &declared.outputs {
            self.active.remove(name);
        }
    }

    fn include(&mut self, task: TaskRef, declared: &Declared) {
        for name in &declared.consuming {
            self.visited.remove(name);
        }

        tracing::debug!(task = task.name(), "selected task");
        self.items.push(task);
    }

    fn visit(&mut self, spec: &PropertySpec, strict: bool) -> Result<(), PipelineError> {
        let name = self.resolve(&spec.name)?;

        if self.active.contains(&name) {
            return Err(self.cycle(name));
        }
        if self.visited.contains(&name) {
            return Ok(());
        }

        let Some(task) = self.method.get_task(&name).cloned() else {
            if strict && !self.desired.contains(&name) {
                return Err(PipelineError::MissingProducer { name });
            }

            tracing::trace!(property = &*name, "no producer, treating as input");
            self.visited.insert(name);
            return Ok(());
        };

        let declared = self.declared(&*task)?;
        self.visited.extend(declared.outputs.iter().cloned());
        self.enter(name, &declared);

        for dependency in &declared.dependencies {
            self.visit(dependency, strict)?;
        }

        self.leave(&declared);
        self.include(task, &declared);
        Ok(())
    }

    /// Returns whether the property is satisfied from the seeds, either by
    /// being one or through a producer included under `policy`.
    fn visit_parametrized(
        &mut self,
        spec: &PropertySpec,
        policy: ParametrizationPolicy,
    ) -> Result<bool, PipelineError> {
        let name = self.resolve(&spec.name)?;

        if self.visited.contains(&spec.name) || self.visited.contains(&name) {
            return Ok(true);
        }
        if self.active.contains(&name) {
            return Err(self.cycle(name));
        }
        if self.fixed.contains(&name) {
            return Ok(false);
        }

        let Some(task) = self.method.get_task(&name).cloned() else {
            return Ok(false);
        };

        let declared = self.declared(&*task)?;
        self.enter(name, &declared);

        let indirect = policy.indirect();
        let mut parametrized = false;
        for dependency in &declared.dependencies {
            parametrized |= self.visit_parametrized(dependency, indirect)?;
        }

        self.leave(&declared);

        if !parametrized && policy == ParametrizationPolicy::ParametrizedDependencies {
            return Ok(false);
        }

        self.visited.extend(declared.outputs.iter().cloned());
        self.include(task, &declared);
        Ok(true)
    }
}
