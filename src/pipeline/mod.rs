//! The declarative pipeline resolver.
//!
//! Given a [`Method`] and a list of desired outputs, the resolver derives
//! which tasks have to run, in which order, and what role every property
//! touched along the way plays. It works in two phases:
//!
//! * **Selection** walks backwards from the desired outputs, asking the
//!   method for the producer of every missing property, and appends each
//!   task after all of its dependencies. Iterating the resulting list
//!   forwards is always a valid execution order.
//! * **Classification** simulates the selected tasks forwards and sorts
//!   every property into exactly one of six roles: input, output,
//!   consuming, filter, pipethrough or local.
//!
//! Built pipelines are immutable. When anything they were built from
//! changes, they are thrown away and built again.

mod cache;
mod classify;
mod export;
mod select;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::PlanOptions;
use crate::core::{ArcStr, hash_one};
use crate::engine::{Method, TaskRef};
use crate::error::PipelineError;
use crate::params::{ParamAliases, PropertyList, PropertySpec};

pub use crate::pipeline::cache::{PipelineCache, PipelineKey};
pub use crate::pipeline::export::{PipelineSummary, SpecSummary};

/// The role a property plays in a built pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Set before running the pipeline and not modified by it.
    Input,
    /// Set by the pipeline and requested as a desired output.
    Output,
    /// Set before running the pipeline and gone afterwards.
    Consuming,
    /// Set before running the pipeline, still there afterwards, but possibly
    /// modified.
    Filter,
    /// A desired output that is passed from the inputs untouched.
    Pipethrough,
    /// Set by the pipeline for internal use only.
    Local,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Input => write!(f, "an input property"),
            Role::Output => write!(f, "an output property"),
            Role::Consuming => write!(f, "a consumed property"),
            Role::Filter => write!(f, "a true filter property"),
            Role::Pipethrough => write!(f, "a pipethrough property"),
            Role::Local => write!(f, "a local property"),
        }
    }
}

/// The alias-resolved property lists of one pipeline item, i.e. the names
/// the executor reads from and writes to.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub inputs: PropertyList,
    pub filters: PropertyList,
    pub consuming: PropertyList,
    pub outputs: PropertyList,
}

/// A resolved pipeline: the ordered tasks and the classified properties.
#[derive(Debug)]
pub struct Pipeline {
    items: Vec<TaskRef>,
    bindings: Vec<Binding>,
    used_aliases: ParamAliases<'static>,
    fixed_specs: PropertyList,
    desired_specs: PropertyList,
    input_specs: PropertyList,
    output_specs: PropertyList,
    consuming_specs: PropertyList,
    filter_specs: PropertyList,
    pipethrough_specs: PropertyList,
    local_specs: PropertyList,
    unsatisfied_specs: PropertyList,
}

impl Pipeline {
    /// Resolves every task needed to produce `desired` using `method`.
    pub fn build(
        method: &Method,
        desired: &PropertyList,
        aliases: &ParamAliases<'_>,
    ) -> Result<Self, PipelineError> {
        PipelineBuilder::new(method, desired, aliases).build()
    }

    /// Resolves only the tasks that transitively depend on one of `seeds`,
    /// which mark properties pulled in from an enclosing scope. Desired
    /// outputs that don't depend on any seed are left for the enclosing
    /// pipeline.
    pub fn build_partial<I, S>(
        method: &Method,
        seeds: I,
        desired: &PropertyList,
        aliases: &ParamAliases<'_>,
    ) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<ArcStr>,
    {
        PipelineBuilder::new(method, desired, aliases)
            .partial(seeds)
            .build()
    }

    /// Tasks in execution order.
    pub fn items(&self) -> &[TaskRef] {
        &self.items
    }

    /// Resolved property lists of each item, parallel to [`items`](Self::items).
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Every proxy → provider redirection applied while building.
    pub fn used_aliases(&self) -> &ParamAliases<'static> {
        &self.used_aliases
    }

    /// Inputs declared as fixed by the caller, after aliasing.
    pub fn fixed_specs(&self) -> &PropertyList {
        &self.fixed_specs
    }

    /// Desired outputs, after aliasing.
    pub fn desired_specs(&self) -> &PropertyList {
        &self.desired_specs
    }

    pub fn input_specs(&self) -> &PropertyList {
        &self.input_specs
    }

    pub fn output_specs(&self) -> &PropertyList {
        &self.output_specs
    }

    pub fn consuming_specs(&self) -> &PropertyList {
        &self.consuming_specs
    }

    pub fn filter_specs(&self) -> &PropertyList {
        &self.filter_specs
    }

    pub fn pipethrough_specs(&self) -> &PropertyList {
        &self.pipethrough_specs
    }

    pub fn local_specs(&self) -> &PropertyList {
        &self.local_specs
    }

    /// Desired outputs a partial resolution could not satisfy from its seeds,
    /// left for an enclosing pipeline. Always empty for full resolutions.
    pub fn unsatisfied_outputs(&self) -> &PropertyList {
        &self.unsatisfied_specs
    }

    /// Desired outputs satisfied by this pipeline, in desired order.
    pub fn satisfied_outputs(&self) -> impl Iterator<Item = &PropertySpec> + '_ {
        self.desired_specs
            .iter()
            .filter(|spec| !self.unsatisfied_specs.contains(&spec.name))
    }

    /// The role of the (resolved) property `name`, if the pipeline touches it.
    pub fn role_of(&self, name: &str) -> Option<Role> {
        self.roles()
            .into_iter()
            .find_map(|(role, specs)| specs.contains(name).then_some(role))
    }

    /// The six classified lists, tagged with their role.
    pub fn roles(&self) -> [(Role, &PropertyList); 6] {
        [
            (Role::Input, &self.input_specs),
            (Role::Output, &self.output_specs),
            (Role::Consuming, &self.consuming_specs),
            (Role::Filter, &self.filter_specs),
            (Role::Pipethrough, &self.pipethrough_specs),
            (Role::Local, &self.local_specs),
        ]
    }

    /// Checks that every desired output is produced by the pipeline itself,
    /// rather than being filtered in place or passed through.
    pub fn require_outputs(&self) -> Result<(), PipelineError> {
        for spec in &self.desired_specs {
            match self.role_of(&spec.name) {
                Some(Role::Output) => {}
                Some(role) => {
                    return Err(PipelineError::Classification {
                        scope: self.pipeline_id(),
                        name: spec.name.clone(),
                        role,
                    });
                }
                None => {
                    return Err(PipelineError::OutputNotFound {
                        scope: self.pipeline_id(),
                        name: spec.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Configures and runs a single pipeline resolution.
///
/// ```
/// use tessera::{Method, ParamAliases, PipelineBuilder, PropertyList, PropertySpec, StaticTask};
///
/// let shade = StaticTask::define("Shade")
///     .input(PropertySpec::of::<[f32; 3]>("normal"))
///     .output(PropertySpec::of::<[f32; 4]>("color"))
///     .finish();
/// let method = Method::builder("Forward").task(shade).finish();
/// let desired: PropertyList = [PropertySpec::of::<[f32; 4]>("color")].into_iter().collect();
///
/// let pipeline = PipelineBuilder::new(&method, &desired, &ParamAliases::new())
///     .build()
///     .unwrap();
///
/// assert_eq!(pipeline.items().len(), 1);
/// assert!(pipeline.input_specs().contains("normal"));
/// ```
#[derive(Clone)]
pub struct PipelineBuilder<'a> {
    method: &'a Method,
    desired: &'a PropertyList,
    aliases: &'a ParamAliases<'a>,
    fixed: PropertyList,
    seeds: Option<Vec<ArcStr>>,
    options: PlanOptions,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        method: &'a Method,
        desired: &'a PropertyList,
        aliases: &'a ParamAliases<'a>,
    ) -> Self {
        Self {
            method,
            desired,
            aliases,
            fixed: PropertyList::new(),
            seeds: None,
            options: PlanOptions::default(),
        }
    }

    /// Properties supplied by the caller. No producer is looked up for them
    /// and they are simulated as existing before the first task runs.
    pub fn fixed_inputs(mut self, fixed: PropertyList) -> Self {
        self.fixed = fixed;
        self
    }

    /// Turns the resolution into a partial one, seeded with `seeds`.
    pub fn partial<I, S>(mut self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ArcStr>,
    {
        self.seeds = Some(seeds.into_iter().map(Into::into).collect());
        self
    }

    pub fn options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    /// The cache key identifying the pipeline this builder produces.
    pub fn key(&self) -> PipelineKey {
        PipelineKey {
            method: self.method.id(),
            desired: self.desired.hash(),
            aliases: self.aliases.hash(),
            fixed: self.fixed.hash(),
            seeds: self.seeds.as_ref().map(|seeds| {
                let seeds: BTreeSet<&str> = seeds.iter().map(|seed| &**seed).collect();
                hash_one(&seeds)
            }),
            options: self.options,
        }
    }

    pub fn build(&self) -> Result<Pipeline, PipelineError> {
        let span = tracing::debug_span!(
            "pipeline_build",
            method = self.method.name(),
            outputs = self.desired.len(),
            aliases = self.aliases.hash(),
            partial = self.seeds.is_some(),
        );
        let _enter = span.enter();

        let mut used = BTreeMap::new();
        let desired = resolve_list(self.desired, self.aliases, &mut used)?;
        let fixed = resolve_list(&self.fixed, self.aliases, &mut used)?;

        let selector = select::Selector::new(self.method, self.aliases, &fixed, &desired);
        let selection = match &self.seeds {
            None => selector.full(self.options.strict)?,
            Some(seeds) => selector.partial(seeds, self.options.policy)?,
        };
        used.extend(selection.used);

        let classes = classify::classify(&selection.items, &fixed, &desired, self.aliases, &mut used)?;

        tracing::debug!(
            items = selection.items.len(),
            inputs = classes.inputs.len(),
            outputs = classes.outputs.len(),
            consuming = classes.consuming.len(),
            filters = classes.filters.len(),
            pipethrough = classes.pipethrough.len(),
            locals = classes.locals.len(),
            "pipeline resolved"
        );

        Ok(Pipeline {
            items: selection.items,
            bindings: classes.bindings,
            used_aliases: ParamAliases::from_pairs(used),
            fixed_specs: fixed,
            desired_specs: desired,
            input_specs: classes.inputs,
            output_specs: classes.outputs,
            consuming_specs: classes.consuming,
            filter_specs: classes.filters,
            pipethrough_specs: classes.pipethrough,
            local_specs: classes.locals,
            unsatisfied_specs: selection.unsatisfied,
        })
    }
}

/// Renames every spec of `list` to its provider under `aliases`, recording
/// each applied redirection in `used`.
pub(crate) fn resolve_list(
    list: &PropertyList,
    aliases: &ParamAliases<'_>,
    used: &mut BTreeMap<ArcStr, ArcStr>,
) -> Result<PropertyList, PipelineError> {
    let mut resolved = PropertyList::new();

    for spec in list {
        let name = resolve_name(&spec.name, aliases, used)?;
        resolved.insert_back(spec.renamed(name));
    }

    Ok(resolved)
}

pub(crate) fn resolve_name(
    name: &ArcStr,
    aliases: &ParamAliases<'_>,
    used: &mut BTreeMap<ArcStr, ArcStr>,
) -> Result<ArcStr, PipelineError> {
    let choice = aliases.choice_for(name)?;

    if choice != *name {
        used.insert(name.clone(), choice.clone());
    }

    Ok(choice)
}

#[cfg(test)]
mod tests;
