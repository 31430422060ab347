//! Tasks that wrap a whole sub-pipeline behind their own aliases.
//!
//! A [`ScopedTask`] advertises a fixed list of outputs, but which tasks
//! actually produce them is decided by the aliases of the scope, layered
//! over whatever aliases the enclosing pipeline resolves it under. For each
//! distinct set of enclosing aliases the scope resolves a partial pipeline
//! containing only the tasks that depend on its own aliases, and exposes the
//! inputs, filters and consumed properties of that pipeline as its own.
//! Everything else is left for the enclosing pipeline to schedule.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ParametrizationPolicy, PlanOptions};
use crate::core::ArcStr;
use crate::engine::{Method, Task};
use crate::error::PipelineError;
use crate::params::{ParamAliases, PropertyList};
use crate::pipeline::{Pipeline, PipelineBuilder, Role};

/// The sub-pipeline resolved for one set of enclosing aliases.
#[derive(Debug)]
pub struct ScopedPlan {
    pipeline: Pipeline,
    finishing: BTreeMap<ArcStr, ArcStr>,
    inputs: PropertyList,
    filters: PropertyList,
    consuming: PropertyList,
}

impl ScopedPlan {
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Inner property → desired output name, i.e. the copies an executor
    /// has to make after running the sub-pipeline. Void outputs are omitted.
    pub fn finishing(&self) -> &BTreeMap<ArcStr, ArcStr> {
        &self.finishing
    }

    pub fn input_specs(&self) -> &PropertyList {
        &self.inputs
    }

    pub fn filter_specs(&self) -> &PropertyList {
        &self.filters
    }

    pub fn consuming_specs(&self) -> &PropertyList {
        &self.consuming
    }
}

/// A task producing its outputs through a nested, alias-parametrized
/// pipeline.
///
/// Every desired output has to be redirected by the scope's aliases,
/// otherwise the scope would simply shadow the enclosing producer.
pub struct ScopedTask {
    name: String,
    aliases: ParamAliases<'static>,
    desired: PropertyList,
    method: Arc<Method>,
    /// Keyed by the hash of the enclosing aliases.
    plans: RwLock<HashMap<u64, Arc<ScopedPlan>>>,
}

impl ScopedTask {
    pub fn new(
        name: impl Into<String>,
        aliases: ParamAliases<'static>,
        desired: PropertyList,
        method: Arc<Method>,
    ) -> Self {
        Self {
            name: name.into(),
            aliases,
            desired,
            method,
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// The scope's aliases layered over `external`.
    pub fn contained_aliases<'a>(&'a self, external: &'a ParamAliases<'a>) -> ParamAliases<'a> {
        ParamAliases::with_parents([&self.aliases, external], std::iter::empty::<(ArcStr, ArcStr)>())
    }

    /// The already resolved plan for `external`, if any.
    pub fn plan(&self, external: &ParamAliases<'_>) -> Option<Arc<ScopedPlan>> {
        let plans = self.plans.read().unwrap_or_else(PoisonError::into_inner);
        plans.get(&external.hash()).cloned()
    }

    /// The plan for `external`, resolving it first if needed.
    pub fn plan_or_build(&self, external: &ParamAliases<'_>) -> Result<Arc<ScopedPlan>, PipelineError> {
        if let Some(plan) = self.plan(external) {
            return Ok(plan);
        }

        let plan = Arc::new(self.build_plan(external)?);
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        Ok(plans.entry(external.hash()).or_insert(plan).clone())
    }

    /// Drops the plan for `external` together with anything its items built
    /// for the scope. Returns whether a plan existed.
    pub fn forget(&self, external: &ParamAliases<'_>) -> bool {
        let removed = {
            let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
            plans.remove(&external.hash())
        };

        let Some(plan) = removed else {
            return false;
        };

        let contained = self.contained_aliases(external);
        for item in plan.pipeline.items() {
            item.invalidate(&contained);
        }

        tracing::debug!(scope = %self.name, "forgot scoped plan");
        true
    }

    /// Resolves the plan for `external` again from scratch.
    pub fn rebuild(&self, external: &ParamAliases<'_>) -> Result<Arc<ScopedPlan>, PipelineError> {
        self.forget(external);
        self.plan_or_build(external)
    }

    /// Number of memoized plans.
    pub fn plan_count(&self) -> usize {
        let plans = self.plans.read().unwrap_or_else(PoisonError::into_inner);
        plans.len()
    }

    fn build_plan(&self, external: &ParamAliases<'_>) -> Result<ScopedPlan, PipelineError> {
        let span = tracing::debug_span!("scoped_plan", scope = %self.name, aliases = external.hash());
        let _enter = span.enter();

        let contained = self.contained_aliases(external);

        for spec in &self.desired {
            if contained.choice_for(&spec.name)? == spec.name {
                return Err(PipelineError::NotAliased {
                    scope: self.name.clone(),
                    name: spec.name.clone(),
                });
            }
        }

        let seeds: Vec<ArcStr> = contained
            .flatten()?
            .into_keys()
            .filter(|proxy| !self.desired.contains(proxy))
            .collect();

        let options = PlanOptions::default().policy(ParametrizationPolicy::ParametrizedOrDirectDependencies);
        let pipeline = PipelineBuilder::new(&self.method, &self.desired, &contained)
            .partial(seeds)
            .options(options)
            .build()?;

        let mut finishing = BTreeMap::new();

        for spec in &self.desired {
            let inner = contained.choice_for(&spec.name)?;

            match pipeline.role_of(&inner) {
                Some(Role::Output | Role::Filter | Role::Pipethrough) => {
                    if !spec.ty.is_void() {
                        finishing.insert(inner, spec.name.clone());
                    }
                }
                Some(role) => {
                    return Err(PipelineError::Classification {
                        scope: self.name.clone(),
                        name: spec.name.clone(),
                        role,
                    });
                }
                None => {
                    return Err(PipelineError::OutputNotFound {
                        scope: self.name.clone(),
                        name: spec.name.clone(),
                    });
                }
            }
        }

        Ok(ScopedPlan {
            inputs: pipeline.input_specs().clone(),
            filters: pipeline.filter_specs().clone(),
            consuming: pipeline.consuming_specs().clone(),
            finishing,
            pipeline,
        })
    }

    fn planned(&self, aliases: &ParamAliases<'_>, select: fn(&ScopedPlan) -> &PropertyList) -> Cow<'_, PropertyList> {
        match self.plan(aliases) {
            Some(plan) => Cow::Owned(select(&plan).clone()),
            None => Cow::Owned(PropertyList::new()),
        }
    }
}

impl Task for ScopedTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_specs(&self) -> &PropertyList {
        &self.desired
    }

    fn input_specs(&self, aliases: &ParamAliases<'_>) -> Cow<'_, PropertyList> {
        self.planned(aliases, ScopedPlan::input_specs)
    }

    fn filter_specs(&self, aliases: &ParamAliases<'_>) -> Cow<'_, PropertyList> {
        self.planned(aliases, ScopedPlan::filter_specs)
    }

    fn consuming_specs(&self, aliases: &ParamAliases<'_>) -> Cow<'_, PropertyList> {
        self.planned(aliases, ScopedPlan::consuming_specs)
    }

    fn prepare(&self, aliases: &ParamAliases<'_>) -> Result<(), PipelineError> {
        self.plan_or_build(aliases).map(|_| ())
    }

    fn invalidate(&self, aliases: &ParamAliases<'_>) {
        self.forget(aliases);
    }
}
