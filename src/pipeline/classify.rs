use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::ArcStr;
use crate::engine::TaskRef;
use crate::error::PipelineError;
use crate::params::{ParamAliases, PropertyList, PropertySpec};
use crate::pipeline::{Binding, resolve_name};

/// Result of property classification.
pub(crate) struct Classes {
    pub inputs: PropertyList,
    pub outputs: PropertyList,
    pub consuming: PropertyList,
    pub filters: PropertyList,
    pub pipethrough: PropertyList,
    pub locals: PropertyList,
    pub bindings: Vec<Binding>,
}

/// Forward simulation of which properties exist at each point.
#[derive(Default)]
struct Simulation {
    /// Required while not alive, so they have to come from outside.
    missing: HashSet<ArcStr>,
    /// Every touched property with its first-seen type.
    ever_used: PropertyList,
    /// Who first used each property, for mismatch reports.
    first_by: HashMap<ArcStr, String>,
    alive: HashSet<ArcStr>,
    /// Set at least once by an output or a filter.
    modified: HashSet<ArcStr>,
}

impl Simulation {
    fn require(&mut self, spec: &PropertySpec, by: &str) -> Result<(), PipelineError> {
        if self.alive.contains(&spec.name) {
            return Ok(());
        }

        if self.ever_used.contains(&spec.name) {
            return Err(PipelineError::ConsumedThenRequired {
                name: spec.name.clone(),
                by: by.to_string(),
            });
        }

        self.missing.insert(spec.name.clone());
        self.alive.insert(spec.name.clone());
        Ok(())
    }

    fn track(&mut self, spec: &PropertySpec, by: &str) -> Result<(), PipelineError> {
        match self.ever_used.get(&spec.name) {
            Some(first) if first.ty != spec.ty => Err(PipelineError::TypeMismatch {
                name: spec.name.clone(),
                first: first.ty.clone(),
                first_by: self.first_by.get(&spec.name).cloned().unwrap_or_default(),
                later: spec.ty.clone(),
                later_by: by.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.ever_used.insert_back(spec.clone());
                self.first_by.insert(spec.name.clone(), by.to_string());
                Ok(())
            }
        }
    }

    fn set(&mut self, spec: &PropertySpec) {
        self.alive.insert(spec.name.clone());
        self.modified.insert(spec.name.clone());
    }

    fn consume(&mut self, spec: &PropertySpec) {
        self.alive.remove(&spec.name);
    }
}

/// Renames each spec of `list` on its own. Two specs aliased to the same
/// provider both stay, so each of them gets type-checked.
fn resolve_each(
    list: &PropertyList,
    aliases: &ParamAliases<'_>,
    used: &mut BTreeMap<ArcStr, ArcStr>,
) -> Result<Vec<PropertySpec>, PipelineError> {
    list.iter()
        .map(|spec| Ok(spec.renamed(resolve_name(&spec.name, aliases, used)?)))
        .collect()
}

/// Sorts every property touched by `items` into exactly one role.
///
/// `fixed` and `desired` must already be alias-resolved.
pub(crate) fn classify(
    items: &[TaskRef],
    fixed: &PropertyList,
    desired: &PropertyList,
    aliases: &ParamAliases<'_>,
    used: &mut BTreeMap<ArcStr, ArcStr>,
) -> Result<Classes, PipelineError> {
    let mut sim = Simulation::default();

    for spec in fixed {
        sim.require(spec, "fixed inputs")?;
        sim.track(spec, "fixed inputs")?;
    }

    let mut bindings = Vec::with_capacity(items.len());

    for task in items {
        let by = format!("task '{}'", task.name());
        let inputs = resolve_each(&task.input_specs(aliases), aliases, used)?;
        let filters = resolve_each(&task.filter_specs(aliases), aliases, used)?;
        let consuming = resolve_each(&task.consuming_specs(aliases), aliases, used)?;
        let outputs = resolve_each(task.output_specs(), aliases, used)?;

        for spec in &inputs {
            sim.require(spec, &by)?;
            sim.track(spec, &by)?;
        }
        for spec in &consuming {
            sim.require(spec, &by)?;
            sim.track(spec, &by)?;
            sim.consume(spec);
        }
        for spec in &outputs {
            sim.track(spec, &by)?;
            sim.set(spec);
        }
        for spec in &filters {
            sim.require(spec, &by)?;
            sim.track(spec, &by)?;
            sim.set(spec);
        }

        bindings.push(Binding {
            inputs: inputs.into_iter().collect(),
            filters: filters.into_iter().collect(),
            consuming: consuming.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
        });
    }

    for spec in desired {
        sim.require(spec, "pipeline outputs")?;
        sim.track(spec, "pipeline outputs")?;
    }

    let mut classes = Classes {
        inputs: PropertyList::new(),
        outputs: PropertyList::new(),
        consuming: PropertyList::new(),
        filters: PropertyList::new(),
        pipethrough: PropertyList::new(),
        locals: PropertyList::new(),
        bindings,
    };

    for spec in &sim.ever_used {
        let is_desired = desired.contains(&spec.name);

        let target = if sim.missing.contains(&spec.name) {
            if !sim.alive.contains(&spec.name) {
                &mut classes.consuming
            } else if sim.modified.contains(&spec.name) {
                &mut classes.filters
            } else if is_desired {
                &mut classes.pipethrough
            } else {
                &mut classes.inputs
            }
        } else if is_desired {
            &mut classes.outputs
        } else {
            &mut classes.locals
        };

        target.insert_back(spec.clone());
    }

    Ok(classes)
}
