use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::ArcStr;
use crate::engine::{Method, TaskRef};

/// The pipeline stage a task can be used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
    Compose,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Vertex, Stage::Fragment, Stage::Compute, Stage::Compose];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "Vertex",
            Stage::Fragment => "Fragment",
            Stage::Compute => "Compute",
            Stage::Compose => "Compose",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

struct StageRegistry {
    tasks: Vec<TaskRef>,
    fallbacks: Vec<Arc<Method>>,
    snapshot: Arc<Method>,
}

impl StageRegistry {
    fn new(stage: Stage) -> Self {
        Self {
            tasks: Vec::new(),
            fallbacks: Vec::new(),
            snapshot: Arc::new(Method::empty(stage.name())),
        }
    }

    fn rebuild(&mut self, stage: Stage) {
        self.snapshot = Arc::new(
            Method::builder(stage.name())
                .tasks(self.tasks.iter().cloned())
                .fallbacks(self.fallbacks.iter().cloned())
                .finish(),
        );
    }
}

struct Registry {
    stages: [StageRegistry; 4],
    property_options: BTreeMap<ArcStr, Vec<ArcStr>>,
    compositor_outputs: Vec<ArcStr>,
}

/// All tasks known to a renderer, sorted into per-stage [`Method`]s.
///
/// Every registration replaces the affected stage's method wholesale instead
/// of mutating it. A resolution that already holds a method keeps working on
/// that snapshot, while later resolutions see the new tasks.
pub struct MethodCollection {
    registry: RwLock<Registry>,
}

impl MethodCollection {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                stages: Stage::ALL.map(StageRegistry::new),
                property_options: BTreeMap::new(),
                compositor_outputs: Vec::new(),
            }),
        }
    }

    /// Registers `task` for every stage in `stages`.
    pub fn register_task(&self, task: TaskRef, stages: impl IntoIterator<Item = Stage>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);

        for stage in stages {
            let entry = &mut registry.stages[stage.index()];
            entry.tasks.push(task.clone());
            entry.rebuild(stage);
            tracing::debug!(task = task.name(), stage = stage.name(), "registered task");
        }
    }

    /// Adds a method consulted for `stage` after all registered tasks.
    pub fn add_fallback(&self, stage: Stage, method: Arc<Method>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);

        let entry = &mut registry.stages[stage.index()];
        entry.fallbacks.push(method);
        entry.rebuild(stage);
    }

    /// The current method snapshot of `stage`.
    pub fn method(&self, stage: Stage) -> Arc<Method> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.stages[stage.index()].snapshot.clone()
    }

    /// Records `option` as one of the properties that can provide `output`.
    pub fn register_property_option(&self, output: impl Into<ArcStr>, option: impl Into<ArcStr>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry
            .property_options
            .entry(output.into())
            .or_default()
            .push(option.into());
    }

    /// All registered options for `output`, in registration order.
    pub fn property_options(&self, output: &str) -> Vec<ArcStr> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .property_options
            .get(output)
            .cloned()
            .unwrap_or_default()
    }

    pub fn property_options_map(&self) -> BTreeMap<ArcStr, Vec<ArcStr>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.property_options.clone()
    }

    pub fn register_compositor_output(&self, output: impl Into<ArcStr>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.compositor_outputs.push(output.into());
    }

    pub fn compositor_outputs(&self) -> Vec<ArcStr> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.compositor_outputs.clone()
    }
}

impl Default for MethodCollection {
    fn default() -> Self {
        Self::new()
    }
}
