use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::ArcStr;
use crate::engine::TaskRef;

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// An ordered registry of tasks plus an ordered list of fallback methods.
///
/// A method answers one question: which task produces a given property. Its
/// own tasks are searched first, in registration order, then each fallback
/// method in turn; the first match wins. Not finding a producer is not an
/// error here, it means the property has to be supplied from outside.
///
/// Methods are immutable. Registering more tasks means building a new
/// method, which keeps any resolution that already holds the old one
/// consistent. Every method gets a process-unique [`id`](Method::id) that
/// caches use as its version.
pub struct Method {
    id: u64,
    name: Cow<'static, str>,
    tasks: Vec<TaskRef>,
    fallbacks: Vec<Arc<Method>>,
    /// Output name → index of the first own task producing it.
    producers: HashMap<ArcStr, usize>,
}

impl Method {
    pub fn builder(name: impl Into<Cow<'static, str>>) -> MethodBuilder {
        MethodBuilder {
            name: name.into(),
            tasks: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    /// A method without any tasks, which never finds a producer.
    pub fn empty(name: impl Into<Cow<'static, str>>) -> Self {
        Self::builder(name).finish()
    }

    /// The first task producing `output`, searching own tasks before the
    /// fallback methods.
    pub fn get_task(&self, output: &str) -> Option<&TaskRef> {
        if let Some(&index) = self.producers.get(output) {
            return Some(&self.tasks[index]);
        }

        self.fallbacks
            .iter()
            .find_map(|fallback| fallback.get_task(output))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[TaskRef] {
        &self.tasks
    }

    pub fn fallbacks(&self) -> &[Arc<Method>] {
        &self.fallbacks
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

/// Builder returned by [`Method::builder`].
pub struct MethodBuilder {
    name: Cow<'static, str>,
    tasks: Vec<TaskRef>,
    fallbacks: Vec<Arc<Method>>,
}

impl MethodBuilder {
    pub fn task(mut self, task: TaskRef) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = TaskRef>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn fallback(mut self, method: Arc<Method>) -> Self {
        self.fallbacks.push(method);
        self
    }

    pub fn fallbacks(mut self, methods: impl IntoIterator<Item = Arc<Method>>) -> Self {
        self.fallbacks.extend(methods);
        self
    }

    pub fn finish(self) -> Method {
        let mut producers = HashMap::new();

        for (index, task) in self.tasks.iter().enumerate() {
            for name in task.output_specs().names() {
                producers.entry(name.clone()).or_insert(index);
            }
        }

        Method {
            id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            tasks: self.tasks,
            fallbacks: self.fallbacks,
            producers,
        }
    }
}
