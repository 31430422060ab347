use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rayon::prelude::*;

use crate::config::PlanOptions;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineBuilder};

/// Everything a built pipeline depends on.
///
/// Methods are immutable and carry a process-unique id, so the id doubles as
/// the method version. Lists and aliases contribute their structural hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub method: u64,
    pub desired: u64,
    pub aliases: u64,
    pub fixed: u64,
    pub seeds: Option<u64>,
    pub options: PlanOptions,
}

/// A store of built pipelines.
///
/// Entries are never patched. Whatever invalidates a pipeline drops it and
/// the next request builds a fresh one.
#[derive(Default)]
pub struct PipelineCache {
    entries: RwLock<HashMap<PipelineKey, Arc<Pipeline>>>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline for `builder`, building it on a miss.
    ///
    /// The build runs without holding the lock. Should two threads race on
    /// the same key, the first inserted pipeline wins and both get it.
    pub fn get_or_build(&self, builder: &PipelineBuilder<'_>) -> Result<Arc<Pipeline>, PipelineError> {
        let key = builder.key();

        if let Some(pipeline) = self.get(&key) {
            tracing::debug!(?key, "pipeline cache hit");
            return Ok(pipeline);
        }

        tracing::debug!(?key, "pipeline cache miss");
        let pipeline = Arc::new(builder.build()?);
        Ok(self.insert(key, pipeline))
    }

    pub fn get(&self, key: &PipelineKey) -> Option<Arc<Pipeline>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn insert(&self, key: PipelineKey, pipeline: Arc<Pipeline>) -> Arc<Pipeline> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key).or_insert(pipeline).clone()
    }

    /// Builds every missing pipeline of `builders` in parallel. Returns how
    /// many were built.
    pub fn warm(&self, builders: &[PipelineBuilder<'_>]) -> Result<usize, PipelineError> {
        let built = builders
            .par_iter()
            .map(|builder| (builder.key(), builder))
            .filter(|(key, _)| self.get(key).is_none())
            .map(|(key, builder)| -> Result<_, PipelineError> {
                Ok((key, Arc::new(builder.build()?)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = built.len();
        for (key, pipeline) in built {
            self.insert(key, pipeline);
        }

        tracing::debug!(count, "warmed pipeline cache");
        Ok(count)
    }

    /// Drops the pipeline stored under `key`. Returns whether it existed.
    pub fn invalidate(&self, key: &PipelineKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).is_some()
    }

    /// Drops every pipeline.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(count = entries.len(), "invalidating pipeline cache");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
