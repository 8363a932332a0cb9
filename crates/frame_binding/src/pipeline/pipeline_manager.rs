//! Pipeline manager for the binder's pipeline variants
//!
//! Validates layouts, asks the backend to build pipelines and hands out
//! stable keys. Variants sharing a shader pair share one pipeline.

use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;

use super::{PipelineLayoutDesc, PipelineVariant, ShaderPair};
use crate::backend::PipelineFactory;
use crate::error::{BindingError, BindingResult};
use crate::layout::LayoutTable;

new_key_type! {
    /// Handle of a created pipeline
    pub struct PipelineKey;
}

/// A created pipeline with the layout it was validated against
#[derive(Debug, Clone)]
pub struct PipelineEntry<P> {
    /// Merged set layouts
    pub layout: PipelineLayoutDesc,
    /// Backend pipeline object
    pub handle: P,
}

/// Registry of created pipelines
#[derive(Debug)]
pub struct PipelineManager<P> {
    pipelines: SlotMap<PipelineKey, PipelineEntry<P>>,
    by_pair: HashMap<ShaderPair, PipelineKey>,
    by_variant: HashMap<PipelineVariant, PipelineKey>,
}

impl<P> Default for PipelineManager<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PipelineManager<P> {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            pipelines: SlotMap::with_key(),
            by_pair: HashMap::new(),
            by_variant: HashMap::new(),
        }
    }

    /// Create every variant the binder draws with
    pub fn initialize_standard_pipelines<F>(&mut self, factory: &mut F, table: &LayoutTable) -> BindingResult<()>
    where
        F: PipelineFactory<Pipeline = P>,
    {
        for variant in PipelineVariant::ALL {
            self.create_variant(factory, table, variant)?;
        }
        log::debug!(
            "Created {} pipelines for {} variants",
            self.pipelines.len(),
            self.by_variant.len()
        );
        Ok(())
    }

    /// Create (or reuse) the pipeline of a variant
    pub fn create_variant<F>(
        &mut self,
        factory: &mut F,
        table: &LayoutTable,
        variant: PipelineVariant,
    ) -> BindingResult<PipelineKey>
    where
        F: PipelineFactory<Pipeline = P>,
    {
        let key = self.create_pair(factory, table, variant.shaders())?;
        self.by_variant.insert(variant, key);
        Ok(key)
    }

    /// Create (or reuse) the pipeline of a shader pair
    pub fn create_pair<F>(
        &mut self,
        factory: &mut F,
        table: &LayoutTable,
        shaders: ShaderPair,
    ) -> BindingResult<PipelineKey>
    where
        F: PipelineFactory<Pipeline = P>,
    {
        if let Some(&key) = self.by_pair.get(&shaders) {
            return Ok(key);
        }

        log::debug!("Creating {} pipeline", shaders);
        let layout = PipelineLayoutDesc::build(table, shaders)?;
        let handle = factory.create_pipeline(&layout)?;

        let key = self.pipelines.insert(PipelineEntry { layout, handle });
        self.by_pair.insert(shaders, key);
        Ok(key)
    }

    /// Key of a created variant
    pub fn key(&self, variant: PipelineVariant) -> BindingResult<PipelineKey> {
        self.by_variant
            .get(&variant)
            .copied()
            .ok_or(BindingError::UnknownVariant(variant))
    }

    /// Entry of a created pipeline
    pub fn get(&self, key: PipelineKey) -> BindingResult<&PipelineEntry<P>> {
        self.pipelines.get(key).ok_or(BindingError::UnknownPipeline(key))
    }

    /// Remove a pipeline, returning its backend object
    pub fn remove(&mut self, key: PipelineKey) -> Option<P> {
        let entry = self.pipelines.remove(key)?;
        self.by_pair.retain(|_, k| *k != key);
        self.by_variant.retain(|_, k| *k != key);
        Some(entry.handle)
    }

    /// Number of distinct pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether no pipeline was created
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
