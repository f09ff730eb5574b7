use std::{collections::HashMap, sync::Arc};

use crate::retrieval::{GraphBackend, RetrievalBackend};

/// Lifecycle-scoped registry of concrete retrieval-backend implementations,
/// indexed by `engine_type`. Built once at startup; the query pipeline and
/// the ingestion indexer both read from it rather than constructing engines
/// themselves (SPEC_FULL §9, "Global mutable state → lifecycle-scoped
/// registries").
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<&'static str, Arc<dyn RetrievalBackend>>,
    graph: Option<Arc<dyn GraphBackend>>,
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: Arc<dyn RetrievalBackend>) {
        self.engines.insert(engine.engine_type(), engine);
    }

    pub fn set_graph(&mut self, graph: Arc<dyn GraphBackend>) {
        self.graph = Some(graph);
    }

    #[must_use]
    pub fn get(&self, engine_type: &str) -> Option<Arc<dyn RetrievalBackend>> {
        self.engines.get(engine_type).cloned()
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn RetrievalBackend>> {
        self.engines.values().cloned().collect()
    }

    #[must_use]
    pub fn graph(&self) -> Option<Arc<dyn GraphBackend>> {
        self.graph.clone()
    }
}
