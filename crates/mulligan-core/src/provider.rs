//! The composition root.
//!
//! One explicitly constructed `Provider` per process wires configuration
//! and the external statement builder together; everything downstream is
//! dependency-injected from here. There is no ambient global state.

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::graph::holder::GraphHolder;
use crate::orchestrator::Orchestrator;
use crate::statement::StatementBuilder;

/// Owns the configuration and builder and vends wired components.
pub struct Provider {
    config: CoreConfig,
    builder: Arc<dyn StatementBuilder>,
}

impl Provider {
    pub fn new(config: CoreConfig, builder: Arc<dyn StatementBuilder>) -> Self {
        Self { config, builder }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// A fresh orchestrator with its own root coordinator.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Arc::clone(&self.builder), &self.config)
    }

    /// A graph holder sized to the configured concurrency ceiling, for the
    /// builder layer to plan into.
    pub fn graph_holder(&self) -> GraphHolder {
        GraphHolder::new(self.config.max_concurrent_actions)
    }
}
