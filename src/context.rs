//! Explicitly passed session context.
//!
//! Created once per mount and handed to every component. It carries the
//! configuration, the source registry (which owns the content engine) and
//! the tracing span all projection operations log under.

use std::path::Path;
use std::sync::Arc;

use tracing::{Span, info_span};

use crate::config::FsConfig;
use crate::engine::ContentEngine;
use crate::registry::SourceRegistry;

/// Shared state of one mounted projection.
#[derive(Clone)]
pub struct Context {
    config: Arc<FsConfig>,
    registry: Arc<SourceRegistry>,
    span: Span,
}

impl Context {
    /// Build a context for the backing tree at `root`.
    pub fn new(root: &Path, engine: Arc<dyn ContentEngine>, config: FsConfig) -> Self {
        let registry = SourceRegistry::new(engine, config.remove_after_use);
        let span = info_span!("torrentfs", root = %root.display());
        Self {
            config: Arc::new(config),
            registry,
            span,
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Source registry.
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Span every operation runs in.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("sources", &self.registry.len())
            .finish()
    }
}
