use std::collections::BTreeMap;
use std::sync::Arc;

use murmur_core::{AppConfig, Source};

use crate::adapter::SourceAdapter;
use crate::error::SourceError;
use crate::sources::{RedditAdapter, RedditConfig, ReplayAdapter};

/// Adapters available for harvest runs, keyed by source.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: BTreeMap<Source, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for `config`: replay adapters for every source when
    /// a replay file is configured, otherwise the live adapters.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if a live adapter cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        if let Some(path) = &config.replay_path {
            for source in Source::ALL {
                registry.register(Arc::new(ReplayAdapter::new(source, path.clone())));
            }
        } else {
            registry.register(Arc::new(RedditAdapter::new(
                RedditConfig::from_app_config(config),
            )?));
        }
        Ok(registry)
    }

    /// Add or replace the adapter for its source.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    #[must_use]
    pub fn get(&self, source: Source) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source).cloned()
    }

    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        self.adapters.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}
