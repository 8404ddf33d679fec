//! Reload logic for runtime filter changes

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing_subscriber::{EnvFilter, Registry, layer::Layer};

use crate::error::{LogError, LogResult};

/// Handle for changing the level filter of a running logger
#[derive(Clone)]
pub struct ReloadHandle {
    filter: tracing_subscriber::reload::Handle<EnvFilter, Registry>,
    /// Current filter string, lock-free reads
    current_filter: Arc<ArcSwap<String>>,
}

impl ReloadHandle {
    /// Replace the level filter
    ///
    /// # Errors
    /// Returns `Filter` if the directives do not parse and `Reload` if the
    /// logger this handle belongs to is gone. The previous filter stays in
    /// effect on error.
    pub fn reload(&self, filter: &str) -> LogResult<()> {
        let new_filter = EnvFilter::try_new(filter).map_err(|e| LogError::filter(filter, e))?;
        self.filter
            .reload(new_filter)
            .map_err(|e| LogError::Reload(e.to_string()))?;
        self.current_filter.store(Arc::new(filter.to_string()));
        Ok(())
    }

    /// The filter string currently in effect
    #[must_use]
    pub fn current_filter(&self) -> Arc<String> {
        self.current_filter.load_full()
    }
}

impl std::fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("current_filter", &self.current_filter.load())
            .finish_non_exhaustive()
    }
}

/// Filter layer type installed on the registry
pub(super) type FilterLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Create a filter layer, wrapped in a reload layer when `reloadable`
pub(super) fn create_filter_layer(
    filter: EnvFilter,
    level: &str,
    reloadable: bool,
) -> (FilterLayer, Option<ReloadHandle>) {
    if reloadable {
        let (layer, handle) = tracing_subscriber::reload::Layer::new(filter);
        let reload_handle = ReloadHandle {
            filter: handle,
            current_filter: Arc::new(ArcSwap::from_pointee(level.to_string())),
        };
        (Box::new(layer), Some(reload_handle))
    } else {
        (Box::new(filter), None)
    }
}
