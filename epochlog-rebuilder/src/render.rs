//! Memoized plan dumps
//!
//! Rendering a large plan is not free, and admin commands tend to ask for
//! the same dump repeatedly. [`PlanDumpCache`] keeps the last rendering
//! together with the caller-supplied version it was produced for; the
//! owner bumps the version whenever the underlying plans change.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::plan::RebuildingPlan;

#[derive(Debug)]
struct Entry {
    version: u64,
    dump: Arc<str>,
}

/// Last rendered dump, keyed by a monotonic version
#[derive(Debug, Default)]
pub struct PlanDumpCache {
    entry: Mutex<Option<Entry>>,
}

impl PlanDumpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the dump for `version`, calling `render` on a miss.
    ///
    /// A version older than the cached one is rendered but not stored.
    pub fn get_or_render<F>(&self, version: u64, render: F) -> Arc<str>
    where
        F: FnOnce() -> String,
    {
        let mut entry = self.entry.lock();
        match entry.as_ref() {
            Some(cached) if cached.version == version => return Arc::clone(&cached.dump),
            Some(cached) if cached.version > version => {
                debug!(version, cached = cached.version, "Rendering stale plan version");
                return Arc::from(render());
            }
            _ => {}
        }

        let dump: Arc<str> = Arc::from(render());
        *entry = Some(Entry {
            version,
            dump: Arc::clone(&dump),
        });
        dump
    }

    /// Dump of a single plan
    pub fn render_plan(&self, version: u64, plan: &RebuildingPlan) -> Arc<str> {
        self.get_or_render(version, || plan.to_string())
    }

    pub fn cached_version(&self) -> Option<u64> {
        self.entry.lock().as_ref().map(|e| e.version)
    }

    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }
}
