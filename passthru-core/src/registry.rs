//! Source registry
//!
//! Maps routing ids to live encoded sources so a registry-routed encoder can
//! find the source a placeholder raw frame came from. Entries hold `Arc`s;
//! the application handle, not the registry, decides when a source dies.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::source::SourceCore;
use crate::types::{Codec, RoutingId};

static GLOBAL_REGISTRY: OnceLock<Arc<SourceRegistry>> = OnceLock::new();

/// Registry of live encoded sources keyed by routing id
#[derive(Default)]
pub struct SourceRegistry {
    sources: Mutex<HashMap<RoutingId, Arc<SourceCore>>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default registry, created on first use
    ///
    /// For hosts that cannot thread a registry through to their encoder
    /// factory. Prefer an explicit `Arc<SourceRegistry>` everywhere else.
    pub fn global() -> Arc<SourceRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(SourceRegistry::new()))
            .clone()
    }

    /// Register a source under its routing id
    ///
    /// Returns false and leaves the existing entry in place if the id is
    /// already registered.
    pub fn register(&self, id: RoutingId, source: Arc<SourceCore>) -> bool {
        let mut sources = self.sources.lock();
        if sources.contains_key(&id) {
            warn!("Source {} is already registered", id);
            return false;
        }
        sources.insert(id, source);
        debug!("Registered source {} ({} live)", id, sources.len());
        true
    }

    /// Remove a source, returning it if it was registered
    pub fn unregister(&self, id: RoutingId) -> Option<Arc<SourceCore>> {
        let removed = self.sources.lock().remove(&id);
        if removed.is_some() {
            debug!("Unregistered source {}", id);
        }
        removed
    }

    /// Look up a live source
    pub fn find(&self, id: RoutingId) -> Option<Arc<SourceCore>> {
        self.sources.lock().get(&id).cloned()
    }

    /// Oldest live source carrying the given SDP codec name (case-insensitive)
    pub fn find_by_codec(&self, name: &str) -> Option<Arc<SourceCore>> {
        let codec = Codec::from_sdp_name(name)?;
        self.sources
            .lock()
            .iter()
            .filter(|(_, source)| source.codec() == codec)
            .min_by_key(|(id, _)| **id)
            .map(|(_, source)| source.clone())
    }

    /// Whether any live source carries the given SDP codec name
    pub fn has_source_for_codec(&self, name: &str) -> bool {
        self.find_by_codec(name).is_some()
    }

    /// Distinct codecs of the live sources, in [`Codec::ALL`] order
    pub fn codecs(&self) -> Vec<Codec> {
        let sources = self.sources.lock();
        Codec::ALL
            .into_iter()
            .filter(|codec| sources.values().any(|s| s.codec() == *codec))
            .collect()
    }

    pub fn contains(&self, id: RoutingId) -> bool {
        self.sources.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.lock().is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.len())
            .finish()
    }
}
