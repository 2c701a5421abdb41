use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::core::error::RankingError;
use crate::models::WeightSnapshot;

/// Holds the current weight snapshot.
///
/// Readers take an `Arc` and score a whole request against it; a publish
/// swaps the pointer, so a request never sees a half-written map.
#[derive(Debug)]
pub struct WeightStore {
    current: ArcSwap<WeightSnapshot>,
}

impl WeightStore {
    pub fn new(initial: WeightSnapshot) -> Self {
        Self { current: ArcSwap::from_pointee(initial) }
    }

    pub fn load(&self) -> Arc<WeightSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> i64 {
        self.current.load().version
    }

    /// Publish the next version of the weights. The caller's `version` is
    /// ignored and replaced with current + 1.
    pub fn publish(&self, snapshot: WeightSnapshot) -> Result<Arc<WeightSnapshot>, RankingError> {
        snapshot.weights.validate()?;

        let mut published = Arc::new(snapshot.clone());
        self.current.rcu(|current| {
            let mut next = snapshot.clone();
            next.version = current.version + 1;
            published = Arc::new(next);
            published.clone()
        });

        tracing::info!("Published weight snapshot v{}", published.version);
        Ok(published)
    }

    /// Install a snapshot produced elsewhere (e.g. another instance) if it
    /// is newer than ours. Returns whether it was installed.
    pub fn publish_if_newer(&self, snapshot: WeightSnapshot) -> Result<bool, RankingError> {
        snapshot.weights.validate()?;

        let incoming = Arc::new(snapshot);
        let previous = self.current.rcu(|current| {
            if incoming.version > current.version {
                incoming.clone()
            } else {
                current.clone()
            }
        });

        let installed = incoming.version > previous.version;
        if installed {
            tracing::info!(
                "Installed weight snapshot v{} (was v{})",
                incoming.version,
                previous.version
            );
        }
        Ok(installed)
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new(WeightSnapshot::initial())
    }
}
