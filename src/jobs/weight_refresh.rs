use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::core::bandit::{BanditWeightLearner, LearnerStatus};
use crate::core::error::RankingError;
use crate::core::snapshot::WeightStore;
use crate::models::WeightSnapshot;
use crate::services::store::{FeedbackStore, SnapshotStore, StoreError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ranking(#[from] RankingError),
}

/// What a single learner run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Published { version: i64 },
    NoData,
    /// Another run held the lock
    Skipped,
}

/// Recomputes weights from the feedback window and publishes a new snapshot.
///
/// Never called from a request handler; the serving path only reads the
/// `WeightStore`.
pub struct WeightRefreshJob {
    feedback: Arc<dyn FeedbackStore>,
    snapshots: Arc<dyn SnapshotStore>,
    weights: Arc<WeightStore>,
    learner: BanditWeightLearner,
    window: chrono::Duration,
    running: tokio::sync::Mutex<()>,
}

impl WeightRefreshJob {
    pub fn new(
        feedback: Arc<dyn FeedbackStore>,
        snapshots: Arc<dyn SnapshotStore>,
        weights: Arc<WeightStore>,
        learner: BanditWeightLearner,
        window_days: i64,
    ) -> Self {
        Self {
            feedback,
            snapshots,
            weights,
            learner,
            window: chrono::Duration::days(window_days.max(1)),
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// One learner pass. Persists the snapshot before swapping it in, so a
    /// served version always exists in the store.
    pub async fn run_once(&self) -> Result<RunOutcome, JobError> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::info!("Weight refresh already in progress; skipping run");
            return Ok(RunOutcome::Skipped);
        };

        // Build on whatever another instance may have published
        if let Err(e) = self.sync_latest().await {
            tracing::warn!("Could not check for a newer snapshot: {}", e);
        }

        let window_end = Utc::now();
        let window_start = window_end - self.window;

        let records = self.feedback.feedback_window(window_start, window_end).await?;
        let current = self.weights.load();

        tracing::debug!(
            "Recomputing weights over {} feedback records (current v{})",
            records.len(),
            current.version
        );

        let outcome = self.learner.recompute_weights(&records, &current.weights);
        if outcome.status == LearnerStatus::NoData {
            return Ok(RunOutcome::NoData);
        }

        let snapshot = WeightSnapshot {
            version: current.version + 1,
            weights: outcome.weights,
            stats: outcome.stats,
            window_start: Some(window_start),
            window_end: Some(window_end),
            events_used: outcome.events_used,
            events_skipped: outcome.events_skipped,
            published_at: Utc::now(),
        };
        let version = snapshot.version;

        self.snapshots.insert_snapshot(&snapshot).await?;
        self.weights.publish_if_newer(snapshot)?;

        Ok(RunOutcome::Published { version })
    }

    /// Swap in the latest persisted snapshot if it is newer than ours
    pub async fn sync_latest(&self) -> Result<bool, JobError> {
        let Some(latest) = self.snapshots.latest_snapshot().await? else {
            return Ok(false);
        };

        match self.weights.publish_if_newer(latest) {
            Ok(installed) => Ok(installed),
            Err(e) => {
                tracing::warn!("Ignoring persisted snapshot: {}", e);
                Ok(false)
            }
        }
    }
}

/// Snapshot to serve at startup: the latest persisted one if it is valid,
/// otherwise the built-in prior
pub async fn load_initial_snapshot(snapshots: &dyn SnapshotStore) -> WeightSnapshot {
    match snapshots.latest_snapshot().await {
        Ok(Some(snapshot)) => match snapshot.weights.validate() {
            Ok(()) => {
                tracing::info!("Loaded weight snapshot v{}", snapshot.version);
                snapshot
            }
            Err(e) => {
                tracing::warn!("{}; serving default weights", e);
                WeightSnapshot::initial()
            }
        },
        Ok(None) => {
            tracing::info!("No persisted weight snapshot; serving default weights");
            WeightSnapshot::initial()
        }
        Err(e) => {
            tracing::error!("Failed to load weight snapshot ({}); serving default weights", e);
            WeightSnapshot::initial()
        }
    }
}

/// Shortest period either loop runs at
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the learner loop (every `interval`) and the snapshot poll loop
/// (every `poll`). Periods below one second are raised to one second.
pub fn spawn(
    job: Arc<WeightRefreshJob>,
    interval: Duration,
    poll: Duration,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let interval = interval.max(MIN_PERIOD);
    let poll = poll.max(MIN_PERIOD);
    let learner_job = job.clone();
    let learner = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match learner_job.run_once().await {
                Ok(RunOutcome::Published { version }) => {
                    tracing::info!("Weight refresh published v{}", version)
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Weight refresh failed: {}", e),
            }
        }
    });

    let poller = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = job.sync_latest().await {
                tracing::warn!("Weight snapshot poll failed: {}", e);
            }
        }
    });

    tracing::info!(
        "Weight refresh jobs spawned (interval {:?}, poll {:?})",
        interval,
        poll
    );
    (learner, poller)
}
