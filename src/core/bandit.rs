use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::error::RankingError;
use crate::models::{ArmStats, BanditWeightMap, Component, FeedbackEvent, FeedbackRecord};

/// Tuning knobs for the weight update; all of them are configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Floor on a component's trial increment per event
    pub min_trial_increment: f64,
    /// Intensity above which an event earns full success credit
    pub full_credit_threshold: f64,
    /// Intensity above which an event earns half success credit
    pub half_credit_threshold: f64,
    /// Credit for intensities at or below the half-credit threshold
    pub minimal_credit: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            min_trial_increment: 0.05,
            full_credit_threshold: 0.66,
            half_credit_threshold: 0.33,
            minimal_credit: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LearnerStatus {
    Updated,
    NoData,
}

/// Result of one recompute over a feedback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerOutcome {
    pub status: LearnerStatus,
    pub weights: BanditWeightMap,
    pub stats: BTreeMap<Component, ArmStats>,
    pub events_used: u64,
    pub events_skipped: u64,
}

/// Beta-Bernoulli weight learner.
///
/// Computes posterior means instead of sampling so the weights it publishes
/// are a pure function of the feedback window: running it twice over the
/// same window yields the same map.
#[derive(Debug, Clone, Copy, Default)]
pub struct BanditWeightLearner {
    config: LearnerConfig,
}

impl BanditWeightLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Map a -1..1 feedback signal onto 0..1
    pub fn success_intensity(signal: f64) -> f64 {
        (signal.clamp(-1.0, 1.0) + 1.0) / 2.0
    }

    fn credit(&self, intensity: f64) -> f64 {
        if intensity > self.config.full_credit_threshold {
            1.0
        } else if intensity > self.config.half_credit_threshold {
            0.5
        } else {
            self.config.minimal_credit
        }
    }

    /// Recompute the weight map from a trailing feedback window.
    ///
    /// Corrupt records are skipped and counted. With no usable events the
    /// previous weights come back unchanged.
    pub fn recompute_weights(
        &self,
        window: &[FeedbackRecord],
        previous: &BanditWeightMap,
    ) -> LearnerOutcome {
        let mut skipped = 0u64;
        let mut events: Vec<FeedbackEvent> = Vec::with_capacity(window.len());

        for record in window {
            match FeedbackEvent::try_from(record) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("Skipping feedback record: {}", e);
                    skipped += 1;
                }
            }
        }

        // Fixed accumulation order keeps float sums reproducible
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut stats: BTreeMap<Component, ArmStats> =
            Component::ALL.iter().map(|c| (*c, ArmStats::default())).collect();

        for event in &events {
            let credit = self.credit(Self::success_intensity(event.signal));

            for component in Component::ALL {
                let contribution = event.contributions.get(&component).copied().unwrap_or(0.0);
                let trials = contribution.abs().max(self.config.min_trial_increment);

                if let Some(arm) = stats.get_mut(&component) {
                    arm.trials += trials;
                    arm.successes += trials * credit;
                }
            }
        }

        let total_trials: f64 = stats.values().map(|s| s.trials).sum();
        if events.is_empty() || total_trials <= 0.0 {
            tracing::info!("{}; keeping previous weights", RankingError::LearnerNoData);
            return LearnerOutcome {
                status: LearnerStatus::NoData,
                weights: keep_previous(previous),
                stats,
                events_used: 0,
                events_skipped: skipped,
            };
        }

        let means: BTreeMap<Component, f64> = stats
            .iter()
            .map(|(c, s)| (*c, s.posterior_mean()))
            .collect();
        let total: f64 = means.values().sum();
        let weights = BanditWeightMap(means.into_iter().map(|(c, m)| (c, m / total)).collect());

        tracing::info!(
            "Recomputed weights from {} events ({} skipped): {:?}",
            events.len(),
            skipped,
            weights.0
        );

        LearnerOutcome {
            status: LearnerStatus::Updated,
            weights,
            stats,
            events_used: events.len() as u64,
            events_skipped: skipped,
        }
    }
}

fn keep_previous(previous: &BanditWeightMap) -> BanditWeightMap {
    match previous.validate() {
        Ok(()) => previous.clone(),
        Err(e) => {
            tracing::warn!("{}; previous weights replaced by default prior", e);
            BanditWeightMap::default_prior()
        }
    }
}
