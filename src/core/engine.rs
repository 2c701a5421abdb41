use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::components::{score_listing, ScoringContext};
use crate::core::error::RankingError;
use crate::core::explain::{ExplanationBuilder, ReasonCode};
use crate::models::{
    BanditWeightMap, Component, ComponentContribution, ComponentScores, Listing, RankedResult,
    UserPreferences,
};

/// Final multi-component scorer
///
/// # Pipeline
/// 1. Validate the weight snapshot (fall back to the default prior if malformed)
/// 2. Compute the six component scores per listing
/// 3. Blend with the weights, scale to 0-100
/// 4. Attach explanations and sort (score desc, listing id asc)
///
/// Scoring is pure: identical inputs and weights give identical output.
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    explainer: ExplanationBuilder,
}

impl RankingEngine {
    pub fn new(explainer: ExplanationBuilder) -> Self {
        Self { explainer }
    }

    pub fn explainer(&self) -> &ExplanationBuilder {
        &self.explainer
    }

    /// Rank candidates with no retrieval provenance
    pub fn rank(
        &self,
        candidates: &[Listing],
        preferences: &UserPreferences,
        weights: &BanditWeightMap,
    ) -> Vec<RankedResult> {
        self.rank_with_provenance(candidates, preferences, weights, &HashMap::new())
    }

    /// Rank candidates, carrying each listing's retrieval reason codes into its explanation
    pub fn rank_with_provenance(
        &self,
        candidates: &[Listing],
        preferences: &UserPreferences,
        weights: &BanditWeightMap,
        provenance: &HashMap<String, Vec<ReasonCode>>,
    ) -> Vec<RankedResult> {
        if candidates.is_empty() {
            tracing::info!("{}", RankingError::EmptyCandidateSet);
            return Vec::new();
        }

        let fallback;
        let weights = match effective_weights(weights) {
            Some(w) => w,
            None => {
                fallback = BanditWeightMap::default_prior();
                &fallback
            }
        };

        // First occurrence wins on duplicate ids
        let mut seen = HashSet::with_capacity(candidates.len());
        let unique: Vec<Listing> = candidates
            .iter()
            .filter(|l| seen.insert(l.id.as_str()))
            .cloned()
            .collect();

        let ctx = ScoringContext::from_listings(&unique);

        let mut results: Vec<RankedResult> = unique
            .iter()
            .map(|listing| {
                let scores = score_listing(listing, preferences, &ctx);
                let codes = provenance.get(&listing.id).map(Vec::as_slice).unwrap_or(&[]);
                self.build_result(listing, scores, weights, codes)
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.listing_id.cmp(&b.listing_id))
        });

        tracing::debug!(
            "Ranked {} candidates ({} duplicates dropped)",
            results.len(),
            candidates.len() - unique.len()
        );

        results
    }

    fn build_result(
        &self,
        listing: &Listing,
        scores: ComponentScores,
        weights: &BanditWeightMap,
        retrieval_codes: &[ReasonCode],
    ) -> RankedResult {
        let breakdown: BTreeMap<Component, ComponentContribution> = scores
            .iter()
            .map(|(component, score)| {
                let weight = weights.get(component);
                (component, ComponentContribution { score, weight, contribution: weight * score })
            })
            .collect();

        let score = final_score(&breakdown);

        let mut retrieval_codes: Vec<ReasonCode> = retrieval_codes.to_vec();
        retrieval_codes.sort();
        retrieval_codes.dedup();

        let explanation = self.explainer.build(&breakdown, &retrieval_codes);

        RankedResult {
            listing_id: listing.id.clone(),
            score,
            reasons: explanation.reasons,
            reason_codes: explanation.reason_codes,
            breakdown,
            retrieval_codes,
        }
    }
}

/// Σ contribution scaled to 0-100, rounded to two decimals
pub fn final_score(breakdown: &BTreeMap<Component, ComponentContribution>) -> f64 {
    let raw: f64 = Component::ALL
        .iter()
        .map(|c| breakdown.get(c).map(|b| b.contribution).unwrap_or(0.0))
        .sum();

    round2((raw * 100.0).clamp(0.0, 100.0))
}

/// The weights to score with, or `None` if they must be replaced by the default prior
fn effective_weights(weights: &BanditWeightMap) -> Option<&BanditWeightMap> {
    match weights.validate() {
        Ok(()) => Some(weights),
        Err(e) => {
            tracing::warn!("{}; falling back to default weights", e);
            None
        }
    }
}

#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn create_listing(id: &str, price: f64, amenities: &[&str]) -> Listing {
        Listing {
            id: id.to_string(),
            title: format!("Listing {}", id),
            description: None,
            price,
            bedrooms: Some(2),
            size_sqm: None,
            district: Some("Kreuzberg".to_string()),
            latitude: None,
            longitude: None,
            commute_minutes: None,
            amenities: amenities.iter().map(|a| a.to_string()).collect(),
            character_tags: BTreeSet::new(),
            is_verified: Some(true),
            photo_count: Some(4),
            views: 0,
            saves: 0,
            messages: 0,
        }
    }

    fn create_preferences() -> UserPreferences {
        UserPreferences {
            budget_max: Some(150_000.0),
            required_amenities: BTreeSet::from(["parking".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_within_budget_with_amenity_ranks_first() {
        let engine = RankingEngine::default();
        let candidates = vec![
            create_listing("b", 200_000.0, &["garden"]),
            create_listing("a", 100_000.0, &["parking"]),
        ];

        let results = engine.rank(&candidates, &create_preferences(), &BanditWeightMap::default());

        assert_eq!(results[0].listing_id, "a");
        assert_eq!(results[0].breakdown[&Component::ConstraintFit].score, 1.0);
        assert_eq!(results[1].breakdown[&Component::ConstraintFit].score, 0.0);
    }

    #[test]
    fn test_score_equals_weighted_sum() {
        let engine = RankingEngine::default();
        let candidates = vec![
            create_listing("a", 100_000.0, &["parking"]),
            create_listing("b", 120_000.0, &["parking", "gym"]),
        ];
        let weights = BanditWeightMap::default();

        for result in engine.rank(&candidates, &create_preferences(), &weights) {
            let expected: f64 = Component::ALL
                .iter()
                .map(|c| weights.get(*c) * result.breakdown[c].score)
                .sum::<f64>()
                * 100.0;
            assert!((result.score - expected).abs() <= 0.01);
        }
    }

    #[test]
    fn test_malformed_weights_fall_back_to_default() {
        let engine = RankingEngine::default();
        let candidates = vec![create_listing("a", 100_000.0, &["parking"])];
        let prefs = create_preferences();

        let mut broken = BanditWeightMap::default();
        broken.0.insert(Component::Engagement, 0.9);

        let with_broken = engine.rank(&candidates, &prefs, &broken);
        let with_default = engine.rank(&candidates, &prefs, &BanditWeightMap::default());
        assert_eq!(with_broken, with_default);
    }

    #[test]
    fn test_ties_broken_by_listing_id() {
        let engine = RankingEngine::default();
        let candidates = vec![
            create_listing("c", 100_000.0, &["parking"]),
            create_listing("a", 100_000.0, &["parking"]),
            create_listing("b", 100_000.0, &["parking"]),
        ];

        let ids: Vec<String> = engine
            .rank(&candidates, &create_preferences(), &BanditWeightMap::default())
            .into_iter()
            .map(|r| r.listing_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_candidates_are_dropped() {
        let engine = RankingEngine::default();
        let candidates = vec![
            create_listing("a", 100_000.0, &["parking"]),
            create_listing("a", 90_000.0, &["parking"]),
        ];
        let results = engine.rank(&candidates, &create_preferences(), &BanditWeightMap::default());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_candidates_is_empty_result() {
        let engine = RankingEngine::default();
        assert!(engine
            .rank(&[], &create_preferences(), &BanditWeightMap::default())
            .is_empty());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_678), 12.35);
        assert_eq!(round2(0.004), 0.0);
    }
}
