use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::components::NEUTRAL_SCORE;
use crate::models::{Component, ComponentContribution, RankedResult};

/// Minimum raw component score before it can be claimed as a strength
pub const DEFAULT_STRENGTH_THRESHOLD: f64 = 0.6;

/// Maximum raw component score before it is reported as a concern
pub const DEFAULT_CONCERN_THRESHOLD: f64 = 0.4;

const MAX_STRENGTHS: usize = 2;
const MAX_CONCERNS: usize = 1;

/// Stable, machine-readable reason tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    FitsRequirements,
    MissesRequirements,
    MatchesLifestyle,
    LifestyleMismatch,
    ShortCommute,
    LongCommute,
    TrustedListing,
    IncompleteListing,
    GoodValue,
    AboveMarketPrice,
    PopularListing,
    LowActivity,
    MatchedFilters,
    MatchedKeywords,
    SimilarToSearch,
}

impl ReasonCode {
    /// Code used when `component` is a strength
    pub fn strength(component: Component) -> Self {
        match component {
            Component::ConstraintFit => ReasonCode::FitsRequirements,
            Component::PersonalFit => ReasonCode::MatchesLifestyle,
            Component::Accessibility => ReasonCode::ShortCommute,
            Component::TrustQuality => ReasonCode::TrustedListing,
            Component::MarketValue => ReasonCode::GoodValue,
            Component::Engagement => ReasonCode::PopularListing,
        }
    }

    /// Code used when `component` is a concern
    pub fn concern(component: Component) -> Self {
        match component {
            Component::ConstraintFit => ReasonCode::MissesRequirements,
            Component::PersonalFit => ReasonCode::LifestyleMismatch,
            Component::Accessibility => ReasonCode::LongCommute,
            Component::TrustQuality => ReasonCode::IncompleteListing,
            Component::MarketValue => ReasonCode::AboveMarketPrice,
            Component::Engagement => ReasonCode::LowActivity,
        }
    }

    /// Component whose score backs this code; `None` for retrieval provenance
    pub fn component(&self) -> Option<Component> {
        match self {
            ReasonCode::FitsRequirements | ReasonCode::MissesRequirements => {
                Some(Component::ConstraintFit)
            }
            ReasonCode::MatchesLifestyle | ReasonCode::LifestyleMismatch => {
                Some(Component::PersonalFit)
            }
            ReasonCode::ShortCommute | ReasonCode::LongCommute => Some(Component::Accessibility),
            ReasonCode::TrustedListing | ReasonCode::IncompleteListing => {
                Some(Component::TrustQuality)
            }
            ReasonCode::GoodValue | ReasonCode::AboveMarketPrice => Some(Component::MarketValue),
            ReasonCode::PopularListing | ReasonCode::LowActivity => Some(Component::Engagement),
            ReasonCode::MatchedFilters | ReasonCode::MatchedKeywords | ReasonCode::SimilarToSearch => {
                None
            }
        }
    }

    pub fn is_strength(&self) -> bool {
        self.component()
            .is_some_and(|c| ReasonCode::strength(c) == *self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::FitsRequirements => "fits_requirements",
            ReasonCode::MissesRequirements => "misses_requirements",
            ReasonCode::MatchesLifestyle => "matches_lifestyle",
            ReasonCode::LifestyleMismatch => "lifestyle_mismatch",
            ReasonCode::ShortCommute => "short_commute",
            ReasonCode::LongCommute => "long_commute",
            ReasonCode::TrustedListing => "trusted_listing",
            ReasonCode::IncompleteListing => "incomplete_listing",
            ReasonCode::GoodValue => "good_value",
            ReasonCode::AboveMarketPrice => "above_market_price",
            ReasonCode::PopularListing => "popular_listing",
            ReasonCode::LowActivity => "low_activity",
            ReasonCode::MatchedFilters => "matched_filters",
            ReasonCode::MatchedKeywords => "matched_keywords",
            ReasonCode::SimilarToSearch => "similar_to_search",
        }
    }

    /// Display string; the only place reason wording lives
    pub fn template(&self) -> &'static str {
        match self {
            ReasonCode::FitsRequirements => "Meets your budget, room and amenity requirements",
            ReasonCode::MissesRequirements => "Misses some of your must-haves",
            ReasonCode::MatchesLifestyle => "Neighbourhood suits your lifestyle",
            ReasonCode::LifestyleMismatch => "Neighbourhood may not suit your lifestyle",
            ReasonCode::ShortCommute => "Great location for your commute",
            ReasonCode::LongCommute => "Long commute from your anchor location",
            ReasonCode::TrustedListing => "Verified listing with complete details",
            ReasonCode::IncompleteListing => "Listing details are incomplete or unverified",
            ReasonCode::GoodValue => "Priced below comparable apartments",
            ReasonCode::AboveMarketPrice => "Priced above comparable apartments",
            ReasonCode::PopularListing => "Popular with other renters",
            ReasonCode::LowActivity => "Little interest from other renters so far",
            ReasonCode::MatchedFilters => "Matches your search filters",
            ReasonCode::MatchedKeywords => "Matches your search keywords",
            ReasonCode::SimilarToSearch => "Similar to what you described",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parallel display strings and codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub reasons: Vec<String>,
    #[serde(rename = "reasonCodes")]
    pub reason_codes: Vec<ReasonCode>,
}

impl Explanation {
    fn push(&mut self, code: ReasonCode) {
        if !self.reason_codes.contains(&code) {
            self.reason_codes.push(code);
            self.reasons.push(code.template().to_string());
        }
    }
}

/// Turns a score breakdown into reasons.
///
/// Reasons are derived only from the breakdown the score was computed from,
/// so a strength is never claimed for a component scoring below
/// `strength_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationBuilder {
    strength_threshold: f64,
    concern_threshold: f64,
}

impl ExplanationBuilder {
    pub fn new(strength_threshold: f64, concern_threshold: f64) -> Self {
        // The neutral default is never a strength or a concern, whatever the
        // thresholds; `build` compares strictly against it
        let strength_threshold = if strength_threshold.is_finite() {
            strength_threshold.clamp(0.5, 1.0)
        } else {
            DEFAULT_STRENGTH_THRESHOLD
        };
        let concern_threshold = if concern_threshold.is_finite() {
            concern_threshold.clamp(0.0, 0.5)
        } else {
            DEFAULT_CONCERN_THRESHOLD
        };

        Self { strength_threshold, concern_threshold }
    }

    /// Up to two strengths, one concern, then retrieval provenance
    pub fn build(
        &self,
        breakdown: &BTreeMap<Component, ComponentContribution>,
        provenance: &[ReasonCode],
    ) -> Explanation {
        let mut explanation = Explanation::default();

        let mut strengths: Vec<(Component, &ComponentContribution)> = breakdown
            .iter()
            .filter(|(_, b)| b.score > NEUTRAL_SCORE && b.score >= self.strength_threshold)
            .map(|(c, b)| (*c, b))
            .collect();
        // BTreeMap order is component order, and the sort is stable
        strengths.sort_by(|a, b| b.1.contribution.total_cmp(&a.1.contribution));

        strengths.truncate(MAX_STRENGTHS);
        for (component, _) in &strengths {
            explanation.push(ReasonCode::strength(*component));
        }

        let mut concerns: Vec<(Component, f64)> = breakdown
            .iter()
            .filter(|(c, b)| {
                b.score < NEUTRAL_SCORE
                    && b.score <= self.concern_threshold
                    && !strengths.iter().any(|(s, _)| s == *c)
            })
            .map(|(c, b)| (*c, b.weight * (1.0 - b.score)))
            .collect();
        concerns.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (component, _) in concerns.iter().take(MAX_CONCERNS) {
            explanation.push(ReasonCode::concern(*component));
        }

        let mut provenance: Vec<ReasonCode> = provenance
            .iter()
            .copied()
            .filter(|code| code.component().is_none())
            .collect();
        provenance.sort();
        for code in provenance {
            explanation.push(code);
        }

        explanation
    }

    /// Rebuild the explanation of an already ranked result
    pub fn explain(&self, result: &RankedResult) -> Explanation {
        self.build(&result.breakdown, &result.retrieval_codes)
    }
}

impl Default for ExplanationBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_STRENGTH_THRESHOLD, DEFAULT_CONCERN_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(scores: [(Component, f64, f64); 6]) -> BTreeMap<Component, ComponentContribution> {
        scores
            .into_iter()
            .map(|(c, score, weight)| {
                (c, ComponentContribution { score, weight, contribution: score * weight })
            })
            .collect()
    }

    fn sample() -> BTreeMap<Component, ComponentContribution> {
        breakdown([
            (Component::ConstraintFit, 1.0, 0.30),
            (Component::PersonalFit, 0.5, 0.15),
            (Component::Accessibility, 0.9, 0.20),
            (Component::TrustQuality, 0.7, 0.15),
            (Component::MarketValue, 0.2, 0.12),
            (Component::Engagement, 0.3, 0.08),
        ])
    }

    #[test]
    fn test_top_two_strengths_and_one_concern() {
        let explanation = ExplanationBuilder::default().build(&sample(), &[]);

        assert_eq!(
            explanation.reason_codes,
            vec![
                ReasonCode::FitsRequirements,
                ReasonCode::ShortCommute,
                ReasonCode::AboveMarketPrice,
            ]
        );
        assert_eq!(explanation.reasons.len(), explanation.reason_codes.len());
        assert_eq!(explanation.reasons[1], "Great location for your commute");
    }

    #[test]
    fn test_no_location_claim_below_half() {
        let mut scores = sample();
        scores.insert(
            Component::Accessibility,
            ComponentContribution { score: 0.45, weight: 0.9, contribution: 0.405 },
        );
        let explanation = ExplanationBuilder::default().build(&scores, &[]);
        assert!(!explanation.reason_codes.contains(&ReasonCode::ShortCommute));
    }

    #[test]
    fn test_weights_reorder_strengths() {
        let mut scores = sample();
        scores.insert(
            Component::TrustQuality,
            ComponentContribution { score: 0.7, weight: 0.6, contribution: 0.42 },
        );
        let explanation = ExplanationBuilder::default().build(&scores, &[]);
        assert_eq!(explanation.reason_codes[0], ReasonCode::TrustedListing);
    }

    #[test]
    fn test_neutral_scores_produce_no_component_reasons() {
        let scores = breakdown([
            (Component::ConstraintFit, 0.5, 0.30),
            (Component::PersonalFit, 0.5, 0.15),
            (Component::Accessibility, 0.5, 0.20),
            (Component::TrustQuality, 0.5, 0.15),
            (Component::MarketValue, 0.5, 0.12),
            (Component::Engagement, 0.5, 0.08),
        ]);
        let explanation = ExplanationBuilder::default().build(&scores, &[]);
        assert!(explanation.reason_codes.is_empty());
    }

    #[test]
    fn test_provenance_follows_component_reasons() {
        let explanation = ExplanationBuilder::default().build(
            &sample(),
            &[ReasonCode::SimilarToSearch, ReasonCode::MatchedFilters, ReasonCode::GoodValue],
        );
        let codes = &explanation.reason_codes;
        assert_eq!(&codes[3..], &[ReasonCode::MatchedFilters, ReasonCode::SimilarToSearch]);
        // Component codes can't be smuggled in as provenance
        assert!(!codes.contains(&ReasonCode::GoodValue));
    }

    #[test]
    fn test_thresholds_are_clamped() {
        let builder = ExplanationBuilder::new(0.1, 0.9);
        assert_eq!(builder.strength_threshold, 0.5);
        assert_eq!(builder.concern_threshold, 0.5);

        let scores = breakdown([
            (Component::ConstraintFit, 0.51, 0.30),
            (Component::PersonalFit, 0.5, 0.15),
            (Component::Accessibility, 0.5, 0.20),
            (Component::TrustQuality, 0.5, 0.15),
            (Component::MarketValue, 0.49, 0.12),
            (Component::Engagement, 0.5, 0.08),
        ]);
        let explanation = builder.build(&scores, &[]);
        assert_eq!(
            explanation.reason_codes,
            vec![ReasonCode::FitsRequirements, ReasonCode::AboveMarketPrice]
        );
    }

    #[test]
    fn test_neutral_default_never_claimed_at_any_threshold() {
        let neutral = breakdown([
            (Component::ConstraintFit, 0.5, 0.30),
            (Component::PersonalFit, 0.5, 0.15),
            (Component::Accessibility, 0.5, 0.20),
            (Component::TrustQuality, 0.5, 0.15),
            (Component::MarketValue, 0.5, 0.12),
            (Component::Engagement, 0.5, 0.08),
        ]);

        for (strength, concern) in [(0.5, 0.5), (0.0, 1.0), (0.6, 0.4), (f64::NAN, f64::NAN)] {
            let explanation = ExplanationBuilder::new(strength, concern).build(&neutral, &[]);
            assert!(
                explanation.reason_codes.is_empty(),
                "thresholds ({}, {}) gave {:?}",
                strength,
                concern,
                explanation.reason_codes
            );
        }
    }

    #[test]
    fn test_reason_code_serializes_snake_case() {
        let json = serde_json::to_string(&ReasonCode::AboveMarketPrice).unwrap();
        assert_eq!(json, "\"above_market_price\"");
        assert_eq!(ReasonCode::AboveMarketPrice.as_str(), "above_market_price");
        assert!(ReasonCode::GoodValue.is_strength());
        assert!(!ReasonCode::AboveMarketPrice.is_strength());
    }
}
