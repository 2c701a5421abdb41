use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::core::explain::ReasonCode;
use crate::models::{Candidate, ChannelKind, ChannelResult, ChannelStatus};

/// Output of a merge, with the degradation flags the response surfaces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub candidates: Vec<Candidate>,
    pub degraded: bool,
    #[serde(rename = "timedOutChannels")]
    pub timed_out: Vec<ChannelKind>,
    #[serde(rename = "failedChannels")]
    pub failed: Vec<ChannelKind>,
}

impl MergeOutcome {
    pub fn listing_ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.listing_id.clone()).collect()
    }

    /// Retrieval reason codes per listing, for the explanation layer
    pub fn provenance(&self) -> HashMap<String, Vec<ReasonCode>> {
        self.candidates
            .iter()
            .map(|c| (c.listing_id.clone(), c.reason_codes.iter().copied().collect()))
            .collect()
    }
}

/// Fuse per-channel result lists into one deduplicated candidate list.
///
/// `channel_weights[i]` blends `results[i]`; a candidate's fused score sums
/// `weight * score` over the channels it appeared in only. Channel scores
/// are clamped to [0, 1], so with weights summing to 1 a fused score never
/// exceeds 1. Weights that don't form a distribution over the channels are
/// replaced by equal weights.
pub fn merge(results: &[ChannelResult], channel_weights: &[f64]) -> MergeOutcome {
    let weights = channel_blend(results.len(), channel_weights);

    let mut outcome = MergeOutcome::default();
    let mut fused: HashMap<&str, Candidate> = HashMap::new();

    for (result, weight) in results.iter().zip(weights.iter()) {
        match result.status {
            ChannelStatus::Ok => {}
            ChannelStatus::TimedOut => outcome.timed_out.push(result.kind),
            ChannelStatus::Failed => outcome.failed.push(result.kind),
        }

        // A channel may list the same listing twice; only its best hit counts
        let mut best: HashMap<&str, f64> = HashMap::new();
        let mut codes: HashMap<&str, BTreeSet<ReasonCode>> = HashMap::new();

        for hit in &result.candidates {
            if hit.listing_id.is_empty() {
                continue;
            }
            let score = if hit.score.is_finite() { hit.score.clamp(0.0, 1.0) } else { 0.0 };
            let entry = best.entry(hit.listing_id.as_str()).or_insert(score);
            *entry = entry.max(score);

            codes
                .entry(hit.listing_id.as_str())
                .or_default()
                .extend(hit.reason_codes.iter().copied());
        }

        for (listing_id, score) in best {
            let candidate = fused.entry(listing_id).or_insert_with(|| Candidate {
                listing_id: listing_id.to_string(),
                fused_score: 0.0,
                channels: Vec::new(),
                reason_codes: BTreeSet::new(),
            });

            candidate.fused_score += weight * score;
            if !candidate.channels.contains(&result.kind) {
                candidate.channels.push(result.kind);
            }
            candidate.reason_codes.insert(result.kind.reason_code());
            if let Some(channel_codes) = codes.remove(listing_id) {
                candidate.reason_codes.extend(channel_codes);
            }
        }
    }

    let mut candidates: Vec<Candidate> = fused
        .into_values()
        .map(|mut c| {
            c.channels.sort();
            c.fused_score = c.fused_score.min(1.0);
            c
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.listing_id.cmp(&b.listing_id))
    });

    outcome.degraded = !outcome.timed_out.is_empty() || !outcome.failed.is_empty();
    outcome.candidates = candidates;

    if outcome.degraded {
        tracing::warn!(
            "Merged {} candidates from degraded retrieval (timed out: {:?}, failed: {:?})",
            outcome.candidates.len(),
            outcome.timed_out,
            outcome.failed
        );
    } else {
        tracing::debug!("Merged {} candidates from {} channels", outcome.candidates.len(), results.len());
    }

    outcome
}

/// Channel weights as given if they form a distribution, else uniform
fn channel_blend(channels: usize, weights: &[f64]) -> Vec<f64> {
    if channels == 0 {
        return Vec::new();
    }

    let valid = weights.len() == channels
        && weights.iter().all(|w| w.is_finite() && *w >= 0.0)
        && (weights.iter().sum::<f64>() - 1.0).abs() <= 1e-6;

    if valid {
        return weights.to_vec();
    }

    tracing::warn!(
        "Invalid channel weights {:?} for {} channels; using equal weights",
        weights,
        channels
    );
    vec![1.0 / channels as f64; channels]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredCandidate;

    fn hit(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate { listing_id: id.to_string(), score, reason_codes: vec![] }
    }

    #[test]
    fn test_fused_score_sums_present_channels_only() {
        let results = vec![
            ChannelResult::ok(ChannelKind::Structured, vec![hit("a", 1.0), hit("b", 0.5)]),
            ChannelResult::ok(ChannelKind::Keyword, vec![hit("a", 0.5)]),
            ChannelResult::ok(ChannelKind::Semantic, vec![hit("c", 0.8)]),
        ];
        let outcome = merge(&results, &[0.5, 0.3, 0.2]);

        let a = outcome.candidates.iter().find(|c| c.listing_id == "a").unwrap();
        assert!((a.fused_score - 0.65).abs() < 1e-9);
        assert_eq!(a.channels, vec![ChannelKind::Structured, ChannelKind::Keyword]);

        let b = outcome.candidates.iter().find(|c| c.listing_id == "b").unwrap();
        assert!((b.fused_score - 0.25).abs() < 1e-9);

        assert_eq!(outcome.listing_ids(), vec!["a", "b", "c"]);
        assert!(!outcome.degraded);
    }

    #[test]
    fn test_candidate_in_every_channel_is_bounded() {
        let results = vec![
            ChannelResult::ok(ChannelKind::Structured, vec![hit("a", 1.0)]),
            ChannelResult::ok(ChannelKind::Keyword, vec![hit("a", 3.0)]),
            ChannelResult::ok(ChannelKind::Semantic, vec![hit("a", 1.0)]),
        ];
        let outcome = merge(&results, &[0.4, 0.3, 0.3]);
        assert!(outcome.candidates[0].fused_score <= 1.0);
    }

    #[test]
    fn test_reason_codes_are_unioned() {
        let mut keyword_hit = hit("a", 0.4);
        keyword_hit.reason_codes = vec![ReasonCode::MatchedKeywords];
        let results = vec![
            ChannelResult::ok(ChannelKind::Structured, vec![hit("a", 0.9)]),
            ChannelResult::ok(ChannelKind::Keyword, vec![keyword_hit]),
        ];
        let outcome = merge(&results, &[0.5, 0.5]);

        let codes: Vec<ReasonCode> = outcome.candidates[0].reason_codes.iter().copied().collect();
        assert_eq!(codes, vec![ReasonCode::MatchedFilters, ReasonCode::MatchedKeywords]);
    }

    #[test]
    fn test_timed_out_channel_degrades_but_keeps_results() {
        let results = vec![
            ChannelResult::ok(ChannelKind::Structured, vec![hit("a", 0.9)]),
            ChannelResult::timed_out(ChannelKind::Keyword),
            ChannelResult::ok(ChannelKind::Semantic, vec![hit("b", 0.7)]),
        ];
        let outcome = merge(&results, &[0.4, 0.3, 0.3]);

        assert!(outcome.degraded);
        assert_eq!(outcome.timed_out, vec![ChannelKind::Keyword]);
        assert_eq!(outcome.candidates.len(), 2);
    }

    #[test]
    fn test_duplicate_hits_within_channel_count_once() {
        let results = vec![ChannelResult::ok(
            ChannelKind::Keyword,
            vec![hit("a", 0.3), hit("a", 0.9)],
        )];
        let outcome = merge(&results, &[1.0]);
        assert_eq!(outcome.candidates.len(), 1);
        assert!((outcome.candidates[0].fused_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_channel_weights_fall_back_to_equal() {
        assert_eq!(channel_blend(2, &[0.7]), vec![0.5, 0.5]);
        assert_eq!(channel_blend(2, &[0.7, 0.7]), vec![0.5, 0.5]);
        assert_eq!(channel_blend(2, &[0.7, 0.3]), vec![0.7, 0.3]);
    }

    #[test]
    fn test_no_channels_no_candidates() {
        let outcome = merge(&[], &[]);
        assert!(outcome.candidates.is_empty());
        assert!(!outcome.degraded);
    }
}
