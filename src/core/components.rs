use std::collections::BTreeSet;

use crate::core::distance::estimate_commute_minutes;
use crate::models::{ComponentScores, Listing, UserPreferences};

/// Value any component degrades to when its inputs are missing
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Photos needed for full media completeness
const TARGET_PHOTO_COUNT: f64 = 8.0;

/// Smallest comparable set before widening it
const MIN_COMPARABLES: usize = 3;

/// Trait -> listing character tags that express it
const TRAIT_TAGS: &[(&str, &[&str])] = &[
    ("quiet", &["quiet", "residential", "green"]),
    ("social", &["nightlife", "social", "lively", "central"]),
    ("family", &["family", "schools", "playground"]),
    ("active", &["park", "gym", "sports", "green"]),
    ("urban", &["central", "shopping", "transit"]),
];

// Sub-weights
const PERSONAL_TRAIT_WEIGHT: f64 = 0.6;
const PERSONAL_PRIORITY_WEIGHT: f64 = 0.4;
const TRUST_VERIFIED_WEIGHT: f64 = 0.4;
const TRUST_MEDIA_WEIGHT: f64 = 0.3;
const TRUST_PROFILE_WEIGHT: f64 = 0.3;
const ENGAGEMENT_VIEWS_WEIGHT: f64 = 0.2;
const ENGAGEMENT_SAVES_WEIGHT: f64 = 0.35;
const ENGAGEMENT_MESSAGES_WEIGHT: f64 = 0.45;

#[derive(Debug, Clone)]
struct PricePoint {
    listing_id: String,
    district: Option<String>,
    bedrooms: Option<u8>,
    price: f64,
}

/// Candidate-set statistics some components are relative to
///
/// Built once per ranking pass and shared read-only across listings.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    max_views: u64,
    max_saves: u64,
    max_messages: u64,
    prices: Vec<PricePoint>,
}

impl ScoringContext {
    pub fn from_listings(listings: &[Listing]) -> Self {
        let mut ctx = Self::default();
        for listing in listings {
            ctx.max_views = ctx.max_views.max(listing.views);
            ctx.max_saves = ctx.max_saves.max(listing.saves);
            ctx.max_messages = ctx.max_messages.max(listing.messages);

            if listing.price.is_finite() && listing.price >= 0.0 {
                ctx.prices.push(PricePoint {
                    listing_id: listing.id.clone(),
                    district: listing.district.as_deref().map(normalize_tag),
                    bedrooms: listing.bedrooms,
                    price: listing.price,
                });
            }
        }
        ctx
    }

    /// Same district and bedroom count, widened until big enough
    fn comparables(&self, listing: &Listing) -> Vec<&PricePoint> {
        let district = listing.district.as_deref().map(normalize_tag);
        let others = || self.prices.iter().filter(|p| p.listing_id != listing.id);

        if district.is_some() && listing.bedrooms.is_some() {
            let narrow: Vec<_> = others()
                .filter(|p| p.district == district && p.bedrooms == listing.bedrooms)
                .collect();
            if narrow.len() >= MIN_COMPARABLES {
                return narrow;
            }
        }

        if listing.bedrooms.is_some() {
            let by_rooms: Vec<_> = others().filter(|p| p.bedrooms == listing.bedrooms).collect();
            if by_rooms.len() >= MIN_COMPARABLES {
                return by_rooms;
            }
        }

        others().collect()
    }
}

/// Compute all six components for one listing
pub fn score_listing(
    listing: &Listing,
    preferences: &UserPreferences,
    ctx: &ScoringContext,
) -> ComponentScores {
    ComponentScores {
        constraint_fit: sanitize(constraint_fit(listing, preferences)),
        personal_fit: sanitize(personal_fit(listing, preferences)),
        accessibility: sanitize(accessibility(listing, preferences)),
        trust_quality: sanitize(trust_quality(listing)),
        market_value: sanitize(market_value(listing, ctx)),
        engagement: sanitize(engagement(listing, ctx)),
    }
}

/// Hard constraints: budget ceiling, minimum bedrooms, required amenities.
///
/// Each violated constraint costs `1 / active`; one the listing has no data
/// for costs half of that.
pub fn constraint_fit(listing: &Listing, preferences: &UserPreferences) -> f64 {
    let mut active: f64 = 0.0;
    let mut violations: f64 = 0.0;

    if let Some(max) = preferences.budget_max.filter(|m| m.is_finite() && *m > 0.0) {
        active += 1.0;
        if !listing.price.is_finite() || listing.price < 0.0 {
            violations += 0.5;
        } else if listing.price > max {
            violations += 1.0;
        }
    }

    if let Some(min_rooms) = preferences.min_bedrooms.filter(|r| *r > 0) {
        active += 1.0;
        match listing.bedrooms {
            None => violations += 0.5,
            Some(rooms) if rooms < min_rooms => violations += 1.0,
            Some(_) => {}
        }
    }

    let required = normalized_set(&preferences.required_amenities);
    if !required.is_empty() {
        active += 1.0;
        let offered = normalized_set(&listing.amenities);
        if offered.is_empty() {
            violations += 0.5;
        } else if !required.is_subset(&offered) {
            violations += 1.0;
        }
    }

    if active == 0.0 {
        return 1.0;
    }

    (1.0 - violations / active).max(0.0)
}

/// Lifestyle fit: personality vs character tags, blended with stated priorities
pub fn personal_fit(listing: &Listing, preferences: &UserPreferences) -> f64 {
    let traits = trait_similarity(listing, preferences).unwrap_or(NEUTRAL_SCORE);
    let priorities = priority_alignment(listing, preferences).unwrap_or(NEUTRAL_SCORE);

    PERSONAL_TRAIT_WEIGHT * traits + PERSONAL_PRIORITY_WEIGHT * priorities
}

/// Cosine between the user's trait affinities and the traits a listing expresses
fn trait_similarity(listing: &Listing, preferences: &UserPreferences) -> Option<f64> {
    let personality = preferences.personality.as_ref()?;
    let tags = normalized_set(&listing.character_tags);

    let mut dot = 0.0;
    let mut user_norm = 0.0;
    let mut listing_norm = 0.0;

    for (name, trait_tags) in TRAIT_TAGS {
        let affinity = personality
            .iter()
            .find(|(k, _)| normalize_tag(k) == *name)
            .map(|(_, v)| *v)
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let expressed = if trait_tags.iter().any(|t| tags.contains(*t)) { 1.0 } else { 0.0 };

        dot += affinity * expressed;
        user_norm += affinity * affinity;
        listing_norm += expressed;
    }

    if user_norm == 0.0 || listing_norm == 0.0 {
        return None;
    }

    Some((dot / (user_norm.sqrt() * listing_norm.sqrt())).clamp(0.0, 1.0))
}

/// Priority-weighted mean of price, location, amenity and quality signals
fn priority_alignment(listing: &Listing, preferences: &UserPreferences) -> Option<f64> {
    let p = &preferences.priorities;
    let signals = [
        (p.price, price_headroom(listing, preferences)),
        (p.location, commute_score(listing, preferences)),
        (p.amenities, amenity_coverage(listing, preferences)),
        (p.quality, Some(trust_quality(listing))),
    ];

    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (weight, signal) in signals {
        if let Some(value) = signal {
            if weight.is_finite() && weight > 0.0 {
                total += weight * value;
                weight_sum += weight;
            }
        }
    }

    (weight_sum > 0.0).then(|| total / weight_sum)
}

/// 1.0 at free, 0.5 at the budget ceiling, 0.0 at twice the ceiling
fn price_headroom(listing: &Listing, preferences: &UserPreferences) -> Option<f64> {
    let max = preferences.budget_max.filter(|m| m.is_finite() && *m > 0.0)?;
    if !listing.price.is_finite() || listing.price < 0.0 {
        return None;
    }

    let ratio = listing.price / max;
    Some(if ratio <= 1.0 {
        1.0 - 0.5 * ratio
    } else {
        0.5 * (2.0 - ratio).max(0.0)
    })
}

fn amenity_coverage(listing: &Listing, preferences: &UserPreferences) -> Option<f64> {
    let required = normalized_set(&preferences.required_amenities);
    let offered = normalized_set(&listing.amenities);
    if required.is_empty() || offered.is_empty() {
        return None;
    }

    Some(required.intersection(&offered).count() as f64 / required.len() as f64)
}

/// Commute decay: 1 up to the preferred time, linear down to 0 at twice the maximum
pub fn accessibility(listing: &Listing, preferences: &UserPreferences) -> f64 {
    commute_score(listing, preferences).unwrap_or(NEUTRAL_SCORE)
}

fn commute_score(listing: &Listing, preferences: &UserPreferences) -> Option<f64> {
    let commute = preferences.commute.as_ref()?;
    let minutes = commute_minutes(listing, preferences)?;

    let preferred = commute.preferred_minutes;
    let max = commute.max_minutes;
    if !preferred.is_finite() || !max.is_finite() {
        return None;
    }

    let preferred = preferred.max(0.0);
    let zero_at = 2.0 * max;

    if minutes <= preferred {
        return Some(1.0);
    }
    if minutes >= zero_at {
        return Some(0.0);
    }

    Some(1.0 - (minutes - preferred) / (zero_at - preferred))
}

/// Routed commute if the listing has one, otherwise a straight-line estimate
pub fn commute_minutes(listing: &Listing, preferences: &UserPreferences) -> Option<f64> {
    let commute = preferences.commute.as_ref()?;

    if let Some(minutes) = listing.commute_minutes.filter(|m| m.is_finite() && *m >= 0.0) {
        return Some(minutes);
    }

    let anchor = (commute.latitude, commute.longitude);
    if !anchor.0.is_finite() || !anchor.1.is_finite() {
        return None;
    }

    listing
        .coordinates()
        .map(|coords| estimate_commute_minutes(anchor, coords))
}

/// Verification, media completeness and profile completeness
pub fn trust_quality(listing: &Listing) -> f64 {
    let verified = match listing.is_verified {
        Some(true) => 1.0,
        Some(false) => 0.0,
        None => NEUTRAL_SCORE,
    };

    let media = listing
        .photo_count
        .map(|n| (n as f64 / TARGET_PHOTO_COUNT).min(1.0))
        .unwrap_or(NEUTRAL_SCORE);

    TRUST_VERIFIED_WEIGHT * verified
        + TRUST_MEDIA_WEIGHT * media
        + TRUST_PROFILE_WEIGHT * profile_completeness(listing)
}

fn profile_completeness(listing: &Listing) -> f64 {
    let fields = [
        !listing.title.trim().is_empty(),
        listing.description.as_deref().is_some_and(|d| !d.trim().is_empty()),
        listing.size_sqm.is_some_and(|s| s.is_finite() && s > 0.0),
        listing.bedrooms.is_some(),
        listing.district.as_deref().is_some_and(|d| !d.trim().is_empty()),
        listing.coordinates().is_some(),
        !listing.amenities.is_empty(),
    ];

    fields.iter().filter(|present| **present).count() as f64 / fields.len() as f64
}

/// Price percentile among comparables; cheaper than the median scores above 0.5
pub fn market_value(listing: &Listing, ctx: &ScoringContext) -> f64 {
    if !listing.price.is_finite() || listing.price < 0.0 {
        return NEUTRAL_SCORE;
    }

    let comparables = ctx.comparables(listing);
    if comparables.is_empty() {
        return NEUTRAL_SCORE;
    }

    let cheaper = comparables.iter().filter(|p| p.price < listing.price).count() as f64;
    let equal = comparables.iter().filter(|p| p.price == listing.price).count() as f64;
    let percentile = (cheaper + 0.5 * equal) / comparables.len() as f64;

    (1.0 - percentile).clamp(0.05, 0.95)
}

/// Log-dampened activity relative to the busiest candidate
pub fn engagement(listing: &Listing, ctx: &ScoringContext) -> f64 {
    let parts = [
        (listing.views, ctx.max_views, ENGAGEMENT_VIEWS_WEIGHT),
        (listing.saves, ctx.max_saves, ENGAGEMENT_SAVES_WEIGHT),
        (listing.messages, ctx.max_messages, ENGAGEMENT_MESSAGES_WEIGHT),
    ];

    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (count, max, weight) in parts {
        if max == 0 {
            continue;
        }
        let dampened = ((count.min(max) as f64).ln_1p()) / (max as f64).ln_1p();
        total += weight * dampened;
        weight_sum += weight;
    }

    if weight_sum == 0.0 {
        return NEUTRAL_SCORE;
    }

    total / weight_sum
}

/// Clamp to [0, 1], mapping non-finite values to neutral
#[inline]
fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        NEUTRAL_SCORE
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

fn normalized_set(tags: &BTreeSet<String>) -> BTreeSet<String> {
    tags.iter()
        .map(|t| normalize_tag(t))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommutePreference;
    use std::collections::BTreeMap;

    fn create_listing(id: &str, price: f64) -> Listing {
        Listing {
            id: id.to_string(),
            title: format!("Listing {}", id),
            description: Some("Bright two-room flat".to_string()),
            price,
            bedrooms: Some(2),
            size_sqm: Some(60.0),
            district: Some("Mitte".to_string()),
            latitude: Some(52.52),
            longitude: Some(13.405),
            commute_minutes: None,
            amenities: BTreeSet::from(["balcony".to_string(), "elevator".to_string()]),
            character_tags: BTreeSet::from(["quiet".to_string()]),
            is_verified: Some(true),
            photo_count: Some(8),
            views: 10,
            saves: 2,
            messages: 1,
        }
    }

    fn create_preferences() -> UserPreferences {
        UserPreferences {
            budget_max: Some(1500.0),
            min_bedrooms: Some(2),
            required_amenities: BTreeSet::from(["balcony".to_string()]),
            commute: Some(CommutePreference {
                latitude: 52.52,
                longitude: 13.405,
                preferred_minutes: 15.0,
                max_minutes: 30.0,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_constraint_fit_all_satisfied() {
        let listing = create_listing("a", 1200.0);
        assert_eq!(constraint_fit(&listing, &create_preferences()), 1.0);
    }

    #[test]
    fn test_constraint_fit_partial_credit_per_violation() {
        let mut listing = create_listing("a", 1800.0);
        let prefs = create_preferences();
        let one_violation = constraint_fit(&listing, &prefs);
        assert!((one_violation - 2.0 / 3.0).abs() < 1e-9);

        listing.bedrooms = Some(1);
        let two_violations = constraint_fit(&listing, &prefs);
        assert!((two_violations - 1.0 / 3.0).abs() < 1e-9);

        listing.amenities = BTreeSet::from(["garden".to_string()]);
        assert_eq!(constraint_fit(&listing, &prefs), 0.0);
    }

    #[test]
    fn test_constraint_fit_missing_data_is_half_violation() {
        let mut listing = create_listing("a", 1200.0);
        listing.bedrooms = None;
        let score = constraint_fit(&listing, &create_preferences());
        assert!((score - (1.0 - 0.5 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_constraint_fit_without_constraints() {
        let listing = create_listing("a", 99999.0);
        assert_eq!(constraint_fit(&listing, &UserPreferences::default()), 1.0);
    }

    #[test]
    fn test_amenity_matching_ignores_case() {
        let mut listing = create_listing("a", 1000.0);
        listing.amenities = BTreeSet::from(["Balcony ".to_string()]);
        assert_eq!(constraint_fit(&listing, &create_preferences()), 1.0);
    }

    #[test]
    fn test_accessibility_decay() {
        let prefs = create_preferences();
        let mut listing = create_listing("a", 1000.0);

        listing.commute_minutes = Some(10.0);
        assert_eq!(accessibility(&listing, &prefs), 1.0);

        // Halfway between preferred (15) and zero point (60)
        listing.commute_minutes = Some(37.5);
        assert!((accessibility(&listing, &prefs) - 0.5).abs() < 1e-9);

        listing.commute_minutes = Some(60.0);
        assert_eq!(accessibility(&listing, &prefs), 0.0);

        listing.commute_minutes = Some(120.0);
        assert_eq!(accessibility(&listing, &prefs), 0.0);
    }

    #[test]
    fn test_accessibility_neutral_without_commute_preference() {
        let listing = create_listing("a", 1000.0);
        assert_eq!(accessibility(&listing, &UserPreferences::default()), NEUTRAL_SCORE);
    }

    #[test]
    fn test_accessibility_estimates_from_coordinates() {
        let listing = create_listing("a", 1000.0);
        // Same point as the anchor: overhead only, under the preferred time
        assert_eq!(accessibility(&listing, &create_preferences()), 1.0);
    }

    #[test]
    fn test_personal_fit_prefers_matching_character() {
        let mut prefs = create_preferences();
        prefs.personality = Some(BTreeMap::from([
            ("quiet".to_string(), 1.0),
            ("social".to_string(), 0.0),
        ]));

        let quiet = create_listing("a", 1000.0);
        let mut loud = create_listing("b", 1000.0);
        loud.character_tags = BTreeSet::from(["nightlife".to_string()]);

        assert!(personal_fit(&quiet, &prefs) > personal_fit(&loud, &prefs));
    }

    #[test]
    fn test_trait_similarity_missing_inputs() {
        let listing = create_listing("a", 1000.0);
        assert!(trait_similarity(&listing, &create_preferences()).is_none());

        let mut prefs = create_preferences();
        prefs.personality = Some(BTreeMap::from([("quiet".to_string(), 0.9)]));
        let mut untagged = create_listing("b", 1000.0);
        untagged.character_tags.clear();
        assert!(trait_similarity(&untagged, &prefs).is_none());
    }

    #[test]
    fn test_trust_quality_blend() {
        let full = create_listing("a", 1000.0);
        assert!((trust_quality(&full) - 1.0).abs() < 1e-9);

        let mut unverified = create_listing("b", 1000.0);
        unverified.is_verified = Some(false);
        unverified.photo_count = Some(0);
        assert!((trust_quality(&unverified) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_market_value_cheaper_scores_higher() {
        let listings = vec![
            create_listing("a", 900.0),
            create_listing("b", 1100.0),
            create_listing("c", 1300.0),
            create_listing("d", 1500.0),
        ];
        let ctx = ScoringContext::from_listings(&listings);

        let cheapest = market_value(&listings[0], &ctx);
        let priciest = market_value(&listings[3], &ctx);
        assert!(cheapest > priciest);
        assert_eq!(cheapest, 0.95);
        assert_eq!(priciest, 0.05);
    }

    #[test]
    fn test_market_value_lone_listing_is_neutral() {
        let listings = vec![create_listing("a", 900.0)];
        let ctx = ScoringContext::from_listings(&listings);
        assert_eq!(market_value(&listings[0], &ctx), NEUTRAL_SCORE);
    }

    #[test]
    fn test_engagement_log_dampened() {
        let mut popular = create_listing("a", 1000.0);
        popular.views = 10_000;
        popular.saves = 500;
        popular.messages = 100;
        let mut modest = create_listing("b", 1000.0);
        modest.views = 100;
        modest.saves = 5;
        modest.messages = 1;

        let listings = vec![popular, modest];
        let ctx = ScoringContext::from_listings(&listings);

        assert!((engagement(&listings[0], &ctx) - 1.0).abs() < 1e-9);
        let modest_score = engagement(&listings[1], &ctx);
        // Linear normalization would put this near 0.01
        assert!(modest_score > 0.2 && modest_score < 0.6, "got {}", modest_score);
    }

    #[test]
    fn test_engagement_neutral_when_no_activity() {
        let mut listing = create_listing("a", 1000.0);
        listing.views = 0;
        listing.saves = 0;
        listing.messages = 0;
        let ctx = ScoringContext::from_listings(std::slice::from_ref(&listing));
        assert_eq!(engagement(&listing, &ctx), NEUTRAL_SCORE);
    }

    #[test]
    fn test_scores_stay_in_range_for_degenerate_input() {
        let mut listing = create_listing("a", f64::NAN);
        listing.latitude = Some(f64::INFINITY);
        listing.commute_minutes = Some(f64::NAN);
        let mut prefs = create_preferences();
        prefs.budget_max = Some(f64::NAN);
        prefs.personality = Some(BTreeMap::from([("quiet".to_string(), f64::NAN)]));

        let ctx = ScoringContext::from_listings(std::slice::from_ref(&listing));
        let scores = score_listing(&listing, &prefs, &ctx);
        for (component, value) in scores.iter() {
            assert!(value.is_finite(), "{} is not finite", component);
            assert!((0.0..=1.0).contains(&value), "{} out of range: {}", component, value);
        }
    }
}
