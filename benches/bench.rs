// Criterion benchmarks for rentrank

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rentrank::core::{
    distance::{calculate_bounding_box, haversine_distance},
    merge, BanditWeightLearner, RankingEngine,
};
use rentrank::models::{
    BanditWeightMap, ChannelKind, ChannelResult, CommutePreference, FeedbackRecord, Listing,
    ScoredCandidate, UserPreferences,
};
use std::collections::{BTreeMap, BTreeSet};

fn create_listing(id: usize) -> Listing {
    let offset = (id as f64 * 0.001) % 0.2;
    Listing {
        id: format!("listing-{:05}", id),
        title: format!("Apartment {}", id),
        description: None,
        price: 700.0 + (id * 37 % 1200) as f64,
        bedrooms: Some(1 + (id % 4) as u8),
        size_sqm: Some(35.0 + (id % 80) as f64),
        district: Some("Friedrichshain".to_string()),
        latitude: Some(52.50 + offset),
        longitude: Some(13.40 + offset),
        commute_minutes: None,
        amenities: BTreeSet::from(["balcony".to_string(), "elevator".to_string()]),
        character_tags: BTreeSet::from(["quiet".to_string()]),
        is_verified: Some(id % 3 == 0),
        photo_count: Some((id % 12) as u32),
        views: (id * 13 % 500) as u64,
        saves: (id % 40) as u64,
        messages: (id % 7) as u64,
    }
}

fn create_preferences() -> UserPreferences {
    UserPreferences {
        budget_max: Some(1400.0),
        min_bedrooms: Some(2),
        required_amenities: BTreeSet::from(["balcony".to_string()]),
        commute: Some(CommutePreference {
            latitude: 52.52,
            longitude: 13.405,
            preferred_minutes: 20.0,
            max_minutes: 45.0,
        }),
        personality: Some(BTreeMap::from([("quiet".to_string(), 0.8)])),
        ..Default::default()
    }
}

fn channel_result(kind: ChannelKind, count: usize, stride: usize) -> ChannelResult {
    let hits = (0..count)
        .map(|i| ScoredCandidate {
            listing_id: format!("listing-{:05}", i * stride),
            score: 1.0 - i as f64 / count as f64,
            reason_codes: vec![],
        })
        .collect();
    ChannelResult::ok(kind, hits)
}

fn bench_haversine_distance(c: &mut Criterion) {
    c.bench_function("haversine_distance", |b| {
        b.iter(|| {
            haversine_distance(
                black_box(52.52),
                black_box(13.405),
                black_box(52.49),
                black_box(13.42),
            )
        });
    });
}

fn bench_bounding_box(c: &mut Criterion) {
    c.bench_function("bounding_box_calculation", |b| {
        b.iter(|| calculate_bounding_box(black_box(52.52), black_box(13.405), black_box(25.0)));
    });
}

fn bench_ranking(c: &mut Criterion) {
    let engine = RankingEngine::default();
    let preferences = create_preferences();
    let weights = BanditWeightMap::default();

    let mut group = c.benchmark_group("ranking");

    for candidate_count in [10, 50, 100, 500, 1000].iter() {
        let candidates: Vec<Listing> = (0..*candidate_count).map(create_listing).collect();

        group.bench_with_input(
            BenchmarkId::new("rank", candidate_count),
            candidate_count,
            |b, _| {
                b.iter(|| {
                    engine.rank(
                        black_box(&candidates),
                        black_box(&preferences),
                        black_box(&weights),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for hits_per_channel in [50, 200, 1000].iter() {
        let results = vec![
            channel_result(ChannelKind::Structured, *hits_per_channel, 1),
            channel_result(ChannelKind::Keyword, *hits_per_channel, 2),
            channel_result(ChannelKind::Semantic, *hits_per_channel, 3),
        ];

        group.bench_with_input(
            BenchmarkId::new("three_channels", hits_per_channel),
            hits_per_channel,
            |b, _| {
                b.iter(|| merge(black_box(&results), black_box(&[0.5, 0.2, 0.3])));
            },
        );
    }

    group.finish();
}

fn bench_learner(c: &mut Criterion) {
    let learner = BanditWeightLearner::default();
    let previous = BanditWeightMap::default();
    let now = chrono::Utc::now();

    let window: Vec<FeedbackRecord> = (0..10_000)
        .map(|i| FeedbackRecord {
            id: uuid::Uuid::new_v4(),
            listing_id: format!("listing-{:05}", i % 500),
            kind: None,
            signal: ((i % 7) as f64 - 3.0) / 3.0,
            contributions: serde_json::json!({
                "constraintFit": 0.3, "personalFit": 0.1, "accessibility": 0.12,
                "trustQuality": 0.1, "marketValue": 0.06, "engagement": 0.03
            }),
            created_at: now - chrono::Duration::minutes(i),
        })
        .collect();

    c.bench_function("recompute_weights_10k_events", |b| {
        b.iter(|| learner.recompute_weights(black_box(&window), black_box(&previous)));
    });
}

criterion_group!(
    benches,
    bench_haversine_distance,
    bench_bounding_box,
    bench_ranking,
    bench_merge,
    bench_learner
);

criterion_main!(benches);
