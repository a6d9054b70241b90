use std::hint::black_box;

use chrono::{TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};

use bolao_engine::model::{Match, MatchStatus, Prediction, Role, User};
use bolao_engine::store::{MemoryStore, PoolStore};
use bolao_engine::{scoring, settlement, views};

fn seeded_store(users: usize) -> MemoryStore {
    let store = MemoryStore::new();
    let kickoff = Utc.with_ymd_and_hms(2026, 5, 10, 16, 0, 0).unwrap();

    store
        .upsert_match(&Match {
            id: "m1".to_string(),
            round: 1,
            home_team: "Flamengo".to_string(),
            away_team: "Palmeiras".to_string(),
            home_crest_url: None,
            away_crest_url: None,
            kickoff,
            status: MatchStatus::Finished,
            home_score: Some(2),
            away_score: Some(1),
        })
        .unwrap();

    for idx in 0..users {
        let id = format!("u{idx:04}");
        store
            .upsert_user(&User {
                id: id.clone(),
                username: format!("player{idx:04}"),
                email: format!("p{idx}@pool.test"),
                avatar_url: String::new(),
                favorite_team: None,
                pix_key: None,
                role: Role::User,
                total_points: 0,
                bonus_usage: Default::default(),
                created_at: kickoff,
            })
            .unwrap();
        store
            .upsert_prediction(&Prediction {
                user_id: id,
                match_id: "m1".to_string(),
                round: 1,
                home_goals: (idx % 4) as u32,
                away_goals: (idx % 3) as u32,
                bonus_used: idx % 7 == 0,
                points: 0,
                created_at: kickoff,
            })
            .unwrap();
    }
    store
}

fn bench_score(c: &mut Criterion) {
    c.bench_function("score_compute", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for h in 0..6u32 {
                for a in 0..6u32 {
                    acc += scoring::score(black_box(2), black_box(1), h, a, h == a);
                }
            }
            black_box(acc);
        })
    });
}

fn bench_finalize(c: &mut Criterion) {
    let store = seeded_store(500);
    // Finalize is idempotent, so re-running against the same score is a
    // fair steady-state measurement.
    c.bench_function("finalize_500_predictions", |b| {
        b.iter(|| {
            let report = settlement::finalize(black_box(&store), "m1", 2, 1).unwrap();
            black_box(report.processed);
        })
    });
}

fn bench_overall_ranking(c: &mut Criterion) {
    let store = seeded_store(500);
    settlement::finalize(&store, "m1", 2, 1).unwrap();
    c.bench_function("overall_ranking_500_users", |b| {
        b.iter(|| {
            let rows = views::overall_ranking(black_box(&store), None).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_crowd_stats(c: &mut Criterion) {
    let store = seeded_store(500);
    let predictions = store.predictions_for_match("m1").unwrap();
    c.bench_function("crowd_stats_500_predictions", |b| {
        b.iter(|| {
            let stats = views::crowd_stats(black_box(&predictions)).unwrap();
            black_box(stats.total);
        })
    });
}

criterion_group!(
    perf,
    bench_score,
    bench_finalize,
    bench_overall_ranking,
    bench_crowd_stats
);
criterion_main!(perf);
