use chrono::{DateTime, TimeZone, Utc};

use bolao_engine::model::{Match, MatchStatus, Prediction, Role, User};
use bolao_engine::settlement::{self, MatchEdit};
use bolao_engine::store::{MemoryStore, PoolStore};

fn kickoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 16, 0, 0).unwrap()
}

fn add_user(store: &MemoryStore, id: &str, admin: bool) {
    store
        .upsert_user(&User {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{id}@pool.test"),
            avatar_url: String::new(),
            favorite_team: None,
            pix_key: None,
            role: if admin { Role::Admin } else { Role::User },
            total_points: 0,
            bonus_usage: Default::default(),
            created_at: kickoff(),
        })
        .unwrap();
}

fn add_match(store: &MemoryStore, id: &str, round: u32) {
    store
        .upsert_match(&Match {
            id: id.to_string(),
            round,
            home_team: "Flamengo".to_string(),
            away_team: "Palmeiras".to_string(),
            home_crest_url: None,
            away_crest_url: None,
            kickoff: kickoff(),
            status: MatchStatus::Scheduled,
            home_score: None,
            away_score: None,
        })
        .unwrap();
}

fn add_prediction(store: &MemoryStore, user: &str, match_id: &str, home: u32, away: u32, bonus: bool) {
    store
        .upsert_prediction(&Prediction {
            user_id: user.to_string(),
            match_id: match_id.to_string(),
            round: 1,
            home_goals: home,
            away_goals: away,
            bonus_used: bonus,
            points: 0,
            created_at: kickoff(),
        })
        .unwrap();
}

fn total(store: &MemoryStore, user: &str) -> i64 {
    store.user_by_id(user).unwrap().unwrap().total_points
}

fn points(store: &MemoryStore, user: &str, match_id: &str) -> i64 {
    store.prediction(user, match_id).unwrap().unwrap().points
}

#[test]
fn finalize_scores_exact_partial_and_miss() {
    let store = MemoryStore::new();
    for id in ["ana", "bia", "caio"] {
        add_user(&store, id, false);
    }
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, false); // exact
    add_prediction(&store, "bia", "m1", 1, 0, false); // outcome + goal diff
    add_prediction(&store, "caio", "m1", 0, 3, false); // everything wrong

    let report = settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert!(report.fully_settled());
    assert_eq!(report.processed, 3);

    assert_eq!(points(&store, "ana", "m1"), 10);
    assert_eq!(total(&store, "ana"), 10);
    // 1x0 against 2x1: outcome (3) + goal diff (3); both exact-goal
    // checks miss.
    assert_eq!(points(&store, "bia", "m1"), 6);
    assert_eq!(total(&store, "bia"), 6);
    assert_eq!(points(&store, "caio", "m1"), 0);
    assert_eq!(total(&store, "caio"), 0);
}

#[test]
fn bonus_doubles_the_settled_points() {
    let store = MemoryStore::new();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, true);

    settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert_eq!(points(&store, "ana", "m1"), 20);
    assert_eq!(total(&store, "ana"), 20);
}

#[test]
fn finalize_is_idempotent() {
    let store = MemoryStore::new();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, false);

    settlement::finalize(&store, "m1", 2, 1).unwrap();
    settlement::finalize(&store, "m1", 2, 1).unwrap();
    settlement::finalize(&store, "m1", 2, 1).unwrap();

    assert_eq!(total(&store, "ana"), 10);
}

#[test]
fn refinalize_with_new_score_applies_the_delta() {
    let store = MemoryStore::new();
    add_user(&store, "ana", false);
    add_user(&store, "bia", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, false);
    add_prediction(&store, "bia", "m1", 1, 1, false);

    settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert_eq!(total(&store, "ana"), 10);
    // 1x1 against 2x1 still hits the exact away goals.
    assert_eq!(total(&store, "bia"), 2);

    // Result corrected to 1x1: ana drops from 10 to the away-goals 2,
    // bia gets the exact-score 10.
    settlement::finalize(&store, "m1", 1, 1).unwrap();
    assert_eq!(total(&store, "ana"), 2);
    assert_eq!(total(&store, "bia"), 10);
}

#[test]
fn unfinalize_returns_totals_to_zero() {
    let store = MemoryStore::new();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, true);

    settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert_eq!(total(&store, "ana"), 20);

    settlement::unfinalize(&store, "m1").unwrap();
    assert_eq!(points(&store, "ana", "m1"), 0);
    assert_eq!(total(&store, "ana"), 0);
}

#[test]
fn finalize_unknown_match_aborts() {
    let store = MemoryStore::new();
    assert!(settlement::finalize(&store, "nope", 1, 0).is_err());
    assert!(settlement::unfinalize(&store, "nope").is_err());
}

#[test]
fn orphaned_prediction_is_rescored_but_total_skipped() {
    let store = MemoryStore::new();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, false);
    add_prediction(&store, "ghost", "m1", 2, 1, false); // no such user

    let report = settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert!(report.fully_settled());
    assert_eq!(report.skipped_users, vec!["ghost_m1".to_string()]);

    // The orphan's points are still rewritten.
    assert_eq!(points(&store, "ghost", "m1"), 10);
    assert_eq!(total(&store, "ana"), 10);
}

#[test]
fn save_match_finished_requires_both_scores() {
    let store = MemoryStore::new();
    add_user(&store, "root", true);
    add_match(&store, "m1", 1);

    let err = settlement::save_match(
        &store,
        "root",
        "m1",
        MatchEdit {
            status: MatchStatus::Finished,
            home_score: Some(2),
            away_score: None,
        },
    );
    assert!(err.is_err());
}

#[test]
fn save_match_edit_then_reopen_cascades() {
    let store = MemoryStore::new();
    add_user(&store, "root", true);
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, false);

    settlement::save_match(
        &store,
        "root",
        "m1",
        MatchEdit {
            status: MatchStatus::Finished,
            home_score: Some(2),
            away_score: Some(1),
        },
    )
    .unwrap();
    assert_eq!(total(&store, "ana"), 10);
    assert_eq!(
        store.match_by_id("m1").unwrap().unwrap().final_score(),
        Some((2, 1))
    );

    // Edit to 1x1 recomputes through the same path: ana's 2x1 pick
    // keeps the exact away goals against the new result.
    settlement::save_match(
        &store,
        "root",
        "m1",
        MatchEdit {
            status: MatchStatus::Finished,
            home_score: Some(1),
            away_score: Some(1),
        },
    )
    .unwrap();
    assert_eq!(total(&store, "ana"), 2);

    // Reopening clears the scores and zeroes predictions.
    settlement::save_match(
        &store,
        "root",
        "m1",
        MatchEdit {
            status: MatchStatus::Live,
            home_score: Some(1),
            away_score: Some(1),
        },
    )
    .unwrap();
    let m = store.match_by_id("m1").unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Live);
    assert_eq!(m.home_score, None);
    assert_eq!(m.away_score, None);
    assert_eq!(points(&store, "ana", "m1"), 0);
    assert_eq!(total(&store, "ana"), 0);
}

#[test]
fn delete_match_unwinds_points_first() {
    let store = MemoryStore::new();
    add_user(&store, "root", true);
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_prediction(&store, "ana", "m1", 2, 1, false);

    settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert_eq!(total(&store, "ana"), 10);

    settlement::delete_match(&store, "root", "m1").unwrap();
    assert!(store.match_by_id("m1").unwrap().is_none());
    assert_eq!(total(&store, "ana"), 0);
}

#[test]
fn admin_operations_reject_plain_users() {
    let store = MemoryStore::new();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);

    assert!(settlement::create_match(&store, "ana", 1, "A", "B", kickoff()).is_err());
    assert!(settlement::delete_match(&store, "ana", "m1").is_err());
    assert!(
        settlement::save_match(
            &store,
            "ana",
            "m1",
            MatchEdit {
                status: MatchStatus::Finished,
                home_score: Some(1),
                away_score: Some(0),
            },
        )
        .is_err()
    );
}

#[test]
fn totals_equal_prediction_sums_across_many_matches() {
    let store = MemoryStore::new();
    add_user(&store, "root", true);
    for id in ["ana", "bia", "caio", "duda"] {
        add_user(&store, id, false);
    }
    for (idx, m) in ["m1", "m2", "m3"].iter().enumerate() {
        add_match(&store, m, idx as u32 + 1);
        for (uidx, u) in ["ana", "bia", "caio", "duda"].iter().enumerate() {
            add_prediction(&store, u, m, uidx as u32, (uidx as u32 + idx as u32) % 3, uidx == idx);
        }
    }

    settlement::finalize(&store, "m1", 2, 1).unwrap();
    settlement::finalize(&store, "m2", 0, 0).unwrap();
    settlement::finalize(&store, "m3", 1, 2).unwrap();
    // Rescore one, unwind another.
    settlement::finalize(&store, "m2", 3, 1).unwrap();
    settlement::unfinalize(&store, "m3").unwrap();

    for user in store.list_users().unwrap() {
        let sum: i64 = store
            .predictions_for_user(&user.id)
            .unwrap()
            .iter()
            .map(|p| p.points)
            .sum();
        assert_eq!(user.total_points, sum, "user {}", user.id);
    }
}
