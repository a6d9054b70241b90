use chrono::{DateTime, Duration, TimeZone, Utc};

use bolao_engine::admission::{self, SubmitRequest};
use bolao_engine::model::{Match, MatchStatus, Role, User};
use bolao_engine::settlement::{self, MatchEdit};
use bolao_engine::sqlite_store::SqliteStore;
use bolao_engine::store::PoolStore;
use bolao_engine::{bonus, ledger, views};

fn kickoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 16, 0, 0).unwrap()
}

fn add_user(store: &SqliteStore, id: &str, admin: bool) {
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

fn add_match(store: &SqliteStore, id: &str, round: u32) {
    store
        .upsert_match(&Match {
            id: id.to_string(),
            round,
            home_team: "Bahia".to_string(),
            away_team: "Fortaleza".to_string(),
            home_crest_url: None,
            away_crest_url: None,
            kickoff: kickoff(),
            status: MatchStatus::Scheduled,
            home_score: None,
            away_score: None,
        })
        .unwrap();
}

fn submit(store: &SqliteStore, user: &str, match_id: &str, home: i64, away: i64, bonus: bool) {
    admission::submit(
        store,
        kickoff() - Duration::hours(2),
        &SubmitRequest {
            user_id: user.to_string(),
            match_id: match_id.to_string(),
            home_goals: home,
            away_goals: away,
            bonus_requested: bonus,
        },
    )
    .unwrap();
}

#[test]
fn rows_round_trip_through_sqlite() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);

    let m = store.match_by_id("m1").unwrap().unwrap();
    assert_eq!(m.round, 1);
    assert_eq!(m.kickoff, kickoff());
    assert_eq!(m.status, MatchStatus::Scheduled);

    let u = store.user_by_id("ana").unwrap().unwrap();
    assert_eq!(u.username, "ana");
    assert_eq!(u.role, Role::User);
    assert!(u.bonus_usage.is_empty());

    assert!(store.match_by_id("nope").unwrap().is_none());
    assert!(store.user_by_id("nope").unwrap().is_none());
}

#[test]
fn username_lookup_ignores_case() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "Ana", false);
    assert!(store.user_by_username_ci("ana").unwrap().is_some());
    assert!(store.user_by_username_ci("ANA").unwrap().is_some());
    assert!(store.user_by_username_ci("bia").unwrap().is_none());
}

#[test]
fn add_to_total_is_applied_in_place() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "ana", false);

    assert!(store.add_to_total("ana", 7).unwrap());
    assert!(store.add_to_total("ana", -3).unwrap());
    assert_eq!(store.user_by_id("ana").unwrap().unwrap().total_points, 4);
    // Missing users are reported, not created.
    assert!(!store.add_to_total("ghost", 5).unwrap());
}

#[test]
fn full_settlement_cycle_over_sqlite() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "root", true);
    add_user(&store, "ana", false);
    add_user(&store, "bia", false);
    add_match(&store, "m1", 1);

    submit(&store, "ana", "m1", 2, 1, true);
    submit(&store, "bia", "m1", 0, 0, false);

    let report = settlement::save_match(
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
    assert!(report.fully_settled());
    assert_eq!(report.processed, 2);

    assert_eq!(store.user_by_id("ana").unwrap().unwrap().total_points, 20);
    assert_eq!(store.user_by_id("bia").unwrap().unwrap().total_points, 0);

    // Re-running produces no drift.
    settlement::finalize(&store, "m1", 2, 1).unwrap();
    assert_eq!(store.user_by_id("ana").unwrap().unwrap().total_points, 20);

    settlement::delete_match(&store, "root", "m1").unwrap();
    assert!(store.match_by_id("m1").unwrap().is_none());
    assert_eq!(store.user_by_id("ana").unwrap().unwrap().total_points, 0);
}

#[test]
fn bonus_slot_persists_in_the_user_row() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "ana", false);
    add_match(&store, "m1", 1);
    add_match(&store, "m2", 1);

    submit(&store, "ana", "m1", 1, 0, true);
    assert_eq!(bonus::holder(&store, "ana", 1).unwrap().as_deref(), Some("m1"));

    // Moving the bonus clears the old prediction's flag.
    submit(&store, "ana", "m2", 1, 0, true);
    assert_eq!(bonus::holder(&store, "ana", 1).unwrap().as_deref(), Some("m2"));
    assert!(!store.prediction("ana", "m1").unwrap().unwrap().bonus_used);
    assert!(store.prediction("ana", "m2").unwrap().unwrap().bonus_used);
}

#[test]
fn ledger_and_views_work_over_sqlite() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "root", true);
    add_user(&store, "ana", false);
    add_user(&store, "bia", false);

    ledger::mark_paid(&store, "root", 2, "ana", kickoff()).unwrap();
    ledger::mark_paid(&store, "root", 2, "bia", kickoff()).unwrap();
    let prize = store.round_prize(2).unwrap().unwrap();
    assert!(prize.enabled);
    assert_eq!(prize.total_amount, 20);

    store.add_to_total("bia", 9).unwrap();
    let rows = views::overall_ranking(&store, None).unwrap();
    assert_eq!(rows[0].username, "bia");
    assert!(rows[0].champion);
}

#[test]
fn list_matches_orders_by_round_then_kickoff() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .upsert_match(&Match {
            id: "late".to_string(),
            round: 1,
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            home_crest_url: None,
            away_crest_url: None,
            kickoff: kickoff() + Duration::hours(3),
            status: MatchStatus::Scheduled,
            home_score: None,
            away_score: None,
        })
        .unwrap();
    add_match(&store, "early", 1);
    add_match(&store, "next-round", 0);

    let ids: Vec<String> = store.list_matches().unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["next-round", "early", "late"]);
}

#[test]
fn concurrent_bonus_slot_writes_do_not_lose_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    add_user(&store, "ana", false);

    for iter in 0..200u32 {
        let m1 = format!("r1-{iter}");
        let m2 = format!("r2-{iter}");
        std::thread::scope(|s| {
            s.spawn(|| store.set_bonus_slot("ana", 1, Some(&m1)).unwrap());
            s.spawn(|| store.set_bonus_slot("ana", 2, Some(&m2)).unwrap());
        });

        let user = store.user_by_id("ana").unwrap().unwrap();
        assert_eq!(user.bonus_usage.get(&1), Some(&m1), "iteration {iter}");
        assert_eq!(user.bonus_usage.get(&2), Some(&m2), "iteration {iter}");
    }
}
