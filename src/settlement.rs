//! Settlement engine: keeps `Prediction.points` and `User.total_points`
//! consistent with match results across finish / unfinish / edit /
//! delete transitions.
//!
//! Every mutation of a user's total is a signed delta against the
//! stored old points, applied through the store's atomic `add_to_total`
//! primitive. That makes `finalize` idempotent: re-running it with the
//! same final score produces all-zero deltas.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::auth;
use crate::error::{PoolError, Result};
use crate::model::{Match, MatchStatus, Prediction};
use crate::scoring;
use crate::store::PoolStore;

/// What happened to each prediction of a settled match. `failed` and
/// `skipped_users` carry prediction ids; a non-empty `failed` list
/// means the match is only partially settled and the caller should
/// retry (re-running is safe).
#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    pub match_id: String,
    pub processed: usize,
    /// Predictions whose owning user no longer exists; their points
    /// were still rewritten, only the total update was skipped.
    pub skipped_users: Vec<String>,
    pub failed: Vec<String>,
}

impl SettlementReport {
    pub fn fully_settled(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Recomputes every prediction of a finished match against the final
/// score and shifts each owner's total by the delta.
pub fn finalize(
    store: &dyn PoolStore,
    match_id: &str,
    final_home: u32,
    final_away: u32,
) -> Result<SettlementReport> {
    // A failed match lookup aborts the whole call; partial settlement
    // is only ever reported per prediction.
    store
        .match_by_id(match_id)?
        .ok_or_else(|| PoolError::MatchNotFound(match_id.to_string()))?;

    settle(store, match_id, |p| {
        scoring::score(final_home, final_away, p.home_goals, p.away_goals, p.bonus_used)
    })
}

/// Zeroes every prediction of a match and removes the old points from
/// the owners' totals. Mandatory predecessor of a match delete and of
/// any finished -> not-finished transition.
pub fn unfinalize(store: &dyn PoolStore, match_id: &str) -> Result<SettlementReport> {
    store
        .match_by_id(match_id)?
        .ok_or_else(|| PoolError::MatchNotFound(match_id.to_string()))?;

    settle(store, match_id, |_| 0)
}

enum Settled {
    Done,
    OwnerMissing(String),
    Failed(String),
}

fn settle(
    store: &dyn PoolStore,
    match_id: &str,
    new_points: impl Fn(&Prediction) -> i64 + Sync,
) -> Result<SettlementReport> {
    let predictions = store.predictions_for_match(match_id)?;
    let processed = predictions.len();

    // Predictions touch disjoint records, so the per-prediction work can
    // fan out; per-user total increments stay safe because add_to_total
    // applies the delta atomically inside the store.
    let outcomes: Vec<Settled> = predictions
        .par_iter()
        .map(|pred| {
            let old_points = pred.points;
            let points = new_points(pred);

            if let Err(err) = store.set_prediction_points(&pred.user_id, &pred.match_id, points) {
                warn!(prediction = %pred.id(), %err, "failed to write prediction points");
                return Settled::Failed(pred.id());
            }

            let delta = points - old_points;
            if delta == 0 {
                return Settled::Done;
            }
            match store.add_to_total(&pred.user_id, delta) {
                Ok(true) => Settled::Done,
                Ok(false) => {
                    // Orphaned prediction: owner was deleted. Points
                    // were still rewritten above; only the total is
                    // skipped.
                    warn!(prediction = %pred.id(), user = %pred.user_id, "owner missing, skipping total update");
                    Settled::OwnerMissing(pred.id())
                }
                Err(err) => {
                    warn!(prediction = %pred.id(), %err, "failed to adjust user total");
                    Settled::Failed(pred.id())
                }
            }
        })
        .collect();

    let mut skipped_users = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome {
            Settled::Done => {}
            Settled::OwnerMissing(id) => skipped_users.push(id),
            Settled::Failed(id) => failed.push(id),
        }
    }
    skipped_users.sort();
    failed.sort();

    debug!(match_id, processed, skipped = skipped_users.len(), failed = failed.len(), "settled match");

    Ok(SettlementReport {
        match_id: match_id.to_string(),
        processed,
        skipped_users,
        failed,
    })
}

/// An admin's edit to a match: new status plus the score fields as
/// entered on the form.
#[derive(Debug, Clone, Copy)]
pub struct MatchEdit {
    pub status: MatchStatus,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

/// Admin-only: creates a scheduled match with no scores.
pub fn create_match(
    store: &dyn PoolStore,
    admin_id: &str,
    round: u32,
    home_team: &str,
    away_team: &str,
    kickoff: DateTime<Utc>,
) -> Result<Match> {
    auth::require_admin(store, admin_id)?;

    let m = Match {
        id: generate_match_id(round, home_team, away_team, kickoff),
        round,
        home_team: home_team.to_string(),
        away_team: away_team.to_string(),
        home_crest_url: None,
        away_crest_url: None,
        kickoff,
        status: MatchStatus::Scheduled,
        home_score: None,
        away_score: None,
    };
    store.upsert_match(&m)?;
    Ok(m)
}

/// Admin-only: applies a status/score edit and runs the matching
/// settlement cascade. Finishing a match requires both scores; moving a
/// finished match back to scheduled/live clears them and zeroes every
/// linked prediction.
pub fn save_match(
    store: &dyn PoolStore,
    admin_id: &str,
    match_id: &str,
    edit: MatchEdit,
) -> Result<SettlementReport> {
    auth::require_admin(store, admin_id)?;

    let mut m = store
        .match_by_id(match_id)?
        .ok_or_else(|| PoolError::MatchNotFound(match_id.to_string()))?;

    match edit.status {
        MatchStatus::Finished => {
            let (Some(home), Some(away)) = (edit.home_score, edit.away_score) else {
                return Err(PoolError::InvalidScore(
                    "a finished match needs both final scores".to_string(),
                ));
            };
            m.status = MatchStatus::Finished;
            m.home_score = Some(home);
            m.away_score = Some(away);
            store.upsert_match(&m)?;
            finalize(store, match_id, home, away)
        }
        status => {
            // Scores are only meaningful on a finished match.
            m.status = status;
            m.home_score = None;
            m.away_score = None;
            store.upsert_match(&m)?;
            unfinalize(store, match_id)
        }
    }
}

/// Admin-only: deletes a match. The unfinalize pre-step must fully
/// succeed first, otherwise the delete is aborted and the error (or a
/// partial-settlement report) is surfaced; deleting anyway would leave
/// stale points in user totals.
pub fn delete_match(
    store: &dyn PoolStore,
    admin_id: &str,
    match_id: &str,
) -> Result<SettlementReport> {
    auth::require_admin(store, admin_id)?;

    let report = unfinalize(store, match_id)?;
    if !report.fully_settled() {
        warn!(match_id, failed = report.failed.len(), "aborting delete, reset incomplete");
        return Err(PoolError::Store(format!(
            "match {match_id} not deleted: {} predictions failed to reset",
            report.failed.len()
        )));
    }

    store.remove_match(match_id)?;
    Ok(report)
}

fn generate_match_id(round: u32, home: &str, away: &str, kickoff: DateTime<Utc>) -> String {
    format!(
        "m{round}-{}x{}-{}",
        slug(home),
        slug(away),
        kickoff.timestamp()
    )
}

fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
