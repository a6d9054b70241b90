//! Prediction admission: validates a submission against the freshly
//! read match state and upserts the prediction with its points reset.

use chrono::{DateTime, Utc};

use crate::bonus;
use crate::error::{PoolError, Result};
use crate::model::Prediction;
use crate::store::PoolStore;

/// Raw submission as it arrives from the boundary. Goal counts are kept
/// signed here so a negative input is rejected with `InvalidScore`
/// instead of being silently coerced.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: String,
    pub match_id: String,
    pub home_goals: i64,
    pub away_goals: i64,
    pub bonus_requested: bool,
}

/// Validates and records one user's prediction for one match.
///
/// Checks run in order: match existence, the prediction window (not
/// finished, strictly before kickoff, read fresh from the store and never
/// from a cached match), score validity, and the one-bonus-per-round
/// rule. The match is re-read here on purpose: a submission may race a
/// kickoff boundary or an admin edit.
///
/// On success the prediction is upserted with `points = 0` and the
/// bonus tracker is updated. Last write wins for repeated submissions
/// of the same (user, match) pair.
pub fn submit(store: &dyn PoolStore, now: DateTime<Utc>, req: &SubmitRequest) -> Result<Prediction> {
    let m = store
        .match_by_id(&req.match_id)?
        .ok_or_else(|| PoolError::MatchNotFound(req.match_id.clone()))?;

    if !m.open_for_predictions(now) {
        return Err(PoolError::PredictionsClosed(m.id.clone()));
    }

    if req.home_goals < 0 || req.away_goals < 0 {
        return Err(PoolError::InvalidScore(format!(
            "goal counts must be non-negative, got {}x{}",
            req.home_goals, req.away_goals
        )));
    }

    if req.bonus_requested {
        if let Some(held_by) = bonus::holder(store, &req.user_id, m.round)? {
            if held_by != req.match_id {
                return Err(PoolError::BonusAlreadyUsedThisRound {
                    round: m.round,
                    held_by,
                });
            }
        }
    }

    let prediction = Prediction {
        user_id: req.user_id.clone(),
        match_id: req.match_id.clone(),
        round: m.round,
        home_goals: req.home_goals as u32,
        away_goals: req.away_goals as u32,
        bonus_used: req.bonus_requested,
        points: 0,
        created_at: now,
    };
    store.upsert_prediction(&prediction)?;

    if req.bonus_requested {
        bonus::claim(store, &req.user_id, m.round, &req.match_id)?;
    } else if let Some(held_by) = bonus::holder(store, &req.user_id, m.round)?
        && held_by == req.match_id
    {
        // Saving without the bonus while this match holds the round's
        // slot is an implicit release. A failed holder read surfaces to
        // the caller so the map never silently disagrees with the flag.
        bonus::release(store, &req.user_id, m.round, &req.match_id)?;
    }

    Ok(prediction)
}
