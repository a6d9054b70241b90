//! Bonus allocation: at most one prediction per (user, round) may carry
//! the 2x bonus. The per-user `bonus_usage` map is the source of truth
//! for which match holds the slot; the prediction's `bonus_used` flag
//! must follow it.

use tracing::debug;

use crate::error::{PoolError, Result};
use crate::store::PoolStore;

/// Moves the (user, round) bonus slot to `match_id`. If another match
/// currently holds it, that prediction's flag is cleared first, then
/// the map entry is rewritten, then the new prediction is flagged.
pub fn claim(store: &dyn PoolStore, user_id: &str, round: u32, match_id: &str) -> Result<()> {
    let user = store
        .user_by_id(user_id)?
        .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;

    if let Some(previous) = user.bonus_usage.get(&round) {
        if previous != match_id {
            debug!(user_id, round, previous, "reassigning round bonus");
            if store.prediction(user_id, previous)?.is_some() {
                store.set_prediction_bonus(user_id, previous, false)?;
            }
        }
    }

    store.set_bonus_slot(user_id, round, Some(match_id))?;
    store.set_prediction_bonus(user_id, match_id, true)?;
    Ok(())
}

/// Clears the bonus from `match_id`. The map entry is deleted only when
/// it actually points at this match; the prediction flag is always
/// lowered, so a repeated release is a no-op.
pub fn release(store: &dyn PoolStore, user_id: &str, round: u32, match_id: &str) -> Result<()> {
    let user = store
        .user_by_id(user_id)?
        .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;

    if user.bonus_usage.get(&round).map(String::as_str) == Some(match_id) {
        store.set_bonus_slot(user_id, round, None)?;
    }
    store.set_prediction_bonus(user_id, match_id, false)?;
    Ok(())
}

/// The match currently holding the user's bonus for `round`, if any.
pub fn holder(store: &dyn PoolStore, user_id: &str, round: u32) -> Result<Option<String>> {
    let user = store
        .user_by_id(user_id)?
        .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;
    Ok(user.bonus_usage.get(&round).cloned())
}
