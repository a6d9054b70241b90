//! Round payment ledger: presence of a RoundEntry means "paid in". The
//! cached RoundPrize is recomputed synchronously after every change so
//! it never drifts from the entry count.

use chrono::{DateTime, Utc};

use crate::auth;
use crate::error::{PoolError, Result};
use crate::model::{PrizeType, RoundEntry, RoundPrize};
use crate::store::PoolStore;

/// Fixed buy-in per user per round.
pub const ENTRY_UNIT_AMOUNT: u32 = 10;
pub const PRIZE_POSITIONS: u32 = 1;

/// Admin-only, idempotent: records the user as paid for the round and
/// recomputes the prize.
pub fn mark_paid(
    store: &dyn PoolStore,
    admin_id: &str,
    round: u32,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<RoundPrize> {
    auth::require_admin(store, admin_id)?;
    store
        .user_by_id(user_id)?
        .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;

    if store.round_entry(round, user_id)?.is_none() {
        store.upsert_round_entry(&RoundEntry {
            round,
            user_id: user_id.to_string(),
            amount: ENTRY_UNIT_AMOUNT,
            paid_at: now,
            recorded_by: admin_id.to_string(),
        })?;
    }
    recompute_prize(store, round)
}

/// Admin-only: removes the user's entry (no-op if absent) and
/// recomputes the prize.
pub fn unmark_paid(
    store: &dyn PoolStore,
    admin_id: &str,
    round: u32,
    user_id: &str,
) -> Result<RoundPrize> {
    auth::require_admin(store, admin_id)?;
    store.remove_round_entry(round, user_id)?;
    recompute_prize(store, round)
}

/// Derives the round's prize from the paid-entry count and upserts the
/// cached summary: disabled at zero entries, otherwise
/// `count x ENTRY_UNIT_AMOUNT` paid out in currency.
pub fn recompute_prize(store: &dyn PoolStore, round: u32) -> Result<RoundPrize> {
    let count = store.round_entries(round)?.len() as u32;
    let prize = RoundPrize {
        round,
        enabled: count > 0,
        total_amount: count * ENTRY_UNIT_AMOUNT,
        prize_type: PrizeType::Money,
        positions: PRIZE_POSITIONS,
    };
    store.upsert_round_prize(&prize)?;
    Ok(prize)
}
