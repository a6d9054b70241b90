use std::collections::HashMap;
use std::sync::{Mutex, mpsc};

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::model::{Match, Prediction, RoundEntry, RoundPrize, User};

/// Typed view over the document store the engine runs against. One
/// method per get/query/upsert/delete shape the core actually needs;
/// implementations decide how the collections are laid out.
///
/// `add_to_total` is the one primitive with extra contract: the delta
/// must be applied atomically against the stored value, so concurrent
/// settlement tasks can never race a read-modify-write on the same
/// user. Returns `false` when the user record no longer exists.
pub trait PoolStore: Send + Sync {
    fn match_by_id(&self, id: &str) -> Result<Option<Match>>;
    /// All matches, ordered by round then kickoff.
    fn list_matches(&self) -> Result<Vec<Match>>;
    fn matches_in_round(&self, round: u32) -> Result<Vec<Match>>;
    fn upsert_match(&self, m: &Match) -> Result<()>;
    /// Removes the row only; cascades are the settlement engine's job.
    fn remove_match(&self, id: &str) -> Result<()>;

    fn user_by_id(&self, id: &str) -> Result<Option<User>>;
    fn user_by_username_ci(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn upsert_user(&self, u: &User) -> Result<()>;
    fn add_to_total(&self, user_id: &str, delta: i64) -> Result<bool>;
    /// `None` clears the round's slot.
    fn set_bonus_slot(&self, user_id: &str, round: u32, match_id: Option<&str>) -> Result<()>;

    fn prediction(&self, user_id: &str, match_id: &str) -> Result<Option<Prediction>>;
    fn predictions_for_match(&self, match_id: &str) -> Result<Vec<Prediction>>;
    fn predictions_for_user(&self, user_id: &str) -> Result<Vec<Prediction>>;
    fn predictions_for_round_user(&self, round: u32, user_id: &str) -> Result<Vec<Prediction>>;
    fn list_predictions(&self) -> Result<Vec<Prediction>>;
    fn upsert_prediction(&self, p: &Prediction) -> Result<()>;
    fn set_prediction_points(&self, user_id: &str, match_id: &str, points: i64) -> Result<()>;
    fn set_prediction_bonus(&self, user_id: &str, match_id: &str, bonus: bool) -> Result<()>;

    fn round_entry(&self, round: u32, user_id: &str) -> Result<Option<RoundEntry>>;
    fn round_entries(&self, round: u32) -> Result<Vec<RoundEntry>>;
    fn upsert_round_entry(&self, e: &RoundEntry) -> Result<()>;
    fn remove_round_entry(&self, round: u32, user_id: &str) -> Result<()>;

    fn round_prize(&self, round: u32) -> Result<Option<RoundPrize>>;
    fn upsert_round_prize(&self, p: &RoundPrize) -> Result<()>;
}

/// Live snapshots of a match's predictions, for the aggregate views.
/// Each delivery is a full snapshot: consumers recompute from scratch,
/// so re-delivery and stale arrivals are harmless.
pub trait PredictionFeed {
    fn subscribe_match(&self, match_id: &str) -> mpsc::Receiver<Vec<Prediction>>;
}

/// Full store contents, used by the JSON persistence layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub matches: Vec<Match>,
    pub users: Vec<User>,
    pub predictions: Vec<Prediction>,
    pub round_entries: Vec<RoundEntry>,
    pub round_prizes: Vec<RoundPrize>,
}

#[derive(Debug, Default)]
struct StoreData {
    matches: HashMap<String, Match>,
    users: HashMap<String, User>,
    // keyed by Prediction::composite_id
    predictions: HashMap<String, Prediction>,
    // keyed by RoundEntry::composite_id
    round_entries: HashMap<String, RoundEntry>,
    round_prizes: HashMap<u32, RoundPrize>,
}

/// In-memory implementation, one mutex over the whole data set. Also
/// the only store that implements `PredictionFeed`.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    watchers: Mutex<Vec<(String, mpsc::Sender<Vec<Prediction>>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let data = self.lock_data()?;
        let mut matches: Vec<Match> = data.matches.values().cloned().collect();
        matches.sort_by(|a, b| (a.round, a.kickoff).cmp(&(b.round, b.kickoff)));
        let mut users: Vec<User> = data.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        let mut predictions: Vec<Prediction> = data.predictions.values().cloned().collect();
        predictions.sort_by(|a, b| a.id().cmp(&b.id()));
        let mut round_entries: Vec<RoundEntry> = data.round_entries.values().cloned().collect();
        round_entries.sort_by(|a, b| (a.round, &a.user_id).cmp(&(b.round, &b.user_id)));
        let mut round_prizes: Vec<RoundPrize> = data.round_prizes.values().cloned().collect();
        round_prizes.sort_by_key(|p| p.round);
        Ok(StoreSnapshot {
            matches,
            users,
            predictions,
            round_entries,
            round_prizes,
        })
    }

    pub fn restore(&self, snapshot: StoreSnapshot) -> Result<()> {
        let mut data = self.lock_data()?;
        *data = StoreData::default();
        for m in snapshot.matches {
            data.matches.insert(m.id.clone(), m);
        }
        for u in snapshot.users {
            data.users.insert(u.id.clone(), u);
        }
        for p in snapshot.predictions {
            data.predictions.insert(p.id(), p);
        }
        for e in snapshot.round_entries {
            data.round_entries
                .insert(RoundEntry::composite_id(e.round, &e.user_id), e);
        }
        for p in snapshot.round_prizes {
            data.round_prizes.insert(p.round, p);
        }
        Ok(())
    }

    fn lock_data(&self) -> Result<std::sync::MutexGuard<'_, StoreData>> {
        self.data
            .lock()
            .map_err(|_| PoolError::Store("memory store lock poisoned".to_string()))
    }

    fn notify_match(&self, match_id: &str) {
        let snapshot = match self.predictions_for_match(match_id) {
            Ok(preds) => preds,
            Err(_) => return,
        };
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        watchers.retain(|(id, tx)| id != match_id || tx.send(snapshot.clone()).is_ok());
    }
}

impl PredictionFeed for MemoryStore {
    fn subscribe_match(&self, match_id: &str) -> mpsc::Receiver<Vec<Prediction>> {
        let (tx, rx) = mpsc::channel();
        // Deliver the current state immediately so a late subscriber
        // does not wait for the next write.
        if let Ok(current) = self.predictions_for_match(match_id) {
            let _ = tx.send(current);
        }
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push((match_id.to_string(), tx));
        }
        rx
    }
}

impl PoolStore for MemoryStore {
    fn match_by_id(&self, id: &str) -> Result<Option<Match>> {
        Ok(self.lock_data()?.matches.get(id).cloned())
    }

    fn list_matches(&self) -> Result<Vec<Match>> {
        let data = self.lock_data()?;
        let mut out: Vec<Match> = data.matches.values().cloned().collect();
        out.sort_by(|a, b| (a.round, a.kickoff).cmp(&(b.round, b.kickoff)));
        Ok(out)
    }

    fn matches_in_round(&self, round: u32) -> Result<Vec<Match>> {
        let data = self.lock_data()?;
        let mut out: Vec<Match> = data
            .matches
            .values()
            .filter(|m| m.round == round)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.kickoff);
        Ok(out)
    }

    fn upsert_match(&self, m: &Match) -> Result<()> {
        self.lock_data()?.matches.insert(m.id.clone(), m.clone());
        Ok(())
    }

    fn remove_match(&self, id: &str) -> Result<()> {
        self.lock_data()?.matches.remove(id);
        Ok(())
    }

    fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.lock_data()?.users.get(id).cloned())
    }

    fn user_by_username_ci(&self, username: &str) -> Result<Option<User>> {
        let needle = username.to_lowercase();
        let data = self.lock_data()?;
        Ok(data
            .users
            .values()
            .find(|u| u.username.to_lowercase() == needle)
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let data = self.lock_data()?;
        let mut out: Vec<User> = data.users.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn upsert_user(&self, u: &User) -> Result<()> {
        self.lock_data()?.users.insert(u.id.clone(), u.clone());
        Ok(())
    }

    fn add_to_total(&self, user_id: &str, delta: i64) -> Result<bool> {
        let mut data = self.lock_data()?;
        match data.users.get_mut(user_id) {
            Some(user) => {
                user.total_points += delta;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_bonus_slot(&self, user_id: &str, round: u32, match_id: Option<&str>) -> Result<()> {
        let mut data = self.lock_data()?;
        let user = data
            .users
            .get_mut(user_id)
            .ok_or_else(|| PoolError::UserNotFound(user_id.to_string()))?;
        match match_id {
            Some(id) => {
                user.bonus_usage.insert(round, id.to_string());
            }
            None => {
                user.bonus_usage.remove(&round);
            }
        }
        Ok(())
    }

    fn prediction(&self, user_id: &str, match_id: &str) -> Result<Option<Prediction>> {
        let key = Prediction::composite_id(user_id, match_id);
        Ok(self.lock_data()?.predictions.get(&key).cloned())
    }

    fn predictions_for_match(&self, match_id: &str) -> Result<Vec<Prediction>> {
        let data = self.lock_data()?;
        let mut out: Vec<Prediction> = data
            .predictions
            .values()
            .filter(|p| p.match_id == match_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(out)
    }

    fn predictions_for_user(&self, user_id: &str) -> Result<Vec<Prediction>> {
        let data = self.lock_data()?;
        let mut out: Vec<Prediction> = data
            .predictions
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.round, &a.match_id).cmp(&(b.round, &b.match_id)));
        Ok(out)
    }

    fn predictions_for_round_user(&self, round: u32, user_id: &str) -> Result<Vec<Prediction>> {
        let data = self.lock_data()?;
        let mut out: Vec<Prediction> = data
            .predictions
            .values()
            .filter(|p| p.round == round && p.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        Ok(out)
    }

    fn list_predictions(&self) -> Result<Vec<Prediction>> {
        let data = self.lock_data()?;
        let mut out: Vec<Prediction> = data.predictions.values().cloned().collect();
        out.sort_by(|a, b| a.id().cmp(&b.id()));
        Ok(out)
    }

    fn upsert_prediction(&self, p: &Prediction) -> Result<()> {
        self.lock_data()?.predictions.insert(p.id(), p.clone());
        self.notify_match(&p.match_id);
        Ok(())
    }

    fn set_prediction_points(&self, user_id: &str, match_id: &str, points: i64) -> Result<()> {
        let key = Prediction::composite_id(user_id, match_id);
        {
            let mut data = self.lock_data()?;
            if let Some(pred) = data.predictions.get_mut(&key) {
                pred.points = points;
            }
        }
        self.notify_match(match_id);
        Ok(())
    }

    fn set_prediction_bonus(&self, user_id: &str, match_id: &str, bonus: bool) -> Result<()> {
        let key = Prediction::composite_id(user_id, match_id);
        {
            let mut data = self.lock_data()?;
            if let Some(pred) = data.predictions.get_mut(&key) {
                pred.bonus_used = bonus;
            }
        }
        self.notify_match(match_id);
        Ok(())
    }

    fn round_entry(&self, round: u32, user_id: &str) -> Result<Option<RoundEntry>> {
        let key = RoundEntry::composite_id(round, user_id);
        Ok(self.lock_data()?.round_entries.get(&key).cloned())
    }

    fn round_entries(&self, round: u32) -> Result<Vec<RoundEntry>> {
        let data = self.lock_data()?;
        let mut out: Vec<RoundEntry> = data
            .round_entries
            .values()
            .filter(|e| e.round == round)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(out)
    }

    fn upsert_round_entry(&self, e: &RoundEntry) -> Result<()> {
        let key = RoundEntry::composite_id(e.round, &e.user_id);
        self.lock_data()?.round_entries.insert(key, e.clone());
        Ok(())
    }

    fn remove_round_entry(&self, round: u32, user_id: &str) -> Result<()> {
        let key = RoundEntry::composite_id(round, user_id);
        self.lock_data()?.round_entries.remove(&key);
        Ok(())
    }

    fn round_prize(&self, round: u32) -> Result<Option<RoundPrize>> {
        Ok(self.lock_data()?.round_prizes.get(&round).cloned())
    }

    fn upsert_round_prize(&self, p: &RoundPrize) -> Result<()> {
        self.lock_data()?.round_prizes.insert(p.round, p.clone());
        Ok(())
    }
}
