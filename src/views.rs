//! Read-only projections over users, predictions and matches: rankings,
//! profile summaries, crowd stats and the round prize label. These
//! consume the settlement invariants but never mutate anything; when
//! fed from a store subscription they simply recompute from whatever
//! snapshot arrives, so re-delivery and out-of-order arrival are fine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Match, Prediction, PrizeType};
use crate::scoring::{self, Outcome};
use crate::store::PoolStore;

/// How many of the most-guessed scorelines crowd stats keep.
const MAX_CROWD_SCORELINES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingRow {
    pub position: usize,
    pub user_id: String,
    pub username: String,
    pub avatar_url: String,
    pub points: i64,
    pub champion: bool,
}

/// Overall ranking by running total, optionally filtered by a
/// case-insensitive username substring. The leader is flagged champion.
pub fn overall_ranking(store: &dyn PoolStore, search: Option<&str>) -> Result<Vec<RankingRow>> {
    let needle = search.unwrap_or("").trim().to_lowercase();
    let mut users = store.list_users()?;
    users.retain(|u| needle.is_empty() || u.username.to_lowercase().contains(&needle));
    users.sort_by(|a, b| b.total_points.cmp(&a.total_points).then(a.username.cmp(&b.username)));

    Ok(users
        .into_iter()
        .enumerate()
        .map(|(idx, u)| RankingRow {
            position: idx + 1,
            user_id: u.id,
            username: u.username,
            avatar_url: u.avatar_url,
            points: u.total_points,
            champion: idx == 0,
        })
        .collect())
}

/// Per-round ranking: each user's points summed over the round's
/// predictions. The leader is flagged round champion only once every
/// match of the round is finished and they actually scored.
pub fn round_ranking(store: &dyn PoolStore, round: u32) -> Result<Vec<RankingRow>> {
    let finished = round_is_finished(store, round)?;

    let mut per_user: HashMap<String, i64> = HashMap::new();
    for pred in store.list_predictions()? {
        if pred.round == round {
            *per_user.entry(pred.user_id.clone()).or_insert(0) += pred.points;
        }
    }

    let mut rows: Vec<RankingRow> = store
        .list_users()?
        .into_iter()
        .map(|u| RankingRow {
            points: per_user.get(&u.id).copied().unwrap_or(0),
            position: 0,
            user_id: u.id,
            username: u.username,
            avatar_url: u.avatar_url,
            champion: false,
        })
        .collect();
    rows.sort_by(|a, b| b.points.cmp(&a.points).then(a.username.cmp(&b.username)));
    for (idx, row) in rows.iter_mut().enumerate() {
        row.position = idx + 1;
        row.champion = idx == 0 && finished && row.points > 0;
    }
    Ok(rows)
}

/// A round is finished when it has matches and all of them are finished.
pub fn round_is_finished(store: &dyn PoolStore, round: u32) -> Result<bool> {
    let matches = store.matches_in_round(round)?;
    Ok(!matches.is_empty() && matches.iter().all(|m| m.final_score().is_some()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorelineShare {
    pub home_goals: u32,
    pub away_goals: u32,
    pub count: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrowdStats {
    pub total: usize,
    pub home_win_percent: u32,
    pub draw_percent: u32,
    pub away_win_percent: u32,
    /// Most-guessed scorelines first, capped at eight.
    pub top_scorelines: Vec<ScorelineShare>,
}

/// Aggregates one match's predictions into outcome percentages and the
/// most-guessed scorelines. Pure: feed it any snapshot, stale or fresh.
pub fn crowd_stats(predictions: &[Prediction]) -> Option<CrowdStats> {
    if predictions.is_empty() {
        return None;
    }
    let total = predictions.len();

    let mut home = 0usize;
    let mut draw = 0usize;
    let mut away = 0usize;
    let mut counts: HashMap<(u32, u32), usize> = HashMap::new();
    for p in predictions {
        match scoring::outcome(p.home_goals, p.away_goals) {
            Outcome::HomeWin => home += 1,
            Outcome::Draw => draw += 1,
            Outcome::AwayWin => away += 1,
        }
        *counts.entry((p.home_goals, p.away_goals)).or_insert(0) += 1;
    }

    let pct = |n: usize| ((n as f64 / total as f64) * 100.0).round() as u32;

    let mut scorelines: Vec<ScorelineShare> = counts
        .into_iter()
        .map(|((h, a), count)| ScorelineShare {
            home_goals: h,
            away_goals: a,
            count,
            percent: pct(count),
        })
        .collect();
    scorelines.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then((a.home_goals, a.away_goals).cmp(&(b.home_goals, b.away_goals)))
    });
    scorelines.truncate(MAX_CROWD_SCORELINES);

    Some(CrowdStats {
        total,
        home_win_percent: pct(home),
        draw_percent: pct(draw),
        away_win_percent: pct(away),
        top_scorelines: scorelines,
    })
}

/// Crowd stats for a match, but only once it has kicked off; other
/// users' predictions stay hidden before that.
pub fn crowd_stats_for_match(
    store: &dyn PoolStore,
    match_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<CrowdStats>> {
    let Some(m) = store.match_by_id(match_id)? else {
        return Ok(None);
    };
    if !m.has_started(now) {
        return Ok(None);
    }
    Ok(crowd_stats(&store.predictions_for_match(match_id)?))
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub round: u32,
    pub match_id: String,
    pub fixture: String,
    pub kickoff: DateTime<Utc>,
    /// None while hidden (someone else's prediction before kickoff).
    pub prediction: Option<(u32, u32, bool)>,
    pub result: Option<(u32, u32)>,
    pub points: i64,
}

#[derive(Debug, Clone)]
pub struct ProfileSummary {
    pub user_id: String,
    pub username: String,
    pub total_points: i64,
    /// (round, points) with the most recent round first.
    pub round_totals: Vec<(u32, i64)>,
    /// Most recent round first, then kickoff order within the round.
    pub rows: Vec<ProfileRow>,
}

/// A user's prediction history as another participant sees it. The
/// owner always sees their own picks; everyone else sees a pick only
/// after its match has started.
pub fn profile_summary(
    store: &dyn PoolStore,
    profile_user_id: &str,
    viewer_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<ProfileSummary>> {
    let Some(user) = store.user_by_id(profile_user_id)? else {
        return Ok(None);
    };

    let matches: HashMap<String, Match> = store
        .list_matches()?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();

    let mut predictions = store.predictions_for_user(profile_user_id)?;
    predictions.sort_by(|a, b| {
        b.round.cmp(&a.round).then_with(|| {
            let ka = matches.get(&a.match_id).map(|m| m.kickoff);
            let kb = matches.get(&b.match_id).map(|m| m.kickoff);
            ka.cmp(&kb)
        })
    });

    let mut round_totals: HashMap<u32, i64> = HashMap::new();
    for p in &predictions {
        *round_totals.entry(p.round).or_insert(0) += p.points;
    }
    let mut round_totals: Vec<(u32, i64)> = round_totals.into_iter().collect();
    round_totals.sort_by(|a, b| b.0.cmp(&a.0));

    let is_owner = viewer_id == profile_user_id;
    let rows = predictions
        .into_iter()
        .map(|p| {
            let m = matches.get(&p.match_id);
            let started = m.map(|m| m.has_started(now)).unwrap_or(true);
            ProfileRow {
                round: p.round,
                fixture: m
                    .map(|m| format!("{} x {}", m.home_team, m.away_team))
                    .unwrap_or_default(),
                kickoff: m.map(|m| m.kickoff).unwrap_or(now),
                prediction: (is_owner || started)
                    .then_some((p.home_goals, p.away_goals, p.bonus_used)),
                result: m.and_then(|m| m.final_score()),
                points: p.points,
                match_id: p.match_id,
            }
        })
        .collect();

    Ok(Some(ProfileSummary {
        user_id: user.id,
        username: user.username,
        total_points: user.total_points,
        round_totals,
        rows,
    }))
}

/// True once the user has saved a prediction for every match of the
/// round (and the round has matches at all).
pub fn round_complete_for_user(store: &dyn PoolStore, round: u32, user_id: &str) -> Result<bool> {
    let match_count = store.matches_in_round(round)?.len();
    if match_count == 0 {
        return Ok(false);
    }
    let pred_count = store.predictions_for_round_user(round, user_id)?.len();
    Ok(pred_count >= match_count)
}

/// Display label for an enabled round prize; None when the prize is
/// missing or disabled.
pub fn prize_label(store: &dyn PoolStore, round: u32) -> Result<Option<String>> {
    let Some(prize) = store.round_prize(round)? else {
        return Ok(None);
    };
    if !prize.enabled {
        return Ok(None);
    }
    let label = match prize.prize_type {
        PrizeType::Money => format!("Prize: R$ {} • Top {}", prize.total_amount, prize.positions),
        PrizeType::Points => format!("Prize: {} pts • Top {}", prize.total_amount, prize.positions),
    };
    Ok(Some(label))
}
