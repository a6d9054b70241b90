use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
}

/// A scheduled fixture. Final scores are both-present or both-absent,
/// and both-present only while `status == Finished`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub round: u32,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub home_crest_url: Option<String>,
    #[serde(default)]
    pub away_crest_url: Option<String>,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
}

impl Match {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.kickoff <= now
    }

    /// Predictions stay open strictly before kickoff and only while the
    /// match is not finished.
    pub fn open_for_predictions(&self, now: DateTime<Utc>) -> bool {
        self.status != MatchStatus::Finished && !self.has_started(now)
    }

    pub fn final_score(&self) -> Option<(u32, u32)> {
        match (self.status, self.home_score, self.away_score) {
            (MatchStatus::Finished, Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }
}

/// One user's forecast for one match. At most one per (user, match);
/// stores key it by `composite_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub user_id: String,
    pub match_id: String,
    /// Denormalized copy of the match round, captured at save time.
    pub round: u32,
    pub home_goals: u32,
    pub away_goals: u32,
    pub bonus_used: bool,
    /// Authoritative only once the match is finished; 0 otherwise.
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    pub fn composite_id(user_id: &str, match_id: &str) -> String {
        format!("{user_id}_{match_id}")
    }

    pub fn id(&self) -> String {
        Self::composite_id(&self.user_id, &self.match_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// A participant. `total_points` must equal the sum of this user's
/// prediction points whenever no settlement is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub favorite_team: Option<String>,
    #[serde(default)]
    pub pix_key: Option<String>,
    pub role: Role,
    pub total_points: i64,
    /// round -> match id currently holding that round's 2x bonus.
    #[serde(default)]
    pub bonus_usage: HashMap<u32, String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Presence marks the user as paid-in for the round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEntry {
    pub round: u32,
    pub user_id: String,
    pub amount: u32,
    pub paid_at: DateTime<Utc>,
    pub recorded_by: String,
}

impl RoundEntry {
    pub fn composite_id(round: u32, user_id: &str) -> String {
        format!("{round}_{user_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeType {
    Money,
    Points,
}

/// Cached per-round prize summary, recomputed from the entry count on
/// every ledger change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPrize {
    pub round: u32,
    pub enabled: bool,
    pub total_amount: u32,
    pub prize_type: PrizeType,
    pub positions: u32,
}

/// Masked rendition of a payout key for admin listings. Short keys keep
/// only the last two characters visible; longer ones show a 3+3 window.
pub fn mask_pix(pix: &str) -> String {
    if pix.is_empty() {
        return "—".to_string();
    }
    let chars: Vec<char> = pix.chars().collect();
    if chars.len() <= 6 {
        let visible = chars.len().saturating_sub(2);
        chars
            .iter()
            .enumerate()
            .map(|(i, c)| if i < visible { '*' } else { *c })
            .collect()
    } else {
        let prefix: String = chars.iter().take(3).collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{prefix}...{suffix}")
    }
}
