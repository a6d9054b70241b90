//! Pure scoring rules: final score + predicted score + bonus flag -> points.
//!
//! Criteria, all cumulative:
//! - correct outcome (win/draw/win): +3
//! - exact home goals: +2
//! - exact away goals: +2
//! - exact goal difference: +3
//! - 2x bonus doubles the total (applied unconditionally, so 0 stays 0).

pub const POINTS_OUTCOME: i64 = 3;
pub const POINTS_HOME_GOALS: i64 = 2;
pub const POINTS_AWAY_GOALS: i64 = 2;
pub const POINTS_GOAL_DIFF: i64 = 3;

/// Max attainable: 3 + 2 + 2 + 3 = 10 base, 20 with the bonus.
pub const MAX_BASE_POINTS: i64 = POINTS_OUTCOME + POINTS_HOME_GOALS + POINTS_AWAY_GOALS + POINTS_GOAL_DIFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

pub fn outcome(home: u32, away: u32) -> Outcome {
    let diff = home as i64 - away as i64;
    if diff > 0 {
        Outcome::HomeWin
    } else if diff < 0 {
        Outcome::AwayWin
    } else {
        Outcome::Draw
    }
}

pub fn score(final_home: u32, final_away: u32, pred_home: u32, pred_away: u32, bonus_used: bool) -> i64 {
    breakdown(final_home, final_away, pred_home, pred_away, bonus_used).total
}

/// Which criteria a prediction hit, for the expandable points detail on
/// a finished match card. `total` is the authoritative value; the flags
/// are display-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub exact_score: bool,
    pub outcome_hit: bool,
    pub home_goals_hit: bool,
    pub away_goals_hit: bool,
    pub goal_diff_hit: bool,
    pub bonus_applied: bool,
    pub base: i64,
    pub total: i64,
}

pub fn breakdown(
    final_home: u32,
    final_away: u32,
    pred_home: u32,
    pred_away: u32,
    bonus_used: bool,
) -> ScoreBreakdown {
    let diff_final = final_home as i64 - final_away as i64;
    let diff_pred = pred_home as i64 - pred_away as i64;

    let outcome_hit = outcome(final_home, final_away) == outcome(pred_home, pred_away);
    let home_goals_hit = pred_home == final_home;
    let away_goals_hit = pred_away == final_away;
    let goal_diff_hit = diff_pred == diff_final;

    let mut base = 0;
    if outcome_hit {
        base += POINTS_OUTCOME;
    }
    if home_goals_hit {
        base += POINTS_HOME_GOALS;
    }
    if away_goals_hit {
        base += POINTS_AWAY_GOALS;
    }
    if goal_diff_hit {
        base += POINTS_GOAL_DIFF;
    }

    let total = if bonus_used { base * 2 } else { base };

    ScoreBreakdown {
        exact_score: home_goals_hit && away_goals_hit,
        outcome_hit,
        home_goals_hit,
        away_goals_hit,
        goal_diff_hit,
        bonus_applied: bonus_used,
        base,
        total,
    }
}
