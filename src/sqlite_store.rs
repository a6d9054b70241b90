//! SQLite-backed implementation of `PoolStore`. Same contract as the
//! in-memory store; the per-user total increment is a single UPDATE so
//! it stays atomic under concurrent settlement tasks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use crate::error::{PoolError, Result};
use crate::model::{
    Match, MatchStatus, Prediction, PrizeType, Role, RoundEntry, RoundPrize, User,
};
use crate::store::PoolStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).map_err(db_err)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PoolError::Store("sqlite connection lock poisoned".to_string()))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            round INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_crest_url TEXT NULL,
            away_crest_url TEXT NULL,
            kickoff TEXT NOT NULL,
            status TEXT NOT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_round ON matches(round);

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            avatar_url TEXT NOT NULL,
            favorite_team TEXT NULL,
            pix_key TEXT NULL,
            role TEXT NOT NULL,
            total_points INTEGER NOT NULL,
            bonus_usage_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_username ON users(username COLLATE NOCASE);

        CREATE TABLE IF NOT EXISTS predictions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            match_id TEXT NOT NULL,
            round INTEGER NOT NULL,
            home_goals INTEGER NOT NULL,
            away_goals INTEGER NOT NULL,
            bonus_used INTEGER NOT NULL,
            points INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_match ON predictions(match_id);
        CREATE INDEX IF NOT EXISTS idx_predictions_user ON predictions(user_id);
        CREATE INDEX IF NOT EXISTS idx_predictions_round_user ON predictions(round, user_id);

        CREATE TABLE IF NOT EXISTS round_entries (
            id TEXT PRIMARY KEY,
            round INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            paid_at TEXT NOT NULL,
            recorded_by TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_round_entries_round ON round_entries(round);

        CREATE TABLE IF NOT EXISTS round_prizes (
            round INTEGER PRIMARY KEY,
            enabled INTEGER NOT NULL,
            total_amount INTEGER NOT NULL,
            prize_type TEXT NOT NULL,
            positions INTEGER NOT NULL
        );
        "#,
    )
    .map_err(db_err)
}

fn db_err(err: rusqlite::Error) -> PoolError {
    PoolError::Store(err.to_string())
}

fn ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn status_str(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Scheduled => "scheduled",
        MatchStatus::Live => "live",
        MatchStatus::Finished => "finished",
    }
}

fn status_from(idx: usize, raw: &str) -> rusqlite::Result<MatchStatus> {
    match raw {
        "scheduled" => Ok(MatchStatus::Scheduled),
        "live" => Ok(MatchStatus::Live),
        "finished" => Ok(MatchStatus::Finished),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown match status {other:?}").into(),
        )),
    }
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        round: row.get(1)?,
        home_team: row.get(2)?,
        away_team: row.get(3)?,
        home_crest_url: row.get(4)?,
        away_crest_url: row.get(5)?,
        kickoff: ts(6, &row.get::<_, String>(6)?)?,
        status: status_from(7, &row.get::<_, String>(7)?)?,
        home_score: row.get(8)?,
        away_score: row.get(9)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let bonus_raw: String = row.get(8)?;
    let bonus_usage: HashMap<u32, String> = serde_json::from_str(&bonus_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;
    let role = match row.get::<_, String>(6)?.as_str() {
        "admin" => Role::Admin,
        _ => Role::User,
    };
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar_url: row.get(3)?,
        favorite_team: row.get(4)?,
        pix_key: row.get(5)?,
        role,
        total_points: row.get(7)?,
        bonus_usage,
        created_at: ts(9, &row.get::<_, String>(9)?)?,
    })
}

fn prediction_from_row(row: &Row<'_>) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        user_id: row.get(0)?,
        match_id: row.get(1)?,
        round: row.get(2)?,
        home_goals: row.get(3)?,
        away_goals: row.get(4)?,
        bonus_used: row.get::<_, i64>(5)? != 0,
        points: row.get(6)?,
        created_at: ts(7, &row.get::<_, String>(7)?)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RoundEntry> {
    Ok(RoundEntry {
        round: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        paid_at: ts(3, &row.get::<_, String>(3)?)?,
        recorded_by: row.get(4)?,
    })
}

const MATCH_COLS: &str = "id, round, home_team, away_team, home_crest_url, away_crest_url, kickoff, status, home_score, away_score";
const USER_COLS: &str = "id, username, email, avatar_url, favorite_team, pix_key, role, total_points, bonus_usage_json, created_at";
const PRED_COLS: &str = "user_id, match_id, round, home_goals, away_goals, bonus_used, points, created_at";
const ENTRY_COLS: &str = "round, user_id, amount, paid_at, recorded_by";

impl SqliteStore {
    fn query_matches(&self, where_clause: &str, bind: &[&dyn rusqlite::ToSql]) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {MATCH_COLS} FROM matches {where_clause} ORDER BY round ASC, kickoff ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map(bind, match_from_row).map_err(db_err)?;
        collect(rows)
    }

    fn query_predictions(
        &self,
        where_clause: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {PRED_COLS} FROM predictions {where_clause} ORDER BY user_id ASC, match_id ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map(bind, prediction_from_row).map_err(db_err)?;
        collect(rows)
    }
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(db_err)?);
    }
    Ok(out)
}

impl PoolStore for SqliteStore {
    fn match_by_id(&self, id: &str) -> Result<Option<Match>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {MATCH_COLS} FROM matches WHERE id = ?1");
        conn.query_row(&sql, params![id], match_from_row)
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })
    }

    fn list_matches(&self) -> Result<Vec<Match>> {
        self.query_matches("", &[])
    }

    fn matches_in_round(&self, round: u32) -> Result<Vec<Match>> {
        self.query_matches("WHERE round = ?1", &[&round])
    }

    fn upsert_match(&self, m: &Match) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO matches (id, round, home_team, away_team, home_crest_url, away_crest_url, kickoff, status, home_score, away_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                round = excluded.round,
                home_team = excluded.home_team,
                away_team = excluded.away_team,
                home_crest_url = excluded.home_crest_url,
                away_crest_url = excluded.away_crest_url,
                kickoff = excluded.kickoff,
                status = excluded.status,
                home_score = excluded.home_score,
                away_score = excluded.away_score
            "#,
            params![
                m.id,
                m.round,
                m.home_team,
                m.away_team,
                m.home_crest_url,
                m.away_crest_url,
                m.kickoff.to_rfc3339(),
                status_str(m.status),
                m.home_score,
                m.away_score,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove_match(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM matches WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {USER_COLS} FROM users WHERE id = ?1");
        conn.query_row(&sql, params![id], user_from_row)
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })
    }

    fn user_by_username_ci(&self, username: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {USER_COLS} FROM users WHERE username = ?1 COLLATE NOCASE");
        conn.query_row(&sql, params![username], user_from_row)
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {USER_COLS} FROM users ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map([], user_from_row).map_err(db_err)?;
        collect(rows)
    }

    fn upsert_user(&self, u: &User) -> Result<()> {
        let bonus_json = serde_json::to_string(&u.bonus_usage)
            .map_err(|e| PoolError::Store(format!("encode bonus map: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO users (id, username, email, avatar_url, favorite_team, pix_key, role, total_points, bonus_usage_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                avatar_url = excluded.avatar_url,
                favorite_team = excluded.favorite_team,
                pix_key = excluded.pix_key,
                role = excluded.role,
                total_points = excluded.total_points,
                bonus_usage_json = excluded.bonus_usage_json,
                created_at = excluded.created_at
            "#,
            params![
                u.id,
                u.username,
                u.email,
                u.avatar_url,
                u.favorite_team,
                u.pix_key,
                if u.is_admin() { "admin" } else { "user" },
                u.total_points,
                bonus_json,
                u.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn add_to_total(&self, user_id: &str, delta: i64) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE users SET total_points = total_points + ?1 WHERE id = ?2",
                params![delta, user_id],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    fn set_bonus_slot(&self, user_id: &str, round: u32, match_id: Option<&str>) -> Result<()> {
        // Read and rewrite under one lock acquisition so concurrent
        // slot writes for the same user cannot lose entries.
        let conn = self.lock()?;
        let raw: String = conn
            .query_row(
                "SELECT bonus_usage_json FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    PoolError::UserNotFound(user_id.to_string())
                }
                other => db_err(other),
            })?;
        let mut bonus_usage: HashMap<u32, String> = serde_json::from_str(&raw)
            .map_err(|e| PoolError::Store(format!("decode bonus map: {e}")))?;
        match match_id {
            Some(id) => {
                bonus_usage.insert(round, id.to_string());
            }
            None => {
                bonus_usage.remove(&round);
            }
        }
        let bonus_json = serde_json::to_string(&bonus_usage)
            .map_err(|e| PoolError::Store(format!("encode bonus map: {e}")))?;
        conn.execute(
            "UPDATE users SET bonus_usage_json = ?1 WHERE id = ?2",
            params![bonus_json, user_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn prediction(&self, user_id: &str, match_id: &str) -> Result<Option<Prediction>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {PRED_COLS} FROM predictions WHERE id = ?1");
        conn.query_row(
            &sql,
            params![Prediction::composite_id(user_id, match_id)],
            prediction_from_row,
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(db_err(other)),
        })
    }

    fn predictions_for_match(&self, match_id: &str) -> Result<Vec<Prediction>> {
        self.query_predictions("WHERE match_id = ?1", &[&match_id])
    }

    fn predictions_for_user(&self, user_id: &str) -> Result<Vec<Prediction>> {
        self.query_predictions("WHERE user_id = ?1", &[&user_id])
    }

    fn predictions_for_round_user(&self, round: u32, user_id: &str) -> Result<Vec<Prediction>> {
        self.query_predictions("WHERE round = ?1 AND user_id = ?2", &[&round, &user_id])
    }

    fn list_predictions(&self) -> Result<Vec<Prediction>> {
        self.query_predictions("", &[])
    }

    fn upsert_prediction(&self, p: &Prediction) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO predictions (id, user_id, match_id, round, home_goals, away_goals, bonus_used, points, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                round = excluded.round,
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                bonus_used = excluded.bonus_used,
                points = excluded.points,
                created_at = excluded.created_at
            "#,
            params![
                p.id(),
                p.user_id,
                p.match_id,
                p.round,
                p.home_goals,
                p.away_goals,
                p.bonus_used as i64,
                p.points,
                p.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_prediction_points(&self, user_id: &str, match_id: &str, points: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE predictions SET points = ?1 WHERE id = ?2",
            params![points, Prediction::composite_id(user_id, match_id)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn set_prediction_bonus(&self, user_id: &str, match_id: &str, bonus: bool) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE predictions SET bonus_used = ?1 WHERE id = ?2",
            params![bonus as i64, Prediction::composite_id(user_id, match_id)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn round_entry(&self, round: u32, user_id: &str) -> Result<Option<RoundEntry>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ENTRY_COLS} FROM round_entries WHERE id = ?1");
        conn.query_row(
            &sql,
            params![RoundEntry::composite_id(round, user_id)],
            entry_from_row,
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(db_err(other)),
        })
    }

    fn round_entries(&self, round: u32) -> Result<Vec<RoundEntry>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {ENTRY_COLS} FROM round_entries WHERE round = ?1 ORDER BY user_id ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map(params![round], entry_from_row).map_err(db_err)?;
        collect(rows)
    }

    fn upsert_round_entry(&self, e: &RoundEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO round_entries (id, round, user_id, amount, paid_at, recorded_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                amount = excluded.amount,
                paid_at = excluded.paid_at,
                recorded_by = excluded.recorded_by
            "#,
            params![
                RoundEntry::composite_id(e.round, &e.user_id),
                e.round,
                e.user_id,
                e.amount,
                e.paid_at.to_rfc3339(),
                e.recorded_by,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove_round_entry(&self, round: u32, user_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM round_entries WHERE id = ?1",
            params![RoundEntry::composite_id(round, user_id)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn round_prize(&self, round: u32) -> Result<Option<RoundPrize>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT round, enabled, total_amount, prize_type, positions FROM round_prizes WHERE round = ?1",
            params![round],
            |row| {
                let prize_type = match row.get::<_, String>(3)?.as_str() {
                    "points" => PrizeType::Points,
                    _ => PrizeType::Money,
                };
                Ok(RoundPrize {
                    round: row.get(0)?,
                    enabled: row.get::<_, i64>(1)? != 0,
                    total_amount: row.get(2)?,
                    prize_type,
                    positions: row.get(4)?,
                })
            },
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(db_err(other)),
        })
    }

    fn upsert_round_prize(&self, p: &RoundPrize) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO round_prizes (round, enabled, total_amount, prize_type, positions)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(round) DO UPDATE SET
                enabled = excluded.enabled,
                total_amount = excluded.total_amount,
                prize_type = excluded.prize_type,
                positions = excluded.positions
            "#,
            params![
                p.round,
                p.enabled as i64,
                p.total_amount,
                match p.prize_type {
                    PrizeType::Money => "money",
                    PrizeType::Points => "points",
                },
                p.positions,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
