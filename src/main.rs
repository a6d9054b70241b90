use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};

use bolao_engine::model::{MatchStatus, Role, User, mask_pix};
use bolao_engine::settlement::MatchEdit;
use bolao_engine::sqlite_store::SqliteStore;
use bolao_engine::store::PoolStore;
use bolao_engine::{admission, auth, ledger, settlement, views};

const USAGE: &str = "\
bolao-engine <command> [flags]

commands:
  add-user      --id ID --username NAME --email MAIL [--admin]
  create-match  --as ADMIN --round N --home TEAM --away TEAM --kickoff RFC3339
  list-matches
  predict       --user ID --match ID --score HxA [--bonus]
  set-result    --as ADMIN --match ID --score HxA
  reopen-match  --as ADMIN --match ID [--live]
  delete-match  --as ADMIN --match ID
  mark-paid     --as ADMIN --round N --user ID
  unmark-paid   --as ADMIN --round N --user ID
  ranking       [--round N] [--search TEXT]
  profile       --user ID [--viewer ID]
  crowd         --match ID
  entries       --as ADMIN --round N

flags everywhere: --db PATH (or BOLAO_DB env, default ./bolao.sqlite)";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let store = SqliteStore::open(&db_path(&args)).map_err(|e| anyhow!("open store: {e}"))?;
    let now = Utc::now();

    match command.as_str() {
        "add-user" => {
            let id = require_flag(&args, "--id")?;
            let username = require_flag(&args, "--username")?;
            let email = require_flag(&args, "--email")?;
            let mut user = auth::signup(
                &store,
                &auth::Signup {
                    user_id: id,
                    username,
                    email,
                    avatar_url: String::new(),
                    favorite_team: flag_value(&args, "--team"),
                },
                now,
            )?;
            if has_flag(&args, "--admin") {
                user.role = Role::Admin;
                store.upsert_user(&user)?;
            }
            println!("user {} ({})", user.username, user.id);
        }
        "create-match" => {
            let admin = require_flag(&args, "--as")?;
            let round = parse_round(&require_flag(&args, "--round")?)?;
            let home = require_flag(&args, "--home")?;
            let away = require_flag(&args, "--away")?;
            let kickoff = parse_kickoff(&require_flag(&args, "--kickoff")?)?;
            let m = settlement::create_match(&store, &admin, round, &home, &away, kickoff)?;
            println!("match {} (round {})", m.id, m.round);
        }
        "list-matches" => {
            for m in store.list_matches()? {
                let score = match (m.home_score, m.away_score) {
                    (Some(h), Some(a)) => format!("{h}x{a}"),
                    _ => "-".to_string(),
                };
                println!(
                    "r{:02} {} {} x {} [{}] {} {}",
                    m.round,
                    m.kickoff.format("%Y-%m-%d %H:%M"),
                    m.home_team,
                    m.away_team,
                    status_label(m.status),
                    score,
                    m.id
                );
            }
        }
        "predict" => {
            let user = require_flag(&args, "--user")?;
            let match_id = require_flag(&args, "--match")?;
            let (home, away) = parse_score(&require_flag(&args, "--score")?)?;
            let pred = admission::submit(
                &store,
                now,
                &admission::SubmitRequest {
                    user_id: user,
                    match_id,
                    home_goals: home,
                    away_goals: away,
                    bonus_requested: has_flag(&args, "--bonus"),
                },
            )?;
            println!(
                "prediction saved: {} -> {}x{}{}",
                pred.match_id,
                pred.home_goals,
                pred.away_goals,
                if pred.bonus_used { " (bonus)" } else { "" }
            );
        }
        "set-result" => {
            let admin = require_flag(&args, "--as")?;
            let match_id = require_flag(&args, "--match")?;
            let (home, away) = parse_score(&require_flag(&args, "--score")?)?;
            let report = settlement::save_match(
                &store,
                &admin,
                &match_id,
                MatchEdit {
                    status: MatchStatus::Finished,
                    home_score: Some(u32::try_from(home).context("home score")?),
                    away_score: Some(u32::try_from(away).context("away score")?),
                },
            )?;
            print_report("settled", &report);
        }
        "reopen-match" => {
            let admin = require_flag(&args, "--as")?;
            let match_id = require_flag(&args, "--match")?;
            let status = if has_flag(&args, "--live") {
                MatchStatus::Live
            } else {
                MatchStatus::Scheduled
            };
            let report = settlement::save_match(
                &store,
                &admin,
                &match_id,
                MatchEdit {
                    status,
                    home_score: None,
                    away_score: None,
                },
            )?;
            print_report("reopened", &report);
        }
        "delete-match" => {
            let admin = require_flag(&args, "--as")?;
            let match_id = require_flag(&args, "--match")?;
            let report = settlement::delete_match(&store, &admin, &match_id)?;
            print_report("deleted", &report);
        }
        "mark-paid" => {
            let admin = require_flag(&args, "--as")?;
            let round = parse_round(&require_flag(&args, "--round")?)?;
            let user = require_flag(&args, "--user")?;
            let prize = ledger::mark_paid(&store, &admin, round, &user, now)?;
            println!(
                "round {} prize: R$ {} ({} entries)",
                round,
                prize.total_amount,
                store.round_entries(round)?.len()
            );
        }
        "unmark-paid" => {
            let admin = require_flag(&args, "--as")?;
            let round = parse_round(&require_flag(&args, "--round")?)?;
            let user = require_flag(&args, "--user")?;
            let prize = ledger::unmark_paid(&store, &admin, round, &user)?;
            println!(
                "round {} prize: R$ {} ({} entries)",
                round,
                prize.total_amount,
                store.round_entries(round)?.len()
            );
        }
        "ranking" => {
            let rows = match flag_value(&args, "--round") {
                Some(raw) => views::round_ranking(&store, parse_round(&raw)?)?,
                None => views::overall_ranking(&store, flag_value(&args, "--search").as_deref())?,
            };
            for row in rows {
                println!(
                    "{:>3}. {:<20} {:>4}{}",
                    row.position,
                    row.username,
                    row.points,
                    if row.champion { "  *" } else { "" }
                );
            }
        }
        "profile" => {
            let user = require_flag(&args, "--user")?;
            let viewer = flag_value(&args, "--viewer").unwrap_or_else(|| user.clone());
            let Some(summary) = views::profile_summary(&store, &user, &viewer, now)? else {
                return Err(anyhow!("no such user: {user}"));
            };
            println!("{}: {} pts", summary.username, summary.total_points);
            for (round, points) in &summary.round_totals {
                println!("  round {round}: {points} pts");
            }
            for row in &summary.rows {
                let pick = match row.prediction {
                    Some((h, a, bonus)) => {
                        format!("{h}x{a}{}", if bonus { " (bonus)" } else { "" })
                    }
                    None => "hidden".to_string(),
                };
                let result = match row.result {
                    Some((h, a)) => format!("{h}x{a}"),
                    None => "-".to_string(),
                };
                println!(
                    "  r{:02} {:<30} pick {:<12} result {:<5} {:>3} pts",
                    row.round, row.fixture, pick, result, row.points
                );
            }
        }
        "crowd" => {
            let match_id = require_flag(&args, "--match")?;
            match views::crowd_stats_for_match(&store, &match_id, now)? {
                Some(stats) => {
                    println!(
                        "{} predictions: home {}% / draw {}% / away {}%",
                        stats.total,
                        stats.home_win_percent,
                        stats.draw_percent,
                        stats.away_win_percent
                    );
                    for line in &stats.top_scorelines {
                        println!(
                            "  {}x{}: {} ({}%)",
                            line.home_goals, line.away_goals, line.count, line.percent
                        );
                    }
                }
                None => println!("no stats (match not started or no predictions)"),
            }
        }
        "entries" => {
            let admin = require_flag(&args, "--as")?;
            let round = parse_round(&require_flag(&args, "--round")?)?;
            auth::require_admin(&store, &admin)?;
            for entry in store.round_entries(round)? {
                let user = store.user_by_id(&entry.user_id)?;
                println!(
                    "{:<20} R$ {:<4} {} pix {}",
                    user.as_ref().map(|u| u.username.as_str()).unwrap_or("?"),
                    entry.amount,
                    entry.paid_at.format("%Y-%m-%d"),
                    user.as_ref().map(pix_label).unwrap_or_default()
                );
            }
            if let Some(label) = views::prize_label(&store, round)? {
                println!("{label}");
            }
        }
        other => {
            println!("unknown command: {other}\n\n{USAGE}");
        }
    }

    Ok(())
}

fn pix_label(user: &User) -> String {
    mask_pix(user.pix_key.as_deref().unwrap_or(""))
}

fn status_label(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Scheduled => "scheduled",
        MatchStatus::Live => "live",
        MatchStatus::Finished => "finished",
    }
}

fn print_report(action: &str, report: &settlement::SettlementReport) {
    println!(
        "{action} {}: {} predictions, {} skipped, {} failed",
        report.match_id,
        report.processed,
        report.skipped_users.len(),
        report.failed.len()
    );
    for id in &report.failed {
        println!("  failed: {id}");
    }
}

fn db_path(args: &[String]) -> PathBuf {
    flag_value(args, "--db")
        .map(PathBuf::from)
        .or_else(|| std::env::var("BOLAO_DB").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("bolao.sqlite"))
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn require_flag(args: &[String], name: &str) -> Result<String> {
    flag_value(args, name).ok_or_else(|| anyhow!("missing {name}"))
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn parse_round(raw: &str) -> Result<u32> {
    raw.parse::<u32>().with_context(|| format!("bad round {raw:?}"))
}

fn parse_kickoff(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("bad kickoff {raw:?}, expected RFC3339"))
}

/// "2x1" or "2-1"; signed so negatives reach the admission check.
fn parse_score(raw: &str) -> Result<(i64, i64)> {
    let (home, away) = raw
        .split_once(['x', 'X', '-'])
        .ok_or_else(|| anyhow!("bad score {raw:?}, expected HxA"))?;
    Ok((
        home.trim().parse().with_context(|| format!("bad score {raw:?}"))?,
        away.trim().parse().with_context(|| format!("bad score {raw:?}"))?,
    ))
}
