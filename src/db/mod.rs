// Database access layer (SQLite via sqlx).
//
// One row per player keyed by discord_id, one row per team keyed by
// team_code. Nested data (rank entries, alt accounts, split counters,
// counted match ids) is stored in JSON text columns and decoded at the
// edge of this module; everything above works with typed records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::rank::{Rank, RankEntry};

/// Team value for players not on a roster.
pub const FREE_AGENT_TEAM: &str = "FA";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt {column} column for player {discord_id}: {source}")]
    CorruptColumn {
        discord_id: String,
        column: &'static str,
        source: serde_json::Error,
    },
}

/// A linked riot account (main or alt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiotAccount {
    pub game_name: String,
    pub tag_line: String,
}

/// One player document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub discord_id: String,
    pub name: String,
    pub nickname: String,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
    pub puuid: Option<String>,
    pub alt_accounts: Vec<RiotAccount>,
    pub rank_info: Vec<RankEntry>,
    /// Dated snapshots of `rank_info`, keyed by ISO date.
    pub historical_rank_info: BTreeMap<String, Vec<RankEntry>>,
    /// Monotonic high-water mark; only raised, never lowered.
    pub peak_rank: Option<Rank>,
    /// Team code, or `FREE_AGENT_TEAM`. `None` before first assignment.
    pub team: Option<String>,
    pub active_roster: bool,
    pub in_game_roles: Vec<String>,
    pub salary: Option<i64>,
    /// Operator override; wins over the derived salary when higher.
    pub manual_salary: Option<i64>,
    pub salary_season: Option<String>,
    /// Qualifying game counts per split name.
    pub split_game_counts: BTreeMap<String, i64>,
    pub eligible_for_split: bool,
    pub eligible_match_count: i64,
    /// Match ids already inspected by eligibility counting; the
    /// high-water mark that prevents double charging.
    pub counted_match_ids: BTreeSet<String>,
    pub joined_at: String,
    pub left_at: Option<String>,
}

impl PlayerRecord {
    pub fn is_free_agent(&self) -> bool {
        match self.team.as_deref() {
            None | Some(FREE_AGENT_TEAM) | Some("") => true,
            Some(_) => false,
        }
    }

    /// Salary used for cap math: the manual override when it beats the
    /// derived value, otherwise the derived value.
    pub fn effective_salary(&self) -> Option<i64> {
        match (self.salary, self.manual_salary) {
            (Some(s), Some(m)) => Some(s.max(m)),
            (Some(s), None) => Some(s),
            (None, m) => m,
        }
    }

    /// All riot accounts to consider for rank, main first.
    pub fn all_accounts(&self) -> Vec<RiotAccount> {
        let mut accounts = Vec::new();
        if let (Some(game_name), Some(tag_line)) = (&self.game_name, &self.tag_line) {
            accounts.push(RiotAccount {
                game_name: game_name.clone(),
                tag_line: tag_line.clone(),
            });
        }
        accounts.extend(self.alt_accounts.iter().cloned());
        accounts
    }
}

/// One team document. `remaining_cap` is authoritative; Sign and Release
/// are its only mutators.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamRecord {
    pub team_code: String,
    pub team_role_id: i64,
    pub gm_role_id: i64,
    pub salary_cap: i64,
    pub remaining_cap: i64,
    pub wins: i64,
    pub losses: i64,
}

/// Raw player row; JSON columns are decoded by `into_record`.
#[derive(Debug, FromRow)]
struct PlayerRow {
    discord_id: String,
    name: String,
    nickname: String,
    game_name: Option<String>,
    tag_line: Option<String>,
    puuid: Option<String>,
    alt_accounts: String,
    rank_info: String,
    historical_rank_info: String,
    peak_tier: Option<String>,
    peak_division: Option<String>,
    team: Option<String>,
    active_roster: i64,
    in_game_roles: String,
    salary: Option<i64>,
    manual_salary: Option<i64>,
    salary_season: Option<String>,
    split_game_counts: String,
    eligible_for_split: i64,
    eligible_match_count: i64,
    counted_match_ids: String,
    joined_at: String,
    left_at: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(
    discord_id: &str,
    column: &'static str,
    raw: &str,
) -> Result<T, DbError> {
    serde_json::from_str(raw).map_err(|source| DbError::CorruptColumn {
        discord_id: discord_id.to_string(),
        column,
        source,
    })
}

impl PlayerRow {
    fn into_record(self) -> Result<PlayerRecord, DbError> {
        let id = self.discord_id.clone();
        let peak_rank = match (&self.peak_tier, &self.peak_division) {
            (Some(tier), Some(division)) => Rank::parse(tier, division),
            _ => None,
        };
        Ok(PlayerRecord {
            alt_accounts: decode(&id, "alt_accounts", &self.alt_accounts)?,
            rank_info: decode(&id, "rank_info", &self.rank_info)?,
            historical_rank_info: decode(&id, "historical_rank_info", &self.historical_rank_info)?,
            in_game_roles: decode(&id, "in_game_roles", &self.in_game_roles)?,
            split_game_counts: decode(&id, "split_game_counts", &self.split_game_counts)?,
            counted_match_ids: decode(&id, "counted_match_ids", &self.counted_match_ids)?,
            peak_rank,
            discord_id: self.discord_id,
            name: self.name,
            nickname: self.nickname,
            game_name: self.game_name,
            tag_line: self.tag_line,
            puuid: self.puuid,
            team: self.team,
            active_roster: self.active_roster != 0,
            salary: self.salary,
            manual_salary: self.manual_salary,
            salary_season: self.salary_season,
            eligible_for_split: self.eligible_for_split != 0,
            eligible_match_count: self.eligible_match_count,
            joined_at: self.joined_at,
            left_at: self.left_at,
        })
    }
}

const PLAYER_COLUMNS: &str = "discord_id, name, nickname, game_name, tag_line, puuid, \
     alt_accounts, rank_info, historical_rank_info, peak_tier, peak_division, \
     team, active_roster, in_game_roles, salary, manual_salary, salary_season, \
     split_game_counts, eligible_for_split, eligible_match_count, counted_match_ids, \
     joined_at, left_at";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                discord_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                nickname TEXT NOT NULL DEFAULT '',
                game_name TEXT,
                tag_line TEXT,
                puuid TEXT,
                alt_accounts TEXT NOT NULL DEFAULT '[]',
                rank_info TEXT NOT NULL DEFAULT '[]',
                historical_rank_info TEXT NOT NULL DEFAULT '{}',
                peak_tier TEXT,
                peak_division TEXT,
                team TEXT,
                active_roster INTEGER NOT NULL DEFAULT 0,
                in_game_roles TEXT NOT NULL DEFAULT '[]',
                salary INTEGER,
                manual_salary INTEGER,
                salary_season TEXT,
                split_game_counts TEXT NOT NULL DEFAULT '{}',
                eligible_for_split INTEGER NOT NULL DEFAULT 0,
                eligible_match_count INTEGER NOT NULL DEFAULT 0,
                counted_match_ids TEXT NOT NULL DEFAULT '[]',
                joined_at TEXT NOT NULL DEFAULT (datetime('now')),
                left_at TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                team_code TEXT PRIMARY KEY,
                team_role_id INTEGER NOT NULL,
                gm_role_id INTEGER NOT NULL,
                salary_cap INTEGER NOT NULL,
                remaining_cap INTEGER NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Players ───────────────────────────────────────────────────────

    /// Create the player on first touch, or refresh their name and clear
    /// `left_at` on rejoin. History (ranks, splits, salary) is retained.
    pub async fn upsert_player(
        &self,
        discord_id: &str,
        name: &str,
    ) -> Result<PlayerRecord, DbError> {
        let row = sqlx::query_as::<_, PlayerRow>(&format!(
            "INSERT INTO players (discord_id, name, nickname) VALUES (?, ?, ?)
             ON CONFLICT(discord_id) DO UPDATE SET name = excluded.name, left_at = NULL
             RETURNING {PLAYER_COLUMNS}"
        ))
        .bind(discord_id)
        .bind(name)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        row.into_record()
    }

    pub async fn get_player(&self, discord_id: &str) -> Result<Option<PlayerRecord>, DbError> {
        let row = sqlx::query_as::<_, PlayerRow>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE discord_id = ?"
        ))
        .bind(discord_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PlayerRow::into_record).transpose()
    }

    /// All current members (departed players excluded).
    pub async fn list_active_players(&self) -> Result<Vec<PlayerRecord>, DbError> {
        let rows = sqlx::query_as::<_, PlayerRow>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE left_at IS NULL ORDER BY discord_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PlayerRow::into_record).collect()
    }

    /// Active roster of one team.
    pub async fn team_roster(&self, team_code: &str) -> Result<Vec<PlayerRecord>, DbError> {
        let rows = sqlx::query_as::<_, PlayerRow>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players
             WHERE team = ? AND active_roster = 1 AND left_at IS NULL
             ORDER BY discord_id"
        ))
        .bind(team_code)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PlayerRow::into_record).collect()
    }

    pub async fn list_by_eligibility(
        &self,
        eligible: bool,
    ) -> Result<Vec<PlayerRecord>, DbError> {
        let rows = sqlx::query_as::<_, PlayerRow>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players
             WHERE eligible_for_split = ? AND left_at IS NULL
             ORDER BY discord_id"
        ))
        .bind(eligible as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PlayerRow::into_record).collect()
    }

    pub async fn set_riot_identity(
        &self,
        discord_id: &str,
        game_name: &str,
        tag_line: &str,
        puuid: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE players SET game_name = ?, tag_line = ?, puuid = ? WHERE discord_id = ?",
        )
        .bind(game_name)
        .bind(tag_line)
        .bind(puuid)
        .bind(discord_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_puuid(&self, discord_id: &str, puuid: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET puuid = ? WHERE discord_id = ?")
            .bind(puuid)
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_alt_accounts(
        &self,
        discord_id: &str,
        alts: &[RiotAccount],
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET alt_accounts = ? WHERE discord_id = ?")
            .bind(serde_json::to_string(alts).expect("alt accounts serialize"))
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store a fresh rank observation. When the entries differ from the
    /// stored ones, a dated snapshot is kept under `observed_on`.
    pub async fn record_rank_observation(
        &self,
        discord_id: &str,
        entries: &[RankEntry],
        observed_on: &str,
    ) -> Result<(), DbError> {
        let Some(player) = self.get_player(discord_id).await? else {
            return Ok(());
        };
        let mut historical = player.historical_rank_info;
        if player.rank_info != entries {
            historical.insert(observed_on.to_string(), entries.to_vec());
        }
        sqlx::query(
            "UPDATE players SET rank_info = ?, historical_rank_info = ? WHERE discord_id = ?",
        )
        .bind(serde_json::to_string(entries).expect("rank entries serialize"))
        .bind(serde_json::to_string(&historical).expect("rank history serialize"))
        .bind(discord_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Raise the peak rank if `candidate` is strictly higher than the
    /// stored peak. Returns whether the peak changed.
    pub async fn raise_peak_rank(
        &self,
        discord_id: &str,
        candidate: Rank,
    ) -> Result<bool, DbError> {
        let Some(player) = self.get_player(discord_id).await? else {
            return Ok(false);
        };
        if let Some(peak) = player.peak_rank {
            if candidate <= peak {
                return Ok(false);
            }
        }
        sqlx::query("UPDATE players SET peak_tier = ?, peak_division = ? WHERE discord_id = ?")
            .bind(candidate.tier.as_str())
            .bind(candidate.division.as_str())
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    pub async fn set_salary(
        &self,
        discord_id: &str,
        salary: i64,
        season: &str,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET salary = ?, salary_season = ? WHERE discord_id = ?")
            .bind(salary)
            .bind(season)
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_manual_salary(
        &self,
        discord_id: &str,
        manual_salary: Option<i64>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET manual_salary = ? WHERE discord_id = ?")
            .bind(manual_salary)
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_team_state(
        &self,
        discord_id: &str,
        team: &str,
        active_roster: bool,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET team = ?, active_roster = ? WHERE discord_id = ?")
            .bind(team)
            .bind(active_roster as i64)
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_in_game_roles(
        &self,
        discord_id: &str,
        roles: &[String],
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET in_game_roles = ? WHERE discord_id = ?")
            .bind(serde_json::to_string(roles).expect("roles serialize"))
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_nickname(&self, discord_id: &str, nickname: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET nickname = ? WHERE discord_id = ?")
            .bind(nickname)
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist one eligibility pass: updated per-split counters, the new
    /// counted-match high-water mark, the cumulative count, and the sticky
    /// flag (never lowered here).
    pub async fn apply_eligibility_progress(
        &self,
        discord_id: &str,
        split_game_counts: &BTreeMap<String, i64>,
        counted_match_ids: &BTreeSet<String>,
        eligible_match_count: i64,
        eligible: bool,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE players SET
                split_game_counts = ?,
                counted_match_ids = ?,
                eligible_match_count = ?,
                eligible_for_split = MAX(eligible_for_split, ?)
             WHERE discord_id = ?",
        )
        .bind(serde_json::to_string(split_game_counts).expect("split counts serialize"))
        .bind(serde_json::to_string(counted_match_ids).expect("counted ids serialize"))
        .bind(eligible_match_count)
        .bind(eligible as i64)
        .bind(discord_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Explicit admin action: flip the sticky flag directly.
    pub async fn set_eligible(&self, discord_id: &str, eligible: bool) -> Result<(), DbError> {
        sqlx::query("UPDATE players SET eligible_for_split = ? WHERE discord_id = ?")
            .bind(eligible as i64)
            .bind(discord_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Season rollover: clear eligibility state for every player.
    /// Returns the number of players reset.
    pub async fn reset_split_eligibility(&self) -> Result<u64, DbError> {
        let result = sqlx::query(
            "UPDATE players SET
                eligible_for_split = 0,
                eligible_match_count = 0,
                split_game_counts = '{}',
                counted_match_ids = '[]'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Soft delete on departure: the record stays for a future rejoin.
    pub async fn mark_left(&self, discord_id: &str) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE players SET
                left_at = datetime('now'),
                team = ?,
                active_roster = 0
             WHERE discord_id = ?",
        )
        .bind(FREE_AGENT_TEAM)
        .bind(discord_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Teams ─────────────────────────────────────────────────────────

    pub async fn create_team(
        &self,
        team_code: &str,
        team_role_id: i64,
        gm_role_id: i64,
        salary_cap: i64,
    ) -> Result<TeamRecord, DbError> {
        let row = sqlx::query_as::<_, TeamRecord>(
            "INSERT INTO teams (team_code, team_role_id, gm_role_id, salary_cap, remaining_cap)
             VALUES (?, ?, ?, ?, ?)
             RETURNING team_code, team_role_id, gm_role_id, salary_cap, remaining_cap, wins, losses",
        )
        .bind(team_code)
        .bind(team_role_id)
        .bind(gm_role_id)
        .bind(salary_cap)
        .bind(salary_cap)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_team(&self, team_code: &str) -> Result<Option<TeamRecord>, DbError> {
        let row = sqlx::query_as::<_, TeamRecord>(
            "SELECT team_code, team_role_id, gm_role_id, salary_cap, remaining_cap, wins, losses
             FROM teams WHERE team_code = ?",
        )
        .bind(team_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_teams(&self) -> Result<Vec<TeamRecord>, DbError> {
        let rows = sqlx::query_as::<_, TeamRecord>(
            "SELECT team_code, team_role_id, gm_role_id, salary_cap, remaining_cap, wins, losses
             FROM teams ORDER BY team_code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Atomically reserve cap space for a signing. The guard in the WHERE
    /// clause makes concurrent signings on one team race-safe: the update
    /// only applies while enough cap remains. Returns whether it applied.
    pub async fn try_reserve_cap(&self, team_code: &str, amount: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE teams SET remaining_cap = remaining_cap - ?
             WHERE team_code = ? AND remaining_cap >= ?",
        )
        .bind(amount)
        .bind(team_code)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return cap space on release.
    pub async fn release_cap(&self, team_code: &str, amount: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE teams SET remaining_cap = remaining_cap + ? WHERE team_code = ?")
            .bind(amount)
            .bind(team_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_match_result(&self, team_code: &str, won: bool) -> Result<(), DbError> {
        let column = if won { "wins" } else { "losses" };
        sqlx::query(&format!(
            "UPDATE teams SET {column} = {column} + 1 WHERE team_code = ?"
        ))
        .bind(team_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
