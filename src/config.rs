// Application configuration, loaded from environment variables.

use std::time::Duration;

/// League-wide roster cap shared by every team.
pub const DEFAULT_SALARY_CAP: i64 = 600;
/// Ranked games needed within the tracked splits to become eligible.
pub const DEFAULT_REQUIRED_GAME_COUNT: i64 = 30;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the admin/health HTTP server to.
    pub port: u16,
    /// Bearer key for the rank API.
    pub riot_api_key: String,
    /// Per-second request budget against the rank API.
    pub riot_requests_per_second: usize,
    /// League salary cap applied to new teams.
    pub salary_cap: i64,
    /// Games required for split eligibility.
    pub required_game_count: i64,
    /// Interval between automatic audit sweeps.
    pub audit_interval: Duration,
    /// Notification channel for transaction announcements.
    pub transaction_channel: String,
    /// Notification channel for operator review requests.
    pub ops_channel: String,
    /// League-wide status role ids.
    pub free_agent_role_id: i64,
    pub spectator_role_id: i64,
    pub franchise_owner_role_id: i64,
    pub captain_role_id: i64,
    pub missing_intent_role_id: i64,
    pub flagged_ineligible_role_id: i64,
}

fn env_i64(name: &str) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:gauntlet.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `RIOT_API_KEY` - rank API bearer key (default: empty, requests will 401)
    /// - `RIOT_REQS_PER_SEC` - rank API pacing budget (default: 18)
    /// - `SALARY_CAP` - league salary cap (default: 600)
    /// - `REQUIRED_GAME_COUNT` - eligibility threshold (default: 30)
    /// - `AUDIT_INTERVAL_HOURS` - hours between sweeps (default: 24)
    /// - `TRANSACTION_CHANNEL` / `OPS_CHANNEL` - notification channel refs
    /// - `*_ROLE_ID` - platform role ids for the league status roles
    pub fn load() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:gauntlet.db?mode=rwc".to_string());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let riot_api_key = std::env::var("RIOT_API_KEY").unwrap_or_default();

        let riot_requests_per_second = std::env::var("RIOT_REQS_PER_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(18);

        let salary_cap = std::env::var("SALARY_CAP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SALARY_CAP);

        let required_game_count = std::env::var("REQUIRED_GAME_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUIRED_GAME_COUNT);

        let audit_interval_hours: u64 = std::env::var("AUDIT_INTERVAL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        let transaction_channel =
            std::env::var("TRANSACTION_CHANNEL").unwrap_or_else(|_| "transactions".to_string());
        let ops_channel = std::env::var("OPS_CHANNEL").unwrap_or_else(|_| "ops".to_string());

        Config {
            database_url,
            port,
            riot_api_key,
            riot_requests_per_second,
            salary_cap,
            required_game_count,
            audit_interval: Duration::from_secs(audit_interval_hours * 3600),
            transaction_channel,
            ops_channel,
            free_agent_role_id: env_i64("FREE_AGENT_ROLE_ID"),
            spectator_role_id: env_i64("SPECTATOR_ROLE_ID"),
            franchise_owner_role_id: env_i64("FRANCHISE_OWNER_ROLE_ID"),
            captain_role_id: env_i64("CAPTAIN_ROLE_ID"),
            missing_intent_role_id: env_i64("MISSING_INTENT_ROLE_ID"),
            flagged_ineligible_role_id: env_i64("FLAGGED_INELIGIBLE_ROLE_ID"),
        }
    }
}
