// Periodic audit sweep.
//
// Re-derives every member's expected rank, salary, eligibility, and
// nickname state from the record store plus fresh rank API data, and
// corrects drift. One member's failure never aborts the sweep; failures
// are counted, logged with player context, and processing continues.
// Cancellation is cooperative and takes effect between players, never in
// the middle of one player's update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use serde::Serialize;

use crate::db::{Database, DbError, PlayerRecord};
use crate::directory::{MembershipDirectory, NotificationSink, RoleRef};
use crate::eligibility::EligibilityTracker;
use crate::metrics;
use crate::rank::{calculate_salary, get_highest_rank, Rank, RankEntry};
use crate::riot::{RiotClient, RiotError};
use crate::roster::{apply_canonical_nickname, RoleConfig};

/// Counters for one completed (or cancelled) sweep.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub started_at: String,
    pub processed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub duration_ms: u64,
    pub cancelled: bool,
}

/// What to do with a freshly computed salary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SalaryAction {
    /// Store the computed value.
    Apply,
    /// Signed player would get a raise; ask an operator instead.
    NotifyReview,
    /// Nothing to change.
    Keep,
}

/// Monotonic salary rule: free agents auto-increase, signed players only
/// increase through manual review, and the stored value never decreases.
fn salary_decision(
    stored: Option<i64>,
    manual: Option<i64>,
    computed: i64,
    is_free_agent: bool,
) -> SalaryAction {
    let effective = match (stored, manual) {
        (Some(s), Some(m)) => Some(s.max(m)),
        (Some(s), None) => Some(s),
        (None, m) => m,
    };
    match effective {
        None => SalaryAction::Apply,
        Some(current) if computed > current => {
            if is_free_agent {
                SalaryAction::Apply
            } else {
                SalaryAction::NotifyReview
            }
        }
        Some(_) => SalaryAction::Keep,
    }
}

pub struct AuditReconciler {
    db: Arc<Database>,
    riot: RiotClient,
    directory: Arc<dyn MembershipDirectory>,
    notifier: Arc<dyn NotificationSink>,
    eligibility: EligibilityTracker,
    roles: RoleConfig,
    ops_channel: String,
    cancel: AtomicBool,
    running: AtomicBool,
    last_summary: Mutex<Option<AuditSummary>>,
}

impl AuditReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        riot: RiotClient,
        directory: Arc<dyn MembershipDirectory>,
        notifier: Arc<dyn NotificationSink>,
        eligibility: EligibilityTracker,
        roles: RoleConfig,
        ops_channel: String,
    ) -> Self {
        Self {
            db,
            riot,
            directory,
            notifier,
            eligibility,
            roles,
            ops_channel,
            cancel: AtomicBool::new(false),
            running: AtomicBool::new(false),
            last_summary: Mutex::new(None),
        }
    }

    /// Ask a running sweep to stop at the next player boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn last_summary(&self) -> Option<AuditSummary> {
        self.last_summary.lock().unwrap().clone()
    }

    /// Full member sweep. Departed players are excluded by the store
    /// query; bots never enter the store at all.
    pub async fn run_sweep(&self) -> Result<AuditSummary, DbError> {
        self.running.store(true, Ordering::Relaxed);
        self.cancel.store(false, Ordering::Relaxed);
        metrics::AUDIT_SWEEP_RUNNING.set(1);
        let started = Instant::now();

        let mut summary = AuditSummary {
            started_at: Utc::now().to_rfc3339(),
            processed: 0,
            skipped: 0,
            errored: 0,
            duration_ms: 0,
            cancelled: false,
        };

        let players = match self.db.list_active_players().await {
            Ok(players) => players,
            Err(e) => {
                self.running.store(false, Ordering::Relaxed);
                metrics::AUDIT_SWEEP_RUNNING.set(0);
                return Err(e);
            }
        };
        tracing::info!(members = players.len(), "audit sweep started");

        for player in players {
            // Cooperative cancellation at the player boundary only.
            if self.cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                tracing::info!("audit sweep cancelled");
                break;
            }
            match self.process_member(&player).await {
                Ok(true) => {
                    summary.processed += 1;
                    metrics::AUDIT_MEMBERS_TOTAL
                        .with_label_values(&["processed"])
                        .inc();
                }
                Ok(false) => {
                    summary.skipped += 1;
                    metrics::AUDIT_MEMBERS_TOTAL
                        .with_label_values(&["skipped"])
                        .inc();
                }
                Err(e) => {
                    summary.errored += 1;
                    metrics::AUDIT_MEMBERS_TOTAL
                        .with_label_values(&["errored"])
                        .inc();
                    tracing::error!(
                        discord_id = %player.discord_id,
                        name = %player.name,
                        error = %e,
                        "audit failed for member, continuing"
                    );
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        metrics::AUDIT_SWEEPS_TOTAL.inc();
        metrics::AUDIT_SWEEP_RUNNING.set(0);
        self.running.store(false, Ordering::Relaxed);
        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            errored = summary.errored,
            duration_ms = summary.duration_ms,
            cancelled = summary.cancelled,
            "audit sweep finished"
        );
        *self.last_summary.lock().unwrap() = Some(summary.clone());
        Ok(summary)
    }

    /// One member's update, strictly sequential: identity → rank → peak →
    /// salary → eligibility → nickname. Returns false for a benign skip.
    async fn process_member(&self, player: &PlayerRecord) -> Result<bool, AuditError> {
        let Some(entries) = self.fetch_merged_rank_entries(player).await? else {
            tracing::warn!(
                discord_id = %player.discord_id,
                "no riot identity on record, skipping"
            );
            return Ok(false);
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.db
            .record_rank_observation(&player.discord_id, &entries, &today)
            .await?;

        if let Some(highest) = get_highest_rank(&entries) {
            self.db.raise_peak_rank(&player.discord_id, highest).await?;
            self.reconcile_salary(player, highest).await?;
        }

        if !player.eligible_for_split {
            let outcome = self.eligibility.refresh_player(player).await?;
            if outcome.newly_eligible {
                self.notifier
                    .post(
                        &self.ops_channel,
                        &format!("{} is now split-eligible", player.name),
                    )
                    .await;
            }
        }

        // Re-read: salary/eligibility above may have changed the record.
        if let Some(fresh) = self.db.get_player(&player.discord_id).await? {
            self.reconcile_roles(&fresh).await;
            apply_canonical_nickname(&self.db, self.directory.as_ref(), &self.roles, &fresh)
                .await
                .map_err(|e| AuditError::Nickname(e.to_string()))?;
        }
        Ok(true)
    }

    /// Apply the monotonic salary rule for one member.
    async fn reconcile_salary(
        &self,
        player: &PlayerRecord,
        highest: Rank,
    ) -> Result<(), AuditError> {
        let computed = calculate_salary(highest);
        let season = Utc::now().year().to_string();
        match salary_decision(
            player.salary,
            player.manual_salary,
            computed,
            player.is_free_agent(),
        ) {
            SalaryAction::Apply => {
                self.db
                    .set_salary(&player.discord_id, computed, &season)
                    .await?;
                tracing::info!(
                    discord_id = %player.discord_id,
                    computed,
                    rank = %highest,
                    "salary updated"
                );
            }
            SalaryAction::NotifyReview => {
                // Raising a signed player's salary can break cap compliance
                // retroactively; an operator has to apply it.
                self.notifier
                    .post(
                        &self.ops_channel,
                        &format!(
                            "{} ({}) now rates salary {} at {}, stored {}; manual review needed",
                            player.name,
                            player.team.as_deref().unwrap_or("?"),
                            computed,
                            highest,
                            player.effective_salary().unwrap_or(0),
                        ),
                    )
                    .await;
                tracing::info!(
                    discord_id = %player.discord_id,
                    computed,
                    "signed player salary increase flagged for review"
                );
            }
            SalaryAction::Keep => {}
        }
        Ok(())
    }

    /// Current solo-queue entries across the main account and every alt.
    /// `None` means the player has no resolvable riot identity.
    async fn fetch_merged_rank_entries(
        &self,
        player: &PlayerRecord,
    ) -> Result<Option<Vec<RankEntry>>, RiotError> {
        let mut entries = Vec::new();
        let mut any_identity = false;

        if let Some(puuid) = &player.puuid {
            any_identity = true;
            entries.extend(self.riot.get_rank_entries(puuid).await?);
        } else if let (Some(game_name), Some(tag_line)) = (&player.game_name, &player.tag_line) {
            any_identity = true;
            if let Some(puuid) = self.riot.resolve_puuid(game_name, tag_line).await? {
                if let Err(e) = self.db.set_puuid(&player.discord_id, &puuid).await {
                    tracing::warn!(discord_id = %player.discord_id, error = %e, "failed to cache puuid");
                }
                entries.extend(self.riot.get_rank_entries(&puuid).await?);
            }
        }

        for alt in &player.alt_accounts {
            any_identity = true;
            match self.riot.resolve_puuid(&alt.game_name, &alt.tag_line).await? {
                Some(puuid) => entries.extend(self.riot.get_rank_entries(&puuid).await?),
                None => {
                    tracing::warn!(
                        discord_id = %player.discord_id,
                        alt = %alt.game_name,
                        "alt account not found"
                    );
                }
            }
        }

        Ok(any_identity.then_some(entries))
    }

    /// Correct role drift from the store outward: signed players must hold
    /// their team role, free agents their free-agent role. Failures are
    /// logged and do not fail the member.
    async fn reconcile_roles(&self, player: &PlayerRecord) {
        let member_roles = match self.directory.member_roles(&player.discord_id).await {
            Ok(roles) => roles,
            Err(e) => {
                tracing::error!(discord_id = %player.discord_id, error = %e, "role read failed");
                return;
            }
        };

        let expected = if player.active_roster {
            match &player.team {
                Some(team_code) => match self.db.get_team(team_code).await {
                    Ok(Some(team)) => Some((RoleRef(team.team_role_id), "audit: roster member")),
                    Ok(None) => {
                        tracing::error!(
                            discord_id = %player.discord_id,
                            team_code,
                            "player assigned to unconfigured team"
                        );
                        None
                    }
                    Err(e) => {
                        tracing::error!(discord_id = %player.discord_id, error = %e, "team lookup failed");
                        None
                    }
                },
                None => None,
            }
        } else if player.is_free_agent() && !member_roles.contains(&self.roles.spectator) {
            Some((self.roles.free_agent, "audit: free agent"))
        } else {
            None
        };

        if let Some((role, reason)) = expected {
            if !member_roles.contains(&role) {
                if let Err(e) = self
                    .directory
                    .grant_role(&player.discord_id, role, reason)
                    .await
                {
                    tracing::error!(
                        discord_id = %player.discord_id,
                        error = %e,
                        "role drift correction failed"
                    );
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum AuditError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Riot(#[from] RiotError),
    #[error(transparent)]
    Eligibility(#[from] crate::eligibility::EligibilityError),
    #[error("nickname update failed: {0}")]
    Nickname(String),
}

/// Spawn the 24-hour audit loop. The first sweep runs one interval after
/// startup; on-demand sweeps go through the admin API instead.
pub fn spawn_audit_scheduler(reconciler: Arc<AuditReconciler>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if reconciler.is_running() {
                tracing::warn!("previous audit sweep still running, skipping this interval");
                continue;
            }
            if let Err(e) = reconciler.run_sweep().await {
                tracing::error!(error = %e, "scheduled audit sweep failed to start");
            }
        }
    });
}
