// Roster transactions: sign, release, designations, substitutions.
//
// Every transaction is validated first and applied second; a failed
// precondition returns a typed rejection and leaves roles, records, and
// cap accounting untouched. Sign and Release are the only mutators of a
// team's remaining cap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::{Database, DbError, PlayerRecord, FREE_AGENT_TEAM};
use crate::directory::{DirectoryError, MembershipDirectory, NotificationSink, RoleRef};
use crate::metrics;
use crate::nickname::{format_nickname, NameState};

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("{player} has not completed onboarding")]
    MissingIntent { player: String },
    #[error("{player} is a spectator and cannot be signed")]
    Spectator { player: String },
    #[error("{player} is not eligible for this split")]
    NotEligible { player: String },
    #[error("{player} is already on a roster")]
    AlreadySigned { player: String },
    #[error("{player} has no rank-derived salary yet")]
    NoSalary { player: String },
    #[error("signing at salary {salary} exceeds the cap: {remaining} remaining")]
    CapExceeded { salary: i64, remaining: i64 },
    #[error("{player} is not on team {team}")]
    NotOnTeam { player: String, team: String },
    #[error("substitutes must be free agents")]
    SubstituteNotFreeAgent { player: String },
    #[error("unknown player {0}")]
    UnknownPlayer(String),
    #[error("team {0} is not configured")]
    UnknownTeam(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl TransactionError {
    /// Precondition rejections are user-facing and expected; everything
    /// else is a system failure worth an error log.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            TransactionError::Db(_)
                | TransactionError::Directory(_)
                | TransactionError::UnknownTeam(_)
        )
    }
}

/// League-wide status roles.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub free_agent: RoleRef,
    pub spectator: RoleRef,
    pub franchise_owner: RoleRef,
    pub captain: RoleRef,
    /// Onboarding not completed.
    pub missing_intent: RoleRef,
    /// Operator-flagged as ineligible regardless of game count.
    pub flagged_ineligible: RoleRef,
}

struct SubTimer {
    handle: tokio::task::JoinHandle<()>,
    role: RoleRef,
}

/// Executes cap-constrained roster transactions.
pub struct RosterManager {
    db: Arc<Database>,
    directory: Arc<dyn MembershipDirectory>,
    notifier: Arc<dyn NotificationSink>,
    roles: RoleConfig,
    transaction_channel: String,
    sub_timers: Arc<Mutex<HashMap<String, SubTimer>>>,
}

impl RosterManager {
    pub fn new(
        db: Arc<Database>,
        directory: Arc<dyn MembershipDirectory>,
        notifier: Arc<dyn NotificationSink>,
        roles: RoleConfig,
        transaction_channel: String,
    ) -> Self {
        Self {
            db,
            directory,
            notifier,
            roles,
            transaction_channel,
            sub_timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sign a free agent (or the team's own GM) onto a team's active
    /// roster, reserving cap space for their salary.
    pub async fn sign(&self, discord_id: &str, team_code: &str) -> Result<(), TransactionError> {
        let result = self.sign_inner(discord_id, team_code).await;
        record_outcome("sign", &result);
        result
    }

    async fn sign_inner(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let player = self.require_player(discord_id).await?;
        let team = self
            .db
            .get_team(team_code)
            .await?
            .ok_or_else(|| TransactionError::UnknownTeam(team_code.to_string()))?;
        let member_roles = self.directory.member_roles(discord_id).await?;

        if member_roles.contains(&self.roles.missing_intent) {
            return Err(TransactionError::MissingIntent {
                player: player.name,
            });
        }
        if member_roles.contains(&self.roles.spectator) {
            return Err(TransactionError::Spectator {
                player: player.name,
            });
        }
        if member_roles.contains(&self.roles.flagged_ineligible) || !player.eligible_for_split {
            return Err(TransactionError::NotEligible {
                player: player.name,
            });
        }
        let is_target_gm = member_roles.contains(&RoleRef(team.gm_role_id));
        if !player.is_free_agent() && !is_target_gm {
            return Err(TransactionError::AlreadySigned {
                player: player.name,
            });
        }
        let salary = match player.effective_salary() {
            Some(s) if s > 0 => s,
            _ => {
                return Err(TransactionError::NoSalary {
                    player: player.name,
                })
            }
        };

        // Claim cap space atomically; the guarded update is the cap check.
        if !self.db.try_reserve_cap(team_code, salary).await? {
            let remaining = self
                .db
                .get_team(team_code)
                .await?
                .map(|t| t.remaining_cap)
                .unwrap_or(0);
            return Err(TransactionError::CapExceeded { salary, remaining });
        }

        let team_role = RoleRef(team.team_role_id);
        if let Err(e) = self
            .directory
            .grant_role(discord_id, team_role, "roster signing")
            .await
        {
            // Give the claimed cap back before surfacing the failure.
            self.db.release_cap(team_code, salary).await?;
            return Err(e.into());
        }
        // A pending substitution becomes a real signing.
        self.cancel_substitution_timer(discord_id);
        if let Err(e) = self
            .directory
            .revoke_role(discord_id, self.roles.free_agent, "roster signing")
            .await
        {
            tracing::error!(
                discord_id,
                team_code,
                error = %e,
                "signed but failed to remove free-agent role"
            );
        }

        self.db.set_team_state(discord_id, team_code, true).await?;
        self.notifier
            .post(
                &self.transaction_channel,
                &format!(
                    "{} signs with {} at salary {}",
                    player.name, team_code, salary
                ),
            )
            .await;
        self.refresh_nickname(discord_id).await?;
        tracing::info!(discord_id, team_code, salary, "player signed");
        Ok(())
    }

    /// Release a player from a team, returning their salary to the cap.
    pub async fn release(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let result = self.release_inner(discord_id, team_code).await;
        record_outcome("release", &result);
        result
    }

    async fn release_inner(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let player = self.require_player(discord_id).await?;
        let team = self
            .db
            .get_team(team_code)
            .await?
            .ok_or_else(|| TransactionError::UnknownTeam(team_code.to_string()))?;
        let member_roles = self.directory.member_roles(discord_id).await?;

        let team_role = RoleRef(team.team_role_id);
        let on_roster =
            member_roles.contains(&team_role) && player.team.as_deref() == Some(team_code);
        if !on_roster {
            return Err(TransactionError::NotOnTeam {
                player: player.name,
                team: team_code.to_string(),
            });
        }
        let salary = player
            .effective_salary()
            .ok_or_else(|| TransactionError::NoSalary {
                player: player.name.clone(),
            })?;

        self.directory
            .revoke_role(discord_id, team_role, "roster release")
            .await?;
        if let Err(e) = self
            .directory
            .grant_role(discord_id, self.roles.free_agent, "roster release")
            .await
        {
            tracing::error!(
                discord_id,
                team_code,
                error = %e,
                "released but failed to restore free-agent role"
            );
        }

        self.db
            .set_team_state(discord_id, FREE_AGENT_TEAM, false)
            .await?;
        self.db.release_cap(team_code, salary).await?;
        self.cancel_substitution_timer(discord_id);
        self.notifier
            .post(
                &self.transaction_channel,
                &format!(
                    "{} released by {}; {} returns to the cap",
                    player.name, team_code, salary
                ),
            )
            .await;
        self.refresh_nickname(discord_id).await?;
        tracing::info!(discord_id, team_code, salary, "player released");
        Ok(())
    }

    /// Grant the team's GM role. Additive; cap accounting is untouched.
    pub async fn designate_gm(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let result = self
            .designate_team_role(discord_id, team_code, DesignatedRole::Gm, true)
            .await;
        record_outcome("designate_gm", &result);
        result
    }

    pub async fn relieve_gm(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let result = self
            .designate_team_role(discord_id, team_code, DesignatedRole::Gm, false)
            .await;
        record_outcome("relieve_gm", &result);
        result
    }

    /// Grant the franchise-owner role and pin the player to the team for
    /// display purposes. Owners are not salaried.
    pub async fn designate_owner(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let result = self.designate_owner_inner(discord_id, team_code).await;
        record_outcome("designate_owner", &result);
        result
    }

    async fn designate_owner_inner(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let player = self.require_player(discord_id).await?;
        if self.db.get_team(team_code).await?.is_none() {
            return Err(TransactionError::UnknownTeam(team_code.to_string()));
        }
        self.directory
            .grant_role(discord_id, self.roles.franchise_owner, "owner designation")
            .await?;
        // Owners keep their team association without joining the roster.
        if player.is_free_agent() {
            self.db.set_team_state(discord_id, team_code, false).await?;
        }
        self.refresh_nickname(discord_id).await?;
        tracing::info!(discord_id, team_code, "franchise owner designated");
        Ok(())
    }

    pub async fn designate_captain(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let result = self
            .designate_team_role(discord_id, team_code, DesignatedRole::Captain, true)
            .await;
        record_outcome("designate_captain", &result);
        result
    }

    pub async fn relieve_captain(
        &self,
        discord_id: &str,
        team_code: &str,
    ) -> Result<(), TransactionError> {
        let result = self
            .designate_team_role(discord_id, team_code, DesignatedRole::Captain, false)
            .await;
        record_outcome("relieve_captain", &result);
        result
    }

    async fn designate_team_role(
        &self,
        discord_id: &str,
        team_code: &str,
        kind: DesignatedRole,
        grant: bool,
    ) -> Result<(), TransactionError> {
        let player = self.require_player(discord_id).await?;
        let team = self
            .db
            .get_team(team_code)
            .await?
            .ok_or_else(|| TransactionError::UnknownTeam(team_code.to_string()))?;

        let role = match kind {
            DesignatedRole::Gm => RoleRef(team.gm_role_id),
            DesignatedRole::Captain => self.roles.captain,
        };
        // Captains must actually be on the roster; a GM may be appointed
        // before they sign themselves.
        if kind == DesignatedRole::Captain
            && grant
            && player.team.as_deref() != Some(team_code)
        {
            return Err(TransactionError::NotOnTeam {
                player: player.name,
                team: team_code.to_string(),
            });
        }

        if grant {
            self.directory
                .grant_role(discord_id, role, kind.reason())
                .await?;
        } else {
            self.directory
                .revoke_role(discord_id, role, kind.reason())
                .await?;
        }
        tracing::info!(discord_id, team_code, kind = ?kind, grant, "designation updated");
        Ok(())
    }

    /// Temporarily grant a free agent the team role, revoking it
    /// automatically after `duration`. An early release or a real signing
    /// cancels the timer; expiry revocation is idempotent.
    pub async fn substitute(
        &self,
        discord_id: &str,
        team_code: &str,
        duration: Duration,
    ) -> Result<(), TransactionError> {
        let result = self.substitute_inner(discord_id, team_code, duration).await;
        record_outcome("substitute", &result);
        result
    }

    async fn substitute_inner(
        &self,
        discord_id: &str,
        team_code: &str,
        duration: Duration,
    ) -> Result<(), TransactionError> {
        let player = self.require_player(discord_id).await?;
        let team = self
            .db
            .get_team(team_code)
            .await?
            .ok_or_else(|| TransactionError::UnknownTeam(team_code.to_string()))?;
        if !player.is_free_agent() {
            return Err(TransactionError::SubstituteNotFreeAgent {
                player: player.name,
            });
        }

        let team_role = RoleRef(team.team_role_id);
        self.directory
            .grant_role(discord_id, team_role, "substitution")
            .await?;

        // Replace any previous timer for this player.
        self.cancel_substitution_timer(discord_id);

        let directory = self.directory.clone();
        let timers = self.sub_timers.clone();
        let id = discord_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let still_pending = timers.lock().unwrap().remove(&id).is_some();
            if !still_pending {
                return;
            }
            metrics::ACTIVE_SUBSTITUTIONS.dec();
            // Only revoke if the role is still held.
            match directory.member_roles(&id).await {
                Ok(roles) if roles.contains(&team_role) => {
                    if let Err(e) = directory
                        .revoke_role(&id, team_role, "substitution expired")
                        .await
                    {
                        tracing::error!(discord_id = %id, error = %e, "substitution revocation failed");
                    } else {
                        tracing::info!(discord_id = %id, "substitution expired, role revoked");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(discord_id = %id, error = %e, "substitution expiry role check failed");
                }
            }
        });
        self.sub_timers
            .lock()
            .unwrap()
            .insert(discord_id.to_string(), SubTimer {
                handle,
                role: team_role,
            });
        metrics::ACTIVE_SUBSTITUTIONS.inc();
        self.notifier
            .post(
                &self.transaction_channel,
                &format!("{} substitutes for {}", player.name, team_code),
            )
            .await;
        tracing::info!(discord_id, team_code, minutes = duration.as_secs() / 60, "substitution started");
        Ok(())
    }

    /// End a substitution early: cancel the timer and drop the role now.
    pub async fn end_substitution(&self, discord_id: &str) -> Result<(), TransactionError> {
        let Some(role) = self.cancel_substitution_timer(discord_id) else {
            return Ok(());
        };
        self.directory
            .revoke_role(discord_id, role, "substitution ended")
            .await?;
        Ok(())
    }

    /// Abort a pending substitution timer, returning the team role it was
    /// guarding. No role mutation happens here.
    fn cancel_substitution_timer(&self, discord_id: &str) -> Option<RoleRef> {
        let timer = self.sub_timers.lock().unwrap().remove(discord_id)?;
        timer.handle.abort();
        metrics::ACTIVE_SUBSTITUTIONS.dec();
        Some(timer.role)
    }

    /// Whether a substitution timer is pending for this player.
    pub fn substitution_pending(&self, discord_id: &str) -> bool {
        self.sub_timers.lock().unwrap().contains_key(discord_id)
    }

    async fn require_player(&self, discord_id: &str) -> Result<PlayerRecord, TransactionError> {
        self.db
            .get_player(discord_id)
            .await?
            .ok_or_else(|| TransactionError::UnknownPlayer(discord_id.to_string()))
    }

    async fn refresh_nickname(&self, discord_id: &str) -> Result<(), TransactionError> {
        let Some(player) = self.db.get_player(discord_id).await? else {
            return Ok(());
        };
        apply_canonical_nickname(&self.db, self.directory.as_ref(), &self.roles, &player)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DesignatedRole {
    Gm,
    Captain,
}

impl DesignatedRole {
    fn reason(&self) -> &'static str {
        match self {
            DesignatedRole::Gm => "gm designation",
            DesignatedRole::Captain => "captain designation",
        }
    }
}

fn record_outcome<T>(kind: &str, result: &Result<T, TransactionError>) {
    let outcome = match result {
        Ok(_) => "accepted",
        Err(e) if e.is_rejection() => "rejected",
        Err(_) => "error",
    };
    metrics::TRANSACTIONS_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}

/// Re-derive and apply the canonical display name for one player. Shared
/// by transactions and the audit sweep so there is exactly one rendering
/// path.
pub async fn apply_canonical_nickname(
    db: &Database,
    directory: &dyn MembershipDirectory,
    roles: &RoleConfig,
    player: &PlayerRecord,
) -> Result<String, TransactionError> {
    let member_roles = directory.member_roles(&player.discord_id).await?;
    let state = NameState::derive(
        player.team.as_deref(),
        member_roles.contains(&roles.franchise_owner),
        member_roles.contains(&roles.spectator),
        player.eligible_for_split,
        false,
        player.effective_salary(),
    );
    let current = if player.nickname.is_empty() {
        player.name.as_str()
    } else {
        player.nickname.as_str()
    };
    let rendered = format_nickname(current, &state);
    if rendered != player.nickname {
        directory
            .set_display_name(&player.discord_id, &rendered)
            .await?;
        db.set_nickname(&player.discord_id, &rendered).await?;
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectory, RecordingSink};

    const FA_ROLE: RoleRef = RoleRef(1);
    const SPEC_ROLE: RoleRef = RoleRef(2);
    const OWNER_ROLE: RoleRef = RoleRef(3);
    const CAPTAIN_ROLE: RoleRef = RoleRef(4);
    const INTENT_ROLE: RoleRef = RoleRef(5);
    const INELIGIBLE_ROLE: RoleRef = RoleRef(6);
    const TSM_TEAM_ROLE: RoleRef = RoleRef(100);
    const TSM_GM_ROLE: RoleRef = RoleRef(101);

    fn role_config() -> RoleConfig {
        RoleConfig {
            free_agent: FA_ROLE,
            spectator: SPEC_ROLE,
            franchise_owner: OWNER_ROLE,
            captain: CAPTAIN_ROLE,
            missing_intent: INTENT_ROLE,
            flagged_ineligible: INELIGIBLE_ROLE,
        }
    }

    struct Fixture {
        db: Arc<Database>,
        directory: Arc<InMemoryDirectory>,
        sink: Arc<RecordingSink>,
        manager: RosterManager,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.create_team("TSM", TSM_TEAM_ROLE.0, TSM_GM_ROLE.0, 100)
            .await
            .unwrap();
        let directory = Arc::new(InMemoryDirectory::new());
        let sink = Arc::new(RecordingSink::new());
        let manager = RosterManager::new(
            db.clone(),
            directory.clone(),
            sink.clone(),
            role_config(),
            "transactions".into(),
        );
        Fixture {
            db,
            directory,
            sink,
            manager,
        }
    }

    /// Eligible free agent with a salary, holding the FA role.
    async fn seed_free_agent(f: &Fixture, id: &str, salary: i64) {
        f.db.upsert_player(id, &format!("player-{id}")).await.unwrap();
        f.db.set_salary(id, salary, "2026-summer").await.unwrap();
        f.db.set_eligible(id, true).await.unwrap();
        f.db.set_team_state(id, FREE_AGENT_TEAM, false).await.unwrap();
        f.directory.insert_role(id, FA_ROLE);
    }

    #[tokio::test]
    async fn test_sign_happy_path() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        f.manager.sign("1", "TSM").await.unwrap();

        let team = f.db.get_team("TSM").await.unwrap().unwrap();
        assert_eq!(team.remaining_cap, 40);
        let player = f.db.get_player("1").await.unwrap().unwrap();
        assert_eq!(player.team.as_deref(), Some("TSM"));
        assert!(player.active_roster);
        assert!(f.directory.has_role("1", TSM_TEAM_ROLE));
        assert!(!f.directory.has_role("1", FA_ROLE));
        assert!(f.sink.posts_to("transactions")[0].contains("signs with TSM"));
        // Nickname switched to the team form.
        assert_eq!(player.nickname, "TSM player-1");
    }

    #[tokio::test]
    async fn test_sign_rejected_over_cap() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.db.try_reserve_cap("TSM", 50).await.unwrap(); // 50 remaining

        let err = f.manager.sign("1", "TSM").await.unwrap_err();
        match err {
            TransactionError::CapExceeded { salary, remaining } => {
                assert_eq!(salary, 60);
                assert_eq!(remaining, 50);
            }
            other => panic!("expected CapExceeded, got {other:?}"),
        }

        // Zero state change.
        let team = f.db.get_team("TSM").await.unwrap().unwrap();
        assert_eq!(team.remaining_cap, 50);
        let player = f.db.get_player("1").await.unwrap().unwrap();
        assert!(player.is_free_agent());
        assert!(!f.directory.has_role("1", TSM_TEAM_ROLE));
        assert!(f.sink.posts_to("transactions").is_empty());
    }

    #[tokio::test]
    async fn test_sign_rejected_without_salary() {
        let f = fixture().await;
        f.db.upsert_player("1", "noobie").await.unwrap();
        f.db.set_eligible("1", true).await.unwrap();
        f.directory.insert_role("1", FA_ROLE);

        let err = f.manager.sign("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::NoSalary { .. }));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_sign_rejected_for_spectator_and_missing_intent() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.directory.insert_role("1", SPEC_ROLE);
        let err = f.manager.sign("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::Spectator { .. }));

        seed_free_agent(&f, "2", 60).await;
        f.directory.insert_role("2", INTENT_ROLE);
        let err = f.manager.sign("2", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::MissingIntent { .. }));
    }

    #[tokio::test]
    async fn test_sign_rejected_when_not_eligible() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.db.set_eligible("1", false).await.unwrap();

        let err = f.manager.sign("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::NotEligible { .. }));
    }

    #[tokio::test]
    async fn test_sign_rejected_when_already_on_other_team() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.db.set_team_state("1", "C9", true).await.unwrap();

        let err = f.manager.sign("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::AlreadySigned { .. }));
    }

    #[tokio::test]
    async fn test_gm_of_target_team_may_sign_self() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        // Pretend a prior designation pinned them to the team.
        f.db.set_team_state("1", "TSM", false).await.unwrap();
        f.directory.insert_role("1", TSM_GM_ROLE);

        f.manager.sign("1", "TSM").await.unwrap();
        let player = f.db.get_player("1").await.unwrap().unwrap();
        assert!(player.active_roster);
    }

    #[tokio::test]
    async fn test_grant_failure_returns_cap() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.directory.set_fail_grants(true);

        let err = f.manager.sign("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::Directory(_)));
        assert!(!err.is_rejection());

        let team = f.db.get_team("TSM").await.unwrap().unwrap();
        assert_eq!(team.remaining_cap, 100);
        let player = f.db.get_player("1").await.unwrap().unwrap();
        assert!(player.is_free_agent());
    }

    #[tokio::test]
    async fn test_release_restores_cap_and_state() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.manager.sign("1", "TSM").await.unwrap();

        f.manager.release("1", "TSM").await.unwrap();

        let team = f.db.get_team("TSM").await.unwrap().unwrap();
        assert_eq!(team.remaining_cap, 100);
        let player = f.db.get_player("1").await.unwrap().unwrap();
        assert_eq!(player.team.as_deref(), Some(FREE_AGENT_TEAM));
        assert!(!player.active_roster);
        assert!(!f.directory.has_role("1", TSM_TEAM_ROLE));
        assert!(f.directory.has_role("1", FA_ROLE));
        // Free-agent nickname carries the salary suffix again.
        assert_eq!(player.nickname, "FA player-1 60");
    }

    #[tokio::test]
    async fn test_release_rejected_when_not_on_team() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        let err = f.manager.release("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::NotOnTeam { .. }));
    }

    #[tokio::test]
    async fn test_captain_requires_roster_membership() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        let err = f.manager.designate_captain("1", "TSM").await.unwrap_err();
        assert!(matches!(err, TransactionError::NotOnTeam { .. }));

        f.manager.sign("1", "TSM").await.unwrap();
        f.manager.designate_captain("1", "TSM").await.unwrap();
        assert!(f.directory.has_role("1", CAPTAIN_ROLE));

        f.manager.relieve_captain("1", "TSM").await.unwrap();
        assert!(!f.directory.has_role("1", CAPTAIN_ROLE));
    }

    #[tokio::test]
    async fn test_gm_designation_without_roster() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        f.manager.designate_gm("1", "TSM").await.unwrap();
        assert!(f.directory.has_role("1", TSM_GM_ROLE));

        f.manager.relieve_gm("1", "TSM").await.unwrap();
        assert!(!f.directory.has_role("1", TSM_GM_ROLE));
    }

    #[tokio::test]
    async fn test_owner_designation_sets_team_prefix() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        f.manager.designate_owner("1", "TSM").await.unwrap();
        assert!(f.directory.has_role("1", OWNER_ROLE));
        let player = f.db.get_player("1").await.unwrap().unwrap();
        // Owner keeps the team tag but stays off the active roster.
        assert_eq!(player.team.as_deref(), Some("TSM"));
        assert!(!player.active_roster);
        assert_eq!(player.nickname, "TSM player-1");
    }

    #[tokio::test]
    async fn test_substitution_expires_and_revokes() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        f.manager
            .substitute("1", "TSM", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(f.directory.has_role("1", TSM_TEAM_ROLE));
        assert!(f.manager.substitution_pending("1"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!f.directory.has_role("1", TSM_TEAM_ROLE));
        assert!(!f.manager.substitution_pending("1"));
    }

    #[tokio::test]
    async fn test_substitution_rejected_for_signed_player() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;
        f.manager.sign("1", "TSM").await.unwrap();

        let err = f
            .manager
            .substitute("1", "TSM", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, TransactionError::SubstituteNotFreeAgent { .. }));
    }

    #[tokio::test]
    async fn test_signing_cancels_substitution_timer() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        f.manager
            .substitute("1", "TSM", Duration::from_millis(50))
            .await
            .unwrap();
        f.manager.sign("1", "TSM").await.unwrap();
        assert!(!f.manager.substitution_pending("1"));

        // The expired timer must not strip the role from the real signing.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(f.directory.has_role("1", TSM_TEAM_ROLE));
    }

    #[tokio::test]
    async fn test_end_substitution_early() {
        let f = fixture().await;
        seed_free_agent(&f, "1", 60).await;

        f.manager
            .substitute("1", "TSM", Duration::from_secs(600))
            .await
            .unwrap();
        f.manager.end_substitution("1").await.unwrap();
        assert!(!f.directory.has_role("1", TSM_TEAM_ROLE));
        assert!(!f.manager.substitution_pending("1"));

        // Ending again is a no-op.
        f.manager.end_substitution("1").await.unwrap();
    }
}
