use std::sync::Arc;

use chrono::Datelike;
use tower_http::cors::CorsLayer;

use gauntlet_backend::audit::{spawn_audit_scheduler, AuditReconciler};
use gauntlet_backend::config::Config;
use gauntlet_backend::db::Database;
use gauntlet_backend::directory::{DryRunDirectory, LogSink, RoleRef};
use gauntlet_backend::eligibility::{default_splits, EligibilityTracker};
use gauntlet_backend::rate_limit::PacingLimiter;
use gauntlet_backend::riot::RiotClient;
use gauntlet_backend::roster::RoleConfig;
use gauntlet_backend::{api, metrics};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let config = Config::load();
    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let limiter = PacingLimiter::per_second(config.riot_requests_per_second);
    let riot = RiotClient::new(config.riot_api_key.clone(), limiter);

    // Gateway adapters plug in here; standalone runs log role/nickname
    // writes instead of applying them.
    let directory = Arc::new(DryRunDirectory);
    let notifier = Arc::new(LogSink);

    let roles = RoleConfig {
        free_agent: RoleRef(config.free_agent_role_id),
        spectator: RoleRef(config.spectator_role_id),
        franchise_owner: RoleRef(config.franchise_owner_role_id),
        captain: RoleRef(config.captain_role_id),
        missing_intent: RoleRef(config.missing_intent_role_id),
        flagged_ineligible: RoleRef(config.flagged_ineligible_role_id),
    };

    let splits = default_splits(chrono::Utc::now().year());
    let eligibility = EligibilityTracker::new(
        db.clone(),
        riot.clone(),
        splits,
        config.required_game_count,
    );

    let reconciler = Arc::new(AuditReconciler::new(
        db,
        riot,
        directory,
        notifier,
        eligibility,
        roles,
        config.ops_channel.clone(),
    ));
    spawn_audit_scheduler(reconciler.clone(), config.audit_interval);

    let app = api::router(reconciler).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("gauntlet backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
