pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod directory;
pub mod eligibility;
pub mod metrics;
pub mod nickname;
pub mod rank;
pub mod rate_limit;
pub mod riot;
pub mod roster;
