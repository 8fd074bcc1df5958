// Capability seams for the chat platform.
//
// The core never talks to the gateway directly; it is handed something
// that can read/grant/revoke roles and rename members, and something that
// can post notifications. Production wires the real platform adapters in;
// tests use the in-memory fakes below.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

/// Opaque reference to a platform role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleRef(pub i64);

#[derive(Debug, thiserror::Error)]
#[error("role operation failed: {0}")]
pub struct DirectoryError(pub String);

/// Membership state: role reads and writes, display-name writes.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn member_roles(&self, member_id: &str) -> Result<HashSet<RoleRef>, DirectoryError>;
    async fn grant_role(
        &self,
        member_id: &str,
        role: RoleRef,
        reason: &str,
    ) -> Result<(), DirectoryError>;
    async fn revoke_role(
        &self,
        member_id: &str,
        role: RoleRef,
        reason: &str,
    ) -> Result<(), DirectoryError>;
    async fn set_display_name(&self, member_id: &str, name: &str)
        -> Result<(), DirectoryError>;
}

/// Fire-and-forget notification channel. Implementations log their own
/// delivery failures; callers never block on them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn post(&self, channel: &str, message: &str);
}

// ── In-memory fakes (used by unit and integration tests) ─────────────

/// In-memory `MembershipDirectory`. Grants can be made to fail to test
/// abort paths.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    roles: Mutex<HashMap<String, HashSet<RoleRef>>>,
    names: Mutex<HashMap<String, String>>,
    fail_grants: std::sync::atomic::AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_role(&self, member_id: &str, role: RoleRef) {
        self.roles
            .lock()
            .unwrap()
            .entry(member_id.to_string())
            .or_default()
            .insert(role);
    }

    pub fn has_role(&self, member_id: &str, role: RoleRef) -> bool {
        self.roles
            .lock()
            .unwrap()
            .get(member_id)
            .map(|set| set.contains(&role))
            .unwrap_or(false)
    }

    pub fn display_name(&self, member_id: &str) -> Option<String> {
        self.names.lock().unwrap().get(member_id).cloned()
    }

    pub fn set_fail_grants(&self, fail: bool) {
        self.fail_grants
            .store(fail, std::sync::atomic::Ordering::Relaxed);
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryDirectory {
    async fn member_roles(&self, member_id: &str) -> Result<HashSet<RoleRef>, DirectoryError> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(member_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn grant_role(
        &self,
        member_id: &str,
        role: RoleRef,
        _reason: &str,
    ) -> Result<(), DirectoryError> {
        if self.fail_grants.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(DirectoryError("grant refused".into()));
        }
        self.insert_role(member_id, role);
        Ok(())
    }

    async fn revoke_role(
        &self,
        member_id: &str,
        role: RoleRef,
        _reason: &str,
    ) -> Result<(), DirectoryError> {
        if let Some(set) = self.roles.lock().unwrap().get_mut(member_id) {
            set.remove(&role);
        }
        Ok(())
    }

    async fn set_display_name(
        &self,
        member_id: &str,
        name: &str,
    ) -> Result<(), DirectoryError> {
        self.names
            .lock()
            .unwrap()
            .insert(member_id.to_string(), name.to_string());
        Ok(())
    }
}

/// Records every posted notification for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn posts_to(&self, channel: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn post(&self, channel: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((channel.to_string(), message.to_string()));
    }
}

// ── Standalone-mode adapters ─────────────────────────────────────────

/// Directory used when no gateway adapter is wired in: reads see no roles
/// and every write is logged instead of applied. Lets the service run
/// standalone against a store without touching the platform.
#[derive(Debug, Default)]
pub struct DryRunDirectory;

#[async_trait]
impl MembershipDirectory for DryRunDirectory {
    async fn member_roles(&self, _member_id: &str) -> Result<HashSet<RoleRef>, DirectoryError> {
        Ok(HashSet::new())
    }

    async fn grant_role(
        &self,
        member_id: &str,
        role: RoleRef,
        reason: &str,
    ) -> Result<(), DirectoryError> {
        tracing::info!(member_id, role = role.0, reason, "dry-run: would grant role");
        Ok(())
    }

    async fn revoke_role(
        &self,
        member_id: &str,
        role: RoleRef,
        reason: &str,
    ) -> Result<(), DirectoryError> {
        tracing::info!(member_id, role = role.0, reason, "dry-run: would revoke role");
        Ok(())
    }

    async fn set_display_name(
        &self,
        member_id: &str,
        name: &str,
    ) -> Result<(), DirectoryError> {
        tracing::info!(member_id, name, "dry-run: would set display name");
        Ok(())
    }
}

/// Notification sink that writes to the log instead of a channel.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn post(&self, channel: &str, message: &str) {
        tracing::info!(channel, message, "notification");
    }
}
