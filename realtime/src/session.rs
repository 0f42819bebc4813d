//! Session and access lookup for realtime connections.
//!
//! The hub consumes the auth collaborator's tables read-only: a session
//! token resolves to a tenant, and the user's branch/service access sets
//! bound what they may subscribe to. An empty set leaves that dimension
//! unrestricted.

use crate::RealtimeError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// A resolved session.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
}

/// The branches and services a user may subscribe to.
#[derive(Debug, Clone, Default)]
pub struct AccessSets {
    pub branches: Vec<Uuid>,
    pub services: Vec<Uuid>,
}

impl AccessSets {
    /// Whether a subscription to `(branch, service)` stays inside the sets.
    ///
    /// A non-empty set requires the corresponding field to be present and
    /// listed; an empty set allows anything for that dimension.
    #[must_use]
    pub fn allows(&self, branch_id: Option<Uuid>, service_id: Option<Uuid>) -> bool {
        if !self.branches.is_empty() {
            match branch_id {
                Some(branch) if self.branches.contains(&branch) => {}
                _ => return false,
            }
        }
        if !self.services.is_empty() {
            match service_id {
                Some(service) if self.services.contains(&service) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Read-only store over the session/access collaborator tables.
#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve an unexpired session token. `None` means unknown or expired.
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, RealtimeError> {
        let row = sqlx::query(
            r"
            SELECT s.session_id, s.user_id, u.tenant_id, r.name AS role
            FROM sessions s
            JOIN users u ON u.user_id = s.user_id
            JOIN roles r ON r.role_id = u.role_id
            WHERE s.session_id = $1 AND s.expires_at > NOW()
            ",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Session {
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            tenant_id: row.try_get("tenant_id")?,
            role: row.try_get("role")?,
        }))
    }

    /// Load the user's allowed branch and service sets.
    pub async fn get_access(&self, user_id: Uuid) -> Result<AccessSets, RealtimeError> {
        let branches = sqlx::query("SELECT branch_id FROM user_branch_access WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.try_get("branch_id"))
            .collect::<Result<Vec<Uuid>, _>>()?;

        let services = sqlx::query("SELECT service_id FROM user_service_access WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.try_get("service_id"))
            .collect::<Result<Vec<Uuid>, _>>()?;

        Ok(AccessSets { branches, services })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sets_allow_everything() {
        let access = AccessSets::default();
        assert!(access.allows(None, None));
        assert!(access.allows(Some(Uuid::new_v4()), Some(Uuid::new_v4())));
    }

    #[test]
    fn branch_set_requires_membership() {
        let branch = Uuid::new_v4();
        let access = AccessSets {
            branches: vec![branch],
            services: vec![],
        };
        assert!(access.allows(Some(branch), None));
        assert!(!access.allows(Some(Uuid::new_v4()), None));
        // A restricted user cannot subscribe branch-wide.
        assert!(!access.allows(None, None));
    }

    #[test]
    fn both_sets_must_pass() {
        let branch = Uuid::new_v4();
        let service = Uuid::new_v4();
        let access = AccessSets {
            branches: vec![branch],
            services: vec![service],
        };
        assert!(access.allows(Some(branch), Some(service)));
        assert!(!access.allows(Some(branch), Some(Uuid::new_v4())));
        assert!(!access.allows(Some(branch), None));
    }
}
