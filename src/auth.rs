use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::ClinicError, middleware::auth_context::AuthContext};

/// 1 admin, 2 staff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum Role {
    Admin = 1,
    Staff = 2,
}

/// Turns a bearer token into the caller's identity.
///
/// Issuing tokens is somebody else's job; this side only reads them.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` for unknown, revoked or expired tokens.
    async fn resolve(&self, token: &str) -> Result<Option<AuthContext>, ClinicError>;
}

/// Hash token for DB storage (SHA-256 hex).
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    clinic_id: Uuid,
    role: Role,
}

/// Sessions stored in `session_token`, keyed by token hash.
#[derive(Clone)]
pub struct PgSessionProvider {
    pool: PgPool,
}

impl PgSessionProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PgSessionProvider {
    async fn resolve(&self, token: &str) -> Result<Option<AuthContext>, ClinicError> {
        let token_hash = hash_access_token(token);

        let row = sqlx::query_as::<_, SessionLookupRow>(
            r#"
            SELECT st.session_token_id, st.user_id, u.clinic_id, u.role
            FROM session_token st
            JOIN clinic_user u ON u.user_id = st.user_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > now()
              AND u.is_active = true
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // best-effort; a failed touch must not fail the request
        if let Err(e) = sqlx::query("UPDATE session_token SET last_seen_at = now() WHERE session_token_id = $1")
            .bind(row.session_token_id)
            .execute(&self.pool)
            .await
        {
            tracing::debug!(error = %e, "could not touch session");
        }

        Ok(Some(AuthContext {
            user_id: row.user_id,
            tenant_id: row.clinic_id,
            role: row.role,
        }))
    }
}

/// Fixed token table, for tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    sessions: HashMap<String, AuthContext>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, ctx: AuthContext) -> Self {
        self.sessions.insert(hash_access_token(token), ctx);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, token: &str) -> Result<Option<AuthContext>, ClinicError> {
        Ok(self.sessions.get(&hash_access_token(token)).cloned())
    }
}
