//! Credential resolution
//!
//! The engine never acquires credentials itself; it only resolves a stored
//! token for a tenant. A missing credential fails the run fast, with no
//! in-process retry, and the next scheduled trigger tries again.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EngineResult;

/// A resolved API credential for one tenant
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub token_id: String,
    pub token: String,
}

/// Resolves the API credential for a tenant, if one exists
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, tenant_id: Uuid) -> EngineResult<Option<AuthToken>>;
}

/// Credential resolver backed by the `tenant_credentials` table
pub struct PgCredentialResolver {
    pool: PgPool,
}

impl PgCredentialResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialResolver for PgCredentialResolver {
    async fn resolve(&self, tenant_id: Uuid) -> EngineResult<Option<AuthToken>> {
        // token_id is a UUID column; decode it as one and render for the
        // caller, since sqlx will not read a UUID into a String.
        let row: Option<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT token_id, token
            FROM tenant_credentials
            WHERE tenant_id = $1 AND revoked_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(token_id, token)| AuthToken {
            token_id: token_id.to_string(),
            token,
        }))
    }
}
