use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::password::{hash_password, verify_password};

/// Auth-side account record, distinct from the application profile.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub last_sign_in_at: Option<OffsetDateTime>,
    pub email_confirmed_at: Option<OffsetDateTime>,
}

/// Password operations available to any authenticated caller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the identity id when `password` matches; errors otherwise.
    async fn verify_password(&self, email: &str, password: &str) -> anyhow::Result<Uuid>;
    async fn update_password(&self, user_id: Uuid, new_password: &str) -> anyhow::Result<()>;
    async fn find_identity(&self, user_id: Uuid) -> anyhow::Result<Option<Identity>>;
}

/// Elevated operations; only wired in when a service-role connection exists.
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    async fn delete_identity(&self, user_id: Uuid) -> anyhow::Result<()>;
}

#[derive(FromRow)]
struct Credentials {
    id: Uuid,
    password_hash: String,
}

/// Identity provider backed by the local `users` table.
#[derive(Clone)]
pub struct PgIdentityProvider {
    db: PgPool,
}

impl PgIdentityProvider {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn verify_password(&self, email: &str, password: &str) -> anyhow::Result<Uuid> {
        let creds = sqlx::query_as::<_, Credentials>(
            r#"SELECT id, password_hash FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("load credentials")?
        .ok_or_else(|| anyhow::anyhow!("invalid login credentials"))?;

        if !verify_password(password, &creds.password_hash)? {
            anyhow::bail!("invalid login credentials");
        }

        sqlx::query(r#"UPDATE users SET last_sign_in_at = now() WHERE id = $1"#)
            .bind(creds.id)
            .execute(&self.db)
            .await
            .context("touch last_sign_in_at")?;
        debug!(user_id = %creds.id, "password verified");
        Ok(creds.id)
    }

    async fn update_password(&self, user_id: Uuid, new_password: &str) -> anyhow::Result<()> {
        let hash = hash_password(new_password)?;
        let res = sqlx::query(r#"UPDATE users SET password_hash = $1 WHERE id = $2"#)
            .bind(hash)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("update password")?;
        anyhow::ensure!(res.rows_affected() == 1, "identity {} not found", user_id);
        Ok(())
    }

    async fn find_identity(&self, user_id: Uuid) -> anyhow::Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, email, last_sign_in_at, email_confirmed_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("load identity")?;
        Ok(identity)
    }
}

#[async_trait]
impl IdentityAdmin for PgIdentityProvider {
    async fn delete_identity(&self, user_id: Uuid) -> anyhow::Result<()> {
        let res = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete identity")?;
        anyhow::ensure!(res.rows_affected() == 1, "identity {} not found", user_id);
        Ok(())
    }
}
