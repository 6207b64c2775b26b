use crate::auth::repo_types::{CredentialUser, User};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

impl User {
    /// Create a new user with a hashed password. The role always starts as
    /// 'user'; privileged roles are assigned out of band.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, role, password_changed_at, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, password_changed_at, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, password_changed_at, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Store a pending reset token. Hash and expiry move in one statement so
    /// a concurrent request can never observe one without the other.
    pub async fn set_password_reset(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token_hash = $2, password_reset_expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Drop a pending reset token, e.g. after the notification failed to send.
    pub async fn clear_password_reset(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token_hash = NULL, password_reset_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Look up the user holding an unexpired reset token with this digest.
    pub async fn find_by_reset_token(
        db: &PgPool,
        token_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, password_changed_at, created_at
            FROM users
            WHERE password_reset_token_hash = $1
              AND password_reset_expires_at > now()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Replace the password. One statement sets the new hash, stamps
    /// password_changed_at and clears any pending reset token. The stamp is
    /// backdated a second so a session token issued right after stays ahead
    /// of it.
    pub async fn update_password(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = now() - interval '1 second',
                password_reset_token_hash = NULL,
                password_reset_expires_at = NULL
            WHERE id = $1
            RETURNING id, name, email, role, password_changed_at, created_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}

impl CredentialUser {
    /// Find a user by email including the password hash. Only the login path
    /// asks for this read.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<CredentialUser>> {
        let user = sqlx::query_as::<_, CredentialUser>(
            r#"
            SELECT id, name, email, role, password_changed_at, created_at, password_hash
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by id including the password hash, for re-verification
    /// before an authenticated password change.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<CredentialUser>> {
        let user = sqlx::query_as::<_, CredentialUser>(
            r#"
            SELECT id, name, email, role, password_changed_at, created_at, password_hash
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }
}
