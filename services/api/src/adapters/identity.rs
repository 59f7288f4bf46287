//! services/api/src/adapters/identity.rs
//!
//! A self-hosted identity provider backed by the `auth_*` tables. Passwords are
//! hashed with Argon2 and sessions are opaque random tokens with a fixed lifetime.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;
use warga_core::domain::{Identity, Session, SignUpMetadata};
use warga_core::ports::{AuthEvent, IdentityProvider, PortError, PortResult};

const EVENT_CAPACITY: usize = 64;
const RESET_LINK_TTL_MINUTES: i64 = 60;

#[derive(Clone)]
pub struct PgIdentityProvider {
    pool: PgPool,
    session_ttl: Duration,
    events: broadcast::Sender<AuthEvent>,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pool,
            session_ttl,
            events,
        }
    }

    async fn open_session(&self, user_id: Uuid, email: String) -> PortResult<Session> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.session_ttl;
        sqlx::query("INSERT INTO auth_sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Session {
            user_id,
            email,
            token,
            expires_at,
        })
    }

    fn publish(&self, event: AuthEvent) {
        // Having no subscribers is normal for the HTTP service.
        let _ = self.events.send(event);
    }
}

#[derive(FromRow)]
struct CredentialRecord {
    id: Uuid,
    email: String,
    password_hash: String,
}

#[derive(FromRow)]
struct SessionRecord {
    token: String,
    user_id: Uuid,
    email: String,
    expires_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            user_id: self.user_id,
            email: self.email,
            token: self.token,
            expires_at: self.expires_at,
        }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Session> {
        // 1. Look up the account
        let creds = sqlx::query_as::<_, CredentialRecord>(
            "SELECT id, email, password_hash FROM auth_users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .ok_or(PortError::InvalidCredentials)?;

        // 2. Verify the password
        let parsed_hash = PasswordHash::new(&creds.password_hash).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            PortError::Unexpected("Authentication error".to_string())
        })?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| PortError::InvalidCredentials)?;

        // 3. Open the session and tell followers about it
        let session = self.open_session(creds.id, creds.email).await?;
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> PortResult<Identity> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                PortError::Unexpected("Failed to hash password".to_string())
            })?
            .to_string();

        let user_id = Uuid::new_v4();
        let email = email.trim().to_string();
        sqlx::query(
            "INSERT INTO auth_users (id, email, password_hash, full_name, house_number) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(&metadata.full_name)
        .bind(&metadata.house_number)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                PortError::Conflict("User already registered".to_string())
            }
            other => PortError::Unexpected(other.to_string()),
        })?;

        info!(user_id = %user_id, "Created identity account");
        Ok(Identity { user_id, email })
    }

    async fn sign_out(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.publish(AuthEvent::SignedOut {
            token: token.to_string(),
        });
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_url: &str) -> PortResult<()> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM auth_users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Unknown addresses succeed silently so accounts cannot be probed.
        let Some(user_id) = user_id else {
            debug!("Password reset requested for an unknown address");
            return Ok(());
        };

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + Duration::minutes(RESET_LINK_TTL_MINUTES);
        sqlx::query(
            "INSERT INTO password_resets (token, user_id, redirect_url, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(redirect_url)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        info!(user_id = %user_id, redirect_url, "Password reset link issued");
        Ok(())
    }

    async fn get_session(&self, token: &str) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT s.token, s.user_id, u.email, s.expires_at \
             FROM auth_sessions s JOIN auth_users u ON u.id = s.user_id \
             WHERE s.token = $1 AND s.expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn delete_identity(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM auth_users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Identity {} not found", user_id)));
        }
        info!(user_id = %user_id, "Deleted identity account");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
