//! crates/warga_core/src/session.rs
//!
//! The session context: the one place that knows who is signed in for a
//! browser context (or a CLI process). It is constructed explicitly, handed
//! around by `Arc`, and disposed when its owner shuts down.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Identity, Session};
use crate::ports::{AuthEvent, IdentityProvider, PortError};

/// What the rest of the application may observe about the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    /// True until the stored session has been restored (or found absent).
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn loading() -> Self {
        Self {
            session: None,
            loading: true,
        }
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            session: Some(session),
            loading: false,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            session: None,
            loading: false,
        }
    }

    pub fn user(&self) -> Option<Identity> {
        self.session.as_ref().map(Session::identity)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("the session context has been disposed")]
    Disposed,
    #[error(transparent)]
    Port(#[from] PortError),
}

pub struct SessionContext {
    identity: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Creates the context and starts restoring `stored_token` in the background.
    ///
    /// The snapshot reports `loading` until the restore finishes. Auth events
    /// from the provider are followed for the lifetime of the context.
    pub fn launch(identity: Arc<dyn IdentityProvider>, stored_token: Option<String>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::loading());
        let state = Arc::new(state);
        let shutdown = CancellationToken::new();

        // Subscribe before restoring so a sign-out racing the restore is not missed.
        let events = identity.subscribe();
        let worker = tokio::spawn(run_context(
            identity.clone(),
            state.clone(),
            shutdown.clone(),
            stored_token,
            events,
        ));

        Arc::new(Self {
            identity,
            state,
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until the initial restore has finished.
    pub async fn ready(&self) -> Result<SessionSnapshot, SessionError> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        let mut rx = self.state.subscribe();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(SessionError::Disposed),
            snapshot = rx.wait_for(|s| !s.loading) => match snapshot {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(SessionError::Disposed),
            },
        }
    }

    /// Exchanges credentials for a session and makes it the current one.
    ///
    /// A session already held by this context is signed out first.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        self.ready().await?;

        if let Some(previous) = self.snapshot().session {
            if let Err(e) = self.identity.sign_out(&previous.token).await {
                warn!(user_id = %previous.user_id, error = %e, "Failed to end previous session");
            }
        }

        let session = self.identity.sign_in(email, password).await?;
        if self.is_disposed() {
            debug!(user_id = %session.user_id, "Dropping sign-in result for disposed context");
            return Err(SessionError::Disposed);
        }

        self.state
            .send_replace(SessionSnapshot::signed_in(session.clone()));
        info!(user_id = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Ends the current session, if any. Having no session is not an error.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }
        let Some(session) = self.snapshot().session else {
            return Ok(());
        };
        self.identity.sign_out(&session.token).await?;
        clear_if_current(&self.state, &session.token);
        info!(user_id = %session.user_id, "Signed out");
        Ok(())
    }

    /// Stops following auth events. Results still in flight are discarded.
    pub async fn dispose(&self) {
        self.shutdown.cancel();
        self.state.send_modify(|s| s.loading = false);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Session context worker ended abnormally");
            }
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn clear_if_current(state: &watch::Sender<SessionSnapshot>, token: &str) -> bool {
    state.send_if_modified(|s| {
        if s.session.as_ref().is_some_and(|current| current.token == token) {
            s.session = None;
            true
        } else {
            false
        }
    })
}

async fn restore(identity: &dyn IdentityProvider, stored_token: Option<String>) -> Option<Session> {
    let token = stored_token?;
    match identity.get_session(&token).await {
        Ok(session) => session,
        Err(e) => {
            // An unreachable provider leaves the context signed out, not broken.
            warn!(error = %e, "Failed to restore stored session");
            None
        }
    }
}

async fn run_context(
    identity: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    shutdown: CancellationToken,
    stored_token: Option<String>,
    mut events: broadcast::Receiver<AuthEvent>,
) {
    let restored = tokio::select! {
        _ = shutdown.cancelled() => return,
        restored = restore(identity.as_ref(), stored_token) => restored,
    };
    state.send_modify(|s| {
        // A sign-in can only begin after loading ends, so nothing is overwritten here.
        s.session = restored;
        s.loading = false;
    });

    let mut changes = state.subscribe();
    loop {
        let held = state
            .borrow()
            .session
            .as_ref()
            .map(|s| (s.token.clone(), s.expires_at));
        tokio::select! {
            _ = shutdown.cancelled() => break,
            // Re-read the held session whenever it is replaced.
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = until_expiry(held.as_ref().map(|(_, at)| *at)) => {
                if let Some((token, _)) = &held {
                    if clear_if_current(&state, token) {
                        info!("Session expired");
                    }
                }
            }
            event = events.recv() => match event {
                Ok(AuthEvent::SignedOut { token }) => {
                    if clear_if_current(&state, &token) {
                        info!("Session ended by the identity provider");
                    }
                }
                // Other browser contexts signing in do not affect this one.
                Ok(AuthEvent::SignedIn(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed auth events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Resolves at `expires_at`, or never when no session is held.
async fn until_expiry(expires_at: Option<DateTime<Utc>>) {
    match expires_at {
        Some(at) => {
            let left = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(left).await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryIdentityProvider;

    fn provider() -> Arc<MemoryIdentityProvider> {
        let provider = Arc::new(MemoryIdentityProvider::default());
        provider.seed_account("warga@example.com", "rahasia123");
        provider
    }

    #[tokio::test]
    async fn absent_token_restores_to_anonymous() {
        let ctx = SessionContext::launch(provider(), None);
        let snapshot = ctx.ready().await.unwrap();
        assert_eq!(snapshot, SessionSnapshot::anonymous());
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn stored_token_is_restored() {
        let provider = provider();
        let session = provider
            .sign_in("warga@example.com", "rahasia123")
            .await
            .unwrap();

        let ctx = SessionContext::launch(provider.clone(), Some(session.token.clone()));
        let snapshot = ctx.ready().await.unwrap();
        assert_eq!(snapshot.session, Some(session));
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn expired_token_is_not_restored() {
        let provider = provider();
        let session = provider
            .sign_in("warga@example.com", "rahasia123")
            .await
            .unwrap();
        provider.expire_session(&session.token);

        let ctx = SessionContext::launch(provider.clone(), Some(session.token));
        assert!(ctx.ready().await.unwrap().session.is_none());
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn sign_in_then_sign_out() {
        let ctx = SessionContext::launch(provider(), None);
        let session = ctx.sign_in("warga@example.com", "rahasia123").await.unwrap();
        assert_eq!(ctx.snapshot().session, Some(session));

        ctx.sign_out().await.unwrap();
        assert_eq!(ctx.snapshot(), SessionSnapshot::anonymous());
        // Signing out again with no session is fine.
        ctx.sign_out().await.unwrap();
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn wrong_password_leaves_context_anonymous() {
        let ctx = SessionContext::launch(provider(), None);
        let err = ctx.sign_in("warga@example.com", "salah").await.unwrap_err();
        assert!(matches!(err, SessionError::Port(PortError::InvalidCredentials)));
        assert!(ctx.snapshot().session.is_none());
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn second_sign_in_replaces_the_first_session() {
        let provider = provider();
        let ctx = SessionContext::launch(provider.clone(), None);
        let first = ctx.sign_in("warga@example.com", "rahasia123").await.unwrap();
        let second = ctx.sign_in("warga@example.com", "rahasia123").await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(provider.get_session(&first.token).await.unwrap().is_none());
        assert_eq!(ctx.snapshot().session, Some(second));
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn provider_sign_out_clears_the_context() {
        let provider = provider();
        let ctx = SessionContext::launch(provider.clone(), None);
        let session = ctx.sign_in("warga@example.com", "rahasia123").await.unwrap();
        let mut rx = ctx.watch();

        provider.sign_out(&session.token).await.unwrap();
        let snapshot = rx.wait_for(|s| s.session.is_none()).await.unwrap().clone();
        assert_eq!(snapshot, SessionSnapshot::anonymous());
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn held_session_is_dropped_when_it_expires() {
        let provider = Arc::new(MemoryIdentityProvider::new(chrono::Duration::milliseconds(50)));
        provider.seed_account("warga@example.com", "rahasia123");
        let ctx = SessionContext::launch(provider, None);
        ctx.sign_in("warga@example.com", "rahasia123").await.unwrap();
        let mut rx = ctx.watch();

        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.session.is_none()),
        )
        .await
        .expect("session should expire")
        .unwrap()
        .clone();
        assert_eq!(snapshot, SessionSnapshot::anonymous());
        ctx.dispose().await;
    }

    #[tokio::test]
    async fn disposed_context_rejects_operations() {
        let ctx = SessionContext::launch(provider(), None);
        ctx.dispose().await;
        assert!(matches!(
            ctx.sign_in("warga@example.com", "rahasia123").await,
            Err(SessionError::Disposed)
        ));
        assert!(matches!(ctx.sign_out().await, Err(SessionError::Disposed)));
    }
}
