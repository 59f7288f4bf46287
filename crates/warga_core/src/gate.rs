//! crates/warga_core/src/gate.rs
//!
//! The authorization gate: decides whether the current caller may enter a
//! resident or admin area and, if not, where to send them.
//!
//! Every evaluation reads the caller's profile afresh. A failed lookup is
//! reported back and treated as "not admin"; it is never retried here.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Capability, Profile, Role, Session};
use crate::ports::DatabaseService;
use crate::routes::{LOGIN_ROUTE, NOT_AUTHORIZED_ROUTE};
use crate::session::SessionSnapshot;

/// One gate variant. Gates stack: admin areas sit behind both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateTier {
    Resident,
    Admin,
}

impl GateTier {
    pub fn required_capability(self) -> Capability {
        match self {
            GateTier::Resident => Capability::ResidentArea,
            GateTier::Admin => Capability::AdminArea,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The session is still being resolved; show a waiting indicator.
    Wait,
    Allow,
    RedirectLogin,
    RedirectNotAuthorized,
}

impl GateDecision {
    pub fn redirect_target(self) -> Option<&'static str> {
        match self {
            GateDecision::RedirectLogin => Some(LOGIN_ROUTE),
            GateDecision::RedirectNotAuthorized => Some(NOT_AUTHORIZED_ROUTE),
            GateDecision::Wait | GateDecision::Allow => None,
        }
    }
}

/// A signed-in caller together with whatever profile could be read for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub session: Session,
    pub profile: Option<Profile>,
}

impl Caller {
    pub fn user_id(&self) -> Uuid {
        self.session.user_id
    }

    /// Without a readable profile the caller is an ordinary resident.
    pub fn role(&self) -> Role {
        self.profile.as_ref().map(|p| p.role).unwrap_or_default()
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role().grants(capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub decision: GateDecision,
    pub caller: Option<Caller>,
    /// Set when the profile lookup failed during this evaluation.
    pub lookup_error: Option<String>,
}

impl GateOutcome {
    fn bare(decision: GateDecision) -> Self {
        Self {
            decision,
            caller: None,
            lookup_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateDenied {
    #[error("the session is still loading")]
    Pending,
    #[error("sign in required")]
    SignInRequired,
    #[error("not authorized")]
    NotAuthorized { lookup_error: Option<String> },
}

impl GateDenied {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            GateDenied::Pending => None,
            GateDenied::SignInRequired => Some(LOGIN_ROUTE),
            GateDenied::NotAuthorized { .. } => Some(NOT_AUTHORIZED_ROUTE),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationGate {
    db: Arc<dyn DatabaseService>,
}

impl AuthorizationGate {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Evaluates a single gate.
    pub async fn evaluate(&self, tier: GateTier, snapshot: &SessionSnapshot) -> GateOutcome {
        self.admit(&[tier], snapshot).await
    }

    /// Evaluates stacked gates, outermost first, stopping at the first denial.
    pub async fn admit(&self, tiers: &[GateTier], snapshot: &SessionSnapshot) -> GateOutcome {
        if tiers.is_empty() {
            return GateOutcome::bare(GateDecision::Allow);
        }
        if snapshot.loading {
            return GateOutcome::bare(GateDecision::Wait);
        }
        let Some(session) = snapshot.session.clone() else {
            return GateOutcome::bare(GateDecision::RedirectLogin);
        };
        if session.is_expired(Utc::now()) {
            debug!(user_id = %session.user_id, "Held session has expired");
            return GateOutcome::bare(GateDecision::RedirectLogin);
        }

        let (profile, lookup_error) = match self.db.get_profile(session.user_id).await {
            Ok(profile) => (profile, None),
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "Profile lookup failed during gate evaluation");
                (None, Some(e.to_string()))
            }
        };
        let caller = Caller { session, profile };

        let decision = if tiers
            .iter()
            .all(|tier| caller.can(tier.required_capability()))
        {
            GateDecision::Allow
        } else {
            GateDecision::RedirectNotAuthorized
        };

        GateOutcome {
            decision,
            caller: Some(caller),
            lookup_error,
        }
    }

    /// Like [`admit`](Self::admit), for callers that already resolved the session.
    pub async fn require(
        &self,
        tiers: &[GateTier],
        session: Option<Session>,
    ) -> Result<Option<Caller>, GateDenied> {
        let snapshot = SessionSnapshot {
            session,
            loading: false,
        };
        let outcome = self.admit(tiers, &snapshot).await;
        match outcome.decision {
            GateDecision::Allow => Ok(outcome.caller),
            GateDecision::Wait => Err(GateDenied::Pending),
            GateDecision::RedirectLogin => Err(GateDenied::SignInRequired),
            GateDecision::RedirectNotAuthorized => Err(GateDenied::NotAuthorized {
                lookup_error: outcome.lookup_error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, MemoryDatabase};
    use chrono::Duration;

    const ADMIN_STACK: &[GateTier] = &[GateTier::Resident, GateTier::Admin];

    fn session_for(user_id: Uuid) -> SessionSnapshot {
        SessionSnapshot::signed_in(Session {
            user_id,
            email: "warga@example.com".to_string(),
            token: "token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    fn gate(db: &Arc<MemoryDatabase>) -> AuthorizationGate {
        AuthorizationGate::new(db.clone())
    }

    #[tokio::test]
    async fn loading_makes_no_decision() {
        let db = Arc::new(MemoryDatabase::new());
        db.fail(FailPoint::GetProfile, 1);
        let outcome = gate(&db).admit(ADMIN_STACK, &SessionSnapshot::loading()).await;
        assert_eq!(outcome.decision, GateDecision::Wait);
        // No lookup happened, so the armed failure is still pending.
        assert!(db.get_profile(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn anonymous_is_sent_to_login_from_every_gate() {
        let db = Arc::new(MemoryDatabase::new());
        let gate = gate(&db);
        for tiers in [&[GateTier::Resident][..], &[GateTier::Admin][..], ADMIN_STACK] {
            let outcome = gate.admit(tiers, &SessionSnapshot::anonymous()).await;
            assert_eq!(outcome.decision, GateDecision::RedirectLogin);
            assert_eq!(outcome.decision.redirect_target(), Some("/login"));
        }
    }

    #[tokio::test]
    async fn expired_session_counts_as_signed_out() {
        let db = Arc::new(MemoryDatabase::new());
        let admin = db.seed_profile("Siti", "B-02", Role::Admin);
        let snapshot = SessionSnapshot::signed_in(Session {
            user_id: admin.id,
            email: "siti@example.com".to_string(),
            token: "stale".to_string(),
            expires_at: Utc::now() - Duration::hours(1),
        });

        let outcome = gate(&db).admit(ADMIN_STACK, &snapshot).await;
        assert_eq!(outcome.decision, GateDecision::RedirectLogin);
        assert!(outcome.caller.is_none());
        assert_eq!(
            gate(&db).require(&[GateTier::Resident], snapshot.session).await,
            Err(GateDenied::SignInRequired)
        );
    }

    #[tokio::test]
    async fn resident_enters_resident_area_only() {
        let db = Arc::new(MemoryDatabase::new());
        let resident = db.seed_profile("Budi", "A-01", Role::User);
        let gate = gate(&db);
        let snapshot = session_for(resident.id);

        let outcome = gate.evaluate(GateTier::Resident, &snapshot).await;
        assert_eq!(outcome.decision, GateDecision::Allow);

        let outcome = gate.admit(ADMIN_STACK, &snapshot).await;
        assert_eq!(outcome.decision, GateDecision::RedirectNotAuthorized);
        assert_eq!(outcome.decision.redirect_target(), Some("/not-authorized"));
        assert!(outcome.lookup_error.is_none());
    }

    #[tokio::test]
    async fn admin_enters_both_areas() {
        let db = Arc::new(MemoryDatabase::new());
        let admin = db.seed_profile("Siti", "B-02", Role::Admin);
        let gate = gate(&db);
        let snapshot = session_for(admin.id);

        assert_eq!(
            gate.evaluate(GateTier::Resident, &snapshot).await.decision,
            GateDecision::Allow
        );
        let outcome = gate.admit(ADMIN_STACK, &snapshot).await;
        assert_eq!(outcome.decision, GateDecision::Allow);
        assert_eq!(outcome.caller.map(|c| c.role()), Some(Role::Admin));
    }

    #[tokio::test]
    async fn missing_profile_is_not_admin() {
        let db = Arc::new(MemoryDatabase::new());
        let gate = gate(&db);
        let snapshot = session_for(Uuid::new_v4());

        assert_eq!(
            gate.evaluate(GateTier::Resident, &snapshot).await.decision,
            GateDecision::Allow
        );
        assert_eq!(
            gate.admit(ADMIN_STACK, &snapshot).await.decision,
            GateDecision::RedirectNotAuthorized
        );
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed_and_is_surfaced() {
        let db = Arc::new(MemoryDatabase::new());
        let admin = db.seed_profile("Siti", "B-02", Role::Admin);
        db.fail(FailPoint::GetProfile, 1);

        let outcome = gate(&db).admit(ADMIN_STACK, &session_for(admin.id)).await;
        assert_eq!(outcome.decision, GateDecision::RedirectNotAuthorized);
        assert!(outcome.lookup_error.is_some());
    }

    #[tokio::test]
    async fn role_is_read_fresh_on_every_evaluation() {
        let db = Arc::new(MemoryDatabase::new());
        let admin = db.seed_profile("Siti", "B-02", Role::Admin);
        let gate = gate(&db);
        let snapshot = session_for(admin.id);
        assert_eq!(gate.admit(ADMIN_STACK, &snapshot).await.decision, GateDecision::Allow);

        let demote = crate::domain::ProfilePatch {
            role: Some(Role::User),
            ..Default::default()
        };
        db.update_profile(admin.id, &demote).await.unwrap();
        assert_eq!(
            gate.admit(ADMIN_STACK, &snapshot).await.decision,
            GateDecision::RedirectNotAuthorized
        );
    }

    #[tokio::test]
    async fn require_maps_decisions_to_errors() {
        let db = Arc::new(MemoryDatabase::new());
        let resident = db.seed_profile("Budi", "A-01", Role::User);
        let gate = gate(&db);

        assert_eq!(
            gate.require(ADMIN_STACK, None).await,
            Err(GateDenied::SignInRequired)
        );
        let session = session_for(resident.id).session;
        assert!(matches!(
            gate.require(ADMIN_STACK, session.clone()).await,
            Err(GateDenied::NotAuthorized { lookup_error: None })
        ));
        let caller = gate.require(&[GateTier::Resident], session).await.unwrap();
        assert_eq!(caller.map(|c| c.user_id()), Some(resident.id));
    }
}
