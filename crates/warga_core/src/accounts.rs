//! crates/warga_core/src/accounts.rs
//!
//! Registration, login, password reset and profile maintenance.
//!
//! Registration writes to two systems (identity provider, then profiles). The
//! profile write is retried a bounded number of times; if it still fails the
//! identity account is deleted again so no account is left without a profile.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Capability, NewProfile, Nik, Profile, ProfilePatch, Role, Session, SignUpMetadata};
use crate::error::{PortalError, PortalResult};
use crate::gate::Caller;
use crate::ports::{DatabaseService, IdentityProvider, PortError};
use crate::routes::landing_route;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_PROFILE_WRITE_ATTEMPTS: u32 = 3;

//=========================================================================================
// Forms
//=========================================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationForm {
    pub full_name: String,
    pub house_number: String,
    pub nik: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Client-side checks; nothing reaches the backend unless these pass.
    pub fn validate(&self) -> PortalResult<Nik> {
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PortalError::validation("Password minimal 8 karakter"));
        }
        if self.password != self.confirm_password {
            return Err(PortalError::validation("Konfirmasi password tidak sesuai"));
        }
        let nik = Nik::parse(&self.nik)
            .ok_or_else(|| PortalError::validation("NIK harus 16 digit angka"))?;
        if self.full_name.trim().is_empty() {
            return Err(PortalError::validation("Nama lengkap wajib diisi"));
        }
        if !self.email.contains('@') {
            return Err(PortalError::validation("Email tidak valid"));
        }
        Ok(nik)
    }
}

/// The fields a resident may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResidentProfileUpdate {
    pub full_name: Option<String>,
    pub house_number: Option<String>,
    pub phone: Option<String>,
}

impl From<ResidentProfileUpdate> for ProfilePatch {
    fn from(u: ResidentProfileUpdate) -> Self {
        ProfilePatch {
            full_name: u.full_name,
            house_number: u.house_number,
            phone: u.phone,
            nik: None,
            role: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub role: Role,
    /// The route to navigate to after signing in.
    pub landing: &'static str,
}

//=========================================================================================
// Service
//=========================================================================================

#[derive(Clone)]
pub struct AccountService {
    identity: Arc<dyn IdentityProvider>,
    db: Arc<dyn DatabaseService>,
    profile_write_attempts: u32,
}

impl AccountService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        db: Arc<dyn DatabaseService>,
        profile_write_attempts: u32,
    ) -> Self {
        Self {
            identity,
            db,
            profile_write_attempts: profile_write_attempts.max(1),
        }
    }

    /// Creates the identity account, then the profile row.
    pub async fn register(&self, form: RegistrationForm) -> PortalResult<Profile> {
        let nik = form.validate()?;
        let metadata = SignUpMetadata {
            full_name: form.full_name.clone(),
            house_number: form.house_number.clone(),
        };
        let identity = self
            .identity
            .sign_up(&form.email, &form.password, &metadata)
            .await?;

        let new_profile = NewProfile {
            id: identity.user_id,
            full_name: form.full_name,
            house_number: form.house_number,
            nik,
            phone: form.phone,
            role: Role::User,
        };

        let mut last_error = None;
        for attempt in 1..=self.profile_write_attempts {
            match self.db.insert_profile(new_profile.clone()).await {
                Ok(profile) => {
                    info!(user_id = %profile.id, "Registered resident");
                    return Ok(profile);
                }
                Err(e) => {
                    warn!(user_id = %identity.user_id, attempt, error = %e, "Profile insert failed");
                    last_error = Some(e);
                }
            }
        }
        let cause = last_error.unwrap_or_else(|| PortError::Unexpected("profile insert failed".to_string()));

        match self.identity.delete_identity(identity.user_id).await {
            Ok(()) => {
                warn!(user_id = %identity.user_id, "Rolled back identity after failed profile insert");
                Err(PortalError::Port(cause))
            }
            Err(e) => {
                error!(user_id = %identity.user_id, error = %e, "Identity left without a profile");
                Err(PortalError::Orphaned {
                    step: format!("Profile insert ({cause})"),
                    resource: format!("identity {}", identity.user_id),
                })
            }
        }
    }

    /// Signs in and picks the landing route from the caller's role.
    pub async fn login(&self, email: &str, password: &str) -> PortalResult<LoginOutcome> {
        let session = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(|e| match e {
                PortError::InvalidCredentials => PortalError::InvalidCredentials,
                other => PortalError::Port(other),
            })?;

        let profile = match self.db.get_profile(session.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                error!(user_id = %session.user_id, error = %e, "Profile fetch failed after sign-in");
                if let Err(e) = self.identity.sign_out(&session.token).await {
                    warn!(user_id = %session.user_id, error = %e, "Failed to end session after profile error");
                }
                return Err(PortalError::Port(e));
            }
        };

        let role = profile.map(|p| p.role).unwrap_or_default();
        Ok(LoginOutcome {
            landing: landing_route(role),
            session,
            role,
        })
    }

    pub async fn logout(&self, token: &str) -> PortalResult<()> {
        self.identity.sign_out(token).await?;
        Ok(())
    }

    pub async fn session(&self, token: &str) -> PortalResult<Option<Session>> {
        Ok(self.identity.get_session(token).await?)
    }

    /// Sends a reset link that returns the user to `{site_origin}/update-password`.
    pub async fn request_password_reset(&self, email: &str, site_origin: &str) -> PortalResult<()> {
        if !email.contains('@') {
            return Err(PortalError::validation("Email tidak valid"));
        }
        let redirect = format!("{}/update-password", site_origin.trim_end_matches('/'));
        self.identity.reset_password_for_email(email, &redirect).await?;
        Ok(())
    }

    pub async fn own_profile(&self, caller: &Caller) -> PortalResult<Profile> {
        self.db
            .get_profile(caller.user_id())
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", caller.user_id())).into())
    }

    pub async fn update_own_profile(
        &self,
        caller: &Caller,
        update: ResidentProfileUpdate,
    ) -> PortalResult<Profile> {
        let patch = ProfilePatch::from(update);
        if patch.is_empty() {
            return self.own_profile(caller).await;
        }
        Ok(self.db.update_profile(caller.user_id(), &patch).await?)
    }

    pub async fn list_residents(&self, actor: &Caller) -> PortalResult<Vec<Profile>> {
        require(actor, Capability::ManageResidents)?;
        Ok(self.db.list_profiles().await?)
    }

    /// Admin edit of any resident. An admin cannot change their own role.
    pub async fn update_resident(
        &self,
        actor: &Caller,
        target: Uuid,
        patch: ProfilePatch,
    ) -> PortalResult<Profile> {
        require(actor, Capability::ManageResidents)?;
        if patch.role.is_some() {
            ensure_role_change_allowed(actor, target)?;
        }
        if let Some(nik) = &patch.nik {
            if Nik::parse(nik).is_none() {
                return Err(PortalError::validation("NIK harus 16 digit angka"));
            }
        }
        let profile = self.db.update_profile(target, &patch).await?;
        info!(actor = %actor.user_id(), target = %target, "Updated resident profile");
        Ok(profile)
    }

    pub async fn change_role(&self, actor: &Caller, target: Uuid, role: Role) -> PortalResult<Profile> {
        ensure_role_change_allowed(actor, target)?;
        let patch = ProfilePatch {
            role: Some(role),
            ..Default::default()
        };
        let profile = self.db.update_profile(target, &patch).await?;
        info!(actor = %actor.user_id(), target = %target, role = %role, "Changed resident role");
        Ok(profile)
    }

    /// Deletes the profile row only; the identity account is kept.
    pub async fn delete_resident(&self, actor: &Caller, target: Uuid) -> PortalResult<()> {
        require(actor, Capability::ManageResidents)?;
        if target == actor.user_id() {
            return Err(PortalError::Forbidden("admins cannot delete their own profile".to_string()));
        }
        self.db.delete_profile(target).await?;
        warn!(actor = %actor.user_id(), target = %target, "Deleted resident profile; identity account remains");
        Ok(())
    }
}

pub(crate) fn require(caller: &Caller, capability: Capability) -> PortalResult<()> {
    if caller.can(capability) {
        Ok(())
    } else {
        Err(PortalError::Forbidden(format!("{capability:?} requires an admin")))
    }
}

fn ensure_role_change_allowed(actor: &Caller, target: Uuid) -> PortalResult<()> {
    require(actor, Capability::ChangeRoles)?;
    if actor.user_id() == target {
        return Err(PortalError::Forbidden("admins cannot change their own role".to_string()));
    }
    Ok(())
}
