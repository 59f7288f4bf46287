//! Helpers shared by the unit tests of this crate.

use chrono::{Duration, Utc};

use crate::domain::{Profile, Session};
use crate::gate::Caller;

/// A signed-in caller for `profile`, as the gate would produce it.
pub(crate) fn caller_for(profile: &Profile) -> Caller {
    Caller {
        session: Session {
            user_id: profile.id,
            email: format!("{}@example.com", profile.id.simple()),
            token: uuid::Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        },
        profile: Some(profile.clone()),
    }
}
