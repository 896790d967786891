use std::sync::{PoisonError, RwLock};

use agora_shared::identity::UserProfile;

/// Read-only access to the signed-in user.
///
/// Authentication itself is owned by the external identity provider; the
/// engine only reads these fields at send and normalization time.
pub trait IdentitySource: Send + Sync + 'static {
    /// Current profile, or `None` when signed out.
    fn current_user(&self) -> Option<UserProfile>;

    fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }
}

/// Process-local session state fed by the identity provider.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    profile: RwLock<Option<UserProfile>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, profile: UserProfile) {
        *self
            .profile
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(profile);
    }

    pub fn sign_out(&self) {
        *self
            .profile
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentitySource for SessionIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
