use serde::{Deserialize, Serialize};

/// Profile fields read from the external identity provider.
///
/// The provider owns authentication entirely; these values are consumed
/// as delivered and never verified locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: String,
}

/// Author record carried on every message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl Author {
    pub const ANONYMOUS_NAME: &'static str = "Anonymous";

    /// Placeholder author used when neither the source record nor the
    /// local session provides any identity.
    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            display_name: Self::ANONYMOUS_NAME.to_string(),
            avatar_url: String::new(),
        }
    }
}

impl From<&UserProfile> for Author {
    fn from(profile: &UserProfile) -> Self {
        // An empty display name falls back to the email address, matching
        // what the identity provider shows elsewhere.
        let display_name = if profile.display_name.is_empty() {
            profile
                .email
                .clone()
                .unwrap_or_else(|| Self::ANONYMOUS_NAME.to_string())
        } else {
            profile.display_name.clone()
        };

        Self {
            id: profile.id.clone(),
            display_name,
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_from_profile_prefers_display_name() {
        let profile = UserProfile {
            id: "u1".into(),
            display_name: "Asha".into(),
            email: Some("asha@example.org".into()),
            avatar_url: "https://example.org/a.png".into(),
        };
        assert_eq!(Author::from(&profile).display_name, "Asha");
    }

    #[test]
    fn test_author_from_profile_falls_back_to_email() {
        let profile = UserProfile {
            id: "u1".into(),
            display_name: String::new(),
            email: Some("asha@example.org".into()),
            avatar_url: String::new(),
        };
        assert_eq!(Author::from(&profile).display_name, "asha@example.org");
    }
}
