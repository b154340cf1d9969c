use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Unknown role strings fall back to the least privileged role.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user profile in the store's user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(name: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            created_at: Utc::now(),
        }
    }
}

/// The acting user for one command, handed to every operation that needs it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<Profile>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn for_user(profile: Profile) -> Self {
        Self {
            user: Some(profile),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|p| p.id)
    }

    /// Whether transfer deletion should be offered to this user at all.
    pub fn can_delete_transfers(&self) -> bool {
        matches!(self.user.as_ref().map(|p| p.role), Some(Role::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_defaults_to_member() {
        assert_eq!(Role::from_str_lossy("admin"), Role::Admin);
        assert_eq!(Role::from_str_lossy("ADMIN"), Role::Admin);
        assert_eq!(Role::from_str_lossy("member"), Role::Member);
        assert_eq!(Role::from_str_lossy("site_engineer"), Role::Member);
    }

    #[test]
    fn test_only_admins_may_delete() {
        assert!(!Session::anonymous().can_delete_transfers());
        assert!(
            !Session::for_user(Profile::new("ravi".into(), Role::Member)).can_delete_transfers()
        );
        assert!(Session::for_user(Profile::new("asha".into(), Role::Admin)).can_delete_transfers());
    }
}
