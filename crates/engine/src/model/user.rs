use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access level. Declaration order is privilege order:
/// `Viewer < Technician < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    #[serde(alias = "ReadOnly")]
    Viewer,
    Technician,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Viewer, Role::Technician, Role::Admin];

    /// `self` is `required` or strictly above it.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }

    pub fn label_de(&self) -> &'static str {
        match self {
            Role::Viewer => "Betrachter",
            Role::Technician => "Techniker",
            Role::Admin => "Administrator",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" | "readonly" => Ok(Role::Viewer),
            "technician" => Ok(Role::Technician),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Viewer => "Viewer",
            Role::Technician => "Technician",
            Role::Admin => "Admin",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order() {
        assert!(Role::Viewer < Role::Technician);
        assert!(Role::Technician < Role::Admin);
    }

    #[test]
    fn test_readonly_alias() {
        let role: Role = serde_json::from_str("\"ReadOnly\"").unwrap();
        assert_eq!(role, Role::Viewer);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"Viewer\"");
        assert_eq!("readonly".parse::<Role>(), Ok(Role::Viewer));
    }

    #[test]
    fn test_user_defaults() {
        let user: User =
            serde_json::from_value(serde_json::json!({"id": 1, "username": "mueller", "role": "Technician"}))
                .unwrap();
        assert!(user.is_active);
        assert!(!user.is_deleted);
        assert_eq!(user.role, Role::Technician);
    }
}
