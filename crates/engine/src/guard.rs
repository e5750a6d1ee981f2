//! Role-gated access checks for routes and commands.

use crate::model::{Role, User};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

impl GuardDecision {
    pub fn is_allowed(self) -> bool {
        self == GuardDecision::Allow
    }
}

/// Decide access for `user` against an optional minimum role. Routes without
/// a minimum role still require a login.
pub fn check(user: Option<&User>, required: Option<Role>) -> GuardDecision {
    let Some(user) = user else {
        return GuardDecision::RedirectToLogin;
    };
    match required {
        Some(min) if !user.role.satisfies(min) => GuardDecision::RedirectToHome,
        _ => GuardDecision::Allow,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppRoute {
    Login,
    Dashboard,
    Machines,
    MachineCreate,
    MachineImport,
    MachineDetail,
    MachineEdit,
    Parts,
    PartCreate,
    PartDetail,
    PartEdit,
    Compatibility,
    Users,
    Backups,
    ModelTraining,
    Settings,
}

impl AppRoute {
    pub const ALL: [AppRoute; 16] = [
        AppRoute::Login,
        AppRoute::Dashboard,
        AppRoute::Machines,
        AppRoute::MachineCreate,
        AppRoute::MachineImport,
        AppRoute::MachineDetail,
        AppRoute::MachineEdit,
        AppRoute::Parts,
        AppRoute::PartCreate,
        AppRoute::PartDetail,
        AppRoute::PartEdit,
        AppRoute::Compatibility,
        AppRoute::Users,
        AppRoute::Backups,
        AppRoute::ModelTraining,
        AppRoute::Settings,
    ];

    pub const HOME: AppRoute = AppRoute::Dashboard;

    pub fn pattern(self) -> &'static str {
        match self {
            AppRoute::Login => "/login",
            AppRoute::Dashboard => "/",
            AppRoute::Machines => "/machines",
            AppRoute::MachineCreate => "/machines/new",
            AppRoute::MachineImport => "/machines/import",
            AppRoute::MachineDetail => "/machines/:id",
            AppRoute::MachineEdit => "/machines/:id/edit",
            AppRoute::Parts => "/parts",
            AppRoute::PartCreate => "/parts/new",
            AppRoute::PartDetail => "/parts/:id",
            AppRoute::PartEdit => "/parts/:id/edit",
            AppRoute::Compatibility => "/compatibility",
            AppRoute::Users => "/users",
            AppRoute::Backups => "/backups",
            AppRoute::ModelTraining => "/model-training",
            AppRoute::Settings => "/settings",
        }
    }

    pub fn is_public(self) -> bool {
        self == AppRoute::Login
    }

    pub fn required_role(self) -> Option<Role> {
        match self {
            AppRoute::Login => None,
            AppRoute::Dashboard
            | AppRoute::Machines
            | AppRoute::MachineDetail
            | AppRoute::Parts
            | AppRoute::PartDetail
            | AppRoute::Compatibility
            | AppRoute::Settings => Some(Role::Viewer),
            AppRoute::MachineCreate
            | AppRoute::MachineImport
            | AppRoute::MachineEdit
            | AppRoute::PartCreate
            | AppRoute::PartEdit => Some(Role::Technician),
            AppRoute::Users | AppRoute::Backups | AppRoute::ModelTraining => Some(Role::Admin),
        }
    }

    /// Resolve a concrete path such as `/machines/12/edit`. Literal segments
    /// win over `:id` placeholders, so `/machines/new` is never a detail page.
    pub fn from_path(path: &str) -> Option<AppRoute> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut fallback = None;
        for route in AppRoute::ALL {
            let pattern: Vec<&str> = route
                .pattern()
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();
            if pattern.len() != segments.len() {
                continue;
            }
            let mut literal = true;
            let matched = pattern.iter().zip(&segments).all(|(p, s)| {
                if *p == ":id" {
                    literal = false;
                    !s.is_empty()
                } else {
                    p == s
                }
            });
            if matched {
                if literal {
                    return Some(route);
                }
                fallback.get_or_insert(route);
            }
        }
        fallback
    }

    pub fn check(self, user: Option<&User>) -> GuardDecision {
        if self.is_public() {
            return GuardDecision::Allow;
        }
        check(user, self.required_role())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        serde_json::from_value(serde_json::json!({
            "id": 1, "username": "meier", "role": role
        }))
        .unwrap()
    }

    #[test]
    fn test_grant_iff_role_at_least_required() {
        for have in Role::ALL {
            for need in Role::ALL {
                let decision = check(Some(&user(have)), Some(need));
                assert_eq!(decision.is_allowed(), have >= need, "{:?} vs {:?}", have, need);
                if !decision.is_allowed() {
                    assert_eq!(decision, GuardDecision::RedirectToHome);
                }
            }
            assert!(check(Some(&user(Role::Admin)), Some(have)).is_allowed());
        }
    }

    #[test]
    fn test_anonymous_is_sent_to_login() {
        for need in Role::ALL {
            assert_eq!(check(None, Some(need)), GuardDecision::RedirectToLogin);
        }
        assert_eq!(check(None, None), GuardDecision::RedirectToLogin);
        assert_eq!(AppRoute::Login.check(None), GuardDecision::Allow);
    }

    #[test]
    fn test_path_lookup() {
        assert_eq!(AppRoute::from_path("/"), Some(AppRoute::Dashboard));
        assert_eq!(AppRoute::from_path("/machines/new"), Some(AppRoute::MachineCreate));
        assert_eq!(AppRoute::from_path("/machines/import"), Some(AppRoute::MachineImport));
        assert_eq!(AppRoute::from_path("/machines/17"), Some(AppRoute::MachineDetail));
        assert_eq!(AppRoute::from_path("/parts/4/edit?tab=1"), Some(AppRoute::PartEdit));
        assert_eq!(AppRoute::from_path("/nope"), None);
    }

    #[test]
    fn test_route_roles() {
        let viewer = user(Role::Viewer);
        let tech = user(Role::Technician);
        assert!(AppRoute::Machines.check(Some(&viewer)).is_allowed());
        assert_eq!(
            AppRoute::MachineImport.check(Some(&viewer)),
            GuardDecision::RedirectToHome
        );
        assert!(AppRoute::MachineImport.check(Some(&tech)).is_allowed());
        assert_eq!(AppRoute::Users.check(Some(&tech)), GuardDecision::RedirectToHome);
        assert!(AppRoute::Backups.check(Some(&user(Role::Admin))).is_allowed());
    }
}
