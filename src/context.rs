//! Caller identity and roles.
//!
//! Every dispatcher call carries a [`CallerContext`]; it is never defaulted
//! silently. Roles form a two-level hierarchy: admin subsumes employee.

use serde::{Deserialize, Serialize};

/// Caller role. `Admin` holds every `Employee` permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Admin,
}

impl Role {
    /// Whether this role satisfies `required`. Admin satisfies everything.
    pub fn satisfies(self, required: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Employee => required == Role::Employee,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(Role::Employee),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: '{other}'")),
        }
    }
}

/// Identity and role of the caller on whose behalf an operation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_satisfies_employee_requirement() {
        assert!(Role::Admin.satisfies(Role::Employee));
        assert!(Role::Admin.satisfies(Role::Admin));
    }

    #[test]
    fn employee_does_not_satisfy_admin_requirement() {
        assert!(!Role::Employee.satisfies(Role::Admin));
        assert!(Role::Employee.satisfies(Role::Employee));
    }

    #[test]
    fn role_round_trips_through_serde() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Admin);
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("employee".parse::<Role>().unwrap(), Role::Employee);
        assert!("superuser".parse::<Role>().is_err());
    }
}
