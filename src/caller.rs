//! Caller identity passed explicitly into every service operation
//!
//! The upstream auth gateway resolves the request to a user id and a role.
//! Services never read identity from ambient request state; they receive a
//! `Caller` value and check the role they require.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RoadmapError;

/// Platform role of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Alumni,
    Company,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::Alumni => "alumni",
            Role::Company => "company",
        }
    }
}

impl FromStr for Role {
    type Err = RoadmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            "alumni" => Ok(Role::Alumni),
            "company" => Ok(Role::Company),
            other => Err(RoadmapError::Unauthorized(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller of a core operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn student(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Student)
    }

    pub fn teacher(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Teacher)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// Fail with Forbidden unless the caller holds one of `allowed`
    pub fn require(&self, allowed: &[Role]) -> Result<(), RoadmapError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(RoadmapError::Forbidden(format!(
                "role '{}' may not perform this operation",
                self.role
            )))
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Caller({}:{})", self.role, self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!(" Teacher ".parse::<Role>().unwrap(), Role::Teacher);
        assert!(matches!(
            "root".parse::<Role>(),
            Err(RoadmapError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_require_role() {
        let caller = Caller::student("u-1");
        assert!(caller.require(&[Role::Student]).is_ok());
        assert!(matches!(
            caller.require(&[Role::Teacher, Role::Admin]),
            Err(RoadmapError::Forbidden(_))
        ));
    }
}
