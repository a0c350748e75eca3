//! Canonical role hierarchy
//!
//! Levels: `superadmin = 1`, `admin = 2`, `user = 3`. A lower level carries
//! more privilege.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
}

impl Role {
    pub fn level(self) -> u8 {
        match self {
            Role::SuperAdmin => 1,
            Role::Admin => 2,
            Role::User => 3,
        }
    }

    pub fn from_level(level: u64) -> Option<Self> {
        match level {
            1 => Some(Role::SuperAdmin),
            2 => Some(Role::Admin),
            3 => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Whether this role meets a route's minimum role
    pub fn satisfies(self, minimum: Role) -> bool {
        self.level() <= minimum.level()
    }

    /// Read a `role` claim that may be a name or a numeric level.
    ///
    /// Missing or unrecognised values fall back to [`Role::User`].
    pub fn from_claim(value: Option<&serde_json::Value>) -> Self {
        let parsed = match value {
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            Some(serde_json::Value::Number(n)) => n.as_u64().and_then(Role::from_level),
            _ => None,
        };
        parsed.unwrap_or(Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "superadmin" | "super_admin" | "super-admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "user" | "client" => Ok(Role::User),
            other => other
                .parse::<u64>()
                .ok()
                .and_then(Role::from_level)
                .ok_or_else(|| UnknownRole(s.to_string())),
        }
    }
}
