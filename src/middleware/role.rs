use serde::{Deserialize, Serialize};

/// Account roles as issued by the session service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Candidate,
    Employer,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "candidate" => Some(Role::Candidate),
            "employer" => Some(Role::Employer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// May act on other users' pitches.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }
}
