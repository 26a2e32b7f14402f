use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStatus {
    pub has_access: bool,
    pub is_creator: bool,
    pub is_private: bool,
}

impl AccessStatus {
    /// Returned whenever access could not be evaluated.
    pub fn denied() -> Self {
        Self {
            has_access: false,
            is_creator: false,
            is_private: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GrantOutcome {
    Granted,
    AlreadyGranted,
}

impl GrantOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            GrantOutcome::Granted => "User granted access to this poll",
            GrantOutcome::AlreadyGranted => "User already has access to this poll",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreate {
    pub user_id: Uuid,
}
